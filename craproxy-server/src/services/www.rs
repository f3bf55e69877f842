/*
 Copyright (c) 2025 Mark Hughes

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as published by
 the Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use actix_web::{web, web::Data, HttpRequest, HttpResponse};

use craproxy::pipeline::Pipeline;

/// Handle every request of the form:
///     http://<BIND>/here/is/a/path.js[?version=<VERSION>]
///
/// The response is whatever the pipeline produces: a dev forwarded
/// response, the cached response for the rewritten path, or an error page.
pub async fn proxy_handler(
    request: HttpRequest,
    body: web::Bytes,
    pipeline: Data<Pipeline>,
) -> HttpResponse {
    pipeline.handle(&request, body).await
}
