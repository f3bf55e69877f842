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

use actix_web::{
    http::{header, StatusCode},
    HttpResponse, HttpResponseBuilder,
};

// Default listening address, used unless overridden on the command line
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";

/// Keep-alive for client connections, in seconds
pub const CONNECTION_TIMEOUT: u64 = 75;

/// Marks whether a response was served without contacting the origin
pub const X_CACHE: &str = "x-cache";

/// Query parameter which selects a version explicitly
pub const VERSION_QUERY_PARAM: &str = "version";

/// Cookie which keeps an explicitly selected version for subsequent requests
/// (e.g. the scripts and stylesheets loaded by a versioned entry point)
pub const VERSION_COOKIE_NAME: &str = "version-override";

/// Whether a response came from the local cache or needed an origin fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// A bare error page. What went wrong is logged, never sent to the client.
pub fn error_response(status_code: StatusCode) -> HttpResponse {
    let reason = status_code.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<!DOCTYPE html><head></head><body>
    <h3>{} {reason}</h3>
    </body>",
        status_code.as_u16()
    );

    HttpResponseBuilder::new(status_code)
        .insert_header(header::ContentType(mime::TEXT_HTML))
        .body(body)
}

#[test]
fn error_response_is_generic_html() {
    let response = error_response(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/html"
    );
}
