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

//! An in-process origin server for tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use parking_lot::Mutex;

#[derive(Default)]
pub struct OriginState {
    /// Requests received, by path
    pub hits: Mutex<HashMap<String, usize>>,
    /// Served as /default-version.txt, or a 500 if None
    pub default_version: Mutex<Option<String>>,
    /// Delay before each response
    pub delay: Mutex<Duration>,
}

impl OriginState {
    pub fn hits_for(&self, path: &str) -> usize {
        self.hits.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }
}

pub struct TestOrigin {
    pub url: String,
    pub state: Arc<OriginState>,
}

async fn origin_handler(request: HttpRequest, state: web::Data<OriginState>) -> HttpResponse {
    let path = request.path().to_string();
    *state.hits.lock().entry(path.clone()).or_default() += 1;

    let delay = *state.delay.lock();
    if !delay.is_zero() {
        actix_web::rt::time::sleep(delay).await;
    }

    match path.as_str() {
        "/default-version.txt" => match state.default_version.lock().clone() {
            Some(version) => HttpResponse::Ok()
                .content_type("text/plain")
                .body(format!("  {version}\n")),
            None => HttpResponse::InternalServerError().finish(),
        },
        "/v1/index.html" => HttpResponse::Ok()
            .content_type("text/html")
            .body("<html>v1</html>"),
        "/v2/index.html" => HttpResponse::Ok()
            .content_type("text/html")
            .body("<html>v2</html>"),
        "/v1/static/app.js" => HttpResponse::Ok()
            .content_type("application/javascript")
            .insert_header(("x-origin", "bucket"))
            .body("console.log('v1')"),
        _ => HttpResponse::NotFound()
            .content_type("text/plain")
            .body("not found"),
    }
}

/// Start an origin on an ephemeral port. It runs until the test's actix
/// system stops.
pub fn start_origin() -> TestOrigin {
    let state = Arc::new(OriginState::default());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let data = web::Data::from(Arc::clone(&state));
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .default_service(web::route().to(origin_handler))
    })
    .workers(1)
    .listen(listener)
    .unwrap()
    .run();
    actix_web::rt::spawn(server);

    TestOrigin { url, state }
}

/// A URL on which nothing is listening
pub fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://{}", listener.local_addr().unwrap())
}
