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

pub(crate) mod www;

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::{Duration, Instant};

use actix_web::{
    dev::{Server, Service},
    middleware::Logger,
    web,
    web::Data,
    App, HttpServer,
};

use craproxy::cache::CacheKey;
use craproxy::pipeline::Pipeline;
use craproxy::web::{CONNECTION_TIMEOUT, X_CACHE};

/// Largest request body accepted, which only matters for dev forwarding
pub const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Where the server listens
pub enum Bind {
    /// A host:port to bind
    Address(String),
    /// A listener which is already bound
    Listener(TcpListener),
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bind::Address(address) => write!(f, "{address}"),
            Bind::Listener(listener) => match listener.local_addr() {
                Ok(addr) => write!(f, "{addr}"),
                Err(_) => write!(f, "<listener>"),
            },
        }
    }
}

/// Build the server which hands every request, whatever its method or path,
/// to the pipeline
pub(crate) fn init_proxy_server(
    bind: Bind,
    pipeline: Pipeline,
) -> io::Result<(Server, Vec<SocketAddr>)> {
    let pipeline = Data::new(pipeline);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            // One summary line per request, including what it was rewritten to
            .wrap_fn(|req, srv| {
                let method = req.method().clone();
                let path = req.path().to_string();
                let started = Instant::now();
                let fut = srv.call(req);
                async move {
                    let res = fut.await?;

                    let rewritten = res
                        .response()
                        .extensions()
                        .get::<CacheKey>()
                        .map(|key| key.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let x_cache = res
                        .headers()
                        .get(X_CACHE)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-")
                        .to_string();
                    log::info!(
                        "{method} {path} {} {:.3}s {rewritten} {x_cache}",
                        res.status().as_u16(),
                        started.elapsed().as_secs_f64()
                    );

                    Ok(res)
                }
            })
            .app_data(web::PayloadConfig::new(MAX_REQUEST_BODY))
            .app_data(Data::clone(&pipeline))
            .default_service(web::route().to(www::proxy_handler))
    })
    .keep_alive(Duration::from_secs(CONNECTION_TIMEOUT));

    let server = match bind {
        Bind::Address(address) => server.bind(address)?,
        Bind::Listener(listener) => server.listen(listener)?,
    };
    let addrs = server.addrs();
    Ok((server.run(), addrs))
}
