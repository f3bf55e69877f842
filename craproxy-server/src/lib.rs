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

mod services;

use std::net::{SocketAddr, TcpListener};

use actix_web::dev::{Server, ServerHandle};
use color_eyre::eyre::{Result, WrapErr};

use craproxy::pipeline::Pipeline;

pub use services::Bind;

/// The proxy's HTTP server, bound and ready to run
pub struct ProxyService {
    addrs: Vec<SocketAddr>,
    server: Server,
}

impl ProxyService {
    /// Bind to `bind` and serve every request with `pipeline`
    pub fn new(bind: Bind, pipeline: Pipeline) -> Result<ProxyService> {
        let description = bind.to_string();
        let (server, addrs) = services::init_proxy_server(bind, pipeline)
            .wrap_err_with(|| format!("failed to listen on {description}"))?;
        Ok(ProxyService { addrs, server })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// For stopping the server from elsewhere
    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Serve until stopped
    pub async fn run(self) -> Result<()> {
        for addr in &self.addrs {
            log::info!("craproxy listening on http://{addr}");
        }
        self.server.await.wrap_err("server failed")
    }
}

/// Serve on `bind_address` until the process is stopped
pub async fn serve(bind_address: &str, pipeline: Pipeline) -> Result<()> {
    ProxyService::new(Bind::Address(bind_address.to_string()), pipeline)?
        .run()
        .await
}

/// Serve on an already bound listener (e.g. port 0 in tests)
pub fn listen(listener: TcpListener, pipeline: Pipeline) -> Result<ProxyService> {
    ProxyService::new(Bind::Listener(listener), pipeline)
}
