/*
*   Copyright (c) 2024-2025 Mark Hughes

*   This program is free software: you can redistribute it and/or modify
*   it under the terms of the GNU Affero General Public License as published by
*   the Free Software Foundation, either version 3 of the License, or
*   (at your option) any later version.

*   This program is distributed in the hope that it will be useful,
*   but WITHOUT ANY WARRANTY; without even the implied warranty of
*   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
*   GNU Affero General Public License for more details.

*   You should have received a copy of the GNU Affero General Public License
*   along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

mod cli_options;
mod commands;

use clap::Parser;
use color_eyre::Result;
use env_logger::Env;

use cli_options::Opt;

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if std::env::var("RUST_SPANTRACE").is_err() {
        std::env::set_var("RUST_SPANTRACE", "0");
    }

    // Request logging from actix and the proxy, overridden by RUST_LOG
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let opt = Opt::parse();
    commands::server::start_in_foreground(opt).await
}
