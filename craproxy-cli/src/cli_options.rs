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

use std::path::PathBuf;

use clap::Parser;

use craproxy::web::DEFAULT_BIND_ADDRESS;

/// Serve versioned builds of a single page app from a local cache of an
/// origin such as an object storage website.
///
/// Every option may instead be set using the environment variable shown.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
pub struct Opt {
    /// Base URL of the origin, under which each build lives in its own
    /// /VERSION directory
    #[arg(long, env = "CRA_PROXY_SOURCE", value_name = "URL")]
    pub source: String,

    /// Directory for cached responses, created if necessary
    #[arg(long, env = "CRA_PROXY_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: PathBuf,

    /// Address to listen on
    #[arg(long, env = "CRA_PROXY_BIND", value_name = "ADDR", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// Version served when a request doesn't select one. When not given
    /// the default is read from <URL>/default-version.txt and polled
    /// for changes.
    #[arg(long, env = "CRA_PROXY_DEFAULT_VERSION", value_name = "VERSION")]
    pub default_version: Option<String>,

    /// JSON file of paths to forward to development servers, of the form:
    /// [{"prefix": "/api", "target": "http://localhost:3000"}]
    #[arg(long, env = "CRA_PROXY_DEV_PATHS", value_name = "FILE")]
    pub dev_paths: Option<PathBuf>,
}

#[test]
fn check_options() {
    use clap::CommandFactory;
    Opt::command().debug_assert();

    let opt = Opt::try_parse_from([
        "craproxy",
        "--source",
        "https://bucket.example.com",
        "--cache-dir",
        "/tmp/cache",
    ])
    .unwrap();
    assert_eq!(opt.bind, DEFAULT_BIND_ADDRESS);
    assert!(opt.default_version.is_none());
    assert!(opt.dev_paths.is_none());
}
