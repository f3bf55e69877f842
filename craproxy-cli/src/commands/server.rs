/*
 Copyright (c) 2025- Mark Hughes

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

use std::sync::Arc;

use color_eyre::{eyre::WrapErr, Result};

use craproxy::cache::CacheStore;
use craproxy::origin::{OriginClient, OriginDescriptor};
use craproxy::pipeline::{load_dev_rules, Pipeline, PipelineConfig};
use craproxy::version::poller::{default_version_url, DefaultVersionPoller};
use craproxy::version::DefaultVersion;

use crate::cli_options::Opt;

/// Check the configuration, build the pipeline and serve until stopped.
/// Any configuration error stops the process before it listens.
pub(crate) async fn start_in_foreground(opt: Opt) -> Result<()> {
    let origin = OriginDescriptor::parse(&opt.source).wrap_err("invalid source")?;
    let origin = OriginClient::new(origin).wrap_err("unable to create origin client")?;

    let default_version = match opt.default_version {
        Some(version) => {
            log::info!("Default version: '{version}'");
            Arc::new(DefaultVersion::new(version))
        }
        None => {
            let url = default_version_url(&opt.source);
            let poller = DefaultVersionPoller::new(origin.http_client().clone(), url.clone());
            let (default_version, _poller) = poller
                .start()
                .await
                .wrap_err_with(|| format!("unable to get default version from {url}"))?;
            default_version
        }
    };

    let dev_rules = match &opt.dev_paths {
        Some(path) => {
            let rules = load_dev_rules(path).wrap_err("unable to load dev paths")?;
            for rule in &rules {
                log::info!("Dev forwarding {}* to {}", rule.prefix, rule.target);
            }
            rules
        }
        None => Vec::new(),
    };

    log::info!("Caching {} in {}", opt.source, opt.cache_dir.display());
    let pipeline = Pipeline::standard(PipelineConfig {
        dev_rules,
        default_version,
        store: CacheStore::new(opt.cache_dir),
        origin,
    })
    .wrap_err("unable to build request pipeline")?;

    craproxy_server::serve(&opt.bind, pipeline).await
}
