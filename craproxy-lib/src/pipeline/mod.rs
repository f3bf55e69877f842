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

//! # Pipeline
//!
//! Every request passes through an ordered list of [`Stage`]s. Each stage
//! may add to the request's [`Exchange`] and let the next stage run
//! ([`Flow::Continue`]), or end the pipeline with a response
//! ([`Flow::Respond`]). An error from any stage also ends the pipeline, and
//! the client gets a generic 500 response.
//!
//! The standard pipeline is:
//!
//!    [dev forwarding] -> resolve version -> rewrite path -> fetch through cache
//!
//! where dev forwarding is only present when dev path rules are configured.
//!
//! Whatever the outcome, once a version has been resolved the response
//! carries the cookie and `Cache-Control` that the resolution calls for.

pub mod dev_forward;
pub mod fetch_through;

pub use dev_forward::{load_dev_rules, DevForward, DevPathRule};
pub use fetch_through::FetchThrough;

use std::sync::Arc;

use actix_web::{http::StatusCode, HttpRequest, HttpResponse};
use bytes::Bytes;

use crate::cache::{CacheKey, CacheStore};
use crate::error::{ProxyError, Result};
use crate::origin::OriginClient;
use crate::rewrite::{decode_request_path, rewrite};
use crate::version::{resolver::resolve_request, DefaultVersion, Resolution};
use crate::web::error_response;

/// What a stage decided
pub enum Flow {
    Continue,
    Respond(HttpResponse),
}

/// The state of one request as it passes through the pipeline
pub struct Exchange<'r> {
    pub request: &'r HttpRequest,
    /// The percent-decoded request path
    pub request_path: String,
    pub resolution: Option<Resolution>,
    pub key: Option<CacheKey>,
    body: Bytes,
}

impl<'r> Exchange<'r> {
    pub fn new(request: &'r HttpRequest, body: Bytes) -> Exchange<'r> {
        Exchange {
            request,
            request_path: decode_request_path(request.path()),
            resolution: None,
            key: None,
            body,
        }
    }

    /// The request body, which only one stage can consume
    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body)
    }
}

pub enum Stage {
    /// Pass matching paths to another server, bypassing the cache
    DevForward(DevForward),
    /// Choose the version from the query, cookie or default
    ResolveVersion(Arc<DefaultVersion>),
    /// Make the cache key from the version and request path
    RewritePath,
    /// Serve the key from the cache, filling it from the origin on a miss
    FetchThrough(FetchThrough),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DevForward(_) => "dev-forward",
            Stage::ResolveVersion(_) => "resolve-version",
            Stage::RewritePath => "rewrite-path",
            Stage::FetchThrough(_) => "fetch-through",
        }
    }

    pub async fn run(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        match self {
            Stage::DevForward(dev_forward) => dev_forward.run(exchange).await,
            Stage::ResolveVersion(default_version) => {
                let resolution = resolve_request(exchange.request, default_version);
                log::debug!(
                    "Version '{}' from {:?} for {}",
                    resolution.version,
                    resolution.source,
                    exchange.request_path
                );
                exchange.resolution = Some(resolution);
                Ok(Flow::Continue)
            }
            Stage::RewritePath => {
                let resolution =
                    exchange
                        .resolution
                        .as_ref()
                        .ok_or(ProxyError::StageOrder {
                            stage: self.name(),
                            missing: "a version",
                        })?;
                exchange.key = Some(rewrite(&resolution.version, &exchange.request_path));
                Ok(Flow::Continue)
            }
            Stage::FetchThrough(fetch_through) => fetch_through.run(exchange).await,
        }
    }
}

/// Everything the standard pipeline needs
pub struct PipelineConfig {
    pub dev_rules: Vec<DevPathRule>,
    pub default_version: Arc<DefaultVersion>,
    pub store: CacheStore,
    pub origin: OriginClient,
}

pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Pipeline {
        Pipeline { stages }
    }

    /// The standard pipeline (see module documentation)
    pub fn standard(config: PipelineConfig) -> Result<Pipeline> {
        let mut stages = Vec::new();
        if !config.dev_rules.is_empty() {
            stages.push(Stage::DevForward(DevForward::new(config.dev_rules)?));
        }
        stages.push(Stage::ResolveVersion(config.default_version));
        stages.push(Stage::RewritePath);
        stages.push(Stage::FetchThrough(FetchThrough::new(
            config.store,
            config.origin,
        )));
        Ok(Pipeline::new(stages))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run the stages for a request and return the response.
    ///
    /// The cache key, when one was made, is attached to the response as an
    /// extension so that request logging can report the rewritten path.
    pub async fn handle(&self, request: &HttpRequest, body: Bytes) -> HttpResponse {
        let mut exchange = Exchange::new(request, body);

        let mut response = match self.run(&mut exchange).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                log::error!(
                    "no stage responded to {} {}",
                    request.method(),
                    request.path()
                );
                error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(e) => {
                log::error!("{} {} - {e}", request.method(), request.path());
                error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        if let Some(resolution) = &exchange.resolution {
            resolution.apply_to(&mut response);
        }
        if let Some(key) = exchange.key {
            response.extensions_mut().insert(key);
        }
        response
    }

    async fn run(&self, exchange: &mut Exchange<'_>) -> Result<Option<HttpResponse>> {
        for stage in &self.stages {
            if let Flow::Respond(response) = stage.run(exchange).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[actix_web::test]
    async fn rewrite_needs_a_version() {
        let pipeline = Pipeline::new(vec![Stage::RewritePath]);
        let request = TestRequest::get().uri("/").to_http_request();
        let response = pipeline.handle(&request, Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn no_response_is_an_error_but_keeps_version_headers() {
        let default_version = Arc::new(DefaultVersion::new("v1"));
        let pipeline = Pipeline::new(vec![
            Stage::ResolveVersion(default_version),
            Stage::RewritePath,
        ]);
        let request = TestRequest::get()
            .uri("/about?version=v9")
            .to_http_request();
        let response = pipeline.handle(&request, Bytes::new()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
        assert_eq!(
            response.extensions().get::<CacheKey>().unwrap().as_str(),
            "/v9/index.html"
        );
    }
}
