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

//! Development path forwarding.
//!
//! During development some paths (typically an API) are served by a local
//! backend rather than the origin. Requests whose path starts with a rule's
//! prefix are passed to that rule's target as they are, bypassing version
//! resolution and the cache.

use std::path::Path;
use std::time::Duration;

use actix_web::{
    http::header::{HeaderName, HeaderValue},
    http::StatusCode,
    HttpResponse,
};
use serde::Deserialize;
use url::Url;

use super::{Exchange, Flow};
use crate::cache::entry::is_framing_header;
use crate::error::{ProxyError, Result};

/// Limit on each forwarded request
pub const DEV_FORWARD_TIMEOUT: Duration = Duration::from_secs(60);

/// One entry of the dev paths file, which holds a JSON array of these
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DevPathRule {
    pub prefix: String,
    pub target: String,
}

/// Read dev path rules from a JSON file
pub fn load_dev_rules(path: &Path) -> Result<Vec<DevPathRule>> {
    let json = std::fs::read_to_string(path).map_err(|e| ProxyError::io(path, e))?;
    serde_json::from_str(&json)
        .map_err(|e| ProxyError::DevConfig(format!("{}: {e}", path.display())))
}

pub struct DevForward {
    rules: Vec<(String, Url)>,
    client: reqwest::Client,
}

impl DevForward {
    /// Fails if any rule's target is not a URL
    pub fn new(rules: Vec<DevPathRule>) -> Result<DevForward> {
        let rules = rules
            .into_iter()
            .map(|rule| match Url::parse(&rule.target) {
                Ok(target) => Ok((rule.prefix, target)),
                Err(e) => Err(ProxyError::DevConfig(format!(
                    "target '{}' for prefix '{}': {e}",
                    rule.target, rule.prefix
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let client = reqwest::Client::builder()
            .timeout(DEV_FORWARD_TIMEOUT)
            .build()?;
        Ok(DevForward { rules, client })
    }

    /// The target URL for a request, from the first rule whose prefix
    /// matches `request_path`
    pub fn target_for(&self, request_path: &str, raw_path: &str, query: &str) -> Option<Url> {
        let (_, target) = self
            .rules
            .iter()
            .find(|(prefix, _)| request_path.starts_with(prefix.as_str()))?;

        let mut url = target.clone();
        url.set_path(raw_path);
        url.set_query(if query.is_empty() { None } else { Some(query) });
        Some(url)
    }

    pub(super) async fn run(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        let request = exchange.request;
        let Some(url) = self.target_for(
            &exchange.request_path,
            request.path(),
            request.query_string(),
        ) else {
            return Ok(Flow::Continue);
        };

        log::info!("Dev forward to {url}");
        let body = exchange.take_body();
        match self.forward(exchange, url, body).await {
            Ok(response) => Ok(Flow::Respond(response)),
            Err(e) => {
                log::error!("dev forward failed - {e}");
                Ok(Flow::Respond(HttpResponse::BadGateway().finish()))
            }
        }
    }

    async fn forward(
        &self,
        exchange: &Exchange<'_>,
        url: Url,
        body: bytes::Bytes,
    ) -> Result<HttpResponse> {
        let request = exchange.request;
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut outbound = self.client.request(method, url).body(body);
        for (name, value) in request.headers() {
            let name = name.as_str();
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("host") {
                continue;
            }
            outbound = outbound.header(name, value.as_bytes());
        }

        let upstream = outbound.send().await?;
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);

        let mut builder = HttpResponse::build(status);
        for (name, value) in upstream.headers() {
            if is_framing_header(name.as_str()) {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) else {
                continue;
            };
            builder.append_header((name, value));
        }

        let body = upstream.bytes().await?;
        Ok(builder.body(body))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn rule(prefix: &str, target: &str) -> DevPathRule {
        DevPathRule {
            prefix: prefix.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn first_matching_prefix_wins() {
        let dev_forward = DevForward::new(vec![
            rule("/api/v2", "http://127.0.0.1:9002"),
            rule("/api", "http://127.0.0.1:9001/ignored?x=1"),
        ])
        .unwrap();

        let url = dev_forward
            .target_for("/api/users", "/api/users", "page=2")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9001/api/users?page=2");

        let url = dev_forward
            .target_for("/api/v2/users", "/api/v2/users", "")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9002/api/v2/users");

        assert!(dev_forward.target_for("/app.js", "/app.js", "").is_none());
    }

    #[test]
    fn raw_path_is_forwarded() {
        let dev_forward = DevForward::new(vec![rule("/api", "http://localhost:9001")]).unwrap();
        let url = dev_forward
            .target_for("/api/a b", "/api/a%20b", "")
            .unwrap();
        assert_eq!(url.path(), "/api/a%20b");
    }

    #[test]
    fn invalid_target_is_rejected() {
        let result = DevForward::new(vec![rule("/api", "not a url")]);
        assert!(matches!(result, Err(ProxyError::DevConfig(_))));
    }

    #[test]
    fn rules_load_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"prefix": "/api", "target": "http://localhost:9001"}]"#)
            .unwrap();
        let rules = load_dev_rules(file.path()).unwrap();
        assert_eq!(rules, vec![rule("/api", "http://localhost:9001")]);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            load_dev_rules(file.path()),
            Err(ProxyError::DevConfig(_))
        ));

        assert!(matches!(
            load_dev_rules(Path::new("/nonexistent/dev-paths.json")),
            Err(ProxyError::Io { .. })
        ));
    }
}
