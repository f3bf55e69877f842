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

use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::cache::key::CacheKey;
use crate::error::{ProxyError, Result};
use crate::rewrite::{clean_path, escape_path};

/// Limit on each request to the origin, from connecting to receiving the
/// whole body
pub const ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The base URL of the origin, fixed for the life of the process
#[derive(Debug, Clone)]
pub struct OriginDescriptor {
    base: Url,
}

impl OriginDescriptor {
    pub fn parse(source: &str) -> Result<OriginDescriptor> {
        let base = Url::parse(source).map_err(|e| ProxyError::InvalidOrigin {
            url: source.to_string(),
            reason: e.to_string(),
        })?;

        if base.cannot_be_a_base() || !base.has_host() {
            return Err(ProxyError::InvalidOrigin {
                url: source.to_string(),
                reason: "not a base URL with a host".to_string(),
            });
        }

        Ok(OriginDescriptor { base })
    }

    pub fn url(&self) -> &Url {
        &self.base
    }

    /// The origin URL for a key: the key appended to the origin's path, with
    /// any query or fragment of the configured URL dropped.
    ///
    /// The version segment of a key is already escaped but the rest is the
    /// decoded request path, which is escaped here so the origin decodes it
    /// back to exactly the cached name.
    pub fn url_for(&self, key: &CacheKey) -> Url {
        let (version, rest) = match key.as_str().trim_start_matches('/').split_once('/') {
            Some((version, rest)) => (version, escape_path(rest)),
            None => (key.as_str().trim_start_matches('/'), String::new()),
        };

        let mut url = self.base.clone();
        url.set_path(&clean_path(&format!(
            "{}/{version}/{rest}",
            self.base.path()
        )));
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

/// A complete response from the origin, whatever its status
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: http::StatusCode,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

/// Fetches cache entries from the origin
#[derive(Clone)]
pub struct OriginClient {
    client: reqwest::Client,
    origin: OriginDescriptor,
}

impl OriginClient {
    /// A client with the standard [`ORIGIN_TIMEOUT`]
    pub fn new(origin: OriginDescriptor) -> Result<OriginClient> {
        let client = reqwest::Client::builder().timeout(ORIGIN_TIMEOUT).build()?;
        Ok(OriginClient::with_client(client, origin))
    }

    pub fn with_client(client: reqwest::Client, origin: OriginDescriptor) -> OriginClient {
        OriginClient { client, origin }
    }

    pub fn origin(&self) -> &OriginDescriptor {
        &self.origin
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET the key from the origin.
    ///
    /// The status is not interpreted: a 404 or 500 from the origin is a
    /// successful fetch, to be cached like any other response. Only failure
    /// to get a complete response (connection, DNS, timeout, a broken body)
    /// is an error.
    pub async fn fetch(&self, key: &CacheKey) -> Result<RawResponse> {
        let url = self.origin.url_for(key);
        log::info!("Fetching from origin: {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        log::debug!("Origin returned {status} with {} bytes for {key}", body.len());
        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[test]
fn check_origin_urls() {
    let origin = OriginDescriptor::parse("https://bucket.example.com").unwrap();
    let key = CacheKey::new("/v1/static/app.js");
    assert_eq!(
        origin.url_for(&key).as_str(),
        "https://bucket.example.com/v1/static/app.js"
    );

    let origin = OriginDescriptor::parse("http://127.0.0.1:9000/builds/?x=1").unwrap();
    assert_eq!(
        origin.url_for(&key).as_str(),
        "http://127.0.0.1:9000/builds/v1/static/app.js"
    );

    let key = CacheKey::new("/feature%20x/index.html");
    assert_eq!(
        origin.url_for(&key).as_str(),
        "http://127.0.0.1:9000/builds/feature%20x/index.html"
    );

    // The file 'a%20b.js', not 'a b.js'
    let key = CacheKey::new("/v1/static/a%20b.js");
    assert_eq!(
        origin.url_for(&key).as_str(),
        "http://127.0.0.1:9000/builds/v1/static/a%2520b.js"
    );
    let key = CacheKey::new("/v1/a b?.js");
    assert_eq!(
        origin.url_for(&key).as_str(),
        "http://127.0.0.1:9000/builds/v1/a%20b%3F.js"
    );
}

#[test]
fn check_invalid_origin() {
    assert!(OriginDescriptor::parse("not a url").is_err());
    assert!(OriginDescriptor::parse("mailto:someone@example.com").is_err());
    assert!(OriginDescriptor::parse("bucket.example.com").is_err());
}
