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

//! Keeps the default version in step with the origin, which publishes it as
//! a small text file alongside the versioned builds.

use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::task::JoinHandle;

use super::DefaultVersion;
use crate::error::{ProxyError, Result};

/// Appended to the origin URL to give the URL of the default version
pub const DEFAULT_VERSION_FILE: &str = "/default-version.txt";

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// The URL of the default version file for an origin URL (as configured)
pub fn default_version_url(source: &str) -> String {
    format!("{source}{DEFAULT_VERSION_FILE}")
}

/// Get the default version. Anything other than a 200 is an error.
pub async fn fetch_default_version(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(ProxyError::DefaultVersionStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let body = response.text().await?;
    Ok(body.trim().to_string())
}

pub struct DefaultVersionPoller {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
    retry_interval: Duration,
}

impl DefaultVersionPoller {
    pub fn new(client: reqwest::Client, url: String) -> DefaultVersionPoller {
        DefaultVersionPoller {
            client,
            url,
            poll_interval: POLL_INTERVAL,
            retry_interval: RETRY_INTERVAL,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, retry_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry_interval = retry_interval;
        self
    }

    /// Fetch the default version and start polling for changes.
    ///
    /// Fails if the first fetch fails, because without a default there is
    /// nothing to serve requests that don't select a version. Once started,
    /// polling continues for the life of the actix system, retrying
    /// failed fetches after a short delay.
    pub async fn start(self) -> Result<(Arc<DefaultVersion>, JoinHandle<()>)> {
        let version = fetch_default_version(&self.client, &self.url).await?;
        log::info!("Default version from source: '{version}'");

        let default_version = Arc::new(DefaultVersion::new(version));
        let handle = actix_web::rt::spawn(self.run(Arc::clone(&default_version)));
        Ok((default_version, handle))
    }

    /// Fetch once and update the default. Returns true if it changed.
    pub async fn poll_once(&self, default_version: &DefaultVersion) -> Result<bool> {
        let version = fetch_default_version(&self.client, &self.url).await?;
        let previous = default_version.replace(version.clone());
        if previous != version {
            log::info!("Updating default version from '{previous}' to '{version}'");
            return Ok(true);
        }
        Ok(false)
    }

    async fn run(self, default_version: Arc<DefaultVersion>) {
        loop {
            tokio::time::sleep(self.poll_interval).await;
            while let Err(e) = self.poll_once(&default_version).await {
                log::error!("Failed to poll default version: {e}");
                tokio::time::sleep(self.retry_interval).await;
            }
        }
    }
}
