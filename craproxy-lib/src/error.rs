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

use thiserror::Error;

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

/// Everything that can go wrong between receiving a request and serving it,
/// plus the startup failures which prevent serving at all.
///
/// Nothing here is retried by the pipeline. Request time errors all map to
/// a generic error response (see [`crate::web::error_response`]).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("cache i/o failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("origin request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed cache entry '{}': {reason}", path.display())]
    MalformedEntry { path: PathBuf, reason: String },

    #[error("cache entry '{0}' was stored but could not be found")]
    EntryVanished(String),

    #[error("invalid origin url '{url}': {reason}")]
    InvalidOrigin { url: String, reason: String },

    #[error("invalid dev paths config: {0}")]
    DevConfig(String),

    #[error("HTTP {status} getting default version from '{url}'")]
    DefaultVersionStatus { url: String, status: http::StatusCode },

    #[error("stage '{stage}' ran before {missing} was available")]
    StageOrder {
        stage: &'static str,
        missing: &'static str,
    },
}

impl ProxyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProxyError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ProxyError::MalformedEntry {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
