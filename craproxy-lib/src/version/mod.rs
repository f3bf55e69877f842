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

//! # Versions
//!
//! A version is an opaque string naming one build of the application, which
//! the origin holds under `/{VERSION}/`. Nothing checks that a version exists:
//! an unknown version simply results in whatever the origin returns for it
//! (typically a 404, which is cached like any other response).
//!
//! Which version a request gets is decided by [`resolver::resolve_version`]:
//!
//!    1) `?version=VERSION` in the query string
//!    2) the `version-override` cookie
//!    3) the current default, held in a [`default::DefaultVersion`] which may
//!       be kept up-to-date by a [`poller::DefaultVersionPoller`]

pub mod default;
pub mod poller;
pub mod resolver;

pub use default::DefaultVersion;
pub use resolver::{resolve_version, CookieAction, Resolution, VersionSource};

use std::fmt::{self, Display, Formatter};

/// The version selected for one request, as received (not yet escaped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(version: impl Into<String>) -> VersionToken {
        VersionToken(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VersionToken {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
