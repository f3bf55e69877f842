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

use parking_lot::RwLock;

/// The version served to requests which don't ask for one.
///
/// One per process, shared as `Arc<DefaultVersion>` between the request
/// handlers (readers) and the poller (the only writer). A request reads the
/// value once when resolving its version, so an update affects only requests
/// resolved after it.
#[derive(Debug)]
pub struct DefaultVersion {
    current: RwLock<String>,
}

impl DefaultVersion {
    pub fn new(initial: impl Into<String>) -> DefaultVersion {
        DefaultVersion {
            current: RwLock::new(initial.into()),
        }
    }

    pub fn get(&self) -> String {
        self.current.read().clone()
    }

    /// Set a new default, returning the previous one
    pub fn replace(&self, version: impl Into<String>) -> String {
        std::mem::replace(&mut *self.current.write(), version.into())
    }

    /// Set a new default only if the current one is `expected`
    pub fn compare_and_swap(&self, expected: &str, version: impl Into<String>) -> bool {
        let mut current = self.current.write();
        if *current != expected {
            return false;
        }
        *current = version.into();
        true
    }
}

#[test]
fn check_default_version_updates() {
    let default_version = DefaultVersion::new("v1");
    assert_eq!(default_version.get(), "v1");

    assert_eq!(default_version.replace("v2"), "v1");
    assert_eq!(default_version.get(), "v2");

    assert!(!default_version.compare_and_swap("v1", "v3"));
    assert_eq!(default_version.get(), "v2");
    assert!(default_version.compare_and_swap("v2", "v3"));
    assert_eq!(default_version.get(), "v3");
}
