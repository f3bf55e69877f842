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

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use crate::rewrite::clean_path;

/// A cleaned, rooted, version-prefixed path such as `/v1/static/app.js`.
///
/// The same key addresses the origin (appended to the origin URL path) and
/// the cache (relative to the cache root). Made by [`crate::rewrite::rewrite`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Cleans the path, so the key never contains `.` or `..` segments
    pub fn new(path: impl AsRef<str>) -> CacheKey {
        CacheKey(clean_path(&format!("/{}", path.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The file for this key under `root`
    pub fn path_under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.0.split('/').filter(|segment| !segment.is_empty()) {
            path.push(segment);
        }
        path
    }
}

impl Display for CacheKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[test]
fn check_cache_key_paths() {
    let key = CacheKey::new("v1/static/../app.js");
    assert_eq!(key.as_str(), "/v1/app.js");
    assert_eq!(
        key.path_under(Path::new("/var/cache/craproxy")),
        Path::new("/var/cache/craproxy/v1/app.js")
    );

    let key = CacheKey::new("/../../etc/passwd");
    assert_eq!(
        key.path_under(Path::new("/cache")),
        Path::new("/cache/etc/passwd")
    );
}
