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

//! Rewriting of a request path into the version-prefixed path used both to
//! fetch from the origin and to address the local cache:
//!
//!    `/{VERSION}/{APP-PATH}`
//!
//! where APP-PATH is the request path, or `/index.html` when the request
//! path has no file extension (app-shell routing: every client side route of
//! a single-page application is served the same entry document).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::cache::key::CacheKey;
use crate::version::VersionToken;

/// The entry document served for any path without a file extension
pub const APP_SHELL_DOCUMENT: &str = "/index.html";

// Everything except unreserved characters and the sub-delimiters which are
// allowed within a single path segment. Notably '/' is escaped so a version
// can never add path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Escape a version so that it is safe to use as exactly one path segment
pub fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Escape each segment of a decoded path, keeping the slashes between them
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(escape_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decode the path of a request URI
pub fn decode_request_path(raw_path: &str) -> String {
    percent_decode_str(raw_path).decode_utf8_lossy().into_owned()
}

/// Lexically clean a slash separated path:
/// - repeated slashes collapse to one
/// - `.` segments are removed
/// - `..` removes the preceding segment, and at the root is dropped
/// - trailing slashes are removed
///
/// A rooted path stays rooted, so the result of cleaning `"/" + anything`
/// can never climb above the root. An empty result is `"."` (or `"/"`
/// when rooted).
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            _ => segments.push(segment),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// The extension of the final path segment, including the dot, or "" if
/// that segment contains no dot.
pub fn path_extension(path: &str) -> &str {
    let last_segment = match path.rfind('/') {
        Some(position) => &path[position + 1..],
        None => path,
    };
    match last_segment.rfind('.') {
        Some(position) => &last_segment[position..],
        None => "",
    }
}

/// Apply app-shell routing to a request path
pub fn app_path(request_path: &str) -> &str {
    if path_extension(request_path).is_empty() {
        APP_SHELL_DOCUMENT
    } else {
        request_path
    }
}

/// Make the cache key for a version and (decoded) request path:
///
///    `clean("/" + escape(version) + "/" + app_path(request_path))`
///
/// The request path is cleaned on its own first so that its `..` segments
/// cannot remove the version prefix. The extension test is made on the
/// request path rather than the versioned path, so a version containing a
/// dot (e.g. '1.2.3') cannot lend its "extension" to a request for '/'.
pub fn rewrite(version: &VersionToken, request_path: &str) -> CacheKey {
    let escaped_version = escape_segment(version.as_str());
    let request_path = clean_path(&format!("/{request_path}"));
    let path = app_path(&request_path);
    CacheKey::new(format!("/{escaped_version}/{path}"))
}

#[test]
fn check_clean_path() {
    assert_eq!(clean_path(""), ".");
    assert_eq!(clean_path("/"), "/");
    assert_eq!(clean_path("//a//b/"), "/a/b");
    assert_eq!(clean_path("/a/./b/../c"), "/a/c");
    assert_eq!(clean_path("/../../etc/passwd"), "/etc/passwd");
    assert_eq!(clean_path("a/../../b"), "../b");
    assert_eq!(clean_path("./"), ".");
}

#[test]
fn check_path_extension() {
    assert_eq!(path_extension("/static/app.js"), ".js");
    assert_eq!(path_extension("/archive.tar.gz"), ".gz");
    assert_eq!(path_extension("/v1.2/about"), "");
    assert_eq!(path_extension("/"), "");
    assert_eq!(path_extension("/.well-known"), ".well-known");
}

#[test]
fn check_escape_segment() {
    assert_eq!(escape_segment("v1.2.3"), "v1.2.3");
    assert_eq!(escape_segment("a/b"), "a%2Fb");
    assert_eq!(escape_segment("feature branch"), "feature%20branch");
    assert_eq!(escape_segment("x?y#z"), "x%3Fy%23z");
    assert_eq!(escape_segment("build@2+3"), "build@2+3");
    assert_eq!(escape_segment("100%"), "100%25");
    assert_eq!(escape_path("/static/a%20b c.js"), "/static/a%2520b%20c.js");
}

#[test]
fn check_rewrite() {
    let v1 = VersionToken::new("v1");
    assert_eq!(rewrite(&v1, "/").as_str(), "/v1/index.html");
    assert_eq!(rewrite(&v1, "/users/42/profile").as_str(), "/v1/index.html");
    assert_eq!(rewrite(&v1, "/static/app.js").as_str(), "/v1/static/app.js");
    assert_eq!(rewrite(&v1, "/a/../b/site.css").as_str(), "/v1/b/site.css");
    assert_eq!(rewrite(&v1, "/../../x.js").as_str(), "/v1/x.js");

    let dotted = VersionToken::new("1.2.3");
    assert_eq!(rewrite(&dotted, "/").as_str(), "/1.2.3/index.html");

    // A version can't climb out of its own directory
    let sneaky = VersionToken::new("../../etc");
    assert_eq!(rewrite(&sneaky, "/passwd.txt").as_str(), "/..%2F..%2Fetc/passwd.txt");
    let dots = VersionToken::new("..");
    assert_eq!(rewrite(&dots, "/x.js").as_str(), "/x.js");
}
