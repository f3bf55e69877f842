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

use actix_web::{
    cookie::{
        time::{Duration, OffsetDateTime},
        Cookie,
    },
    http::header::{self, HeaderValue},
    HttpRequest, HttpResponse,
};
use qstring::QString;

use super::{DefaultVersion, VersionToken};
use crate::web::{VERSION_COOKIE_NAME, VERSION_QUERY_PARAM};

/// How long a browser keeps an explicitly selected version. The cookie is
/// refreshed on every request which uses it, so this is a sliding expiry.
pub const VERSION_COOKIE_LIFETIME: Duration = Duration::hours(1);

/// Where the version for a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Query,
    Cookie,
    Default,
}

/// What to do about the `version-override` cookie in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieAction {
    /// Leave the cookie alone
    None,
    /// Set the cookie so resources loaded by the page get the same version
    Set,
    /// Push back the expiry of the cookie the request arrived with
    Refresh,
}

/// The version chosen for a request and what the response must carry as a
/// result of that choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: VersionToken,
    pub source: VersionSource,
}

impl Resolution {
    pub fn cookie_action(&self) -> CookieAction {
        match self.source {
            VersionSource::Query => CookieAction::Set,
            VersionSource::Cookie => CookieAction::Refresh,
            VersionSource::Default => CookieAction::None,
        }
    }

    /// Responses for an explicitly chosen version must not be stored by
    /// browsers or intermediate caches. Caches don't key on cookies, so a
    /// stored response could be served for a different version.
    pub fn no_store(&self) -> bool {
        self.source != VersionSource::Default
    }

    /// The cookie to send with the response, if any
    pub fn response_cookie(&self) -> Option<Cookie<'static>> {
        if self.cookie_action() == CookieAction::None {
            return None;
        }

        // Not HttpOnly so that page scripts can see and change the version
        Some(
            Cookie::build(VERSION_COOKIE_NAME, cookie_value(self.version.as_str()))
                .path("/")
                .http_only(false)
                .expires(OffsetDateTime::now_utc() + VERSION_COOKIE_LIFETIME)
                .finish(),
        )
    }

    /// Add the cookie and caching headers implied by this resolution
    pub fn apply_to(&self, response: &mut HttpResponse) {
        if let Some(cookie) = self.response_cookie() {
            if let Err(e) = response.add_cookie(&cookie) {
                log::warn!(
                    "unable to set {VERSION_COOKIE_NAME} cookie for version '{}': {e}",
                    self.version
                );
            }
        }

        if self.no_store() {
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
    }
}

/// Make a version usable as a cookie value.
///
/// Characters which can't appear in a cookie value (controls, non-ASCII, `"`, `;`
/// and `\`) are dropped, so a version can't add attributes to the cookie.
/// A value containing a space or comma is quoted. The version used for the
/// request itself is not affected.
pub fn cookie_value(version: &str) -> String {
    let value: String = version
        .chars()
        .filter(|&c| matches!(c, ' '..='~') && !matches!(c, '"' | ';' | '\\'))
        .collect();
    if value.len() < version.len() {
        log::warn!(
            "Dropped characters from version '{version}' which can't be used in the {VERSION_COOKIE_NAME} cookie"
        );
    }

    if value.contains([' ', ',']) {
        format!("\"{value}\"")
    } else {
        value
    }
}

/// Choose the version for a request:
///
///    1) a non-empty `version` query parameter
///    2) the `version-override` cookie
///    3) the current default
///
/// Any string is accepted. It is escaped later, when used in a path.
pub fn resolve_version(
    query_version: Option<&str>,
    cookie_version: Option<&str>,
    default_version: &DefaultVersion,
) -> Resolution {
    if let Some(version) = query_version.filter(|version| !version.is_empty()) {
        return Resolution {
            version: VersionToken::new(version),
            source: VersionSource::Query,
        };
    }

    if let Some(version) = cookie_version {
        return Resolution {
            version: VersionToken::new(version),
            source: VersionSource::Cookie,
        };
    }

    Resolution {
        version: VersionToken::new(default_version.get()),
        source: VersionSource::Default,
    }
}

/// Choose the version for an actix-web request (see [`resolve_version`])
pub fn resolve_request(request: &HttpRequest, default_version: &DefaultVersion) -> Resolution {
    let query = QString::from(request.query_string());
    let cookie = request.cookie(VERSION_COOKIE_NAME);
    resolve_version(
        query.get(VERSION_QUERY_PARAM),
        cookie.as_ref().map(|cookie| cookie.value()),
        default_version,
    )
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn query_beats_cookie_beats_default() {
        let default_version = DefaultVersion::new("v1");

        let resolution = resolve_version(Some("v2"), Some("v3"), &default_version);
        assert_eq!(resolution.version.as_str(), "v2");
        assert_eq!(resolution.source, VersionSource::Query);
        assert_eq!(resolution.cookie_action(), CookieAction::Set);
        assert!(resolution.no_store());

        let resolution = resolve_version(None, Some("v3"), &default_version);
        assert_eq!(resolution.version.as_str(), "v3");
        assert_eq!(resolution.cookie_action(), CookieAction::Refresh);
        assert!(resolution.no_store());

        let resolution = resolve_version(None, None, &default_version);
        assert_eq!(resolution.version.as_str(), "v1");
        assert_eq!(resolution.cookie_action(), CookieAction::None);
        assert!(!resolution.no_store());
        assert!(resolution.response_cookie().is_none());
    }

    #[test]
    fn empty_query_is_ignored() {
        let default_version = DefaultVersion::new("v1");
        let resolution = resolve_version(Some(""), Some("v3"), &default_version);
        assert_eq!(resolution.source, VersionSource::Cookie);
        assert_eq!(resolution.version.as_str(), "v3");
    }

    #[test]
    fn default_is_read_at_resolution_time() {
        let default_version = DefaultVersion::new("v1");
        let before = resolve_version(None, None, &default_version);
        default_version.replace("v2");
        let after = resolve_version(None, None, &default_version);
        assert_eq!(before.version.as_str(), "v1");
        assert_eq!(after.version.as_str(), "v2");
    }

    #[test]
    fn response_cookie_attributes() {
        let default_version = DefaultVersion::new("v1");
        let resolution = resolve_version(Some("v2"), None, &default_version);
        let cookie = resolution.response_cookie().unwrap();
        assert_eq!(cookie.name(), VERSION_COOKIE_NAME);
        assert_eq!(cookie.value(), "v2");
        assert_eq!(cookie.path(), Some("/"));
        assert_ne!(cookie.http_only(), Some(true));

        let expires = cookie.expires_datetime().unwrap();
        let remaining = expires - OffsetDateTime::now_utc();
        assert!(remaining > Duration::minutes(59));
        assert!(remaining <= VERSION_COOKIE_LIFETIME);
    }

    #[test]
    fn resolves_from_request() {
        let default_version = DefaultVersion::new("v1");

        let request = TestRequest::get().uri("/app.js?version=v2").to_http_request();
        let resolution = resolve_request(&request, &default_version);
        assert_eq!(resolution.version.as_str(), "v2");

        let request = TestRequest::get()
            .uri("/app.js")
            .cookie(Cookie::new(VERSION_COOKIE_NAME, "v3"))
            .to_http_request();
        let resolution = resolve_request(&request, &default_version);
        assert_eq!(resolution.version.as_str(), "v3");
        assert_eq!(resolution.source, VersionSource::Cookie);

        let request = TestRequest::get().uri("/?version=feature%20x").to_http_request();
        let resolution = resolve_request(&request, &default_version);
        assert_eq!(resolution.version.as_str(), "feature x");
    }

    #[test]
    fn cookie_value_drops_separators() {
        assert_eq!(cookie_value("v2"), "v2");
        assert_eq!(cookie_value("feature x"), "\"feature x\"");
        assert_eq!(cookie_value("a,b"), "\"a,b\"");
        assert_eq!(cookie_value("v2;\"\\\r\n\u{e9}"), "v2");
    }

    #[test]
    fn query_version_cannot_add_cookie_attributes() {
        let default_version = DefaultVersion::new("v1");
        let request = TestRequest::get()
            .uri("/?version=v2;%20Domain=evil.example;%20SameSite=None")
            .to_http_request();
        let resolution = resolve_request(&request, &default_version);
        assert_eq!(
            resolution.version.as_str(),
            "v2; Domain=evil.example; SameSite=None"
        );

        let cookie = resolution.response_cookie().unwrap();
        assert_eq!(cookie.value(), "\"v2 Domain=evil.example SameSite=None\"");
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.same_site(), None);

        let mut response = HttpResponse::Ok().finish();
        resolution.apply_to(&mut response);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(!set_cookie.contains("; Domain"));
        assert!(!set_cookie.contains("; SameSite"));

        let cookie = response.cookies().next().unwrap();
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.same_site(), None);
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn quoted_cookie_is_read_unquoted() {
        let default_version = DefaultVersion::new("v1");
        let request = TestRequest::get()
            .uri("/app.js")
            .insert_header((header::COOKIE, "version-override=\"feature x\""))
            .to_http_request();
        let resolution = resolve_request(&request, &default_version);
        assert_eq!(resolution.version.as_str(), "feature x");
        assert_eq!(resolution.source, VersionSource::Cookie);
    }

    #[test]
    fn apply_to_sets_cookie_and_no_store() {
        let default_version = DefaultVersion::new("v1");
        let resolution = resolve_version(Some("v2"), None, &default_version);
        let mut response = HttpResponse::Ok().finish();
        resolution.apply_to(&mut response);

        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        let cookie = response.cookies().next().unwrap();
        assert_eq!(cookie.value(), "v2");

        let resolution = resolve_version(None, None, &default_version);
        let mut response = HttpResponse::Ok().finish();
        resolution.apply_to(&mut response);
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
        assert!(response.cookies().next().is_none());
    }
}
