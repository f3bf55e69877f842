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

//! # craproxy
//!
//! Serves immutable, versioned builds of a single-page application from a
//! public origin (e.g. an object-storage website) where each build lives
//! under its own version prefix:
//!
//!    `{origin}/{VERSION}/index.html`, `{origin}/{VERSION}/static/app.js`, ...
//!
//! Each request is resolved to a version (query parameter, cookie or the
//! current default), rewritten to `/{VERSION}/{path}` and served from a
//! local disk cache. Entries missing from the cache are fetched from the
//! origin once, persisted verbatim and then served from disk.
//!
//! Request handling is a [`pipeline::Pipeline`] of stages which the
//! craproxy-server crate binds to an actix-web default service.

pub mod cache;
pub mod error;
pub mod origin;
pub mod pipeline;
pub mod rewrite;
pub mod version;
pub mod web;

pub use error::{ProxyError, Result};
