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

//! The local disk cache of origin responses.
//!
//! Each entry is one file holding a complete HTTP response (status line,
//! headers and body) as it was received from the origin (see [`entry`]), at a
//! path under the cache root which mirrors its key:
//!
//!    `{CACHE-ROOT}/{VERSION}/{APP-PATH}`
//!
//! Versions are immutable, so entries are too: once written an entry is
//! never refreshed or removed. Deleting files from the cache root is the
//! only way to make the proxy fetch them again.
//!
//! Concurrent misses for the same key are serialised by [`in_flight::InFlight`]
//! so that only one of them fetches from the origin. Entries are written to a
//! temporary file and renamed into place, so a lookup never sees part of an
//! entry.

pub mod entry;
pub mod in_flight;
pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CacheStore, CachedEntry};
