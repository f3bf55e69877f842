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

use actix_web::HttpResponse;

use super::{Exchange, Flow};
use crate::cache::in_flight::InFlight;
use crate::cache::{CacheKey, CacheStore, CachedEntry};
use crate::error::{ProxyError, Result};
use crate::origin::OriginClient;
use crate::web::CacheStatus;

/// Serves cache keys from the store, filling misses from the origin.
///
/// Every response is served from the store, including the response to the
/// request which filled it, so the client gets exactly what later requests
/// for the same key will get.
pub struct FetchThrough {
    store: CacheStore,
    origin: OriginClient,
    in_flight: InFlight,
}

impl FetchThrough {
    pub fn new(store: CacheStore, origin: OriginClient) -> FetchThrough {
        FetchThrough {
            store,
            origin,
            in_flight: InFlight::new(),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub(super) async fn run(&self, exchange: &mut Exchange<'_>) -> Result<Flow> {
        let key = exchange.key.as_ref().ok_or(ProxyError::StageOrder {
            stage: "fetch-through",
            missing: "a cache key",
        })?;
        Ok(Flow::Respond(self.serve(key).await?))
    }

    /// The response for `key`, with `X-Cache` set to say whether the entry
    /// was already stored.
    ///
    /// A request which waited while another filled the same key finds the
    /// entry stored, and is served it as a hit.
    pub async fn serve(&self, key: &CacheKey) -> Result<HttpResponse> {
        if let Some(entry) = self.store.lookup(key).await? {
            return entry.into_response(CacheStatus::Hit);
        }

        let _fill = self.in_flight.acquire(key).await;
        if let Some(entry) = self.store.lookup(key).await? {
            return entry.into_response(CacheStatus::Hit);
        }

        let entry = self.fill(key).await?;
        entry.into_response(CacheStatus::Miss)
    }

    async fn fill(&self, key: &CacheKey) -> Result<CachedEntry> {
        let response = self.origin.fetch(key).await?;
        self.store.put(key, &response).await?;
        self.store
            .lookup(key)
            .await?
            .ok_or_else(|| ProxyError::EntryVanished(key.to_string()))
    }
}
