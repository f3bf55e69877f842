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

//! Per-key mutual exclusion for cache fills.
//!
//! Without this, simultaneous first requests for the same key would each
//! miss, each fetch from the origin and each write the entry. With it, the
//! first holds the key while it fetches and stores, and the others wait and
//! then find the entry in the cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};

use super::key::CacheKey;

type Table = Mutex<HashMap<CacheKey, Arc<KeyLock<()>>>>;

/// Keys with a fill in progress (or waiting to start)
#[derive(Default)]
pub struct InFlight {
    table: Arc<Table>,
}

impl InFlight {
    pub fn new() -> InFlight {
        InFlight::default()
    }

    /// Wait until no one else holds `key`, then hold it until the returned
    /// guard is dropped.
    pub async fn acquire(&self, key: &CacheKey) -> InFlightGuard {
        // The table lock is never held across an await
        let slot = Arc::clone(self.table.lock().entry(key.clone()).or_default());
        let guard = Arc::clone(&slot).lock_owned().await;
        InFlightGuard {
            table: Arc::clone(&self.table),
            key: key.clone(),
            slot,
            guard: Some(guard),
        }
    }

    /// Number of keys held or waited on
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a key in an [`InFlight`] table. Dropping it releases the key, and
/// removes it from the table if nobody is waiting for it.
pub struct InFlightGuard {
    table: Arc<Table>,
    key: CacheKey,
    slot: Arc<KeyLock<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock();
        // Only the table and this guard refer to the slot, so no waiters
        if Arc::strong_count(&self.slot) == 2 {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[actix_web::test]
    async fn released_keys_are_removed() {
        let in_flight = InFlight::new();
        let key = CacheKey::new("/v1/index.html");

        let guard = in_flight.acquire(&key).await;
        assert_eq!(in_flight.len(), 1);
        drop(guard);
        assert!(in_flight.is_empty());
    }

    #[actix_web::test]
    async fn second_holder_waits_for_first() {
        let in_flight = Arc::new(InFlight::new());
        let key = CacheKey::new("/v1/app.js");

        let first = in_flight.acquire(&key).await;

        let waiter = {
            let in_flight = Arc::clone(&in_flight);
            let key = key.clone();
            actix_web::rt::spawn(async move {
                let _second = in_flight.acquire(&key).await;
            })
        };

        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(in_flight.len(), 1);

        drop(first);
        waiter.await.unwrap();
        assert!(in_flight.is_empty());
    }

    #[actix_web::test]
    async fn different_keys_do_not_block() {
        let in_flight = InFlight::new();
        let _first = in_flight.acquire(&CacheKey::new("/v1/a.js")).await;
        let _second = in_flight.acquire(&CacheKey::new("/v1/b.js")).await;
        assert_eq!(in_flight.len(), 2);
    }
}
