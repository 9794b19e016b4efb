use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bigdecimal::BigDecimal;
use rustc_hash::FxHashMap;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared `(asset id, decimals) -> USD price` cache for the live path.
///
/// Entries expire by wall-clock age, never by block height. Parallel
/// classifier tasks may miss at the same time, compute the same price and
/// both insert it; the last write wins. The lock only guards the map
/// itself, it does not serialize pricing.
pub struct PriceCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<FxHashMap<(String, u8), (BigDecimal, Instant)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn with_system_clock(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn get(&self, asset_id: &str, decimals: u8) -> Option<BigDecimal> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (price, stored_at) = entries.get(&(asset_id.to_string(), decimals))?;
        if self.clock.now().duration_since(*stored_at) < self.ttl {
            Some(price.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, asset_id: &str, decimals: u8, price: BigDecimal) {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert((asset_id.to_string(), decimals), (price, now));
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|_, (_, stored_at)| now.duration_since(*stored_at) < self.ttl);
        before - entries.len()
    }
}
