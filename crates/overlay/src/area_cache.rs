use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

/// Cache key for a fetched area: the viewport center rounded to `precision`
/// decimal places, plus the search radius.
///
/// Coordinates are stored as scaled integers so that keys compare and hash
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AreaKey {
    lat_scaled: i64,
    lon_scaled: i64,
    precision: u8,
    radius: u32,
}

impl AreaKey {
    pub fn new(latitude: f64, longitude: f64, radius: u32, precision: u8) -> Self {
        let scale = 10f64.powi(i32::from(precision));
        Self {
            lat_scaled: (latitude * scale).round() as i64,
            lon_scaled: (longitude * scale).round() as i64,
            precision,
            radius,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_scaled as f64 / 10f64.powi(i32::from(self.precision))
    }

    pub fn longitude(&self) -> f64 {
        self.lon_scaled as f64 / 10f64.powi(i32::from(self.precision))
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }
}

impl std::fmt::Display for AreaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = usize::from(self.precision);
        write!(
            f,
            "{:.p$}_{:.p$}_{}",
            self.latitude(),
            self.longitude(),
            self.radius
        )
    }
}

/// Time-windowed record of which areas were fetched and when.
///
/// Entries expire lazily: a stale entry stays in the map until it is
/// overwritten, evicted by the size cap, or the cache is cleared. When the
/// cap is exceeded the oldest entry goes first, ties broken by key order so
/// eviction is deterministic.
#[derive(Debug)]
pub struct AreaCache {
    ttl: Duration,
    max_entries: Option<usize>,
    entries: BTreeMap<AreaKey, Instant>,
}

impl AreaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: None,
            entries: BTreeMap::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.map(|m| m.max(1));
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_loaded(&self, key: &AreaKey) -> Option<Instant> {
        self.entries.get(key).copied()
    }

    /// `true` when the area was fetched less than one TTL before `now`.
    pub fn is_fresh(&self, key: &AreaKey, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|loaded| now.saturating_duration_since(*loaded) < self.ttl)
    }

    /// Records a successful fetch and returns any keys evicted by the cap.
    pub fn mark_loaded(&mut self, key: AreaKey, now: Instant) -> Vec<AreaKey> {
        self.entries.insert(key.clone(), now);
        self.evict_as_needed(&key)
    }

    pub fn stale_count(&self, now: Instant) -> usize {
        self.entries
            .values()
            .filter(|loaded| now.saturating_duration_since(**loaded) >= self.ttl)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_as_needed(&mut self, protected: &AreaKey) -> Vec<AreaKey> {
        let mut evicted = Vec::new();
        let Some(max) = self.max_entries else {
            return evicted;
        };
        while self.entries.len() > max {
            let oldest = self
                .entries
                .iter()
                .filter(|(k, _)| *k != protected)
                .min_by(|(ka, ta), (kb, tb)| ta.cmp(tb).then_with(|| ka.cmp(kb)))
                .map(|(k, _)| k.clone());
            let Some(key) = oldest else {
                break;
            };
            self.entries.remove(&key);
            evicted.push(key);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{AreaCache, AreaKey};

    #[test]
    fn nearby_samples_share_a_key() {
        let a = AreaKey::new(49.2812, -123.1204, 50, 2);
        let b = AreaKey::new(49.2780, -123.1249, 50, 2);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "49.28_-123.12_50");

        let coarse = AreaKey::new(49.2812, -123.1204, 50, 1);
        assert_ne!(a, coarse);
        assert_eq!(coarse.to_string(), "49.3_-123.1_50");
    }

    #[test]
    fn radius_is_part_of_the_key() {
        assert_ne!(
            AreaKey::new(49.28, -123.12, 50, 2),
            AreaKey::new(49.28, -123.12, 100, 2)
        );
    }

    #[test]
    fn freshness_window() {
        let t0 = Instant::now();
        let mut cache = AreaCache::new(Duration::from_secs(300));
        let key = AreaKey::new(49.28, -123.12, 50, 2);

        assert!(!cache.is_fresh(&key, t0));
        cache.mark_loaded(key.clone(), t0);
        assert!(cache.is_fresh(&key, t0 + Duration::from_secs(100)));
        assert!(cache.is_fresh(&key, t0 + Duration::from_secs(299)));
        assert!(!cache.is_fresh(&key, t0 + Duration::from_secs(300)));

        // Lazy expiry: still counted until evicted or cleared.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stale_count(t0 + Duration::from_secs(301)), 1);
    }

    #[test]
    fn reloading_refreshes_the_timestamp() {
        let t0 = Instant::now();
        let mut cache = AreaCache::new(Duration::from_secs(10));
        let key = AreaKey::new(1.0, 2.0, 10, 1);
        cache.mark_loaded(key.clone(), t0);
        cache.mark_loaded(key.clone(), t0 + Duration::from_secs(8));
        assert!(cache.is_fresh(&key, t0 + Duration::from_secs(15)));
        assert_eq!(cache.last_loaded(&key), Some(t0 + Duration::from_secs(8)));
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let t0 = Instant::now();
        let mut cache = AreaCache::new(Duration::from_secs(60)).with_max_entries(Some(2));
        let a = AreaKey::new(1.0, 1.0, 10, 1);
        let b = AreaKey::new(2.0, 2.0, 10, 1);
        let c = AreaKey::new(3.0, 3.0, 10, 1);

        assert!(cache.mark_loaded(a.clone(), t0).is_empty());
        assert!(cache.mark_loaded(b.clone(), t0 + Duration::from_secs(1)).is_empty());
        let evicted = cache.mark_loaded(c.clone(), t0 + Duration::from_secs(2));

        assert_eq!(evicted, vec![a.clone()]);
        assert_eq!(cache.len(), 2);
        assert!(cache.last_loaded(&a).is_none());
    }

    #[test]
    fn eviction_ties_break_on_key_order() {
        let t0 = Instant::now();
        let mut cache = AreaCache::new(Duration::from_secs(60)).with_max_entries(Some(2));
        let b = AreaKey::new(2.0, 2.0, 10, 1);
        let a = AreaKey::new(1.0, 1.0, 10, 1);
        cache.mark_loaded(b.clone(), t0);
        cache.mark_loaded(a.clone(), t0);
        let evicted = cache.mark_loaded(AreaKey::new(3.0, 3.0, 10, 1), t0);
        assert_eq!(evicted, vec![a]);
    }

    #[test]
    fn clear_forgets_everything() {
        let t0 = Instant::now();
        let mut cache = AreaCache::new(Duration::from_secs(60));
        let key = AreaKey::new(1.0, 1.0, 10, 1);
        cache.mark_loaded(key.clone(), t0);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_fresh(&key, t0));
    }
}
