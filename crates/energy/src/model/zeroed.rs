//! Shared all-zero and missing readings instances.
//!
//! Most stored profiles are either all zero or not recorded at all, so the
//! decoder and profile constructor hand out one shared instance per shape
//! instead of allocating a fresh one per record.

use super::{Channel, Readings, SharedChannel, SharedReadings};
use dashmap::DashMap;
use std::sync::Arc;

/// Interval counts that are pre-populated: empty, half-hourly and
/// quarter-hourly days.
const COMMON_LENGTHS: [usize; 3] = [0, 48, 96];

/// Memoized pools of zeroed channels, zeroed readings and missing readings.
///
/// Repeated requests for the same shape return the same `Arc`. Entries are
/// never evicted.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::model::ZeroedReadingsCache;
/// use std::sync::Arc;
///
/// let cache = ZeroedReadingsCache::new();
/// let a = cache.zeroed_readings(2, 48);
/// let b = cache.zeroed_readings(2, 48);
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug)]
pub struct ZeroedReadingsCache {
    channels: DashMap<usize, SharedChannel>,
    zeroed: DashMap<(usize, usize), SharedReadings>,
    missing: DashMap<usize, SharedReadings>,
    empty: SharedReadings,
}

impl ZeroedReadingsCache {
    /// Creates a cache with the common day lengths already populated.
    pub fn new() -> Self {
        let cache = Self {
            channels: DashMap::new(),
            zeroed: DashMap::new(),
            missing: DashMap::new(),
            empty: Arc::new(Readings::one(Channel::double(&[]))),
        };
        for len in COMMON_LENGTHS {
            cache.zeroed_readings(1, len);
            cache.missing_readings(len);
        }
        cache
    }

    /// Returns the shared all-zero channel of `len` samples.
    pub fn zeroed_channel(&self, len: usize) -> SharedChannel {
        let entry = self
            .channels
            .entry(len)
            .or_insert_with(|| Arc::new(Channel::zeroed(len)));
        Arc::clone(entry.value())
    }

    /// Returns the shared all-zero readings with `num_channels` channels of
    /// `len` samples.
    pub fn zeroed_readings(&self, num_channels: usize, len: usize) -> SharedReadings {
        let entry = self
            .zeroed
            .entry((num_channels, len))
            .or_insert_with(|| Arc::new(Readings::zeroed(num_channels, self.zeroed_channel(len))));
        Arc::clone(entry.value())
    }

    /// Returns the shared missing-marker readings of `len` samples.
    pub fn missing_readings(&self, len: usize) -> SharedReadings {
        let entry = self
            .missing
            .entry(len)
            .or_insert_with(|| Arc::new(Readings::missing(self.zeroed_channel(len))));
        Arc::clone(entry.value())
    }

    /// Returns the canonical empty readings: one channel, no samples.
    pub fn empty_readings(&self) -> SharedReadings {
        Arc::clone(&self.empty)
    }
}

impl Default for ZeroedReadingsCache {
    fn default() -> Self {
        Self::new()
    }
}
