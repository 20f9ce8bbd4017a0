//! Caching decorator over a date-range index.

use super::{DateRangeIndex, RangeHandler};
use crate::error::Result;
use crate::model::IdDateRange;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::warn;

/// What the cache knows about one id.
#[derive(Debug, Clone)]
enum CachedRange {
    Present(IdDateRange),
    /// The backing index was asked and had no range.
    Absent,
}

/// Memoizes lookups and saves of another [`DateRangeIndex`].
///
/// Both hits and misses are cached, so each id reaches the backing index at
/// most once until the cache is cleared. The cache does not track which
/// entries are uncommitted: a failed commit or any rollback clears it.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::index::{BlobDateRangeIndex, CachedDateRangeIndex, DateRangeIndex};
///
/// let index = CachedDateRangeIndex::new(BlobDateRangeIndex::open(path, config)?);
/// index.extend_range("meter-1", date)?;
/// index.commit()?;
/// ```
#[derive(Debug)]
pub struct CachedDateRangeIndex<I> {
    index: I,
    cache: DashMap<String, CachedRange>,
}

impl<I: DateRangeIndex> CachedDateRangeIndex<I> {
    /// Wraps `index`.
    pub fn new(index: I) -> Self {
        Self {
            index,
            cache: DashMap::new(),
        }
    }

    /// Returns the backing index.
    pub fn inner(&self) -> &I {
        &self.index
    }

    /// Number of cached ids, present or absent.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Forgets everything cached.
    pub fn clear(&self) {
        self.cache.clear();
    }

    fn cached(&self, id: &str) -> Option<CachedRange> {
        self.cache.get(id).map(|entry| entry.value().clone())
    }

    /// Caches `entry` unless `id` already has one, and returns what the cache
    /// holds. A backing read never overwrites a save that landed after it.
    fn fill(&self, id: &str, entry: CachedRange) -> CachedRange {
        self.cache
            .entry(id.to_string())
            .or_insert(entry)
            .value()
            .clone()
    }
}

impl<I: DateRangeIndex> DateRangeIndex for CachedDateRangeIndex<I> {
    fn get(&self, id: &str) -> Result<Option<IdDateRange>> {
        if id.is_empty() {
            return Ok(None);
        }
        match self.cached(id) {
            Some(CachedRange::Present(range)) => return Ok(Some(range)),
            Some(CachedRange::Absent) => return Ok(None),
            None => {}
        }

        let entry = match self.index.get(id)? {
            Some(range) => CachedRange::Present(range),
            None => CachedRange::Absent,
        };
        match self.fill(id, entry) {
            CachedRange::Present(range) => Ok(Some(range)),
            CachedRange::Absent => Ok(None),
        }
    }

    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        let mut seen = HashSet::new();
        let mut lookup = Vec::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.cached(id) {
                Some(CachedRange::Present(range)) => handler(range),
                Some(CachedRange::Absent) => {}
                None => lookup.push(id.clone()),
            }
        }
        if lookup.is_empty() {
            return Ok(());
        }

        let mut found = HashSet::new();
        self.index.for_each(&lookup, &mut |range| {
            let id = range.id().to_string();
            found.insert(id.clone());
            if let CachedRange::Present(range) = self.fill(&id, CachedRange::Present(range)) {
                handler(range);
            }
        })?;
        for id in lookup {
            if !found.contains(&id) {
                self.cache.entry(id).or_insert(CachedRange::Absent);
            }
        }
        Ok(())
    }

    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.index.for_all(&mut |range| {
            let id = range.id().to_string();
            if let CachedRange::Present(range) = self.fill(&id, CachedRange::Present(range)) {
                handler(range);
            }
        })
    }

    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let range = IdDateRange::new(id, from, to);
        // The slot stays locked until the backing save returns, so the cache
        // and the backing index see concurrent saves of one id in the same order.
        match self.cache.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                if let CachedRange::Present(cached) = slot.get() {
                    if cached.has_bounds(range.from(), range.to()) {
                        return Ok(());
                    }
                }
                if let Err(err) = self.index.save(id, from, to) {
                    slot.remove();
                    return Err(err);
                }
                slot.insert(CachedRange::Present(range));
            }
            Entry::Vacant(slot) => {
                self.index.save(id, from, to)?;
                slot.insert(CachedRange::Present(range));
            }
        }
        Ok(())
    }

    /// Widens under the id's cache slot, so concurrent extensions of one id
    /// never lose each other's dates.
    fn extend_range(&self, id: &str, date: NaiveDate) -> Result<()> {
        match self.cache.entry(id.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = match slot.get() {
                    CachedRange::Present(range) => Some(range.clone()),
                    CachedRange::Absent => None,
                };
                if let Some(range) = widen(current.as_ref(), id, date) {
                    if let Err(err) = self.index.save(id, range.from(), range.to()) {
                        slot.remove();
                        return Err(err);
                    }
                    slot.insert(CachedRange::Present(range));
                }
            }
            Entry::Vacant(slot) => {
                let current = self.index.get(id)?;
                let range = match widen(current.as_ref(), id, date) {
                    Some(range) => {
                        self.index.save(id, range.from(), range.to())?;
                        range
                    }
                    None => current.unwrap_or_else(|| IdDateRange::new(id, date, date)),
                };
                slot.insert(CachedRange::Present(range));
            }
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if let Err(err) = self.index.commit() {
            warn!("Date range index commit failed, clearing cache: {}", err);
            self.cache.clear();
            return Err(err);
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.cache.clear();
        self.index.rollback()
    }
}

/// The range `current` must become to cover `date`, or `None` if it already does.
fn widen(current: Option<&IdDateRange>, id: &str, date: NaiveDate) -> Option<IdDateRange> {
    match current {
        None => Some(IdDateRange::new(id, date, date)),
        Some(range) if date < range.from() => Some(IdDateRange::new(id, date, range.to())),
        Some(range) if date > range.to() => Some(IdDateRange::new(id, range.from(), date)),
        Some(_) => None,
    }
}
