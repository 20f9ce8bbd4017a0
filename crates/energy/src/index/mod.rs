//! Per-meter date-range index.
//!
//! The index records, for each meter id, the smallest date interval that
//! covers every date the meter has a stored profile for. Readers consult it
//! to decide which `(id, date)` pairs exist without opening partitions.
//!
//! - [`BlobDateRangeIndex`]: the index persisted in a [`BlobStore`](crate::storage::BlobStore)
//! - [`CachedDateRangeIndex`]: read-through/write-through cache over another index
//! - [`Reindexer`]: rebuilds the persisted index from the partitions

pub mod blob;
pub mod cached;
pub mod reindex;

pub use blob::{BlobDateRangeIndex, DATE_RANGE_TAG};
pub use cached::CachedDateRangeIndex;
pub use reindex::{IndexFactory, ReindexReport, Reindexer};

use crate::error::Result;
use crate::model::IdDateRange;
use chrono::NaiveDate;

/// Handler for streamed date ranges.
pub type RangeHandler<'a> = dyn FnMut(IdDateRange) + 'a;

/// Storage of one covering date range per meter id.
///
/// Implementors provide lookup, streaming, unconditional [`save`](Self::save)
/// and the transaction boundary; range widening is built on top of those.
pub trait DateRangeIndex: Send + Sync {
    /// Returns the range of `id`, if it has one.
    fn get(&self, id: &str) -> Result<Option<IdDateRange>>;

    /// Streams the ranges of `ids`. Ids without a range are skipped.
    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()>;

    /// Streams every range in the index.
    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()>;

    /// Stores `[from, to]` for `id`, replacing any previous range.
    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()>;

    /// Makes saved ranges durable.
    fn commit(&self) -> Result<()>;

    /// Discards ranges saved since the last commit.
    fn rollback(&self) -> Result<()>;

    /// Widens the range of `id` to include `date`.
    ///
    /// An unknown id gets `[date, date]`. A date already in range saves
    /// nothing. Ranges never shrink.
    fn extend_range(&self, id: &str, date: NaiveDate) -> Result<()> {
        match self.get(id)? {
            None => self.save(id, date, date),
            Some(range) if date < range.from() => self.save_from(id, date).map(|_| ()),
            Some(range) if date > range.to() => self.save_to(id, date).map(|_| ()),
            Some(_) => Ok(()),
        }
    }

    /// Moves the start of an existing range.
    ///
    /// Returns `false` without saving when `id` is unknown, the start is
    /// unchanged, or `from` would fall after the end.
    fn save_from(&self, id: &str, from: NaiveDate) -> Result<bool> {
        match self.get(id)? {
            Some(range) if range.from() != from && from <= range.to() => {
                self.save(id, from, range.to())?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Moves the end of an existing range.
    ///
    /// Returns `false` without saving when `id` is unknown, the end is
    /// unchanged, or `to` would fall before the start.
    fn save_to(&self, id: &str, to: NaiveDate) -> Result<bool> {
        match self.get(id)? {
            Some(range) if range.to() != to && range.from() <= to => {
                self.save(id, range.from(), to)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Returns true when the range of `id` covers `date`.
    fn has_date(&self, id: &str, date: NaiveDate) -> Result<bool> {
        Ok(self
            .get(id)?
            .is_some_and(|range| range.is_in_range(date)))
    }

    /// Returns the ids among `ids` whose range covers `date`.
    fn filter_ids_with_date(&self, ids: &[String], date: NaiveDate) -> Result<Vec<String>> {
        let mut filtered = Vec::new();
        self.for_each(ids, &mut |range| {
            if range.is_in_range(date) {
                filtered.push(range.id().to_string());
            }
        })?;
        Ok(filtered)
    }
}
