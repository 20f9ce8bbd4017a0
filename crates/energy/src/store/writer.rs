//! Profile writer.

use super::{ErrorHandler, ItemError};
use crate::codec::{CacheableEncoder, Encoder, ReadingsEncoder, StatEncoder};
use crate::error::{EnergyError, Result};
use crate::index::DateRangeIndex;
use crate::model::{EnergyProfile, EnergyProfileStat, Readings};
use crate::storage::{BlobStore, EnergyProfileAttribute, PartitionStores};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes profiles into their date partitions and keeps the date-range index
/// covering them.
///
/// Writes are staged in every partition touched until [`commit`](Self::commit)
/// or [`rollback`](Self::rollback). Failures are reported per item through
/// the error handler and never stop the caller from writing the next item.
pub struct EnergyProfileWriter {
    stores: Arc<PartitionStores>,
    index: Arc<dyn DateRangeIndex>,
    kw_in_encoder: ReadingsEncoder,
    kw_out_encoder: ReadingsEncoder,
    stat_encoder: StatEncoder,
    cacheable_encoder: CacheableEncoder,
    touched: BTreeSet<NaiveDate>,
}

impl std::fmt::Debug for EnergyProfileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyProfileWriter")
            .field("touched", &self.touched)
            .finish_non_exhaustive()
    }
}

impl EnergyProfileWriter {
    /// Creates a writer over `stores`, extending `index`.
    pub fn new(stores: Arc<PartitionStores>, index: Arc<dyn DateRangeIndex>) -> Self {
        Self {
            stores,
            index,
            kw_in_encoder: ReadingsEncoder::new(),
            kw_out_encoder: ReadingsEncoder::new(),
            stat_encoder: StatEncoder::new(),
            cacheable_encoder: CacheableEncoder,
            touched: BTreeSet::new(),
        }
    }

    /// Dates with staged changes.
    pub fn touched_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.touched.iter().copied()
    }

    /// Stages every attribute of `profile`.
    ///
    /// Missing readings delete their tag and a `false` cacheable flag deletes
    /// the cacheable tag. With `write_stats` the profile maximums are stored,
    /// otherwise any stored maximums are deleted. Returns `false` when the
    /// profile could not be staged.
    ///
    /// A failure to extend the index is reported but the profile stays
    /// written, so `true` is still returned.
    pub fn write(
        &mut self,
        profile: &EnergyProfile,
        write_stats: bool,
        on_error: &mut ErrorHandler<'_>,
    ) -> bool {
        let (id, date) = (profile.id(), profile.date());
        if let Err(err) = self.stage_profile(profile, write_stats) {
            on_error(ItemError::item(id, date, "Failed to write profile", Some(err)));
            return false;
        }
        self.extend_index(id, date, on_error);
        true
    }

    /// Stages the kW in readings of `(id, date)`, deleting stored maximums.
    pub fn write_kw_in(
        &mut self,
        id: &str,
        date: NaiveDate,
        readings: &Readings,
        on_error: &mut ErrorHandler<'_>,
    ) -> bool {
        self.write_readings(id, date, EnergyProfileAttribute::KwIn, readings, on_error)
    }

    /// Stages the kW out readings of `(id, date)`, deleting stored maximums.
    pub fn write_kw_out(
        &mut self,
        id: &str,
        date: NaiveDate,
        readings: &Readings,
        on_error: &mut ErrorHandler<'_>,
    ) -> bool {
        self.write_readings(id, date, EnergyProfileAttribute::KwOut, readings, on_error)
    }

    /// Stages the cacheable flag of `(id, date)`.
    pub fn write_cacheable(
        &mut self,
        id: &str,
        date: NaiveDate,
        cacheable: bool,
        on_error: &mut ErrorHandler<'_>,
    ) -> bool {
        let staged = self.stage_cacheable(id, date, cacheable);
        if let Err(err) = staged {
            on_error(ItemError::item(id, date, "Failed to write cacheable flag", Some(err)));
            return false;
        }
        self.extend_index(id, date, on_error);
        true
    }

    /// Commits every touched partition, then the index.
    ///
    /// Every partition is attempted. If any fails the index is left
    /// uncommitted and `false` is returned.
    pub fn commit(&mut self, on_error: &mut ErrorHandler<'_>) -> bool {
        self.finish("commit", on_error, |store| store.commit(), |index| index.commit())
    }

    /// Rolls back every touched partition, then the index.
    pub fn rollback(&mut self, on_error: &mut ErrorHandler<'_>) -> bool {
        self.finish("rollback", on_error, |store| store.rollback(), |index| index.rollback())
    }

    fn finish(
        &mut self,
        action: &str,
        on_error: &mut ErrorHandler<'_>,
        partition: impl Fn(&dyn BlobStore) -> Result<()>,
        index: impl Fn(&dyn DateRangeIndex) -> Result<()>,
    ) -> bool {
        let mut ok = true;
        for date in std::mem::take(&mut self.touched) {
            let result = match self.stores.get_reader(date) {
                Ok(Some(store)) => {
                    let store: &dyn BlobStore = &*store;
                    partition(store)
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                warn!("Failed to {} partition {}: {}", action, date, err);
                on_error(ItemError::partition(date, format!("Failed to {action} partition"), err));
                ok = false;
            }
        }
        if !ok {
            return false;
        }

        debug!("Index {}", action);
        if let Err(err) = index(&*self.index) {
            on_error(ItemError::index(format!("Failed to {action} date range index"), err));
            return false;
        }
        true
    }

    fn write_readings(
        &mut self,
        id: &str,
        date: NaiveDate,
        attribute: EnergyProfileAttribute,
        readings: &Readings,
        on_error: &mut ErrorHandler<'_>,
    ) -> bool {
        let staged = self.stage_readings(id, date, attribute, readings);
        if let Err(err) = staged {
            on_error(ItemError::item(
                id,
                date,
                format!("Failed to write {}", attribute.tag()),
                Some(err),
            ));
            return false;
        }
        self.extend_index(id, date, on_error);
        true
    }

    fn stage_readings(
        &mut self,
        id: &str,
        date: NaiveDate,
        attribute: EnergyProfileAttribute,
        readings: &Readings,
    ) -> Result<()> {
        let encoder = match attribute {
            EnergyProfileAttribute::KwOut => &mut self.kw_out_encoder,
            _ => &mut self.kw_in_encoder,
        };
        let bytes = encode_readings(encoder, readings)?;
        let store = self.stores.get_writer(date)?;
        self.touched.insert(date);
        put_or_delete(&*store, id, attribute, bytes)?;
        put_or_delete(&*store, id, EnergyProfileAttribute::Maximums, None)
    }

    fn stage_cacheable(&mut self, id: &str, date: NaiveDate, cacheable: bool) -> Result<()> {
        let bytes = if cacheable {
            Some(self.cacheable_encoder.encode(&true)?)
        } else {
            None
        };
        let store = self.stores.get_writer(date)?;
        self.touched.insert(date);
        put_or_delete(&*store, id, EnergyProfileAttribute::Cacheable, bytes)
    }

    fn stage_profile(&mut self, profile: &EnergyProfile, write_stats: bool) -> Result<()> {
        let (id, date) = (profile.id(), profile.date());

        // Everything is encoded before the partition is touched.
        let kw_in = encode_readings(&mut self.kw_in_encoder, profile.kw_in())?;
        let kw_out = encode_readings(&mut self.kw_out_encoder, profile.kw_out())?;
        let cacheable = if profile.cacheable() {
            Some(self.cacheable_encoder.encode(&true)?)
        } else {
            None
        };
        let stat = if write_stats && !profile.is_empty() {
            Some(self.stat_encoder.encode(&EnergyProfileStat::max_of(profile)?)?)
        } else {
            None
        };

        let store = self.stores.get_writer(date)?;
        self.touched.insert(date);

        let mut failure = None;
        for (attribute, bytes) in [
            (EnergyProfileAttribute::KwIn, kw_in),
            (EnergyProfileAttribute::KwOut, kw_out),
            (EnergyProfileAttribute::Cacheable, cacheable),
        ] {
            if let Err(err) = put_or_delete(&*store, id, attribute, bytes) {
                failure.get_or_insert(err);
            }
        }
        let stat = if failure.is_none() { stat } else { None };
        if let Err(err) = put_or_delete(&*store, id, EnergyProfileAttribute::Maximums, stat) {
            failure.get_or_insert(err);
        }
        failure.map_or(Ok(()), Err)
    }

    fn extend_index(&self, id: &str, date: NaiveDate, on_error: &mut ErrorHandler<'_>) {
        if let Err(err) = self.index.extend_range(id, date) {
            warn!("Unable to extend date range of {} to {}: {}", id, date, err);
            on_error(ItemError::item(
                id,
                date,
                "Unable to extend date range in index",
                Some(err),
            ));
        }
    }
}

/// Encodes `readings`, or returns `None` for the missing marker.
fn encode_readings<'e>(encoder: &'e mut ReadingsEncoder, readings: &Readings) -> Result<Option<&'e [u8]>> {
    if readings.is_missing() {
        return Ok(None);
    }
    encoder.encode(readings).map(Some)
}

/// Stores `bytes` under the attribute's tag, or deletes the tag for `None`.
fn put_or_delete(
    store: &dyn BlobStore,
    id: &str,
    attribute: EnergyProfileAttribute,
    bytes: Option<&[u8]>,
) -> Result<()> {
    let tag = attribute.tag();
    match bytes {
        Some(bytes) => {
            if store.update(id, tag, bytes)? || store.write(id, tag, bytes)? {
                Ok(())
            } else {
                Err(EnergyError::Storage(format!("failed to store {tag} of {id}")))
            }
        }
        None => store.delete(id, tag).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BlobDateRangeIndex, CachedDateRangeIndex};
    use crate::model::{Channel, ZeroedReadingsCache};
    use crate::storage::{BlobStoreConfig, PartitionLayout, SyncMode};
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 11, day).unwrap()
    }

    fn setup(temp_dir: &TempDir) -> (Arc<PartitionStores>, Arc<dyn DateRangeIndex>) {
        let config = BlobStoreConfig::default().with_sync_mode(SyncMode::None);
        let layout = PartitionLayout::new(temp_dir.path());
        let index = BlobDateRangeIndex::open(layout.index_path(), config.clone()).unwrap();
        let stores = Arc::new(PartitionStores::new(layout, "UTC", config));
        (stores, Arc::new(CachedDateRangeIndex::new(index)))
    }

    fn profile(id: &str, date: NaiveDate, kw_in: &[f64], cacheable: bool) -> EnergyProfile {
        let zeroes = ZeroedReadingsCache::new();
        let kw_in = Arc::new(Readings::one(Channel::double(kw_in)));
        EnergyProfile::new(id, date, Some(kw_in), None, cacheable, &zeroes).unwrap()
    }

    #[test]
    fn test_write_stages_tags() {
        let temp_dir = TempDir::new().unwrap();
        let (stores, index) = setup(&temp_dir);
        let mut writer = EnergyProfileWriter::new(stores.clone(), index.clone());
        let mut errors = Vec::new();

        assert!(writer.write(&profile("m", d(1), &[1.0, 2.0], true), true, &mut |e| errors.push(e)));
        let store = stores.get_reader(d(1)).unwrap().unwrap();
        assert!(store.get("m", "W_in").unwrap().is_some());
        assert!(store.get("m", "W_out").unwrap().is_none());
        assert_eq!(store.get("m", "cacheable").unwrap(), Some(vec![1]));
        assert!(store.get("m", "maximums").unwrap().is_some());
        assert!(index.has_date("m", d(1)).unwrap());

        assert!(writer.write(&profile("m", d(1), &[1.0, 2.0], false), false, &mut |e| errors.push(e)));
        assert!(store.get("m", "cacheable").unwrap().is_none());
        assert!(store.get("m", "maximums").unwrap().is_none());
        assert!(errors.is_empty());
        assert_eq!(writer.touched_dates().collect::<Vec<_>>(), vec![d(1)]);
    }

    #[test]
    fn test_partial_write_deletes_maximums() {
        let temp_dir = TempDir::new().unwrap();
        let (stores, index) = setup(&temp_dir);
        let mut writer = EnergyProfileWriter::new(stores.clone(), index);
        let mut errors = Vec::new();

        assert!(writer.write(&profile("m", d(2), &[1.0], false), true, &mut |e| errors.push(e)));
        let kw_out = Readings::one(Channel::double(&[0.5]));
        assert!(writer.write_kw_out("m", d(2), &kw_out, &mut |e| errors.push(e)));

        let store = stores.get_reader(d(2)).unwrap().unwrap();
        assert!(store.get("m", "W_out").unwrap().is_some());
        assert!(store.get("m", "maximums").unwrap().is_none());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unencodable_profile_reported() {
        let temp_dir = TempDir::new().unwrap();
        let (stores, index) = setup(&temp_dir);
        let mut writer = EnergyProfileWriter::new(stores.clone(), index.clone());
        let mut errors = Vec::new();

        let bad = profile("bad", d(3), &[f64::INFINITY], false);
        assert!(!writer.write(&bad, false, &mut |e| errors.push(e)));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, "bad");
        assert!(matches!(errors[0].cause, Some(EnergyError::UnencodableValue(_))));
        assert!(stores.get_reader(d(3)).unwrap().is_none());
        assert!(!index.has_date("bad", d(3)).unwrap());

        assert!(writer.write(&profile("good", d(3), &[1.0], false), false, &mut |e| errors.push(e)));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_commit_and_rollback() {
        let temp_dir = TempDir::new().unwrap();
        let (stores, index) = setup(&temp_dir);
        let mut writer = EnergyProfileWriter::new(stores.clone(), index.clone());
        let mut errors = Vec::new();

        writer.write(&profile("a", d(4), &[1.0], false), false, &mut |e| errors.push(e));
        assert!(writer.commit(&mut |e| errors.push(e)));
        writer.write(&profile("b", d(5), &[1.0], false), false, &mut |e| errors.push(e));
        assert!(writer.rollback(&mut |e| errors.push(e)));
        assert_eq!(writer.touched_dates().count(), 0);

        assert!(stores.get_reader(d(4)).unwrap().unwrap().get("a", "W_in").unwrap().is_some());
        assert!(stores.get_reader(d(5)).unwrap().unwrap().get("b", "W_in").unwrap().is_none());
        assert!(index.has_date("a", d(4)).unwrap());
        assert!(!index.has_date("b", d(5)).unwrap());
        assert!(errors.is_empty());
    }
}
