//! Profile readers.
//!
//! Only `(id, date)` pairs covered by the date-range index are visible: a
//! payload left behind in a partition without an index entry is never
//! returned.

use super::{ErrorHandler, ItemError, ItemHandler};
use crate::codec::{CacheableDecoder, Decoder, ReadingsDecoder, StatDecoder};
use crate::error::{EnergyError, Result};
use crate::index::{DateRangeIndex, RangeHandler};
use crate::model::{ChannelPrecision, EnergyProfile, EnergyProfileStat, IdDateRange, ZeroedReadingsCache};
use crate::storage::{BlobStore, EnergyProfileAttribute, FileBlobStore, PartitionStores};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Reads profiles, single attributes, and date ranges.
///
/// # Examples
/// ```rust,ignore
/// let mut reader = store.reader();
/// let ids = vec!["meter-1".to_string(), "meter-2".to_string()];
/// reader.for_each(&ids, date, &mut |id, _, profile| println!("{id}: {}", profile.len()), &mut |err| {
///     eprintln!("{err}");
/// });
/// let peak = reader.maximums().get("meter-1", date, &mut |_| {});
/// ```
pub struct EnergyProfileReader {
    stores: Arc<PartitionStores>,
    index: Arc<dyn DateRangeIndex>,
    zeroes: Arc<ZeroedReadingsCache>,
    kw_in_decoder: ReadingsDecoder,
    kw_out_decoder: ReadingsDecoder,
    stat_decoder: StatDecoder,
    cacheable_decoder: CacheableDecoder,
}

impl std::fmt::Debug for EnergyProfileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyProfileReader").finish_non_exhaustive()
    }
}

impl EnergyProfileReader {
    /// Creates a reader decoding channels at `precision`.
    pub fn new(
        stores: Arc<PartitionStores>,
        index: Arc<dyn DateRangeIndex>,
        zeroes: Arc<ZeroedReadingsCache>,
        precision: ChannelPrecision,
    ) -> Self {
        Self {
            kw_in_decoder: ReadingsDecoder::new(Arc::clone(&zeroes), precision),
            kw_out_decoder: ReadingsDecoder::new(Arc::clone(&zeroes), precision),
            stat_decoder: StatDecoder::new(),
            cacheable_decoder: CacheableDecoder,
            stores,
            index,
            zeroes,
        }
    }

    /// Returns the date range of `id`.
    pub fn date_range(&self, id: &str) -> Result<Option<IdDateRange>> {
        self.index.get(id)
    }

    /// Streams the date ranges of `ids`, skipping ids without one.
    pub fn for_each_date_range(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        self.index.for_each(ids, handler)
    }

    /// Streams every date range.
    pub fn for_all_date_ranges(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.index.for_all(handler)
    }

    /// Reads the profile of `id` on `date`.
    pub fn get(&mut self, id: &str, date: NaiveDate, on_error: &mut ErrorHandler<'_>) -> Option<EnergyProfile> {
        if !covers(&*self.index, id, date, on_error) {
            return None;
        }
        let store = open_partition(&self.stores, date, on_error)?;
        self.read_profile(&*store, id, date, on_error)
    }

    /// Reads the profiles of `ids` on `date`.
    pub fn for_each(
        &mut self,
        ids: &[String],
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfile>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let ids = visible(&*self.index, ids, date, on_error);
        if ids.is_empty() {
            return;
        }
        if let Some(store) = open_partition(&self.stores, date, on_error) {
            self.read_profiles(&*store, &ids, date, on_read, on_error);
        }
    }

    /// Reads every profile stored for `date`.
    pub fn for_all(
        &mut self,
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfile>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let Some(store) = open_partition(&self.stores, date, on_error) else {
            return;
        };
        let mut ids = Vec::new();
        if let Err(err) = store.ids(&mut |id| ids.push(id.to_string())) {
            on_error(ItemError::partition(date, "Failed to list partition ids", err));
            return;
        }
        let ids = visible(&*self.index, &ids, date, on_error);
        self.read_profiles(&*store, &ids, date, on_read, on_error);
    }

    /// Reads every profile stored for `date` whose cacheable flag is set.
    pub fn for_all_cacheable(
        &mut self,
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfile>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let Some(store) = open_partition(&self.stores, date, on_error) else {
            return;
        };
        let mut ids = Vec::new();
        let decoder = &mut self.cacheable_decoder;
        let listed = store.for_all(EnergyProfileAttribute::Cacheable.tag(), &mut |id, bytes| {
            if decoder.decode(bytes) == Some(true) {
                ids.push(id.to_string());
            }
        });
        if let Err(err) = listed {
            on_error(ItemError::partition(date, "Failed to list cacheable profiles", err));
            return;
        }
        let ids = visible(&*self.index, &ids, date, on_error);
        self.read_profiles(&*store, &ids, date, on_read, on_error);
    }

    /// Reader of kW in readings alone.
    pub fn kw_in(&mut self) -> PartialProfileReader<'_, ReadingsDecoder> {
        PartialProfileReader {
            attribute: EnergyProfileAttribute::KwIn,
            stores: &self.stores,
            index: &*self.index,
            decoder: &mut self.kw_in_decoder,
        }
    }

    /// Reader of kW out readings alone.
    pub fn kw_out(&mut self) -> PartialProfileReader<'_, ReadingsDecoder> {
        PartialProfileReader {
            attribute: EnergyProfileAttribute::KwOut,
            stores: &self.stores,
            index: &*self.index,
            decoder: &mut self.kw_out_decoder,
        }
    }

    /// Reader of cacheable flags alone. Profiles stored without the flag
    /// read as absent.
    pub fn cacheable(&mut self) -> PartialProfileReader<'_, CacheableDecoder> {
        PartialProfileReader {
            attribute: EnergyProfileAttribute::Cacheable,
            stores: &self.stores,
            index: &*self.index,
            decoder: &mut self.cacheable_decoder,
        }
    }

    /// Reader of profile maximums, computing them when none are stored.
    pub fn maximums(&mut self) -> StatReader<'_> {
        StatReader { reader: self }
    }

    fn stored_maximums(&mut self) -> PartialProfileReader<'_, StatDecoder> {
        PartialProfileReader {
            attribute: EnergyProfileAttribute::Maximums,
            stores: &self.stores,
            index: &*self.index,
            decoder: &mut self.stat_decoder,
        }
    }

    fn read_profiles(
        &mut self,
        store: &dyn BlobStore,
        ids: &[String],
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfile>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        debug!("Reading {} profiles for {}", ids.len(), date);
        for id in ids {
            if let Some(profile) = self.read_profile(store, id, date, on_error) {
                on_read(id, date, profile);
            }
        }
    }

    fn read_profile(
        &mut self,
        store: &dyn BlobStore,
        id: &str,
        date: NaiveDate,
        on_error: &mut ErrorHandler<'_>,
    ) -> Option<EnergyProfile> {
        match self.decode_profile(store, id, date) {
            Ok(profile) => profile,
            Err(err) => {
                on_error(ItemError::item(id, date, "Failed to read profile", Some(err)));
                None
            }
        }
    }

    fn decode_profile(&mut self, store: &dyn BlobStore, id: &str, date: NaiveDate) -> Result<Option<EnergyProfile>> {
        let kw_in = decode_tag(store, id, EnergyProfileAttribute::KwIn, &mut self.kw_in_decoder)?;
        let kw_out = decode_tag(store, id, EnergyProfileAttribute::KwOut, &mut self.kw_out_decoder)?;
        let cacheable = decode_tag(store, id, EnergyProfileAttribute::Cacheable, &mut self.cacheable_decoder)?;
        if kw_in.is_none() && kw_out.is_none() && cacheable.is_none() {
            return Ok(None);
        }
        EnergyProfile::new(id, date, kw_in, kw_out, cacheable.unwrap_or(false), &self.zeroes).map(Some)
    }
}

/// Reads one stored attribute of profiles.
pub struct PartialProfileReader<'r, D> {
    attribute: EnergyProfileAttribute,
    stores: &'r PartitionStores,
    index: &'r dyn DateRangeIndex,
    decoder: &'r mut D,
}

impl<D: Decoder> PartialProfileReader<'_, D> {
    /// The attribute read.
    pub fn attribute(&self) -> EnergyProfileAttribute {
        self.attribute
    }

    /// Reads the attribute of `id` on `date`.
    pub fn get(&mut self, id: &str, date: NaiveDate, on_error: &mut ErrorHandler<'_>) -> Option<D::Item> {
        if !covers(self.index, id, date, on_error) {
            return None;
        }
        let store = open_partition(self.stores, date, on_error)?;
        match decode_tag(&*store, id, self.attribute, &mut *self.decoder) {
            Ok(item) => item,
            Err(err) => {
                on_error(ItemError::item(
                    id,
                    date,
                    format!("Failed to read {}", self.attribute.tag()),
                    Some(err),
                ));
                None
            }
        }
    }

    /// Reads the attribute of `ids` on `date`.
    pub fn for_each(
        &mut self,
        ids: &[String],
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, D::Item>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let ids = visible(self.index, ids, date, on_error);
        if ids.is_empty() {
            return;
        }
        let Some(store) = open_partition(self.stores, date, on_error) else {
            return;
        };
        let (attribute, decoder) = (self.attribute, &mut *self.decoder);
        let streamed = store.for_each(&ids, attribute.tag(), &mut |id, bytes| {
            emit(decoder, attribute, id, date, bytes, on_read, on_error);
        });
        if let Err(err) = streamed {
            on_error(ItemError::partition(date, format!("Failed to read {}", attribute.tag()), err));
        }
    }

    /// Reads the attribute of every indexed id on `date`.
    pub fn for_all(
        &mut self,
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, D::Item>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let Some(store) = open_partition(self.stores, date, on_error) else {
            return;
        };
        let (attribute, index, decoder) = (self.attribute, self.index, &mut *self.decoder);
        let streamed = store.for_all(attribute.tag(), &mut |id, bytes| match index.has_date(id, date) {
            Ok(true) => emit(decoder, attribute, id, date, bytes, on_read, on_error),
            Ok(false) => {}
            Err(err) => on_error(ItemError::item(id, date, "Failed to read date range index", Some(err))),
        });
        if let Err(err) = streamed {
            on_error(ItemError::partition(date, format!("Failed to read {}", attribute.tag()), err));
        }
    }
}

/// Reads profile maximums.
///
/// Stored maximums are served as is. For profiles written without them the
/// maximums are computed from the full profile.
pub struct StatReader<'r> {
    reader: &'r mut EnergyProfileReader,
}

impl StatReader<'_> {
    /// Returns the maximums of `id` on `date`.
    pub fn get(&mut self, id: &str, date: NaiveDate, on_error: &mut ErrorHandler<'_>) -> Option<EnergyProfileStat> {
        if let Some(stat) = self.reader.stored_maximums().get(id, date, on_error) {
            return Some(stat);
        }
        let profile = self.reader.get(id, date, on_error)?;
        EnergyProfileStat::max_of(&profile).ok()
    }

    /// Streams the maximums of `ids` on `date`.
    pub fn for_each(
        &mut self,
        ids: &[String],
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfileStat>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let mut returned = HashSet::new();
        self.reader.stored_maximums().for_each(
            ids,
            date,
            &mut |id, date, stat| {
                returned.insert(id.to_string());
                on_read(id, date, stat);
            },
            on_error,
        );

        let remaining: Vec<String> = ids
            .iter()
            .filter(|id| !returned.contains(id.as_str()))
            .cloned()
            .collect();
        if remaining.is_empty() {
            return;
        }
        self.reader.for_each(
            &remaining,
            date,
            &mut |id, date, profile| {
                if let Ok(stat) = EnergyProfileStat::max_of(&profile) {
                    on_read(id, date, stat);
                }
            },
            on_error,
        );
    }

    /// Streams the maximums of every profile on `date`.
    pub fn for_all(
        &mut self,
        date: NaiveDate,
        on_read: &mut ItemHandler<'_, EnergyProfileStat>,
        on_error: &mut ErrorHandler<'_>,
    ) {
        let mut returned = HashSet::new();
        self.reader.stored_maximums().for_all(
            date,
            &mut |id, date, stat| {
                returned.insert(id.to_string());
                on_read(id, date, stat);
            },
            on_error,
        );
        self.reader.for_all(
            date,
            &mut |id, date, profile| {
                if returned.contains(id) {
                    return;
                }
                if let Ok(stat) = EnergyProfileStat::max_of(&profile) {
                    on_read(id, date, stat);
                }
            },
            on_error,
        );
    }
}

fn covers(index: &dyn DateRangeIndex, id: &str, date: NaiveDate, on_error: &mut ErrorHandler<'_>) -> bool {
    match index.has_date(id, date) {
        Ok(covered) => covered,
        Err(err) => {
            on_error(ItemError::item(id, date, "Failed to read date range index", Some(err)));
            false
        }
    }
}

fn visible(
    index: &dyn DateRangeIndex,
    ids: &[String],
    date: NaiveDate,
    on_error: &mut ErrorHandler<'_>,
) -> Vec<String> {
    index.filter_ids_with_date(ids, date).unwrap_or_else(|err| {
        on_error(ItemError::partition(date, "Failed to read date range index", err));
        Vec::new()
    })
}

fn open_partition(
    stores: &PartitionStores,
    date: NaiveDate,
    on_error: &mut ErrorHandler<'_>,
) -> Option<Arc<FileBlobStore>> {
    match stores.get_reader(date) {
        Ok(store) => store,
        Err(err) => {
            on_error(ItemError::partition(date, "Failed to open partition", err));
            None
        }
    }
}

fn decode_tag<D: Decoder>(
    store: &dyn BlobStore,
    id: &str,
    attribute: EnergyProfileAttribute,
    decoder: &mut D,
) -> Result<Option<D::Item>> {
    match store.get(id, attribute.tag())? {
        None => Ok(None),
        Some(bytes) => decoder
            .decode(&bytes)
            .map(Some)
            .ok_or_else(|| EnergyError::Decode(format!("undecodable {} payload", attribute.tag()))),
    }
}

fn emit<D: Decoder>(
    decoder: &mut D,
    attribute: EnergyProfileAttribute,
    id: &str,
    date: NaiveDate,
    bytes: &[u8],
    on_read: &mut ItemHandler<'_, D::Item>,
    on_error: &mut ErrorHandler<'_>,
) {
    match decoder.decode(bytes) {
        Some(item) => on_read(id, date, item),
        None => on_error(ItemError::item(
            id,
            date,
            format!("Failed to read {}", attribute.tag()),
            Some(EnergyError::Decode(format!("undecodable {} payload", attribute.tag()))),
        )),
    }
}
