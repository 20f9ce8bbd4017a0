//! Per-date store provider.

use super::{BlobStore, BlobStoreConfig, FileBlobStore, PartitionLayout};
use crate::error::{EnergyError, Result};
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key holding a partition's date.
pub const METADATA_DATE: &str = "date";

/// Metadata key holding a partition's time zone.
pub const METADATA_TIME_ZONE: &str = "timezone";

/// Opens and caches the readings store of each date partition.
///
/// Every partition records the date and time zone it was created for, and
/// refuses to open for any other.
#[derive(Debug)]
pub struct PartitionStores {
    layout: PartitionLayout,
    time_zone: String,
    config: BlobStoreConfig,
    open: DashMap<NaiveDate, Arc<FileBlobStore>>,
}

impl PartitionStores {
    /// Creates a provider over `layout` for partitions in `time_zone`.
    pub fn new(layout: PartitionLayout, time_zone: impl Into<String>, config: BlobStoreConfig) -> Self {
        Self {
            layout,
            time_zone: time_zone.into(),
            config,
            open: DashMap::new(),
        }
    }

    /// Returns the layout partitions are stored in.
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Returns the store for `date`, or `None` if the partition was never
    /// written.
    pub fn get_reader(&self, date: NaiveDate) -> Result<Option<Arc<FileBlobStore>>> {
        self.get_store(date, false)
    }

    /// Returns the store for `date`, creating the partition if needed.
    pub fn get_writer(&self, date: NaiveDate) -> Result<Arc<FileBlobStore>> {
        self.get_store(date, true)?.ok_or_else(|| {
            EnergyError::Storage(format!("partition for {date} could not be created"))
        })
    }

    fn get_store(&self, date: NaiveDate, create: bool) -> Result<Option<Arc<FileBlobStore>>> {
        if let Some(store) = self.open.get(&date) {
            return Ok(Some(Arc::clone(store.value())));
        }

        // The slot stays locked while the partition is opened and initialised,
        // so each partition file has one store instance.
        let slot = match self.open.entry(date) {
            Entry::Occupied(slot) => return Ok(Some(Arc::clone(slot.get()))),
            Entry::Vacant(slot) => slot,
        };
        let path = self.layout.readings_path(date);
        if !create && !path.exists() {
            return Ok(None);
        }
        self.layout.create_partition_dir(date)?;

        let store = Arc::new(FileBlobStore::open(&path, self.config.clone())?);
        self.check_metadata(&store, date)?;
        slot.insert(Arc::clone(&store));
        Ok(Some(store))
    }

    fn check_metadata(&self, store: &FileBlobStore, date: NaiveDate) -> Result<()> {
        let stored_date = store.get_metadata(METADATA_DATE)?;
        let stored_zone = store.get_metadata(METADATA_TIME_ZONE)?;
        match (stored_date, stored_zone) {
            (None, None) => {
                debug!("Initialising partition {date} in time zone {}", self.time_zone);
                store.write_metadata(METADATA_DATE, &date.to_string())?;
                store.write_metadata(METADATA_TIME_ZONE, &self.time_zone)?;
                store.commit()
            }
            (None, Some(_)) => Err(EnergyError::InvalidMetadata(
                "time zone defined with no date".to_string(),
            )),
            (Some(_), None) => Err(EnergyError::InvalidMetadata(
                "date defined with no time zone".to_string(),
            )),
            (Some(stored_date), Some(stored_zone)) => {
                let parsed = stored_date.parse::<NaiveDate>().map_err(|_| {
                    EnergyError::InvalidMetadata(format!("{METADATA_DATE} '{stored_date}' is not a date"))
                })?;
                if parsed != date {
                    warn!("Partition {} holds data for {}", date, parsed);
                    return Err(EnergyError::InvalidMetadata(format!(
                        "{METADATA_DATE} was '{parsed}', expected '{date}'"
                    )));
                }
                if stored_zone != self.time_zone {
                    return Err(EnergyError::InvalidMetadata(format!(
                        "{METADATA_TIME_ZONE} was '{stored_zone}', expected '{}'",
                        self.time_zone
                    )));
                }
                Ok(())
            }
        }
    }
}
