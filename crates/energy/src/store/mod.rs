//! Profile store: date-partitioned readings plus the date-range index.
//!
//! [`EnergyProfileStore`] owns what is shared between threads (the zero
//! cache, the partition stores and the cached index) and hands out
//! [`EnergyProfileReader`]s and [`EnergyProfileWriter`]s, each with its own
//! codec scratch buffers.

pub mod reader;
pub mod writer;

pub use reader::{EnergyProfileReader, PartialProfileReader, StatReader};
pub use writer::EnergyProfileWriter;

use crate::error::{EnergyError, Result};
use crate::index::{BlobDateRangeIndex, CachedDateRangeIndex, DateRangeIndex, Reindexer};
use crate::model::{ChannelPrecision, ZeroedReadingsCache};
use crate::storage::{BlobStoreConfig, PartitionLayout, PartitionStores};
use chrono::NaiveDate;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Receives per-item failures. The failed item is skipped and its siblings
/// carry on.
pub type ErrorHandler<'a> = dyn FnMut(ItemError) + 'a;

/// Receives items read for an `(id, date)` pair.
pub type ItemHandler<'a, T> = dyn FnMut(&str, NaiveDate, T) + 'a;

/// A failure scoped to one item, one partition, or the index.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ItemError {
    /// Meter id, empty when the failure is not about one meter.
    pub id: String,
    /// Partition date, `None` for index failures.
    pub date: Option<NaiveDate>,
    /// What went wrong.
    pub message: String,
    /// Underlying error, if any.
    #[source]
    pub cause: Option<EnergyError>,
}

impl ItemError {
    pub(crate) fn item(
        id: &str,
        date: NaiveDate,
        message: impl Into<String>,
        cause: Option<EnergyError>,
    ) -> Self {
        Self {
            id: id.to_string(),
            date: Some(date),
            message: message.into(),
            cause,
        }
    }

    pub(crate) fn partition(date: NaiveDate, message: impl Into<String>, cause: EnergyError) -> Self {
        Self {
            id: String::new(),
            date: Some(date),
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub(crate) fn index(message: impl Into<String>, cause: EnergyError) -> Self {
        Self {
            id: String::new(),
            date: None,
            message: message.into(),
            cause: Some(cause),
        }
    }
}

/// Configuration for [`EnergyProfileStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Time zone recorded in, and required of, every partition.
    pub time_zone: String,
    /// Precision of decoded channels.
    pub precision: ChannelPrecision,
    /// Settings of every blob store opened.
    pub blob: BlobStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            time_zone: "UTC".to_string(),
            precision: ChannelPrecision::default(),
            blob: BlobStoreConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Sets the partition time zone.
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Sets the precision of decoded channels.
    pub fn with_precision(mut self, precision: ChannelPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the blob store settings.
    pub fn with_blob(mut self, blob: BlobStoreConfig) -> Self {
        self.blob = blob;
        self
    }
}

type SharedIndex = CachedDateRangeIndex<BlobDateRangeIndex>;

/// An energy profile store rooted at a data directory.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::store::{EnergyProfileStore, StoreConfig};
///
/// let store = EnergyProfileStore::open("/var/lib/energy", StoreConfig::default())?;
/// let mut writer = store.writer();
/// writer.write(&profile, true, &mut |err| eprintln!("{err}"));
/// writer.commit(&mut |err| eprintln!("{err}"));
///
/// let mut reader = store.reader();
/// let read = reader.get("meter-1", date, &mut |err| eprintln!("{err}"));
/// ```
#[derive(Debug)]
pub struct EnergyProfileStore {
    config: StoreConfig,
    zeroes: Arc<ZeroedReadingsCache>,
    stores: Arc<PartitionStores>,
    index: Arc<SharedIndex>,
}

impl EnergyProfileStore {
    /// Opens the store in `data_dir`, creating the directory and an empty
    /// index when needed.
    pub fn open(data_dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let layout = PartitionLayout::new(data_dir.as_ref());
        std::fs::create_dir_all(layout.data_dir())?;
        let index = BlobDateRangeIndex::open(layout.index_path(), config.blob.clone())?;
        info!(
            "Opened energy profile store at {} ({})",
            layout.data_dir().display(),
            config.time_zone
        );
        let stores = PartitionStores::new(layout, config.time_zone.clone(), config.blob.clone());
        Ok(Self {
            zeroes: Arc::new(ZeroedReadingsCache::new()),
            stores: Arc::new(stores),
            index: Arc::new(CachedDateRangeIndex::new(index)),
            config,
        })
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the shared zero cache.
    pub fn zeroes(&self) -> &Arc<ZeroedReadingsCache> {
        &self.zeroes
    }

    /// Returns the date-range index.
    pub fn index(&self) -> Arc<dyn DateRangeIndex> {
        self.index.clone()
    }

    /// Creates a reader.
    pub fn reader(&self) -> EnergyProfileReader {
        EnergyProfileReader::new(
            Arc::clone(&self.stores),
            self.index(),
            Arc::clone(&self.zeroes),
            self.config.precision,
        )
    }

    /// Creates a writer.
    pub fn writer(&self) -> EnergyProfileWriter {
        EnergyProfileWriter::new(Arc::clone(&self.stores), self.index())
    }

    /// Creates a reindexer over the same data directory.
    ///
    /// The rebuilt index replaces the file this store has open; reopen the
    /// store after a successful run.
    pub fn reindexer(&self) -> Reindexer {
        Reindexer::new(Arc::clone(&self.stores), self.config.blob.clone())
    }
}

impl fmt::Display for EnergyProfileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnergyProfileStore({})", self.stores.layout().data_dir().display())
    }
}
