//! Date-range index persisted in a blob store.

use super::{DateRangeIndex, RangeHandler};
use crate::codec::DateRangeCodec;
use crate::error::{EnergyError, Result};
use crate::model::IdDateRange;
use crate::storage::{BlobStore, BlobStoreConfig, FileBlobStore};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Blob tag date ranges are stored under.
pub const DATE_RANGE_TAG: &str = "dateRange";

/// A [`DateRangeIndex`] storing one 12-byte payload per id.
///
/// Payloads that fail to decode are logged and treated as absent.
#[derive(Clone)]
pub struct BlobDateRangeIndex {
    store: Arc<dyn BlobStore>,
    codec: DateRangeCodec,
}

impl std::fmt::Debug for BlobDateRangeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobDateRangeIndex").finish_non_exhaustive()
    }
}

impl BlobDateRangeIndex {
    /// Creates an index over `store`.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            codec: DateRangeCodec,
        }
    }

    /// Opens an index backed by a [`FileBlobStore`] at `path`.
    pub fn open(path: impl AsRef<Path>, config: BlobStoreConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(FileBlobStore::open(path, config)?)))
    }

    fn decode(&self, id: &str, bytes: &[u8]) -> Option<IdDateRange> {
        let range = self.codec.decode(id, bytes);
        if range.is_none() {
            warn!("Ignoring undecodable date range for {}", id);
        }
        range
    }
}

impl DateRangeIndex for BlobDateRangeIndex {
    fn get(&self, id: &str) -> Result<Option<IdDateRange>> {
        Ok(self
            .store
            .get(id, DATE_RANGE_TAG)?
            .and_then(|bytes| self.decode(id, &bytes)))
    }

    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        self.store.for_each(ids, DATE_RANGE_TAG, &mut |id, bytes| {
            if let Some(range) = self.decode(id, bytes) {
                handler(range);
            }
        })
    }

    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.store.for_all(DATE_RANGE_TAG, &mut |id, bytes| {
            if let Some(range) = self.decode(id, bytes) {
                handler(range);
            }
        })
    }

    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let bytes = self.codec.encode(from, to);
        if self.store.update(id, DATE_RANGE_TAG, &bytes)? || self.store.write(id, DATE_RANGE_TAG, &bytes)? {
            Ok(())
        } else {
            Err(EnergyError::Storage(format!(
                "failed to save date range of {id}"
            )))
        }
    }

    fn commit(&self) -> Result<()> {
        debug!("Committing date range index");
        self.store.commit()
    }

    fn rollback(&self) -> Result<()> {
        debug!("Rolling back date range index");
        self.store.rollback()
    }
}
