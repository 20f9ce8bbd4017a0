//! Full rebuild of the date-range index from the stored partitions.
//!
//! The rebuild scans the ids of every date partition, folds them into one
//! `[first, last]` range per id, and writes a fresh index. The previous index
//! file is moved to `<index>.bak` first and is put back if anything fails.

use super::{BlobDateRangeIndex, DateRangeIndex};
use crate::error::{EnergyError, Result};
use crate::storage::{BlobStore, BlobStoreConfig, PartitionLayout, PartitionStores};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Opens the index to write at the given path.
pub type IndexFactory = Box<dyn Fn(&Path) -> Result<Box<dyn DateRangeIndex>> + Send + Sync>;

/// Summary of a completed rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReindexReport {
    /// Date partitions scanned.
    pub partitions: usize,
    /// Ranges written to the new index.
    pub ranges: usize,
}

/// Rebuilds the date-range index of a data directory.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::index::Reindexer;
///
/// let report = store.reindexer().reindex()?;
/// println!("indexed {} ids over {} days", report.ranges, report.partitions);
/// ```
pub struct Reindexer {
    layout: PartitionLayout,
    stores: Arc<PartitionStores>,
    index_factory: IndexFactory,
}

impl std::fmt::Debug for Reindexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reindexer")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Reindexer {
    /// Creates a reindexer writing a [`BlobDateRangeIndex`] with `config`.
    pub fn new(stores: Arc<PartitionStores>, config: BlobStoreConfig) -> Self {
        let layout = stores.layout().clone();
        Self {
            layout,
            stores,
            index_factory: Box::new(move |path: &Path| -> Result<Box<dyn DateRangeIndex>> {
                let index = BlobDateRangeIndex::open(path, config.clone())?;
                Ok(Box::new(index) as Box<dyn DateRangeIndex>)
            }),
        }
    }

    /// Replaces the way the new index is opened.
    pub fn with_index_factory(mut self, index_factory: IndexFactory) -> Self {
        self.index_factory = index_factory;
        self
    }

    /// Rebuilds the index.
    ///
    /// # Errors
    ///
    /// Fails without touching anything if a backup from an earlier run is
    /// still present. Fails with [`EnergyError::Reindex`] after restoring the
    /// previous index when the new one cannot be written, or with
    /// [`EnergyError::RestoreFailed`] when the previous index could not be put
    /// back.
    pub fn reindex(&self) -> Result<ReindexReport> {
        let backup = self.layout.index_backup_path();
        if backup.exists() {
            return Err(EnergyError::reindex(
                format!(
                    "Backup file {} already exists. Restore or remove it before reindexing.",
                    backup.display()
                ),
                None,
            ));
        }

        let dates = self
            .layout
            .list_dates()
            .map_err(|err| EnergyError::reindex("Failed to read date listing", Some(err)))?;
        info!("Building index from {} partitions", dates.len());
        let ranges = self.build(&dates)?;

        info!("Saving index of {} ids", ranges.len());
        self.backup_index(&backup)?;
        if let Err(err) = self.write_index(&ranges) {
            error!("Failed to write index, restoring backup: {}", err);
            self.restore_index(&backup)?;
            return Err(EnergyError::reindex(
                "Failed to write to index database.",
                Some(err),
            ));
        }
        if backup.exists() {
            fs::remove_file(&backup).map_err(|err| {
                EnergyError::reindex("Failed to delete backup file", Some(err.into()))
            })?;
        }

        info!("Reindex complete");
        Ok(ReindexReport {
            partitions: dates.len(),
            ranges: ranges.len(),
        })
    }

    fn build(&self, dates: &[NaiveDate]) -> Result<BTreeMap<String, (NaiveDate, NaiveDate)>> {
        let mut ranges: BTreeMap<String, (NaiveDate, NaiveDate)> = BTreeMap::new();
        for &date in dates {
            let store = match self.stores.get_reader(date) {
                Ok(Some(store)) => store,
                Ok(None) => continue,
                Err(err) => {
                    return Err(EnergyError::reindex(
                        format!("Failed to open partition {date}"),
                        Some(err),
                    ))
                }
            };
            store.ids(&mut |id| match ranges.get_mut(id) {
                Some((from, to)) => {
                    *from = (*from).min(date);
                    *to = (*to).max(date);
                }
                None => {
                    ranges.insert(id.to_string(), (date, date));
                }
            })?;
        }
        Ok(ranges)
    }

    fn backup_index(&self, backup: &Path) -> Result<()> {
        let index_path = self.layout.index_path();
        if index_path.exists() {
            fs::rename(&index_path, backup).map_err(|err| {
                EnergyError::reindex("Failed to backup index file", Some(err.into()))
            })?;
        }
        Ok(())
    }

    fn write_index(&self, ranges: &BTreeMap<String, (NaiveDate, NaiveDate)>) -> Result<()> {
        let index = (self.index_factory)(&self.layout.index_path())?;
        for (id, (from, to)) in ranges {
            index.save(id, *from, *to)?;
        }
        index.commit()
    }

    fn restore_index(&self, backup: &Path) -> Result<()> {
        let index_path = self.layout.index_path();
        let restore = || -> std::io::Result<()> {
            if index_path.exists() {
                fs::remove_file(&index_path)?;
            }
            if backup.exists() {
                fs::rename(backup, &index_path)?;
            }
            Ok(())
        };
        restore().map_err(|source| {
            warn!("Index restore failed, backup left at {}", backup.display());
            EnergyError::RestoreFailed {
                backup: backup.to_path_buf(),
                source,
            }
        })
    }
}
