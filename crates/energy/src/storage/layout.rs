//! Date-based partition layout for on-disk organization.

use crate::error::Result;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of each per-date readings store.
pub const READINGS_FILE_NAME: &str = "energy-readings.blobs";

/// File name of the date-range index store.
pub const INDEX_FILE_NAME: &str = "energy-readings-index.blobs";

/// Directory name format of a date partition.
const DATE_DIR_FORMAT: &str = "%Y-%m-%d";

/// Provides filesystem paths for date partitions and the index.
///
/// ```text
/// data_dir/
/// ├── energy-readings-index.blobs
/// ├── 2024-01-01/energy-readings.blobs
/// └── 2024-01-02/energy-readings.blobs
/// ```
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::storage::PartitionLayout;
/// use chrono::NaiveDate;
///
/// let layout = PartitionLayout::new("/data");
/// let path = layout.readings_path(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    data_dir: PathBuf,
}

impl PartitionLayout {
    /// Creates a layout rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the directory of the partition for `date`.
    pub fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(date.format(DATE_DIR_FORMAT).to_string())
    }

    /// Returns the readings store path for `date`.
    pub fn readings_path(&self, date: NaiveDate) -> PathBuf {
        self.partition_dir(date).join(READINGS_FILE_NAME)
    }

    /// Returns the index store path.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }

    /// Returns the path the index is moved to while it is rebuilt.
    pub fn index_backup_path(&self) -> PathBuf {
        self.data_dir.join(format!("{INDEX_FILE_NAME}.bak"))
    }

    /// Creates the partition directory for `date`.
    pub fn create_partition_dir(&self, date: NaiveDate) -> Result<PathBuf> {
        let dir = self.partition_dir(date);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Lists the dates of all partition directories, oldest first.
    ///
    /// Entries whose names are not dates are ignored. A missing data
    /// directory has no partitions.
    pub fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();

        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(dates),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(name, DATE_DIR_FORMAT) {
                dates.push(date);
            }
        }

        dates.sort_unstable();
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_paths() {
        let layout = PartitionLayout::new("/data");
        assert_eq!(
            layout.readings_path(d(2024, 3, 7)),
            PathBuf::from("/data/2024-03-07/energy-readings.blobs")
        );
        assert_eq!(
            layout.index_path(),
            PathBuf::from("/data/energy-readings-index.blobs")
        );
        assert_eq!(
            layout.index_backup_path(),
            PathBuf::from("/data/energy-readings-index.blobs.bak")
        );
    }

    #[test]
    fn test_list_dates_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let layout = PartitionLayout::new(temp_dir.path());
        layout.create_partition_dir(d(2024, 2, 1)).unwrap();
        layout.create_partition_dir(d(2023, 12, 31)).unwrap();
        layout.create_partition_dir(d(2024, 1, 15)).unwrap();
        fs::create_dir_all(temp_dir.path().join("not-a-date")).unwrap();
        fs::write(temp_dir.path().join("2024-05-05"), b"file").unwrap();

        assert_eq!(
            layout.list_dates().unwrap(),
            vec![d(2023, 12, 31), d(2024, 1, 15), d(2024, 2, 1)]
        );
    }

    #[test]
    fn test_list_dates_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let layout = PartitionLayout::new(temp_dir.path().join("missing"));
        assert!(layout.list_dates().unwrap().is_empty());
    }
}
