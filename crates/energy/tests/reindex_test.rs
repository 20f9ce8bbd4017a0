//! Integration tests for rebuilding the date-range index.

mod common;

use alopex_energy::index::{BlobDateRangeIndex, DateRangeIndex, ReindexReport};
use alopex_energy::model::{Channel, EnergyProfile, Readings};
use alopex_energy::storage::{BlobStoreConfig, SyncMode};
use alopex_energy::store::{EnergyProfileStore, StoreConfig};
use alopex_energy::{EnergyError, Result};
use common::{date, FailingCommit};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> StoreConfig {
    StoreConfig::default().with_blob(BlobStoreConfig::default().with_sync_mode(SyncMode::None))
}

fn populate(store: &EnergyProfileStore) {
    let mut writer = store.writer();
    for (id, day) in [("a", 3), ("a", 1), ("b", 2), ("b", 9), ("c", 5), ("a", 7)] {
        let kw_in = Arc::new(Readings::one(Channel::double(&[f64::from(day)])));
        let profile = EnergyProfile::new(id, date(2023, 6, day), Some(kw_in), None, false, store.zeroes()).unwrap();
        assert!(writer.write(&profile, false, &mut |err| panic!("{err}")));
    }
    assert!(writer.commit(&mut |err| panic!("{err}")));
}

fn index_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("energy-readings-index.blobs")
}

#[test]
fn test_reindex_matches_incremental_index() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    populate(&store);
    let before = fs::read(index_path(temp_dir.path())).unwrap();

    let report = store.reindexer().reindex().unwrap();
    assert_eq!(report, ReindexReport { partitions: 6, ranges: 3 });
    assert_eq!(fs::read(index_path(temp_dir.path())).unwrap(), before);

    let reopened = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let reader = reopened.reader();
    assert!(reader.date_range("a").unwrap().unwrap().has_bounds(date(2023, 6, 1), date(2023, 6, 7)));
    assert!(reader.date_range("b").unwrap().unwrap().has_bounds(date(2023, 6, 2), date(2023, 6, 9)));
    assert!(reader.date_range("c").unwrap().unwrap().has_bounds(date(2023, 6, 5), date(2023, 6, 5)));
}

#[test]
fn test_reindex_twice_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    populate(&store);

    store.reindexer().reindex().unwrap();
    let first = fs::read(index_path(temp_dir.path())).unwrap();
    store.reindexer().reindex().unwrap();
    let second = fs::read(index_path(temp_dir.path())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reindex_recovers_lost_index() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
        populate(&store);
    }
    fs::remove_file(index_path(temp_dir.path())).unwrap();

    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let mut reader = store.reader();
    assert!(reader.get("a", date(2023, 6, 1), &mut |err| panic!("{err}")).is_none());

    store.reindexer().reindex().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let mut reader = store.reader();
    assert!(reader.get("a", date(2023, 6, 1), &mut |err| panic!("{err}")).is_some());
}

#[test]
fn test_failed_commit_restores_original_index() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    populate(&store);
    store.reindexer().reindex().unwrap();
    let original = fs::read(index_path(temp_dir.path())).unwrap();

    let blob_config = config().blob;
    let reindexer = store.reindexer().with_index_factory(Box::new(move |path: &Path| -> Result<Box<dyn DateRangeIndex>> {
        let index = BlobDateRangeIndex::open(path, blob_config.clone())?;
        Ok(Box::new(FailingCommit(index)) as Box<dyn DateRangeIndex>)
    }));
    let err = reindexer.reindex().unwrap_err();
    match err {
        EnergyError::Reindex { message, source } => {
            assert_eq!(message, "Failed to write to index database.");
            assert!(source.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(fs::read(index_path(temp_dir.path())).unwrap(), original);
    assert!(!temp_dir.path().join("energy-readings-index.blobs.bak").exists());
}

#[test]
fn test_empty_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let report = store.reindexer().reindex().unwrap();
    assert_eq!(report, ReindexReport::default());

    let index = BlobDateRangeIndex::open(index_path(temp_dir.path()), config().blob).unwrap();
    let mut count = 0;
    index.for_all(&mut |_| count += 1).unwrap();
    assert_eq!(count, 0);
}
