//! Integration tests for writing and reading profiles through the store.

mod common;

use alopex_energy::model::{Channel, EnergyProfile, EnergyProfileStat, Readings, Samples, SharedReadings};
use alopex_energy::storage::{BlobStoreConfig, SyncMode};
use alopex_energy::store::{EnergyProfileStore, ItemError, StoreConfig};
use common::date;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn config() -> StoreConfig {
    StoreConfig::default().with_blob(BlobStoreConfig::default().with_sync_mode(SyncMode::None))
}

fn readings(values: &[f64]) -> SharedReadings {
    Arc::new(Readings::one(Channel::double(values)))
}

fn fail(err: ItemError) {
    panic!("unexpected item error: {err} ({:?})", err.cause);
}

#[test]
fn test_absent_missing_and_zero_stay_distinct() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let day = date(2024, 2, 29);

    let zero = store.zeroes().zeroed_readings(1, 4);
    let missing_out = EnergyProfile::new("missing", day, Some(readings(&[1.0, 2.0, 3.0, 4.0])), None, false, store.zeroes()).unwrap();
    let zero_out = EnergyProfile::new("zero", day, Some(readings(&[1.0, 2.0, 3.0, 4.0])), Some(zero.clone()), false, store.zeroes()).unwrap();

    let mut writer = store.writer();
    assert!(writer.write(&missing_out, false, &mut fail));
    assert!(writer.write(&zero_out, false, &mut fail));
    assert!(writer.commit(&mut fail));

    let mut reader = store.reader();
    assert!(reader.get("absent", day, &mut fail).is_none());

    let read_missing = reader.get("missing", day, &mut fail).unwrap();
    assert!(read_missing.kw_out().is_missing());
    assert_eq!(read_missing.kw_out().len(), 4);
    assert!(reader.kw_out().get("missing", day, &mut fail).is_none());

    let read_zero = reader.get("zero", day, &mut fail).unwrap();
    assert!(!read_zero.kw_out().is_missing());
    assert!(Arc::ptr_eq(read_zero.kw_out(), &zero));
    assert_ne!(read_missing.kw_out(), read_zero.kw_out());
}

#[test]
fn test_profiles_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let day = date(2022, 12, 31);
    let kw_in = Arc::new(
        Readings::multi(vec![
            Arc::new(Channel::double(&[0.5, f64::NAN, 1.25])),
            Arc::new(Channel::double(&[0.25, 0.5, 0.0])),
        ])
        .unwrap(),
    );
    let written = {
        let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
        let kw_out = readings(&[0.0, 0.125, 0.0]);
        let profile = EnergyProfile::new("m", day, Some(kw_in.clone()), Some(kw_out), true, store.zeroes()).unwrap();
        let mut writer = store.writer();
        assert!(writer.write(&profile, true, &mut fail));
        assert!(writer.commit(&mut fail));
        profile
    };

    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let mut reader = store.reader();
    let read = reader.get("m", day, &mut fail).unwrap();
    assert_eq!(read, written);
    assert!(read.kw_in().get(1).unwrap().is_nan());
    assert_eq!(read.kw_in().get(0).unwrap(), 0.75);

    let stat = reader.maximums().get("m", day, &mut fail).unwrap();
    assert_eq!(stat, EnergyProfileStat::max_of(&written).unwrap());
}

#[test]
fn test_uncommitted_writes_rolled_back() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let day = date(2020, 5, 5);
    let profile = EnergyProfile::new("m", day, Some(readings(&[1.0])), None, false, store.zeroes()).unwrap();

    let mut writer = store.writer();
    assert!(writer.write(&profile, false, &mut fail));
    assert!(writer.rollback(&mut fail));

    let mut reader = store.reader();
    assert!(reader.date_range("m").unwrap().is_none());
    assert!(reader.get("m", day, &mut fail).is_none());
}

#[test]
fn test_failed_item_does_not_stop_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let day = date(2021, 3, 14);
    let good = EnergyProfile::new("good", day, Some(readings(&[1.0, 2.0])), None, false, store.zeroes()).unwrap();
    let bad = EnergyProfile::new("bad", day, Some(readings(&[1.0, f64::INFINITY])), None, false, store.zeroes()).unwrap();

    let mut errors = Vec::new();
    let mut writer = store.writer();
    assert!(!writer.write(&bad, true, &mut |err| errors.push(err)));
    assert!(writer.write(&good, true, &mut |err| errors.push(err)));
    assert!(writer.commit(&mut |err| errors.push(err)));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, "bad");
    assert_eq!(errors[0].date, Some(day));

    let mut reader = store.reader();
    let mut read = Vec::new();
    reader.for_all(day, &mut |id, _, _| read.push(id.to_string()), &mut fail);
    assert_eq!(read, vec!["good"]);
}

#[test]
fn test_partial_writers_update_one_attribute() {
    let temp_dir = TempDir::new().unwrap();
    let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
    let day = date(2023, 8, 1);

    let mut writer = store.writer();
    assert!(writer.write_kw_in("m", day, &readings(&[2.0, 4.0]), &mut fail));
    assert!(writer.write_cacheable("m", day, true, &mut fail));
    assert!(writer.commit(&mut fail));

    let mut reader = store.reader();
    let profile = reader.get("m", day, &mut fail).unwrap();
    assert!(profile.cacheable());
    assert!(profile.kw_out().is_missing());
    assert_eq!(reader.kw_in().get("m", day, &mut fail).unwrap().get(1).unwrap(), 4.0);

    assert!(writer.write_kw_out("m", day, &readings(&[1.0, 1.0]), &mut fail));
    assert!(writer.write_cacheable("m", day, false, &mut fail));
    assert!(writer.commit(&mut fail));

    let profile = reader.get("m", day, &mut fail).unwrap();
    assert!(!profile.cacheable());
    assert_eq!(profile.kw_net().get(0).unwrap(), 1.0);

    let mut cacheable = Vec::new();
    reader.for_all_cacheable(day, &mut |id, _, _| cacheable.push(id.to_string()), &mut fail);
    assert!(cacheable.is_empty());
}

#[test]
fn test_partition_time_zone_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let day = date(2024, 1, 1);
    {
        let store = EnergyProfileStore::open(temp_dir.path(), config()).unwrap();
        let mut writer = store.writer();
        assert!(writer.write_kw_in("m", day, &readings(&[1.0]), &mut fail));
        assert!(writer.commit(&mut fail));
    }

    let store = EnergyProfileStore::open(temp_dir.path(), config().with_time_zone("Australia/Sydney")).unwrap();
    let mut errors = Vec::new();
    let mut reader = store.reader();
    assert!(reader.get("m", day, &mut |err| errors.push(err)).is_none());
    assert_eq!(errors.len(), 1);
    assert!(errors[0].cause.as_ref().unwrap().to_string().contains("timezone"));
}

#[test]
fn test_readers_on_threads_share_zero_cache() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(EnergyProfileStore::open(temp_dir.path(), config()).unwrap());
    let day = date(2019, 10, 10);
    {
        let mut writer = store.writer();
        for i in 0..8 {
            let kw_out = store.zeroes().zeroed_readings(1, 48);
            let kw_in = readings(&vec![f64::from(i); 48]);
            let profile = EnergyProfile::new(format!("m{i}"), day, Some(kw_in), Some(kw_out), false, store.zeroes()).unwrap();
            assert!(writer.write(&profile, false, &mut fail));
        }
        assert!(writer.commit(&mut fail));
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut reader = store.reader();
                let mut zero_outs = Vec::new();
                reader.for_all(day, &mut |_, _, profile| zero_outs.push(profile.kw_out().clone()), &mut fail);
                zero_outs
            })
        })
        .collect();

    let shared = store.zeroes().zeroed_readings(1, 48);
    for handle in handles {
        let zero_outs = handle.join().unwrap();
        assert_eq!(zero_outs.len(), 8);
        assert!(zero_outs.iter().all(|readings| Arc::ptr_eq(readings, &shared)));
    }
}
