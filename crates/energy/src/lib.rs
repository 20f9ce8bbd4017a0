//! Alopex Energy - per-meter interval energy profile storage
//!
//! This crate stores daily kW in / kW out interval readings per meter in
//! date partitions, with a per-meter date-range index that tells readers which
//! `(meter, date)` pairs exist.
//!
//! # Components
//!
//! - [`model`]: channels, readings, profiles, statistics and the shared zero cache
//! - [`codec`]: compact binary formats for readings, stats, flags and date ranges
//! - [`storage`]: the [`BlobStore`](storage::BlobStore) contract and its file-backed implementation
//! - [`index`]: the date-range index, its cache and the reindexer
//! - [`store`]: [`EnergyProfileStore`] with its readers and writers
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_energy::model::{Channel, EnergyProfile, Readings};
//! use alopex_energy::store::{EnergyProfileStore, StoreConfig};
//! use std::sync::Arc;
//!
//! let store = EnergyProfileStore::open("/var/lib/energy", StoreConfig::default())?;
//!
//! let kw_in = Arc::new(Readings::one(Channel::double(&[0.5, 0.75, 1.25])));
//! let profile = EnergyProfile::new("meter-1", date, Some(kw_in), None, true, store.zeroes())?;
//!
//! let mut writer = store.writer();
//! writer.write(&profile, true, &mut |err| eprintln!("{err}"));
//! writer.commit(&mut |err| eprintln!("{err}"));
//!
//! let mut reader = store.reader();
//! let maximums = reader.maximums().get("meter-1", date, &mut |err| eprintln!("{err}"));
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod index;
pub mod model;
pub mod storage;
pub mod store;

pub use error::{EnergyError, Result};
pub use index::{CachedDateRangeIndex, DateRangeIndex, Reindexer};
pub use model::{Channel, EnergyProfile, EnergyProfileStat, IdDateRange, Readings, Samples};
pub use storage::{BlobStore, SyncMode};
pub use store::{EnergyProfileReader, EnergyProfileStore, EnergyProfileWriter, ItemError, StoreConfig};
