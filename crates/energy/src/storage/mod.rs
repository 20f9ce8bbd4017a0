//! Key/value blob persistence.
//!
//! Profiles are stored as small payloads keyed by `(id, tag)` in one
//! [`BlobStore`] per date. [`FileBlobStore`] is the bundled implementation;
//! [`PartitionLayout`] and [`PartitionStores`] map dates to stores on disk.

pub mod file;
pub mod layout;
pub mod stores;

pub use file::{BlobStoreConfig, FileBlobStore, SyncMode};
pub use layout::PartitionLayout;
pub use stores::PartitionStores;

use crate::error::Result;

/// Handler for streamed `(id, payload)` pairs.
pub type BlobHandler<'a> = dyn FnMut(&str, &[u8]) + 'a;

/// A transactional store of byte payloads keyed by id and tag.
///
/// Writes are staged until [`BlobStore::commit`] and dropped by
/// [`BlobStore::rollback`]. Reads see staged writes.
pub trait BlobStore: Send + Sync {
    /// Returns the payload stored under `(id, tag)`.
    fn get(&self, id: &str, tag: &str) -> Result<Option<Vec<u8>>>;

    /// Streams the payloads of `ids` that have `tag`, skipping the rest.
    fn for_each(&self, ids: &[String], tag: &str, handler: &mut BlobHandler<'_>) -> Result<()>;

    /// Streams every payload stored under `tag`.
    fn for_all(&self, tag: &str, handler: &mut BlobHandler<'_>) -> Result<()>;

    /// Streams every id with at least one payload, in ascending order.
    fn ids(&self, handler: &mut dyn FnMut(&str)) -> Result<()>;

    /// Stages a new payload. Returns `false` if `(id, tag)` already exists.
    fn write(&self, id: &str, tag: &str, bytes: &[u8]) -> Result<bool>;

    /// Stages a replacement payload. Returns `false` if `(id, tag)` does not
    /// exist.
    fn update(&self, id: &str, tag: &str, bytes: &[u8]) -> Result<bool>;

    /// Stages a delete. Returns `false` if `(id, tag)` does not exist.
    fn delete(&self, id: &str, tag: &str) -> Result<bool>;

    /// Makes staged changes durable.
    fn commit(&self) -> Result<()>;

    /// Discards staged changes.
    fn rollback(&self) -> Result<()>;

    /// Returns a metadata value.
    fn get_metadata(&self, key: &str) -> Result<Option<String>>;

    /// Stages a metadata value.
    fn write_metadata(&self, key: &str, value: &str) -> Result<()>;
}

/// The stored attributes of an energy profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyProfileAttribute {
    /// kW in readings.
    KwIn,
    /// kW out readings.
    KwOut,
    /// Precomputed maximums.
    Maximums,
    /// Cacheable flag.
    Cacheable,
}

impl EnergyProfileAttribute {
    /// Every attribute.
    pub const ALL: [Self; 4] = [Self::KwIn, Self::KwOut, Self::Maximums, Self::Cacheable];

    /// The blob tag the attribute is stored under.
    pub fn tag(self) -> &'static str {
        match self {
            Self::KwIn => "W_in",
            Self::KwOut => "W_out",
            Self::Maximums => "maximums",
            Self::Cacheable => "cacheable",
        }
    }

    /// Looks an attribute up by tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attribute| attribute.tag() == tag)
    }
}
