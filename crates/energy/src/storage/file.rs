//! File-backed blob store.
//!
//! The whole store is kept in memory and written out as one snapshot file on
//! every commit. Snapshots are replaced atomically (temp file, sync, rename),
//! so a crash leaves either the previous or the new commit on disk.
//!
//! ## File Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header                                                      │
//! │  - Magic: "AEBS" (4 bytes)                                   │
//! │  - Version: u16 (2 bytes) = 1                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Metadata                                                    │
//! │  - Entry count: u32, then (key, value) strings               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Records                                                     │
//! │  - Id count: u32                                             │
//! │  - Per id: id string, tag count u32, (tag, payload) pairs    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CRC32 of everything above: u32                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Strings and payloads are u32 length-prefixed. All integers are
//! little-endian.

use super::{BlobHandler, BlobStore};
use crate::error::{EnergyError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Magic bytes for blob store files: "AEBS".
pub const BLOB_MAGIC: [u8; 4] = *b"AEBS";

/// Current blob store file format version.
pub const BLOB_VERSION: u16 = 1;

static PERSIST_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sync mode for commit durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync the snapshot before renaming it into place (default).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for [`FileBlobStore`].
#[derive(Debug, Clone, Default)]
pub struct BlobStoreConfig {
    /// Sync mode for durability guarantees.
    pub sync_mode: SyncMode,
}

impl BlobStoreConfig {
    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}

type Records = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

#[derive(Debug, Default)]
struct State {
    records: Records,
    metadata: BTreeMap<String, String>,
    /// Staged changes; `None` marks a delete.
    pending: BTreeMap<(String, String), Option<Vec<u8>>>,
    pending_metadata: BTreeMap<String, String>,
}

impl State {
    fn visible(&self, id: &str, tag: &str) -> Option<&[u8]> {
        if !self.pending.is_empty() {
            if let Some(staged) = self.pending.get(&(id.to_string(), tag.to_string())) {
                return staged.as_deref();
            }
        }
        self.records.get(id)?.get(tag).map(Vec::as_slice)
    }

    /// Committed records with the staged changes applied.
    fn merged(&self) -> BTreeMap<&str, BTreeMap<&str, &[u8]>> {
        let mut merged: BTreeMap<&str, BTreeMap<&str, &[u8]>> = self
            .records
            .iter()
            .map(|(id, tags)| {
                let tags = tags
                    .iter()
                    .map(|(tag, bytes)| (tag.as_str(), bytes.as_slice()))
                    .collect();
                (id.as_str(), tags)
            })
            .collect();
        for ((id, tag), staged) in &self.pending {
            match staged {
                Some(bytes) => {
                    merged
                        .entry(id.as_str())
                        .or_default()
                        .insert(tag.as_str(), bytes.as_slice());
                }
                None => {
                    if let Some(tags) = merged.get_mut(id.as_str()) {
                        tags.remove(tag.as_str());
                        if tags.is_empty() {
                            merged.remove(id.as_str());
                        }
                    }
                }
            }
        }
        merged
    }

    fn visible_ids(&self) -> BTreeSet<&str> {
        self.merged().into_keys().collect()
    }

    fn apply_pending(&mut self) {
        for ((id, tag), staged) in std::mem::take(&mut self.pending) {
            match staged {
                Some(bytes) => {
                    self.records.entry(id).or_default().insert(tag, bytes);
                }
                None => {
                    if let Some(tags) = self.records.get_mut(&id) {
                        tags.remove(&tag);
                        if tags.is_empty() {
                            self.records.remove(&id);
                        }
                    }
                }
            }
        }
        let metadata = std::mem::take(&mut self.pending_metadata);
        self.metadata.extend(metadata);
    }
}

/// A [`BlobStore`] persisted as a single checksummed snapshot file.
///
/// # Examples
/// ```rust,ignore
/// use alopex_energy::storage::{BlobStore, BlobStoreConfig, FileBlobStore};
///
/// let store = FileBlobStore::open("/data/readings.blobs", BlobStoreConfig::default())?;
/// store.write("meter-1", "W_in", &[1, 0, 0, 0, 0, 0xff])?;
/// store.commit()?;
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    path: PathBuf,
    config: BlobStoreConfig,
    state: RwLock<State>,
}

impl FileBlobStore {
    /// Opens the store at `path`, creating an empty snapshot if the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns `EnergyError::InvalidMagic`, `EnergyError::UnsupportedVersion`,
    /// `EnergyError::ChecksumMismatch` or `EnergyError::Corrupt` for damaged
    /// files.
    pub fn open(path: impl AsRef<Path>, config: BlobStoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            path,
            config,
            state: RwLock::new(State::default()),
        };
        match fs::read(&store.path) {
            Ok(bytes) => {
                let (metadata, records) = decode_snapshot(&store.path, &bytes)?;
                let mut state = store.write_state();
                state.metadata = metadata;
                state.records = records;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("Creating blob store {}", store.path.display());
                let bytes = encode_snapshot(&BTreeMap::new(), &BTreeMap::new());
                store.persist(&bytes)?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(store)
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|err| err.into_inner())
    }

    fn stage(&self, id: &str, tag: &str, bytes: Option<&[u8]>, must_exist: bool) -> bool {
        let mut state = self.write_state();
        if state.visible(id, tag).is_some() != must_exist {
            return false;
        }
        state
            .pending
            .insert((id.to_string(), tag.to_string()), bytes.map(<[u8]>::to_vec));
        true
    }

    /// Writes `bytes` to a temp file next to the snapshot and renames it over
    /// the snapshot. Each call gets its own temp file.
    fn persist(&self, bytes: &[u8]) -> Result<()> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            PERSIST_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp_path = self.path.with_file_name(tmp_name);

        let written = Self::write_tmp(&tmp_path, bytes, self.config.sync_mode)
            .and_then(|()| fs::rename(&tmp_path, &self.path).map_err(EnergyError::from));
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    fn write_tmp(tmp_path: &Path, bytes: &[u8], sync_mode: SyncMode) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        match sync_mode {
            SyncMode::Fsync => file.sync_all()?,
            SyncMode::Fdatasync => file.sync_data()?,
            SyncMode::None => {}
        }
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, id: &str, tag: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read_state().visible(id, tag).map(<[u8]>::to_vec))
    }

    fn for_each(&self, ids: &[String], tag: &str, handler: &mut BlobHandler<'_>) -> Result<()> {
        // Handlers run after the lock is released so they may use this store.
        let found: Vec<(String, Vec<u8>)> = {
            let state = self.read_state();
            let mut seen = BTreeSet::new();
            ids.iter()
                .filter(|id| seen.insert(id.as_str()))
                .filter_map(|id| Some((id.clone(), state.visible(id, tag)?.to_vec())))
                .collect()
        };
        for (id, bytes) in &found {
            handler(id, bytes);
        }
        Ok(())
    }

    fn for_all(&self, tag: &str, handler: &mut BlobHandler<'_>) -> Result<()> {
        let found: Vec<(String, Vec<u8>)> = {
            let state = self.read_state();
            state
                .merged()
                .into_iter()
                .filter_map(|(id, tags)| Some((id.to_string(), tags.get(tag)?.to_vec())))
                .collect()
        };
        for (id, bytes) in &found {
            handler(id, bytes);
        }
        Ok(())
    }

    fn ids(&self, handler: &mut dyn FnMut(&str)) -> Result<()> {
        let ids: Vec<String> = {
            let state = self.read_state();
            state.visible_ids().into_iter().map(str::to_string).collect()
        };
        for id in &ids {
            handler(id);
        }
        Ok(())
    }

    fn write(&self, id: &str, tag: &str, bytes: &[u8]) -> Result<bool> {
        Ok(self.stage(id, tag, Some(bytes), false))
    }

    fn update(&self, id: &str, tag: &str, bytes: &[u8]) -> Result<bool> {
        Ok(self.stage(id, tag, Some(bytes), true))
    }

    fn delete(&self, id: &str, tag: &str) -> Result<bool> {
        Ok(self.stage(id, tag, None, true))
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.write_state();
        if state.pending.is_empty() && state.pending_metadata.is_empty() {
            return Ok(());
        }
        let mut metadata = state.metadata.clone();
        metadata.extend(state.pending_metadata.clone());
        let bytes = encode_snapshot(&metadata, &state.merged());
        self.persist(&bytes)?;

        let staged = state.pending.len();
        state.apply_pending();
        debug!(
            "Committed {} staged changes to {} ({} bytes)",
            staged,
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.write_state();
        let staged = state.pending.len();
        state.pending.clear();
        state.pending_metadata.clear();
        debug!(
            "Rolled back {} staged changes to {}",
            staged,
            self.path.display()
        );
        Ok(())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let state = self.read_state();
        Ok(state
            .pending_metadata
            .get(key)
            .or_else(|| state.metadata.get(key))
            .cloned())
    }

    fn write_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.write_state()
            .pending_metadata
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode_snapshot(
    metadata: &BTreeMap<String, String>,
    records: &BTreeMap<&str, BTreeMap<&str, &[u8]>>,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&BLOB_MAGIC);
    out.extend_from_slice(&BLOB_VERSION.to_le_bytes());

    out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
    for (key, value) in metadata {
        put_bytes(&mut out, key.as_bytes());
        put_bytes(&mut out, value.as_bytes());
    }

    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for (id, tags) in records {
        put_bytes(&mut out, id.as_bytes());
        out.extend_from_slice(&(tags.len() as u32).to_le_bytes());
        for (tag, bytes) in tags {
            put_bytes(&mut out, tag.as_bytes());
            put_bytes(&mut out, bytes);
        }
    }

    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Little-endian cursor over a snapshot body.
struct SnapshotReader<'a> {
    bytes: &'a [u8],
}

impl<'a> SnapshotReader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.bytes.len() {
            return None;
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Some(head)
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Option<String> {
        String::from_utf8(self.bytes()?.to_vec()).ok()
    }
}

type Snapshot = (BTreeMap<String, String>, Records);

fn decode_snapshot(path: &Path, bytes: &[u8]) -> Result<Snapshot> {
    let corrupt = |reason: &str| EnergyError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    if bytes.len() < 4 + 2 + 4 {
        return Err(corrupt("file too short"));
    }

    let magic: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != BLOB_MAGIC {
        return Err(EnergyError::InvalidMagic(magic));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version > BLOB_VERSION {
        return Err(EnergyError::UnsupportedVersion(version));
    }

    let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(EnergyError::ChecksumMismatch { expected, actual });
    }

    let mut reader = SnapshotReader { bytes: &body[6..] };
    let truncated = || corrupt("truncated snapshot");

    let mut metadata = BTreeMap::new();
    for _ in 0..reader.u32().ok_or_else(truncated)? {
        let key = reader.string().ok_or_else(truncated)?;
        let value = reader.string().ok_or_else(truncated)?;
        metadata.insert(key, value);
    }

    let mut records = Records::new();
    for _ in 0..reader.u32().ok_or_else(truncated)? {
        let id = reader.string().ok_or_else(truncated)?;
        let mut tags = BTreeMap::new();
        for _ in 0..reader.u32().ok_or_else(truncated)? {
            let tag = reader.string().ok_or_else(truncated)?;
            let payload = reader.bytes().ok_or_else(truncated)?;
            tags.insert(tag, payload.to_vec());
        }
        records.insert(id, tags);
    }
    if !reader.bytes.is_empty() {
        return Err(corrupt("trailing bytes after records"));
    }
    Ok((metadata, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> BlobStoreConfig {
        BlobStoreConfig::default().with_sync_mode(SyncMode::None)
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.blobs");
        let store = FileBlobStore::open(&path, config()).unwrap();
        assert!(path.exists());
        assert_eq!(store.get("x", "t").unwrap(), None);
    }

    #[test]
    fn test_write_update_delete_rules() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open(temp_dir.path().join("a.blobs"), config()).unwrap();

        assert!(!store.update("m", "t", &[1]).unwrap());
        assert!(!store.delete("m", "t").unwrap());
        assert!(store.write("m", "t", &[1]).unwrap());
        assert!(!store.write("m", "t", &[2]).unwrap());
        assert!(store.update("m", "t", &[3]).unwrap());
        assert_eq!(store.get("m", "t").unwrap(), Some(vec![3]));
        assert!(store.delete("m", "t").unwrap());
        assert_eq!(store.get("m", "t").unwrap(), None);
        assert!(store.write("m", "t", &[4]).unwrap());
    }

    #[test]
    fn test_commit_persists_and_rollback_discards() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.blobs");
        {
            let store = FileBlobStore::open(&path, config()).unwrap();
            store.write("m1", "t", &[1, 2]).unwrap();
            store.write_metadata("date", "2024-01-01").unwrap();
            store.commit().unwrap();
            store.write("m2", "t", &[3]).unwrap();
            store.rollback().unwrap();
            assert_eq!(store.get("m2", "t").unwrap(), None);
        }

        let store = FileBlobStore::open(&path, config()).unwrap();
        assert_eq!(store.get("m1", "t").unwrap(), Some(vec![1, 2]));
        assert_eq!(store.get("m2", "t").unwrap(), None);
        assert_eq!(store.get_metadata("date").unwrap().as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn test_streaming_sees_staged_changes() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBlobStore::open(temp_dir.path().join("a.blobs"), config()).unwrap();
        store.write("b", "t", &[2]).unwrap();
        store.write("a", "t", &[1]).unwrap();
        store.write("c", "u", &[3]).unwrap();
        store.commit().unwrap();
        store.delete("b", "t").unwrap();
        store.write("d", "t", &[4]).unwrap();

        let mut all = Vec::new();
        store
            .for_all("t", &mut |id, bytes| all.push((id.to_string(), bytes.to_vec())))
            .unwrap();
        assert_eq!(all, vec![("a".into(), vec![1]), ("d".into(), vec![4])]);

        let mut ids = Vec::new();
        store.ids(&mut |id| ids.push(id.to_string())).unwrap();
        assert_eq!(ids, vec!["a", "c", "d"]);

        let mut some = Vec::new();
        let wanted = vec!["d".to_string(), "b".to_string(), "a".to_string(), "d".to_string()];
        store
            .for_each(&wanted, "t", &mut |id, _| some.push(id.to_string()))
            .unwrap();
        assert_eq!(some, vec!["d", "a"]);
    }

    #[test]
    fn test_concurrent_commits_to_one_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.blobs");
        let stores: Vec<_> = (0..2)
            .map(|_| FileBlobStore::open(&path, config()).unwrap())
            .collect();

        std::thread::scope(|scope| {
            for (n, store) in stores.iter().enumerate() {
                scope.spawn(move || {
                    for round in 0..20u8 {
                        store.write(&format!("m{n}-{round}"), "t", &[round]).unwrap();
                        store.commit().unwrap();
                    }
                });
            }
        });

        let reopened = FileBlobStore::open(&path, config()).unwrap();
        let last_of = |n: usize| reopened.get(&format!("m{n}-19"), "t").unwrap();
        assert!(last_of(0).is_some() || last_of(1).is_some());
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.blobs");
        {
            let store = FileBlobStore::open(&path, config()).unwrap();
            store.write("m", "t", &[9; 32]).unwrap();
            store.commit().unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            FileBlobStore::open(&path, config()),
            Err(EnergyError::ChecksumMismatch { .. })
        ));

        fs::write(&path, b"NOPE\x01\x00\x00\x00\x00\x00").unwrap();
        assert!(matches!(
            FileBlobStore::open(&path, config()),
            Err(EnergyError::InvalidMagic(_))
        ));

        fs::write(&path, b"AE").unwrap();
        assert!(matches!(
            FileBlobStore::open(&path, config()),
            Err(EnergyError::Corrupt { .. })
        ));
    }
}
