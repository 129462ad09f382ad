//! Durable (file-backed) backend
//!
//! One JSON record per key under the storage root, shared by every process
//! that opens the same directory:
//!
//! ```text
//! <root>/
//! ├── thread_42-5f0c...e91a.json      record
//! ├── thread_43-77ab...03c2.json      record
//! └── .locks/
//!     ├── thread_42-5f0c...e91a.lock  per-key lock
//!     └── thread_43-77ab...03c2.lock
//! ```
//!
//! A lock file lives as long as its record: whoever removes the record
//! (`delete`, lazy expiry, corrupt-file cleanup or the sweep) unlinks the lock
//! file too, as the last step before releasing it.
//!
//! Every read-check-(renew)-write sequence runs under the key's file lock.
//! Writes go to a temp file in the same directory and are renamed over the
//! record, so a reader sees either the old or the new record, never a mix.
//! The existence of the record file is the only existence signal; there is no
//! index.

use crate::error::{Result, StorageError};
use crate::storage::keys::{FileStem, RECORD_EXTENSION};
use crate::storage::lock::{FileLock, LockManager};
use crate::storage::record::Record;
use crate::storage::stats::{Counters, StorageStats};
use crate::storage::TtlPolicy;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Temp files older than this are leftovers from a writer that died
/// mid-write and are removed by the sweeper.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(300);

/// Suffix of in-flight temp files.
const TEMP_SUFFIX: &str = "tmp";

/// File-backed store surviving process restarts.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: LockManager,
    policy: TtlPolicy,
    counters: Counters,
    /// Distinguishes temp files written concurrently by this process
    temp_seq: AtomicU64,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, policy: TtlPolicy, lock_timeout: Duration) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        let locks = LockManager::new(&root, lock_timeout)?;

        info!(
            root = %root.display(),
            ttl_secs = policy.ttl.as_secs(),
            sliding_ttl = policy.sliding,
            "File storage opened"
        );

        Ok(Self {
            root,
            locks,
            policy,
            counters: Counters::default(),
            temp_seq: AtomicU64::new(0),
        })
    }

    /// The directory holding the records.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record file for `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.path_for(&FileStem::from_key(key))
    }

    fn path_for(&self, stem: &FileStem) -> PathBuf {
        self.root.join(stem.record_file_name())
    }

    /// Gets the value for a key, renewing its TTL if sliding TTL is enabled.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Counters::incr(&self.counters.gets);
        let value = self.load(key, self.policy.sliding)?;
        if value.is_some() {
            Counters::incr(&self.counters.hits);
        }
        Ok(value)
    }

    /// Checks whether a live entry exists, without renewing it.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.load(key, false)?.is_some())
    }

    /// Creates or replaces the entry for `key`.
    pub fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(StorageError::InvalidTtl);
        }
        Counters::incr(&self.counters.sets);

        let stem = FileStem::from_key(key);
        let path = self.path_for(&stem);
        let _lock = self.lock(key, &stem)?;

        let record = Record::new(value, Utc::now(), ttl);
        self.write_atomic(&path, &record)?;

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Stored key to file");
        Ok(())
    }

    /// Removes the entry for `key`. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        Counters::incr(&self.counters.deletes);

        let stem = FileStem::from_key(key);
        let path = self.path_for(&stem);
        if !present(&path)? {
            return Ok(());
        }

        let lock = self.lock(key, &stem)?;
        if remove_if_present(&path)? {
            debug!(key = %key, "Deleted key file");
        }
        lock.remove()
    }

    /// Number of record files on disk, including expired ones not yet swept.
    pub fn len(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(FileStem::from_record_file_name)
                    .is_some()
            })
            .count())
    }

    /// Returns true if no record files are present.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Snapshot of this instance's operation counters.
    pub fn stats(&self) -> StorageStats {
        self.counters.snapshot()
    }

    /// Removes expired and corrupt records, plus stale temp files.
    ///
    /// Each record is checked under its own lock, so an entry that a
    /// concurrent `get` is renewing is seen either before the renewal (and
    /// the `get` then finds nothing) or after it (and survives). Per-entry
    /// failures are logged and skipped.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed.
    pub fn sweep_expired(&self) -> Result<u64> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut removed = 0u64;
        let mut skipped = 0u64;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read storage directory entry");
                    skipped += 1;
                    continue;
                }
            };

            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if let Some(stem) = FileStem::from_record_file_name(name) {
                match self.sweep_one(&stem) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(file = %name, error = %e, "Skipping entry during sweep");
                        skipped += 1;
                    }
                }
            } else if name.ends_with(TEMP_SUFFIX) {
                self.remove_stale_temp(&entry.path());
            }
        }

        Counters::incr(&self.counters.sweeps);
        if removed > 0 || skipped > 0 {
            debug!(removed = removed, skipped = skipped, "File sweep finished");
        }
        Ok(removed)
    }

    /// Checks one record under its lock and removes it if expired or corrupt.
    fn sweep_one(&self, stem: &FileStem) -> Result<bool> {
        let path = self.path_for(stem);
        let lock = self.locks.acquire(stem)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            // Deleted between listing and locking
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        let discard = match Record::decode(&bytes) {
            Ok(record) if record.is_expired_at(Utc::now()) => {
                Counters::incr(&self.counters.expired);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Removing corrupt record");
                Counters::incr(&self.counters.corrupt);
                true
            }
        };

        if !discard {
            return Ok(false);
        }
        let removed = remove_if_present(&path)?;
        lock.remove()?;
        Ok(removed)
    }

    /// Shared read path of `get` and `exists`.
    fn load(&self, key: &str, renew: bool) -> Result<Option<String>> {
        let stem = FileStem::from_key(key);
        let path = self.path_for(&stem);
        if !present(&path)? {
            return Ok(None);
        }

        let lock = self.lock(key, &stem)?;
        let now = Utc::now();

        let mut record = match self.read_record(key, &path)? {
            Some(record) => record,
            None => {
                self.discard(key, &path, lock);
                return Ok(None);
            }
        };

        if record.is_expired_at(now) {
            Counters::incr(&self.counters.expired);
            self.discard(key, &path, lock);
            debug!(key = %key, "Key expired and file removed");
            return Ok(None);
        }

        if renew {
            record.renew(now, self.policy.ttl);
            self.write_atomic(&path, &record)?;
            Counters::incr(&self.counters.renewals);
            debug!(
                key = %key,
                ttl_secs = self.policy.ttl.as_secs(),
                "Retrieved key from file and extended TTL"
            );
        } else {
            debug!(key = %key, "Retrieved key from file");
        }

        Ok(Some(record.value))
    }

    /// Reads and decodes a record. Corrupt and missing files both read as
    /// absent. Must be called with the key's lock held.
    fn read_record(&self, key: &str, path: &Path) -> Result<Option<Record>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        match Record::decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read key, removing corrupt file");
                Counters::incr(&self.counters.corrupt);
                Ok(None)
            }
        }
    }

    /// Takes the key's lock, relabelling a timeout with the caller's key.
    fn lock(&self, key: &str, stem: &FileStem) -> Result<FileLock> {
        self.locks.acquire(stem).map_err(|e| match e {
            StorageError::LockTimeout { waited, .. } => StorageError::LockTimeout {
                key: key.to_string(),
                waited,
            },
            other => other,
        })
    }

    /// Removes a record that is already logically absent, together with its
    /// lock file. Failure only delays reclamation, so it is logged rather
    /// than returned.
    fn discard(&self, key: &str, path: &Path, lock: FileLock) {
        let removed = remove_if_present(path).and_then(|_| lock.remove());
        if let Err(e) = removed {
            warn!(key = %key, error = %e, "Failed to remove stale record");
        }
    }

    /// Writes `record` to `path` via temp file + rename.
    /// Must be called with the key's lock held.
    fn write_atomic(&self, path: &Path, record: &Record) -> Result<()> {
        let bytes = record.encode()?;
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!(
            "{}.{}.{}.{}",
            RECORD_EXTENSION,
            std::process::id(),
            seq,
            TEMP_SUFFIX
        ));

        let written = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io(path, e));
        }

        Ok(())
    }

    fn remove_stale_temp(&self, path: &Path) {
        let age = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());

        if age.is_some_and(|age| age >= STALE_TEMP_AGE) {
            match fs::remove_file(path) {
                Ok(()) => debug!(file = %path.display(), "Removed stale temp file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove stale temp file"),
            }
        }
    }
}

/// Whether `path` exists. Only `NotFound` means absent; any other failure
/// is the medium's and is returned.
fn present(path: &Path) -> Result<bool> {
    path.try_exists().map_err(|e| StorageError::io(path, e))
}

/// Removes `path`, returning whether it existed.
fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
