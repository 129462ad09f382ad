//! Cross-process Lock Manager
//!
//! Every key gets its own lock file under `<root>/.locks/`. Holding an
//! exclusive OS lock on that file is what linearizes operations on the key,
//! both between threads of one process and between independent processes
//! sharing the same root.
//!
//! ## Why a separate lock file?
//!
//! Record files are replaced by `rename`, which swaps the inode under the
//! path. A lock taken on the old inode would not be seen by a process that
//! opens the new one, so the lock lives on a file that is never replaced.
//!
//! ## Reclaiming lock files
//!
//! A holder may unlink its lock file once the record is gone
//! ([`FileLock::remove`]). Anyone who was already waiting on the unlinked
//! inode notices after locking it that the path no longer names that file,
//! drops it and starts over on the path's current file. A lock therefore only
//! counts once it is held on the file the path currently names.
//!
//! ## Acquisition
//!
//! ```text
//! open ──> try_lock ──ok──> same file as path? ──yes──> FileLock (released on drop)
//!  ▲          │                     │
//!  │     would block                no
//!  │          │                     │
//!  └──────────┼─────────────────────┘
//!             ▼
//! sleep(backoff), backoff = min(backoff * 2, 50ms)
//!             │
//!             └── elapsed >= timeout ──> StorageError::LockTimeout
//! ```

use crate::error::{Result, StorageError};
use crate::storage::keys::FileStem;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Default lock acquisition timeout (5 seconds)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the lock directory inside the storage root.
pub const LOCK_DIR_NAME: &str = ".locks";

/// First sleep between acquisition attempts.
const INITIAL_BACKOFF: Duration = Duration::from_millis(1);

/// Upper bound for the sleep between acquisition attempts.
const MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Hands out per-key exclusive file locks.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
    timeout: Duration,
}

/// An exclusive lock on one key.
///
/// The lock is released when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl LockManager {
    /// Creates a lock manager storing its lock files under `root/.locks`.
    ///
    /// The directory is created if it does not exist.
    pub fn new(root: &Path, timeout: Duration) -> Result<Self> {
        let dir = root.join(LOCK_DIR_NAME);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(Self { dir, timeout })
    }

    /// Path of the lock file guarding `stem`.
    pub fn lock_path(&self, stem: &FileStem) -> PathBuf {
        self.dir.join(stem.lock_file_name())
    }

    /// Get the acquisition timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquires the exclusive lock for `stem`, waiting at most the configured
    /// timeout.
    pub fn acquire(&self, stem: &FileStem) -> Result<FileLock> {
        self.acquire_with_timeout(stem, self.timeout)
    }

    /// Acquires the exclusive lock for `stem` with a custom timeout.
    pub fn acquire_with_timeout(&self, stem: &FileStem, timeout: Duration) -> Result<FileLock> {
        let path = self.lock_path(stem);
        let mut file = open_lock_file(&path)?;

        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match file.try_lock() {
                Ok(()) => {
                    if is_current(&file, &path).map_err(|e| StorageError::io(&path, e))? {
                        trace!(
                            stem = %stem,
                            waited_us = start.elapsed().as_micros() as u64,
                            "Lock acquired"
                        );
                        return Ok(FileLock { file, path });
                    }
                    // The previous holder unlinked this file; start over on
                    // whatever the path names now.
                    file = open_lock_file(&path)?;
                    continue;
                }
                Err(TryLockError::WouldBlock) => {}
                Err(TryLockError::Error(e)) => return Err(StorageError::io(&path, e)),
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(StorageError::LockTimeout {
                    key: stem.to_string(),
                    waited,
                });
            }

            std::thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StorageError::io(path, e))
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Lock files are never unlinked off Unix, so the held file is always current.
#[cfg(not(unix))]
fn is_current(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

impl FileLock {
    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlinks the lock file, then releases the lock.
    ///
    /// Call only once the guarded record is gone; the next acquirer creates a
    /// fresh lock file. Off Unix the file is kept and only the lock released.
    pub fn remove(self) -> Result<()> {
        unlink_lock_file(&self.path).map_err(|e| StorageError::io(&self.path, e))
    }
}

#[cfg(unix)]
fn unlink_lock_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn unlink_lock_file(_path: &Path) -> io::Result<()> {
    Ok(())
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the descriptor would release it too.
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}
