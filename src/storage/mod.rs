//! Storage Module
//!
//! This module provides the conversation thread store: a key/value store with
//! per-entry TTL that survives restarts and can be shared by several
//! processes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Storage                              │
//! │                                                             │
//! │          ┌─────────────── Backend ───────────────┐          │
//! │          │                                       │          │
//! │   ┌──────┴──────┐                         ┌──────┴──────┐   │
//! │   │  FileStore  │                         │ MemoryStore │   │
//! │   │  keys       │                         │  64 shards  │   │
//! │   │  record     │                         │  Mutex      │   │
//! │   │  lock       │                         └─────────────┘   │
//! │   └─────────────┘                                           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use threadstore::{BackendKind, Storage, StorageConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> threadstore::Result<()> {
//! let config = StorageConfig::new()
//!     .with_backend(BackendKind::Durable)
//!     .with_root("/tmp/threads")
//!     .with_ttl(Duration::from_secs(3 * 3600));
//!
//! let storage = Storage::open(config)?;
//! storage.set("thread-42", r#"{"turns":[]}"#.to_string())?;
//! assert!(storage.get("thread-42")?.is_some());
//!
//! storage.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod durable;
pub mod expiry;
pub mod keys;
pub mod lock;
pub mod record;
pub mod stats;
pub mod volatile;

pub use durable::FileStore;
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use keys::FileStem;
pub use lock::{FileLock, LockManager};
pub use record::{CodecError, Record};
pub use stats::StorageStats;
pub use volatile::MemoryStore;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How entries age: the store-wide base TTL and whether reads renew it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub ttl: Duration,
    pub sliding: bool,
}

/// The backend chosen at construction.
#[derive(Debug)]
pub enum Backend {
    Durable(FileStore),
    Volatile(MemoryStore),
}

impl Backend {
    /// Builds the backend described by `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let policy = TtlPolicy {
            ttl: config.ttl,
            sliding: config.sliding_ttl,
        };

        Ok(match config.backend {
            BackendKind::Durable => {
                Backend::Durable(FileStore::open(&config.root, policy, config.lock_timeout)?)
            }
            BackendKind::Volatile => Backend::Volatile(MemoryStore::new(policy)),
        })
    }

    /// Which backend this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Durable(_) => BackendKind::Durable,
            Backend::Volatile(_) => BackendKind::Volatile,
        }
    }

    /// Reads `key`, renewing it when the TTL policy slides.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Backend::Durable(store) => store.get(key),
            Backend::Volatile(store) => Ok(store.get(key)),
        }
    }

    /// Writes `key` with an explicit TTL.
    pub fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        match self {
            Backend::Durable(store) => store.set(key, value, ttl),
            Backend::Volatile(store) => store.set(key, value, ttl),
        }
    }

    /// Removes `key`. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        match self {
            Backend::Durable(store) => store.delete(key),
            Backend::Volatile(store) => {
                store.delete(key);
                Ok(())
            }
        }
    }

    /// Whether a live entry exists, without renewing it.
    pub fn exists(&self, key: &str) -> Result<bool> {
        match self {
            Backend::Durable(store) => store.exists(key),
            Backend::Volatile(store) => Ok(store.exists(key)),
        }
    }

    /// Number of physically present entries.
    pub fn len(&self) -> Result<usize> {
        match self {
            Backend::Durable(store) => store.len(),
            Backend::Volatile(store) => Ok(store.len()),
        }
    }

    /// Returns true if no entries are present.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Operation counters for this process.
    pub fn stats(&self) -> StorageStats {
        match self {
            Backend::Durable(store) => store.stats(),
            Backend::Volatile(store) => store.stats(),
        }
    }

    /// Removes entries whose expiry has passed. Returns how many were removed.
    pub fn sweep_expired(&self) -> Result<u64> {
        match self {
            Backend::Durable(store) => store.sweep_expired(),
            Backend::Volatile(store) => Ok(store.sweep_expired()),
        }
    }
}

/// The storage facade.
///
/// Construct one at startup and share it (`Arc<Storage>`) with every
/// consumer. All operations are synchronous; from async code, call them via
/// `tokio::task::spawn_blocking` when using the durable backend.
///
/// # Example
///
/// ```
/// use threadstore::{BackendKind, Storage, StorageConfig};
///
/// let storage = Storage::open_without_sweeper(
///     StorageConfig::new().with_backend(BackendKind::Volatile),
/// )
/// .unwrap();
///
/// storage.set("thread-1", "state".to_string()).unwrap();
/// assert_eq!(storage.get("thread-1").unwrap(), Some("state".to_string()));
///
/// storage.delete("thread-1").unwrap();
/// assert!(!storage.exists("thread-1").unwrap());
/// ```
#[derive(Debug)]
pub struct Storage {
    backend: Arc<Backend>,
    config: StorageConfig,
    sweeper: Option<ExpirySweeper>,
}

impl Storage {
    /// Opens the configured backend and starts the expiry sweeper.
    ///
    /// Must be called from within a Tokio runtime, which hosts the sweeper.
    pub fn open(config: StorageConfig) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(StorageError::Config(
                "the expiry sweeper needs a Tokio runtime; use open_without_sweeper outside one"
                    .into(),
            ));
        }

        let mut storage = Self::open_without_sweeper(config)?;
        storage.sweeper = Some(ExpirySweeper::start(
            Arc::clone(&storage.backend),
            ExpiryConfig {
                interval: storage.config.sweep_interval,
            },
        ));
        Ok(storage)
    }

    /// Opens the configured backend without a background sweeper.
    ///
    /// Expired entries are still never returned; they are only reclaimed
    /// lazily or by [`Storage::sweep_now`]. Suited to one-shot tools.
    pub fn open_without_sweeper(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(Backend::from_config(&config)?);

        info!(
            backend = %config.backend,
            ttl_secs = config.ttl.as_secs(),
            sliding_ttl = config.sliding_ttl,
            "Initialized conversation storage"
        );

        Ok(Self {
            backend,
            config,
            sweeper: None,
        })
    }

    /// Returns the value for `key` if a live entry exists.
    ///
    /// With sliding TTL enabled this also renews the entry, atomically with
    /// the expiry check.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(key)
    }

    /// Creates or replaces the entry for `key` with the default TTL.
    pub fn set(&self, key: &str, value: String) -> Result<()> {
        self.backend.set(key, value, self.config.ttl)
    }

    /// Creates or replaces the entry for `key` with an explicit TTL.
    pub fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.backend.set(key, value, ttl)
    }

    /// Redis-compatible spelling of [`Storage::set_with_ttl`].
    pub fn setex(&self, key: &str, ttl_seconds: u64, value: String) -> Result<()> {
        self.set_with_ttl(key, value, Duration::from_secs(ttl_seconds))
    }

    /// Removes the entry for `key`. Absent keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.backend.delete(key)
    }

    /// Returns whether a live entry exists, without renewing it.
    pub fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key)
    }

    /// Number of physically present entries, including expired ones that
    /// have not been reclaimed yet.
    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    /// Returns true if no entries are present.
    pub fn is_empty(&self) -> Result<bool> {
        self.backend.is_empty()
    }

    /// Runs one eviction pass on the calling thread.
    pub fn sweep_now(&self) -> Result<u64> {
        self.backend.sweep_expired()
    }

    /// Returns operation counters for this process.
    pub fn stats(&self) -> StorageStats {
        self.backend.stats()
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Which backend serves this store.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Returns true while the background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|s| !s.is_finished())
    }

    /// Stops the sweeper and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
        info!("Conversation storage shut down");
    }
}
