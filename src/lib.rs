//! # threadstore - Persistence for Conversation Threads
//!
//! threadstore keeps conversation-thread state between requests. It is a
//! key/value store where every entry carries its own expiry, reads can slide
//! that expiry forward, and the file-backed store can be shared safely by
//! several worker processes on one machine.
//!
//! ## Features
//!
//! - **Durable**: One JSON record per key, written atomically, survives restarts
//! - **Multi-Process Safe**: Per-key advisory file locks serialize writers
//! - **Sliding TTL**: Active conversations stay alive while they are being read
//! - **Volatile Mode**: A sharded in-memory store with the same contract
//! - **Background Eviction**: A Tokio task reclaims entries nobody reads again
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             threadstore                                 │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ StorageConf │───>│   Storage   │<───│  Command    │                  │
//! │  │  (env)      │    │  (facade)   │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  ┌──────────────────────────────┐    ┌──────────────────────────────┐   │
//! │  │         FileStore            │    │        MemoryStore           │   │
//! │  │  ┌────────┐ ┌────────────┐   │ or │  ┌────────┐ ┌────────┐       │   │
//! │  │  │FileStem│ │LockManager │   │    │  │Shard 0 │ │...N    │       │   │
//! │  │  │ Record │ │ .locks/    │   │    │  │Mutex   │ │shards  │       │   │
//! │  │  └────────┘ └────────────┘   │    │  └────────┘ └────────┘       │   │
//! │  └──────────────────────────────┘    └──────────────────────────────┘   │
//! │                            ▲                                            │
//! │                            │                                            │
//! │          ┌─────────────────┴───────────────────────────────┐            │
//! │          │           ExpirySweeper                         │            │
//! │          │      (Background Tokio Task)                    │            │
//! │          └─────────────────────────────────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use threadstore::{Storage, StorageConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Backend, TTL and directory come from the environment
//!     let storage = Arc::new(Storage::open(StorageConfig::from_env()?)?);
//!
//!     storage.set("thread-42", r#"{"turns":[]}"#.to_string())?;
//!     if let Some(state) = storage.get("thread-42")? {
//!         println!("resumed: {}", state);
//!     }
//!
//!     if let Ok(storage) = Arc::try_unwrap(storage) {
//!         storage.shutdown().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The facade, both backends, locking and the sweeper
//! - [`config`]: Construction-time configuration and environment parsing
//! - [`error`]: Error types
//! - [`commands`]: The command layer behind the diagnostic binary
//!
//! ## Design Highlights
//!
//! ### Locking
//!
//! Every read-modify-write on the durable store happens under an exclusive
//! lock on `<root>/.locks/<stem>.lock`. Locks are bounded by a timeout, so a
//! stuck peer surfaces as [`StorageError::LockTimeout`] instead of a hang.
//! A lock file is unlinked together with its record, so `.locks/` only holds
//! entries for live keys.
//!
//! ### Lazy + Active Expiry
//!
//! Entries expire in two ways:
//! 1. **Lazy**: An access finds the entry expired, removes it and reports absence
//! 2. **Active**: A background task periodically scans for expired entries
//!
//! The sweeper only reclaims space. Correctness never depends on it running.

pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandError, CommandHandler};
pub use config::{BackendKind, StorageConfig};
pub use error::{Result, StorageError};
pub use storage::{Backend, ExpiryConfig, ExpirySweeper, Storage, StorageStats, TtlPolicy};

/// Version of threadstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
