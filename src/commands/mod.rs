//! Command Module
//!
//! This module implements the command layer behind the `threadstore`
//! diagnostic binary. It turns command-line arguments into a [`Command`],
//! executes it against a [`Storage`](crate::storage::Storage) and renders the
//! reply as text.
//!
//! ## Architecture
//!
//! ```text
//! argv
//!   │
//!   ▼
//! ┌─────────────────┐
//! │ Command::parse  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Execute      │
//! │  - Render       │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Storage      │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get <key>`, `set <key> <value> [--ttl <secs>]`
//! - `delete <key>`, `exists <key>`
//! - `sweep`, `stats`

pub mod handler;

pub use handler::{Command, CommandError, CommandHandler};
