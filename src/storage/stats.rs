//! Operation counters shared by both backends.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub gets: AtomicU64,
    pub hits: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub renewals: AtomicU64,
    pub expired: AtomicU64,
    pub corrupt: AtomicU64,
    pub sweeps: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StorageStats {
        StorageStats {
            get_ops: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            set_ops: self.sets.load(Ordering::Relaxed),
            del_ops: self.deletes.load(Ordering::Relaxed),
            renewals: self.renewals.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}

/// Storage statistics since the store was opened (this process only).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Total GET operations
    pub get_ops: u64,
    /// GETs that returned a value
    pub hits: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Sliding TTL renewals performed by GET
    pub renewals: u64,
    /// Expired entries removed, lazily or by the sweeper
    pub expired: u64,
    /// Corrupt records discarded
    pub corrupt: u64,
    /// Completed sweep passes
    pub sweeps: u64,
}

impl fmt::Display for StorageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "get_ops:{}", self.get_ops)?;
        writeln!(f, "hits:{}", self.hits)?;
        writeln!(f, "set_ops:{}", self.set_ops)?;
        writeln!(f, "del_ops:{}", self.del_ops)?;
        writeln!(f, "renewals:{}", self.renewals)?;
        writeln!(f, "expired:{}", self.expired)?;
        writeln!(f, "corrupt:{}", self.corrupt)?;
        write!(f, "sweeps:{}", self.sweeps)
    }
}
