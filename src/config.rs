//! Storage configuration
//!
//! Configuration is fixed when the store is opened. It is usually read from
//! the environment:
//!
//! | Variable | Default | Effect |
//! |---|---|---|
//! | `STORAGE_BACKEND` | `file` | `file`/`durable` or `memory`/`volatile` |
//! | `STORAGE_DIR` | `~/.threadstore/threads` | durable root directory |
//! | `CONVERSATION_TIMEOUT_HOURS` | `3` | base TTL |
//! | `CONVERSATION_SLIDING_TTL` | `true` | renew the TTL on every read |
//! | `STORAGE_SWEEP_INTERVAL_SECS` | derived from the TTL | sweeper period |
//! | `STORAGE_LOCK_TIMEOUT_MS` | `5000` | per-key lock budget |

use crate::error::{Result, StorageError};
use crate::storage::lock::DEFAULT_LOCK_TIMEOUT;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const ENV_BACKEND: &str = "STORAGE_BACKEND";
pub const ENV_STORAGE_DIR: &str = "STORAGE_DIR";
pub const ENV_TIMEOUT_HOURS: &str = "CONVERSATION_TIMEOUT_HOURS";
pub const ENV_SLIDING_TTL: &str = "CONVERSATION_SLIDING_TTL";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "STORAGE_SWEEP_INTERVAL_SECS";
pub const ENV_LOCK_TIMEOUT_MS: &str = "STORAGE_LOCK_TIMEOUT_MS";

/// Default conversation lifetime in hours.
pub const DEFAULT_TIMEOUT_HOURS: u64 = 3;

/// Which backend the facade runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// One file per key; survives restarts and is shared across processes
    #[default]
    Durable,
    /// Process-local memory; lost on exit
    Volatile,
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "durable" => Ok(BackendKind::Durable),
            "memory" | "volatile" => Ok(BackendKind::Volatile),
            other => Err(StorageError::Config(format!("unknown backend {:?}", other))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Durable => write!(f, "file"),
            BackendKind::Volatile => write!(f, "memory"),
        }
    }
}

/// Everything the store needs at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Base lifetime of new and renewed entries
    pub ttl: Duration,
    /// Renew `expires_at` on every successful read
    pub sliding_ttl: bool,
    /// Sweeper period
    pub sweep_interval: Duration,
    /// Durable backend root directory
    pub root: PathBuf,
    /// Maximum wait for a per-key lock
    pub lock_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let backend = BackendKind::default();
        let ttl = Duration::from_secs(DEFAULT_TIMEOUT_HOURS * 3600);
        Self {
            backend,
            ttl,
            sliding_ttl: true,
            sweep_interval: default_sweep_interval(backend, ttl),
            root: default_root(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// An unknown backend name falls back to the durable backend with a
    /// warning; unparseable numbers are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup(ENV_BACKEND) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(backend = %raw, "Unknown {}, defaulting to file storage", ENV_BACKEND);
                BackendKind::Durable
            }),
            None => BackendKind::default(),
        };

        let hours = parse_number(&lookup, ENV_TIMEOUT_HOURS)?.unwrap_or(DEFAULT_TIMEOUT_HOURS);
        if hours == 0 {
            return Err(StorageError::Config(format!(
                "{} must be at least 1",
                ENV_TIMEOUT_HOURS
            )));
        }
        let ttl = Duration::from_secs(hours.saturating_mul(3600));

        let sliding_ttl = match lookup(ENV_SLIDING_TTL) {
            Some(raw) => parse_flag(ENV_SLIDING_TTL, &raw)?,
            None => true,
        };

        let sweep_interval = match parse_number(&lookup, ENV_SWEEP_INTERVAL_SECS)? {
            Some(0) => {
                return Err(StorageError::Config(format!(
                    "{} must be at least 1",
                    ENV_SWEEP_INTERVAL_SECS
                )))
            }
            Some(secs) => Duration::from_secs(secs),
            None => default_sweep_interval(backend, ttl),
        };

        let lock_timeout = parse_number(&lookup, ENV_LOCK_TIMEOUT_MS)?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT);

        let root = lookup(ENV_STORAGE_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_root);

        Ok(Self {
            backend,
            ttl,
            sliding_ttl,
            sweep_interval,
            root,
            lock_timeout,
        })
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_sliding_ttl(mut self, enabled: bool) -> Self {
        self.sliding_ttl = enabled;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Checks the invariants the backends rely on.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(StorageError::Config("ttl must be greater than zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(StorageError::Config(
                "sweep interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// The file backend sweeps every 1/60th of the TTL (at least every minute);
/// the memory backend every 1/10th (at least every five minutes).
pub fn default_sweep_interval(backend: BackendKind, ttl: Duration) -> Duration {
    let secs = ttl.as_secs();
    match backend {
        BackendKind::Durable => Duration::from_secs((secs / 60).max(60)),
        BackendKind::Volatile => Duration::from_secs((secs / 10).max(300)),
    }
}

/// `~/.threadstore/threads`, or a relative directory if there is no home.
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".threadstore")
        .join("threads")
}

fn parse_number<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("{} is not a number: {:?}", name, raw))),
        None => Ok(None),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StorageError::Config(format!(
            "{} is not a boolean: {:?}",
            name, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StorageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.backend, BackendKind::Durable);
        assert_eq!(config.ttl, Duration::from_secs(3 * 3600));
        assert!(config.sliding_ttl);
        assert_eq!(config.sweep_interval, Duration::from_secs(180));
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert!(config.root.ends_with(".threadstore/threads"));
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn test_all_variables() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            (ENV_BACKEND, "memory"),
            (ENV_STORAGE_DIR, "/var/lib/threads"),
            (ENV_TIMEOUT_HOURS, "6"),
            (ENV_SLIDING_TTL, "false"),
            (ENV_SWEEP_INTERVAL_SECS, "30"),
            (ENV_LOCK_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Volatile);
        assert_eq!(config.root, PathBuf::from("/var/lib/threads"));
        assert_eq!(config.ttl, Duration::from_secs(6 * 3600));
        assert!(!config.sliding_ttl);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_backend_falls_back_to_file() {
        let config = StorageConfig::from_lookup(lookup_from(&[(ENV_BACKEND, "redis")])).unwrap();
        assert_eq!(config.backend, BackendKind::Durable);
    }

    #[test]
    fn test_backend_aliases() {
        assert_eq!("FILE".parse::<BackendKind>().unwrap(), BackendKind::Durable);
        assert_eq!("durable".parse::<BackendKind>().unwrap(), BackendKind::Durable);
        assert_eq!(" Memory ".parse::<BackendKind>().unwrap(), BackendKind::Volatile);
        assert_eq!("volatile".parse::<BackendKind>().unwrap(), BackendKind::Volatile);
        assert!("sqlite".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(StorageConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_HOURS, "three")])).is_err());
        assert!(StorageConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_HOURS, "0")])).is_err());
        assert!(
            StorageConfig::from_lookup(lookup_from(&[(ENV_SWEEP_INTERVAL_SECS, "0")])).is_err()
        );
        assert!(StorageConfig::from_lookup(lookup_from(&[(ENV_SLIDING_TTL, "maybe")])).is_err());
    }

    #[test]
    fn test_default_sweep_interval() {
        let three_hours = Duration::from_secs(3 * 3600);
        assert_eq!(
            default_sweep_interval(BackendKind::Durable, three_hours),
            Duration::from_secs(180)
        );
        assert_eq!(
            default_sweep_interval(BackendKind::Volatile, three_hours),
            Duration::from_secs(1080)
        );
        // Floors for short TTLs
        assert_eq!(
            default_sweep_interval(BackendKind::Durable, Duration::from_secs(10)),
            Duration::from_secs(60)
        );
        assert_eq!(
            default_sweep_interval(BackendKind::Volatile, Duration::from_secs(10)),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_validate() {
        assert!(StorageConfig::default().validate().is_ok());
        assert!(StorageConfig::default()
            .with_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(StorageConfig::default()
            .with_sweep_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
