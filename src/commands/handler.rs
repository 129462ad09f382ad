//! Command Handler
//!
//! Parses `threadstore` sub-commands and executes them against the store.
//!
//! ## Replies
//!
//! Replies follow the conventions of `redis-cli`:
//!
//! | Command  | Reply                                |
//! |----------|--------------------------------------|
//! | `get`    | the value, or `(nil)`                |
//! | `set`    | `OK`                                 |
//! | `delete` | `OK`                                 |
//! | `exists` | `(integer) 1` or `(integer) 0`       |
//! | `sweep`  | `(integer) <removed>`                |
//! | `stats`  | `name:value` lines                   |

use crate::error::StorageError;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while parsing or executing a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}'")]
    WrongArity(&'static str),

    #[error("invalid value for {option}: {value:?}")]
    InvalidOption { option: &'static str, value: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A parsed sub-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { key: String },
    Set {
        key: String,
        value: String,
        /// Overrides the store's default TTL
        ttl_secs: Option<u64>,
    },
    Delete { key: String },
    Exists { key: String },
    Sweep,
    Stats,
}

impl Command {
    /// Parses a command from its arguments, name first.
    ///
    /// Command names are case-insensitive.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, CommandError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let rest: Vec<&str> = rest.iter().map(|arg| arg.as_ref()).collect();

        match name.as_ref().to_lowercase().as_str() {
            "get" => Ok(Command::Get {
                key: single_key("get", &rest)?,
            }),
            "set" => parse_set(&rest),
            "delete" | "del" => Ok(Command::Delete {
                key: single_key("delete", &rest)?,
            }),
            "exists" => Ok(Command::Exists {
                key: single_key("exists", &rest)?,
            }),
            "sweep" if rest.is_empty() => Ok(Command::Sweep),
            "sweep" => Err(CommandError::WrongArity("sweep")),
            "stats" if rest.is_empty() => Ok(Command::Stats),
            "stats" => Err(CommandError::WrongArity("stats")),
            _ => Err(CommandError::UnknownCommand(name.as_ref().to_string())),
        }
    }
}

fn single_key(name: &'static str, rest: &[&str]) -> Result<String, CommandError> {
    match rest {
        [key] => Ok(key.to_string()),
        _ => Err(CommandError::WrongArity(name)),
    }
}

/// set <key> <value> [--ttl <secs>]
fn parse_set(rest: &[&str]) -> Result<Command, CommandError> {
    let (key, value, options) = match rest {
        [key, value, options @ ..] => (key, value, options),
        _ => return Err(CommandError::WrongArity("set")),
    };

    let ttl_secs = match options {
        [] => None,
        [flag, secs] if flag.eq_ignore_ascii_case("--ttl") => {
            let invalid = || CommandError::InvalidOption {
                option: "--ttl",
                value: secs.to_string(),
            };
            let secs: u64 = secs.parse().map_err(|_| invalid())?;
            if secs == 0 {
                return Err(invalid());
            }
            Some(secs)
        }
        _ => return Err(CommandError::WrongArity("set")),
    };

    Ok(Command::Set {
        key: key.to_string(),
        value: value.to_string(),
        ttl_secs,
    })
}

/// Executes commands against a shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<Storage>,
}

impl CommandHandler {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the rendered reply.
    pub fn execute(&self, command: Command) -> Result<String, CommandError> {
        debug!(command = ?command, "Executing command");

        match command {
            Command::Get { key } => self.cmd_get(&key),
            Command::Set {
                key,
                value,
                ttl_secs,
            } => self.cmd_set(&key, value, ttl_secs),
            Command::Delete { key } => self.cmd_delete(&key),
            Command::Exists { key } => self.cmd_exists(&key),
            Command::Sweep => self.cmd_sweep(),
            Command::Stats => self.cmd_stats(),
        }
    }

    fn cmd_get(&self, key: &str) -> Result<String, CommandError> {
        Ok(self
            .storage
            .get(key)?
            .unwrap_or_else(|| "(nil)".to_string()))
    }

    fn cmd_set(&self, key: &str, value: String, ttl_secs: Option<u64>) -> Result<String, CommandError> {
        match ttl_secs {
            Some(secs) => self
                .storage
                .set_with_ttl(key, value, Duration::from_secs(secs))?,
            None => self.storage.set(key, value)?,
        }
        Ok("OK".to_string())
    }

    fn cmd_delete(&self, key: &str) -> Result<String, CommandError> {
        self.storage.delete(key)?;
        Ok("OK".to_string())
    }

    fn cmd_exists(&self, key: &str) -> Result<String, CommandError> {
        let found = self.storage.exists(key)?;
        Ok(format!("(integer) {}", found as u8))
    }

    fn cmd_sweep(&self) -> Result<String, CommandError> {
        let removed = self.storage.sweep_now()?;
        Ok(format!("(integer) {}", removed))
    }

    fn cmd_stats(&self) -> Result<String, CommandError> {
        let config = self.storage.config();
        let mut out = String::new();

        out.push_str("# Storage\n");
        out.push_str(&format!("backend:{}\n", self.storage.backend_kind()));
        if matches!(self.storage.backend_kind(), crate::config::BackendKind::Durable) {
            out.push_str(&format!("root:{}\n", config.root.display()));
        }
        out.push_str(&format!("ttl_secs:{}\n", config.ttl.as_secs()));
        out.push_str(&format!("sliding_ttl:{}\n", config.sliding_ttl));
        out.push_str(&format!("entries:{}\n", self.storage.len()?));
        out.push_str("\n# Stats\n");
        out.push_str(&self.storage.stats().to_string());

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, StorageConfig};

    fn create_handler() -> CommandHandler {
        let storage = Storage::open_without_sweeper(
            StorageConfig::new().with_backend(BackendKind::Volatile),
        )
        .unwrap();
        CommandHandler::new(Arc::new(storage))
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> String {
        handler.execute(Command::parse(args).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(&["GET", "k"]).unwrap(),
            Command::Get { key: "k".into() }
        );
        assert_eq!(
            Command::parse(&["set", "k", "v", "--ttl", "30"]).unwrap(),
            Command::Set {
                key: "k".into(),
                value: "v".into(),
                ttl_secs: Some(30)
            }
        );
        assert_eq!(
            Command::parse(&["del", "k"]).unwrap(),
            Command::Delete { key: "k".into() }
        );
        assert_eq!(Command::parse(&["sweep"]).unwrap(), Command::Sweep);
        assert_eq!(Command::parse(&["Stats"]).unwrap(), Command::Stats);
    }

    #[test]
    fn test_parse_errors() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            Command::parse(&empty),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            Command::parse(&["flushall"]),
            Err(CommandError::UnknownCommand(name)) if name == "flushall"
        ));
        assert!(matches!(
            Command::parse(&["get"]),
            Err(CommandError::WrongArity("get"))
        ));
        assert!(matches!(
            Command::parse(&["set", "k"]),
            Err(CommandError::WrongArity("set"))
        ));
        assert!(matches!(
            Command::parse(&["set", "k", "v", "--ttl"]),
            Err(CommandError::WrongArity("set"))
        ));
        assert!(matches!(
            Command::parse(&["set", "k", "v", "--ttl", "soon"]),
            Err(CommandError::InvalidOption { option: "--ttl", .. })
        ));
        assert!(matches!(
            Command::parse(&["set", "k", "v", "--ttl", "0"]),
            Err(CommandError::InvalidOption { .. })
        ));
        assert!(matches!(
            Command::parse(&["stats", "extra"]),
            Err(CommandError::WrongArity("stats"))
        ));
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["set", "thread", "{\"turns\":[]}"]), "OK");
        assert_eq!(run(&handler, &["get", "thread"]), "{\"turns\":[]}");
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        assert_eq!(run(&handler, &["get", "missing"]), "(nil)");
    }

    #[test]
    fn test_delete_and_exists() {
        let handler = create_handler();

        run(&handler, &["set", "k", "v"]);
        assert_eq!(run(&handler, &["exists", "k"]), "(integer) 1");

        assert_eq!(run(&handler, &["delete", "k"]), "OK");
        assert_eq!(run(&handler, &["exists", "k"]), "(integer) 0");

        // Deleting again is not an error
        assert_eq!(run(&handler, &["delete", "k"]), "OK");
    }

    #[test]
    fn test_set_with_ttl_and_sweep() {
        let handler = create_handler();

        run(&handler, &["set", "short", "v", "--ttl", "1"]);
        run(&handler, &["set", "long", "v"]);
        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(run(&handler, &["sweep"]), "(integer) 1");
        assert_eq!(run(&handler, &["exists", "long"]), "(integer) 1");
    }

    #[test]
    fn test_stats() {
        let handler = create_handler();
        run(&handler, &["set", "k", "v"]);
        run(&handler, &["get", "k"]);

        let stats = run(&handler, &["stats"]);
        assert!(stats.contains("backend:memory"));
        assert!(stats.contains("entries:1"));
        assert!(stats.contains("get_ops:1"));
        assert!(stats.contains("set_ops:1"));
        assert!(!stats.contains("root:"));
    }
}
