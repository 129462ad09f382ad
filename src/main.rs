//! threadstore - Conversation Thread Store
//!
//! This is the entry point for the `threadstore` diagnostic tool. It opens the
//! store described by the environment, runs one command and prints the reply.

use std::sync::Arc;
use threadstore::{Command, CommandHandler, Storage, StorageConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// What the process was asked to do
enum Invocation {
    Help,
    Version,
    Run(Command),
}

impl Invocation {
    /// Parse the invocation from command-line arguments
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();

        match args.first().map(String::as_str) {
            None | Some("--help") | Some("-h") | Some("help") => Invocation::Help,
            Some("--version") | Some("-v") => Invocation::Version,
            Some(_) => match Command::parse(args.as_slice()) {
                Ok(command) => Invocation::Run(command),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    print_help();
                    std::process::exit(2);
                }
            },
        }
    }
}

fn print_help() {
    println!(
        r#"
threadstore - Conversation Thread Store

USAGE:
    threadstore <COMMAND> [ARGS]

COMMANDS:
    get <key>                          Print the value (renews it with sliding TTL)
    set <key> <value> [--ttl <secs>]   Store a value
    delete <key>                       Remove a key
    exists <key>                       Check for a live entry
    sweep                              Remove expired entries now
    stats                              Print store configuration and counters

OPTIONS:
    -v, --version        Print version information
    -h, --help           Print this help message

ENVIRONMENT:
    STORAGE_BACKEND              file | memory (default: file)
    STORAGE_DIR                  Record directory (default: ~/.threadstore/threads)
    CONVERSATION_TIMEOUT_HOURS   Entry lifetime in hours (default: 3)
    CONVERSATION_SLIDING_TTL     Renew entries on read (default: true)
    STORAGE_SWEEP_INTERVAL_SECS  Sweeper period (default: derived from the TTL)
    STORAGE_LOCK_TIMEOUT_MS      Per-key lock budget (default: 5000)
    RUST_LOG                     Log filter (default: info)

EXAMPLES:
    threadstore set thread-42 '{{"turns":[]}}' --ttl 600
    threadstore get thread-42
    STORAGE_DIR=/var/lib/threads threadstore sweep
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = match Invocation::from_args() {
        Invocation::Help => {
            print_help();
            return Ok(());
        }
        Invocation::Version => {
            println!("threadstore version {}", threadstore::VERSION);
            return Ok(());
        }
        Invocation::Run(command) => command,
    };

    // Set up logging on stderr so replies stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = StorageConfig::from_env()?;

    // A one-shot command has no use for the background sweeper
    let storage = Arc::new(Storage::open_without_sweeper(config)?);
    let handler = CommandHandler::new(Arc::clone(&storage));

    let reply = tokio::task::spawn_blocking(move || handler.execute(command)).await??;
    println!("{}", reply);

    debug!("Command complete");
    Ok(())
}
