//! Interactive front end for a BrambleDB store.
//!
//! ```bash
//! # Open (or create) the store in ./data and start the prompt
//! bramble ./data
//!
//! bramble ./data> set 123 0x4242
//! bramble ./data> get 123
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use bramble_common::{StoreConfig, Value, VALUE_SIZE};
use bramble_storage::DISK_META_FILE;
use bramble_tree::BTree;

/// Default buffer-pool budget for the shell (100 MB).
const DEFAULT_MEMORY: usize = 100_000_000;

/// Interactive shell for a BrambleDB key-value store
#[derive(Parser, Debug)]
#[command(name = "bramble", version, about)]
struct Args {
    /// Directory holding the store's on-disk state
    directory: PathBuf,

    /// Buffer-pool memory budget in bytes
    #[arg(short, long, default_value_t = DEFAULT_MEMORY)]
    memory: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = StoreConfig::new(args.memory, &args.directory);

    // An existing store is recognized by its disk metadata file.
    let existing = args.directory.join(DISK_META_FILE).exists();
    let mut tree = if existing {
        println!("Opening store in {}", args.directory.display());
        BTree::open(&config).context("unable to open store")?
    } else {
        println!("Creating new store in {}", args.directory.display());
        BTree::create(&config).context("unable to create store")?
    };

    let mut editor = DefaultEditor::new()?;
    let prompt = format!("{}> ", args.directory.display());

    loop {
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };

        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(command);

        match handle(&mut tree, command) {
            Outcome::Reply(reply) => println!("{reply}"),
            Outcome::Exit => break,
        }
    }

    tree.close().context("unable to close store")?;
    println!("Store closed");

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

enum Outcome {
    Reply(String),
    Exit,
}

/// Executes a single shell command against the store.
fn handle(tree: &mut BTree, command: &str) -> Outcome {
    let parts: Vec<&str> = command.split_whitespace().collect();

    match parts.as_slice() {
        ["get", key] => {
            let key = match parse_key(key) {
                Ok(key) => key,
                Err(reply) => return Outcome::Reply(reply),
            };
            match tree.get(key) {
                Ok(value) => Outcome::Reply(format!("{key} = 0x{}", hex::encode(value))),
                Err(e) => Outcome::Reply(format!("Error retrieving key: {e}")),
            }
        }
        ["set", key, value] => {
            let key = match parse_key(key) {
                Ok(key) => key,
                Err(reply) => return Outcome::Reply(reply),
            };
            let value = match parse_value(value) {
                Ok(value) => value,
                Err(reply) => return Outcome::Reply(reply),
            };
            match tree.put(key, value) {
                Ok(()) => Outcome::Reply(format!("Stored {key} = 0x{}", hex::encode(value))),
                Err(e) => Outcome::Reply(format!("Error storing key: {e}")),
            }
        }
        ["exit"] => Outcome::Exit,
        _ => Outcome::Reply(help().to_string()),
    }
}

fn parse_key(raw: &str) -> std::result::Result<u64, String> {
    raw.parse()
        .map_err(|e| format!("Invalid key {raw}: {e}"))
}

/// Parses a hex-encoded value with a mandatory `0x` prefix. Shorter values
/// are right-padded with zeroes to the stored width.
fn parse_value(raw: &str) -> std::result::Result<Value, String> {
    let hex_part = raw
        .strip_prefix("0x")
        .ok_or_else(|| "Invalid value: must be hex-encoded with a leading 0x".to_string())?;

    let bytes = hex::decode(hex_part).map_err(|e| format!("Invalid hex string: {e}"))?;
    if bytes.len() > VALUE_SIZE {
        return Err(format!(
            "Value must be {VALUE_SIZE} bytes at most, was {}",
            bytes.len()
        ));
    }

    let mut value = [0u8; VALUE_SIZE];
    value[..bytes.len()].copy_from_slice(&bytes);
    Ok(value)
}

fn help() -> &'static str {
    "Valid commands:\n\
     \n\
     \tget <key>\n\
     \tExample: get 123\n\
     \n\
     \tset <key> <value>\n\
     \tExample: set 123 0x4242\n\
     \n\
     \texit"
}
