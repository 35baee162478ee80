// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wordtree::storage::ROOT_PAGE_ID;
use wordtree::{BTreeError, TreeConfig, WordTree, tokenize};

/// One line of shell input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// `i <file>`: index every word of a text file.
    Insert(PathBuf),
    /// `r <lo> <hi>`: count the words in `[lo, hi]`.
    Range(Vec<u8>, Vec<u8>),
    /// `s <word>`: list the text offsets of a word.
    Search(Vec<u8>),
    /// `p`: print the tree.
    Print,
    /// `v`: check the tree structure.
    Verify,
    /// `c`: show page traffic counters.
    Counters,
    /// `x`: sync and exit.
    Exit,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wordtree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment variables
    let config = match TreeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: data_directory={}, page_size={}, postings_per_block={}",
        config.data_directory.display(),
        config.page_size,
        config.postings_per_block
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_directory) {
        tracing::error!("Failed to create data directory: {e}");
        std::process::exit(1);
    }

    let mut tree = match WordTree::open_or_create(config) {
        Ok(tree) => tree,
        Err(e) => {
            tracing::error!("Failed to open word tree: {e}");
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read input: {e}");
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                tracing::warn!("{message}");
                continue;
            }
        };
        if command == Command::Exit {
            break;
        }

        if let Err(e) = run_command(&mut tree, command, &mut stdout.lock()) {
            if e.is_fatal() {
                tracing::error!("{e}");
                std::process::exit(1);
            }
            tracing::warn!("{e}");
        }
    }

    if let Err(e) = tree.sync() {
        tracing::error!("Failed to sync word tree: {e}");
        std::process::exit(1);
    }
}

/// Parse one input line. Blank lines yield `None`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();
    let word = |s: &str| s.as_bytes().to_ascii_lowercase();

    let command = match (name, args.as_slice()) {
        ("i", [path]) => Command::Insert(PathBuf::from(*path)),
        ("r", [lo, hi]) => Command::Range(word(*lo), word(*hi)),
        ("s", [w]) => Command::Search(word(*w)),
        ("p", []) => Command::Print,
        ("v", []) => Command::Verify,
        ("c", []) => Command::Counters,
        ("x", []) => Command::Exit,
        _ => return Err(format!("unrecognized command: {line}")),
    };
    Ok(Some(command))
}

fn run_command<W: Write>(
    tree: &mut WordTree,
    command: Command,
    out: &mut W,
) -> Result<(), BTreeError> {
    match command {
        Command::Insert(path) => {
            let text = std::fs::read(&path)?;
            let mut total = 0u64;
            let mut added = 0u64;
            for (word, offset) in tokenize::words(&text) {
                match tree.insert(&word, offset) {
                    Ok(is_new) => {
                        total += 1;
                        added += u64::from(is_new);
                    }
                    Err(BTreeError::KeyTooLong { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            writeln!(
                out,
                "inserted {total} words ({added} new) from {}",
                path.display()
            )?;
        }
        Command::Range(lo, hi) => {
            tree.reset_stats();
            let count = tree.count_in_range(&lo, &hi)?;
            let reads = tree.io_stats().reads;
            if cfg!(debug_assertions) {
                let scanned = tree.count_in_range_by_scan(&lo, &hi)?;
                if scanned != count {
                    return Err(BTreeError::CountMismatch {
                        page_id: ROOT_PAGE_ID,
                        expected: scanned,
                        actual: count,
                    });
                }
            }
            writeln!(out, "{count} ({reads} page reads)")?;
        }
        Command::Search(word) => {
            let offsets = tree.postings(&word)?;
            if offsets.is_empty() {
                writeln!(out, "{} not found", String::from_utf8_lossy(&word))?;
            } else {
                let offsets: Vec<String> = offsets.iter().map(u64::to_string).collect();
                writeln!(out, "{}", offsets.join(" "))?;
            }
        }
        Command::Print => tree.print_tree(out)?,
        Command::Verify => {
            tree.verify()?;
            writeln!(out, "ok ({} keys)", tree.len()?)?;
        }
        Command::Counters => {
            let stats = tree.io_stats();
            writeln!(
                out,
                "reads {} writes {} frees {}",
                stats.reads, stats.writes, stats.frees
            )?;
        }
        Command::Exit => {}
    }
    Ok(())
}
