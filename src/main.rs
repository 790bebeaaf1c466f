// bamboo-stash command line tool.
// Inspects and clears a stash directory.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use bamboo_stash::{STASH_DIR_ENV, Stash, StashConfig};

#[derive(Parser)]
#[command(name = "bamboo-stash")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Stash directory (defaults to the user's cache directory)
    #[arg(long, global = true, env = STASH_DIR_ENV)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved stash directory
    Dir,

    /// List stored functions with entry counts and sizes
    Ls,

    /// Delete every stored result
    Clear,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = StashConfig {
        base_dir: cli.dir.filter(|dir| !dir.as_os_str().is_empty()),
    };
    let stash = Stash::from_config(&config)?;

    match cli.command {
        Command::Dir => println!("{}", stash.base_dir().display()),
        Command::Ls => {
            let functions = stash.functions()?;
            if functions.is_empty() {
                println!("(empty)");
            }
            for usage in functions {
                println!(
                    "{}  {}  {} entries  {}",
                    usage.name,
                    short_digest(&usage.source_digest),
                    usage.entries,
                    format_bytes(usage.bytes)
                );
            }
        }
        Command::Clear => {
            if stash.clear()? {
                println!("Cleared {}", stash.base_dir().display());
            } else {
                println!("Nothing to clear in {}", stash.base_dir().display());
            }
        }
    }

    Ok(())
}

/// First 12 characters of a digest directory name.
fn short_digest(digest: &str) -> String {
    digest.chars().take(12).collect()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
