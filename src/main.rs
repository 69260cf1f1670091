//! lupack CLI - dependency manager and incremental bundler for Lua game maps
//!
//! Usage: lupack <COMMAND>
//!
//! Commands:
//!   install  Add a dependency to the project and fetch everything
//!   update   Re-download every dependency from scratch
//!   build    Assemble dependencies and sources into the target file
//!   watch    Watch sources, config and target, rebuilding on change

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use is_terminal::IsTerminal;

use lupack::bundler::{self, Bundler};
use lupack::busy::lock_unpoisoned;
use lupack::resolver::{self, PackageManager};
use lupack::{ui, watcher, LupackResult};

const RETRY_ATTEMPTS: u32 = 3;

/// lupack - dependency manager and incremental bundler for Lua game maps
#[derive(Parser, Debug)]
#[command(name = "lupack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a package to the project manifest and install dependencies
    Install {
        /// Resource URL (repository or raw file)
        resource: String,

        /// Exact version tag; omit to require the head revision
        version: Option<String>,
    },

    /// Remove any package data and re-download it
    Update {
        /// Pass 'build' to rebuild right after updating
        #[arg(value_parser = ["build"])]
        then: Option<String>,
    },

    /// Build all downloaded modules and sources into the target file
    Build,

    /// Watch for changes of the sources and target and update or build
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let verbose = cli.verbose > 0;

    let project_dir = std::env::current_dir()?;
    let pm = Arc::new(Mutex::new(PackageManager::new(&project_dir, verbose)));
    let bundler = Arc::new(Bundler::new(verbose, env!("CARGO_PKG_VERSION")));

    let running = Arc::new(AtomicBool::new(true));
    if matches!(command, Commands::Watch) {
        let flag = running.clone();
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;
    }

    for attempt in 1..=RETRY_ATTEMPTS {
        match run_command(&command, &pm, &bundler, &running) {
            Ok(()) => return Ok(()),
            Err(e) => {
                ui::error(&format!("General Error: {e}"));
                let interactive = std::io::stdin().is_terminal();
                let last_attempt = attempt == RETRY_ATTEMPTS;
                if !interactive || last_attempt || !confirm_retry()? {
                    return Err(e.into());
                }
                lock_unpoisoned(&pm).clear();
                bundler.clear();
                ui::warn(&format!("Retry attempt: {attempt}"));
            }
        }
    }
    Ok(())
}

fn confirm_retry() -> Result<bool> {
    let again = dialoguer::Confirm::new()
        .with_prompt("Try again?")
        .default(true)
        .interact()?;
    Ok(again)
}

fn run_command(
    command: &Commands,
    pm: &Arc<Mutex<PackageManager>>,
    bundler: &Arc<Bundler>,
    running: &Arc<AtomicBool>,
) -> LupackResult<()> {
    match command {
        Commands::Install { resource, version } => {
            // Locate what is already present without re-downloading, then
            // install (which forces the full refresh itself).
            resolver::refresh_now(pm, false, true)?;
            resolver::install_now(pm, resource, version.as_deref().unwrap_or("*"))
        }
        Commands::Update { then } => {
            resolver::refresh_now(pm, true, false)?;
            if then.as_deref() == Some("build") {
                bundler::rebuild_now(bundler, pm)?;
            }
            Ok(())
        }
        Commands::Build => {
            resolver::refresh_now(pm, false, false)?;
            bundler::rebuild_now(bundler, pm)
        }
        Commands::Watch => {
            resolver::refresh_now(pm, false, false)?;
            bundler::rebuild_now(bundler, pm)?;
            watcher::watch(pm.clone(), bundler.clone(), running.clone())
        }
    }
}

