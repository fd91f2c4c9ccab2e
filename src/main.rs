use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;

mod config;
mod engine;
mod env;
mod error;
mod installer;
mod manifest;
mod registry;
mod release;
#[cfg(test)]
mod testutil;
mod uninstaller;
mod util;

use crate::config::Config;
use crate::engine::GameManager;
use crate::engine::models::GameSummary;
use crate::engine::state::{Command, Outcome};
use crate::error::{HftError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "hft-games",
    author,
    version,
    about = "Package, install and manage local HappyFunTimes games"
)]
struct Cli {
    /// Config file to use instead of the per-user default.
    #[arg(long, global = true, value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty installed-games list.
    InitGameList,
    /// Show registered games.
    List {
        /// Print every entry as JSON.
        #[arg(long)]
        full: bool,
    },
    /// Register a game straight from its source folder.
    Add { path: PathBuf },
    /// Drop a game registered with `add`; its files stay in place.
    Remove {
        /// Source folder or gameId.
        target: String,
    },
    /// Build release archives.
    MakeRelease {
        /// A game folder, or a folder of game folders.
        #[arg(long, value_name = "DIR")]
        src: PathBuf,
        /// Where the archives are written.
        #[arg(default_value = ".")]
        dest: PathBuf,
        /// Print archive descriptors as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Install a release archive.
    Install {
        archive: PathBuf,
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
    },
    /// Remove an installed game and its files.
    Uninstall {
        game_id: String,
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.kind().exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config_path.as_deref())?;
    debug!(
        "main: config {} registry {}",
        config.config_path.display(),
        config.installed_games_list.display()
    );
    let manager = GameManager::new(config);

    let (command, full, json) = match cli.command {
        Commands::InitGameList => (Command::InitGameList, false, false),
        Commands::List { full } => (Command::List, full, false),
        Commands::Add { path } => (Command::Add { source_dir: path }, false, false),
        Commands::Remove { target } => (Command::Remove { target }, false, false),
        Commands::MakeRelease { src, dest, json } => {
            (Command::MakeRelease { src, dest }, false, json)
        }
        Commands::Install {
            archive,
            install_dir,
        } => (
            Command::Install {
                archive,
                install_dir,
            },
            false,
            false,
        ),
        Commands::Uninstall {
            game_id,
            install_dir,
        } => (
            Command::Uninstall {
                game_id,
                install_dir,
            },
            false,
            false,
        ),
    };

    match manager.handle(command)? {
        Outcome::Initialised(path) => println!("created {}", path.display()),
        Outcome::Listed(entries) if full => print_json(&entries)?,
        Outcome::Listed(entries) => {
            for entry in &entries {
                println!("{}", GameSummary::from(entry));
            }
        }
        Outcome::Added(entry) => println!("added {}", entry.game_id),
        Outcome::Removed(entry) => println!("removed {}", entry.game_id),
        Outcome::Released(archives) if json => print_json(&archives)?,
        Outcome::Released(archives) => {
            for archive in &archives {
                println!("{}", archive.filename.display());
            }
        }
        Outcome::Installed(entry) => println!(
            "installed {} to {}",
            entry.game_id,
            entry
                .install_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        ),
        Outcome::Uninstalled(entry) => println!("uninstalled {}", entry.game_id),
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| HftError::io("failed to encode output", e.into()))
}
