use std::path::{Path, PathBuf};

use log::info;

use crate::config::Config;
use crate::engine::state::{Command, Outcome};
use crate::error::{HftError, Result};
use crate::installer::Installer;
use crate::manifest;
use crate::registry::{InstalledGameEntry, Registry};
use crate::release::ReleaseBuilder;
use crate::uninstaller::Uninstaller;

pub mod models;
pub mod state;

/// Runs commands against one configured registry and install root.
pub struct GameManager {
    config: Config,
    registry: Registry,
}

impl GameManager {
    pub fn new(config: Config) -> Self {
        let registry = config.registry();
        Self { config, registry }
    }

    pub fn handle(&self, command: Command) -> Result<Outcome> {
        match command {
            Command::InitGameList => {
                info!("action: InitGameList");
                self.registry.init()?;
                Ok(Outcome::Initialised(self.registry.path().to_path_buf()))
            }
            Command::List => {
                info!("action: List");
                Ok(Outcome::Listed(self.registry.list()?))
            }
            Command::Add { source_dir } => {
                info!("action: Add {}", source_dir.display());
                self.add(&source_dir).map(Outcome::Added)
            }
            Command::Remove { target } => {
                info!("action: Remove {target}");
                let game_id = resolve_game_id(&target)?;
                self.registry.remove_source(&game_id).map(Outcome::Removed)
            }
            Command::MakeRelease { src, dest } => {
                info!("action: MakeRelease {}", src.display());
                ReleaseBuilder::new(dest)
                    .build_all(&src)
                    .map(Outcome::Released)
            }
            Command::Install {
                archive,
                install_dir,
            } => {
                info!("action: Install {}", archive.display());
                Installer::new(&self.registry, self.install_root(install_dir))
                    .install(&archive)
                    .map(Outcome::Installed)
            }
            Command::Uninstall {
                game_id,
                install_dir,
            } => {
                info!("action: Uninstall {game_id}");
                Uninstaller::new(&self.registry, self.install_root(install_dir))
                    .uninstall(&game_id)
                    .map(Outcome::Uninstalled)
            }
        }
    }

    fn add(&self, source_dir: &Path) -> Result<InstalledGameEntry> {
        let source_dir = std::path::absolute(source_dir).map_err(|e| {
            HftError::io(format!("failed to resolve {}", source_dir.display()), e)
        })?;
        let manifest = manifest::read(&source_dir)?;
        let entry = InstalledGameEntry::from_source(manifest, source_dir);
        self.registry.add(entry.clone())?;
        Ok(entry)
    }

    fn install_root(&self, override_dir: Option<PathBuf>) -> PathBuf {
        override_dir.unwrap_or_else(|| self.config.install_dir.clone())
    }
}

/// `remove` accepts a game folder as well as a bare id.
fn resolve_game_id(target: &str) -> Result<String> {
    let path = Path::new(target);
    if manifest::has_manifest(path) {
        return manifest::read(path).map(|m| m.game_id.to_string());
    }
    Ok(target.to_owned())
}
