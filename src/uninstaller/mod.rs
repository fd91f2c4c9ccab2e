use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{HftError, Result};
use crate::registry::{InstalledGameEntry, Registry};

pub struct Uninstaller<'a> {
    registry: &'a Registry,
    install_root: PathBuf,
}

impl<'a> Uninstaller<'a> {
    pub fn new(registry: &'a Registry, install_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            install_root: install_root.into(),
        }
    }

    /// Delete the game's files, then its registry entry.
    ///
    /// The entry is only dropped once the files are gone, so a failed removal
    /// keeps the game listed and the command can simply be run again.
    pub fn uninstall(&self, game_id: &str) -> Result<InstalledGameEntry> {
        let entry = self
            .registry
            .find_by_id(game_id)?
            .ok_or_else(|| HftError::GameNotFound(game_id.to_owned()))?;

        let target = entry
            .install_path
            .clone()
            .unwrap_or_else(|| self.install_root.join(entry.game_id.as_str()));
        remove_game_dir(&target, game_id)?;

        let removed = self.registry.remove(game_id)?;
        info!("uninstall: {game_id} removed");
        Ok(removed)
    }
}

fn remove_game_dir(dir: &Path, game_id: &str) -> Result<()> {
    if dir.file_name().and_then(|n| n.to_str()) != Some(game_id) {
        return Err(HftError::UnsafeRemoval {
            path: dir.to_path_buf(),
            game_id: game_id.to_owned(),
        });
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            info!("uninstall: deleted {}", dir.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("uninstall: {} already absent", dir.display());
            Ok(())
        }
        Err(err) => Err(HftError::io(
            format!("failed to delete {}", dir.display()),
            err,
        )),
    }
}
