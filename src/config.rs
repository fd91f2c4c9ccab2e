use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::env;
use crate::error::{HftError, Result};
use crate::registry::{INSTALLED_GAMES_FILE, Registry};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    install_dir: Option<PathBuf>,
    installed_games_list: Option<PathBuf>,
    /// Keys owned by other tools sharing the file.
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

/// Resolved locations used by every command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub config_path: PathBuf,
    pub install_dir: PathBuf,
    pub installed_games_list: PathBuf,
}

impl Config {
    /// Load `config_path` (or the per-user default). A missing file means
    /// defaults; relative paths inside it are relative to its folder.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => absolute(path),
            None => env::default_config_path(),
        };
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let file = match fs::read(&config_path) {
            Ok(bytes) => serde_json::from_slice::<ConfigFile>(&bytes).map_err(|e| {
                HftError::ConfigInvalid {
                    path: config_path.clone(),
                    reason: e.to_string(),
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "config: {} not found; using defaults",
                    config_path.display()
                );
                ConfigFile::default()
            }
            Err(err) => {
                return Err(HftError::ConfigInvalid {
                    path: config_path.clone(),
                    reason: err.to_string(),
                });
            }
        };

        for key in file.other.keys() {
            warn!(
                "config: ignoring unknown key {key:?} in {}",
                config_path.display()
            );
        }

        let install_dir = file
            .install_dir
            .map(|dir| config_dir.join(dir))
            .unwrap_or_else(env::games_dir);
        let installed_games_list = file
            .installed_games_list
            .map(|path| config_dir.join(path))
            .unwrap_or_else(|| config_dir.join(INSTALLED_GAMES_FILE));

        let config = Self {
            config_path,
            install_dir: absolute(&install_dir),
            installed_games_list: absolute(&installed_games_list),
        };
        debug!(
            "config: install_dir={} installed_games_list={}",
            config.install_dir.display(),
            config.installed_games_list.display()
        );
        Ok(config)
    }

    pub fn registry(&self) -> Registry {
        Registry::new(&self.installed_games_list)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
