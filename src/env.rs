use std::env;
use std::path::PathBuf;

/// Returns the root directory used for config and installed games.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("hft-games")
}

pub fn config_dir() -> PathBuf {
    default_app_dir().join("config")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn games_dir() -> PathBuf {
    default_app_dir().join("games")
}
