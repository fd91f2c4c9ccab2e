use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs4::fs_std::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{HftError, Result};
use crate::manifest::{GameId, GameManifest};

pub const INSTALLED_GAMES_FILE: &str = "installed-games.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledGameEntry {
    pub game_id: GameId,
    /// Manifest snapshot, kept under the same key `package.json` uses.
    #[serde(rename = "happyFunTimes")]
    pub manifest: GameManifest,
    /// Set for games extracted from a release archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// Set for games registered straight from a source directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub added_at: String,
}

impl InstalledGameEntry {
    pub fn installed(manifest: GameManifest, install_path: PathBuf) -> Self {
        Self {
            game_id: manifest.game_id.clone(),
            manifest,
            install_path: Some(install_path),
            source_path: None,
            added_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn from_source(manifest: GameManifest, source_path: PathBuf) -> Self {
        Self {
            game_id: manifest.game_id.clone(),
            manifest,
            install_path: None,
            source_path: Some(source_path),
            added_at: Utc::now().to_rfc3339(),
        }
    }

    /// Where the game's files live, whichever way it was registered.
    pub fn location(&self) -> Option<&Path> {
        self.install_path
            .as_deref()
            .or(self.source_path.as_deref())
    }
}

/// Handle on the persisted list of installed games.
///
/// Every call goes back to disk; mutations are a locked read-modify-write
/// whose result replaces the file through a rename, so readers see either
/// the old list or the new one.
#[derive(Clone, Debug)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HftError::io(
                    format!("unable to create registry dir {}", parent.display()),
                    e,
                )
            })?;
        }
        let _lock = self.lock()?;
        if self.path.exists() {
            return Err(HftError::RegistryAlreadyExists(self.path.clone()));
        }
        self.save(&[])?;
        info!("registry: created empty list at {}", self.path.display());
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<InstalledGameEntry>> {
        self.load()
    }

    pub fn find_by_id(&self, game_id: &str) -> Result<Option<InstalledGameEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .find(|entry| entry.game_id == *game_id))
    }

    pub fn add(&self, entry: InstalledGameEntry) -> Result<()> {
        let _lock = self.lock()?;
        let mut entries = self.load()?;
        if entries.iter().any(|e| e.game_id == entry.game_id) {
            return Err(HftError::DuplicateGame(entry.game_id.to_string()));
        }
        let game_id = entry.game_id.clone();
        entries.push(entry);
        self.save(&entries)?;
        info!("registry: added {game_id} ({} total)", entries.len());
        Ok(())
    }

    pub fn remove(&self, game_id: &str) -> Result<InstalledGameEntry> {
        self.remove_checked(game_id, |_| Ok(()))
    }

    /// Like [`Registry::remove`], but only for games registered from a
    /// source directory. Archive installs own a folder under the install
    /// root and must go through the uninstaller.
    pub fn remove_source(&self, game_id: &str) -> Result<InstalledGameEntry> {
        self.remove_checked(game_id, |entry| match entry.install_path {
            Some(_) => Err(HftError::InstalledFromArchive(game_id.to_owned())),
            None => Ok(()),
        })
    }

    fn remove_checked(
        &self,
        game_id: &str,
        check: impl FnOnce(&InstalledGameEntry) -> Result<()>,
    ) -> Result<InstalledGameEntry> {
        let _lock = self.lock()?;
        let mut entries = self.load()?;
        let index = entries
            .iter()
            .position(|e| e.game_id == *game_id)
            .ok_or_else(|| HftError::GameNotFound(game_id.to_owned()))?;
        check(&entries[index])?;
        let removed = entries.remove(index);
        self.save(&entries)?;
        info!("registry: removed {game_id} ({} left)", entries.len());
        Ok(removed)
    }

    fn load(&self) -> Result<Vec<InstalledGameEntry>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(HftError::RegistryMissing(self.path.clone()));
            }
            Err(err) => {
                return Err(HftError::io(
                    format!("failed to read {}", self.path.display()),
                    err,
                ));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(HftError::RegistryMissing(self.path.clone()));
        }
        let entries: Vec<InstalledGameEntry> =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.game_id != entry.manifest.game_id {
                return Err(self.corrupt(format!(
                    "entry {} carries manifest for {}",
                    entry.game_id, entry.manifest.game_id
                )));
            }
            if !seen.insert(entry.game_id.as_str()) {
                return Err(self.corrupt(format!("duplicate gameId {}", entry.game_id)));
            }
        }
        debug!(
            "registry: loaded {} entries from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    fn save(&self, entries: &[InstalledGameEntry]) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| HftError::io("failed to serialize installed games", e.into()))?;
        bytes.push(b'\n');

        let tmp = self.sibling("tmp");
        let written = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(err) = written {
            if let Err(cleanup) = fs::remove_file(&tmp)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(
                    "registry: failed to clean up {}: {cleanup}",
                    tmp.display()
                );
            }
            return Err(HftError::io(
                format!("failed to write {}", self.path.display()),
                err,
            ));
        }
        Ok(())
    }

    fn lock(&self) -> Result<RegistryLock> {
        let path = self.sibling("lock");
        let file = match OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(HftError::RegistryMissing(self.path.clone()));
            }
            Err(err) => {
                return Err(HftError::io(
                    format!("failed to open lock file {}", path.display()),
                    err,
                ));
            }
        };
        file.lock_exclusive().map_err(|e| {
            HftError::io(format!("failed to lock {}", path.display()), e)
        })?;
        Ok(RegistryLock { _file: file })
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| INSTALLED_GAMES_FILE.into());
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: String) -> HftError {
        HftError::RegistryCorrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Exclusive lock held for the duration of a read-modify-write; released on drop.
struct RegistryLock {
    _file: File,
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::testutil;

    fn registry_in(dir: &Path) -> Registry {
        Registry::new(dir.join("config").join(INSTALLED_GAMES_FILE))
    }

    fn entry(id: &str) -> InstalledGameEntry {
        let manifest = manifest::decode(&testutil::package_json(id)).unwrap();
        InstalledGameEntry::from_source(manifest, PathBuf::from("/src").join(id))
    }

    #[test]
    fn init_creates_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        assert!(registry.path().exists());
        assert!(registry.list().unwrap().is_empty());
        let text = fs::read_to_string(registry.path()).unwrap();
        assert_eq!(text.trim(), "[]");
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        registry.add(entry("fakegame")).unwrap();
        let err = registry.init().unwrap_err();
        assert!(matches!(err, HftError::RegistryAlreadyExists(_)));
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn missing_and_empty_files_are_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        assert!(matches!(
            registry.list().unwrap_err(),
            HftError::RegistryMissing(_)
        ));
        assert!(matches!(
            registry.add(entry("fakegame")).unwrap_err(),
            HftError::RegistryMissing(_)
        ));

        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        fs::write(registry.path(), "  \n").unwrap();
        assert!(matches!(
            registry.list().unwrap_err(),
            HftError::RegistryMissing(_)
        ));
    }

    #[test]
    fn corrupt_content_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        fs::write(registry.path(), "{\"not\": \"a list\"}").unwrap();
        assert!(matches!(
            registry.list().unwrap_err(),
            HftError::RegistryCorrupt { .. }
        ));
    }

    #[test]
    fn duplicate_ids_on_disk_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        let doubled = vec![entry("fakegame"), entry("fakegame")];
        fs::write(registry.path(), serde_json::to_vec(&doubled).unwrap()).unwrap();
        let err = registry.list().unwrap_err();
        assert!(err.to_string().contains("duplicate gameId fakegame"));
    }

    #[test]
    fn add_list_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();

        let game = entry("fakegame");
        registry.add(game.clone()).unwrap();
        assert_eq!(registry.list().unwrap(), vec![game.clone()]);
        assert_eq!(registry.find_by_id("fakegame").unwrap(), Some(game.clone()));

        let removed = registry.remove("fakegame").unwrap();
        assert_eq!(removed, game);
        assert!(registry.list().unwrap().is_empty());
        assert_eq!(registry.find_by_id("fakegame").unwrap(), None);
    }

    #[test]
    fn remove_source_only_drops_source_entries() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        let manifest = manifest::decode(&testutil::package_json("installed")).unwrap();
        registry
            .add(InstalledGameEntry::installed(
                manifest,
                dir.path().join("games").join("installed"),
            ))
            .unwrap();
        registry.add(entry("fakegame")).unwrap();
        let before = fs::read(registry.path()).unwrap();

        let err = registry.remove_source("installed").unwrap_err();
        assert!(matches!(err, HftError::InstalledFromArchive(_)));
        assert_eq!(fs::read(registry.path()).unwrap(), before);

        registry.remove_source("fakegame").unwrap();
        let ids: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.game_id.to_string())
            .collect();
        assert_eq!(ids, vec!["installed"]);
        assert!(matches!(
            registry.remove_source("fakegame").unwrap_err(),
            HftError::GameNotFound(_)
        ));
    }

    #[test]
    fn duplicate_add_leaves_list_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        registry.add(entry("fakegame")).unwrap();
        let err = registry.add(entry("fakegame")).unwrap_err();
        assert!(matches!(err, HftError::DuplicateGame(ref id) if id == "fakegame"));
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        for id in ["zeta", "alpha", "mid"] {
            registry.add(entry(id)).unwrap();
        }
        registry.remove("alpha").unwrap();
        registry.add(entry("beta")).unwrap();
        let ids: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.game_id.to_string())
            .collect();
        assert_eq!(ids, vec!["zeta", "mid", "beta"]);
    }

    #[test]
    fn remove_unknown_game_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        registry.add(entry("fakegame")).unwrap();
        let before = fs::read(registry.path()).unwrap();
        let err = registry.remove("other").unwrap_err();
        assert!(matches!(err, HftError::GameNotFound(_)));
        assert_eq!(fs::read(registry.path()).unwrap(), before);
    }

    #[test]
    fn persisted_form_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        registry.add(entry("one")).unwrap();
        registry.add(entry("two")).unwrap();
        let first = registry.list().unwrap();
        fs::write(
            registry.path(),
            serde_json::to_vec_pretty(&first).unwrap(),
        )
        .unwrap();
        assert_eq!(registry.list().unwrap(), first);
        assert!(!registry.sibling("tmp").exists());
    }

    #[test]
    fn entry_json_nests_manifest_under_happy_fun_times() {
        let value = serde_json::to_value(vec![entry("fakegame")]).unwrap();
        assert_eq!(value[0]["gameId"], "fakegame");
        assert_eq!(value[0]["happyFunTimes"]["gameId"], "fakegame");
        assert_eq!(value[0]["happyFunTimes"]["name"], "Fake Game");
        assert!(value[0].get("manifest").is_none());
    }

    #[test]
    fn mismatched_manifest_id_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        let mut value = serde_json::to_value(vec![entry("fakegame")]).unwrap();
        value[0]["happyFunTimes"]["gameId"] = "othergame".into();
        fs::write(registry.path(), serde_json::to_vec(&value).unwrap()).unwrap();

        let err = registry.list().unwrap_err();
        assert!(matches!(err, HftError::RegistryCorrupt { .. }));
        assert!(err
            .to_string()
            .contains("entry fakegame carries manifest for othergame"));
    }

    #[test]
    fn failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(dir.path());
        registry.init().unwrap();
        registry.add(entry("fakegame")).unwrap();
        let before = fs::read(registry.path()).unwrap();

        // A directory where the temp file should go makes the write fail.
        fs::create_dir_all(registry.sibling("tmp")).unwrap();
        assert!(registry.add(entry("other")).is_err());
        assert_eq!(fs::read(registry.path()).unwrap(), before);
        assert_eq!(registry.list().unwrap().len(), 1);
    }
}
