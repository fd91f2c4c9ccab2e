//! Release archive installation.
//!
//! An install runs as a fixed sequence of [`InstallStep`]s. Every filesystem
//! side effect is recorded in an [`InstallTransaction`] so that a failure at
//! any step can be undone before the error is returned: a failed install
//! leaves neither a game folder nor a registry entry behind.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{HftError, Result};
use crate::manifest::{self, GameId, MANIFEST_FILE};
use crate::registry::{InstalledGameEntry, Registry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallStep {
    Inspect,
    CheckCollision,
    Stage,
    Place,
    Verify,
    Register,
}

/// Directories created by an in-flight install.
#[derive(Debug, Default)]
pub struct InstallTransaction {
    staged: Option<PathBuf>,
    placed: Option<PathBuf>,
}

impl InstallTransaction {
    pub fn staged(&mut self, dir: PathBuf) {
        self.staged = Some(dir);
    }

    /// The staging folder became the game folder.
    pub fn placed(&mut self, dir: PathBuf) {
        self.staged = None;
        self.placed = Some(dir);
    }

    /// The game is registered; nothing is undone from here on.
    pub fn commit(&mut self) {
        self.staged = None;
        self.placed = None;
    }

    pub fn rollback(&mut self) {
        for dir in [self.placed.take(), self.staged.take()].into_iter().flatten() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => info!("install: rolled back {}", dir.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!("install: failed to roll back {}: {err}", dir.display()),
            }
        }
    }
}

/// Shape of a release archive, established before anything is written.
#[derive(Debug)]
struct ArchiveLayout {
    game_id: GameId,
    /// Archive index and path below the game folder, per entry.
    entries: Vec<(usize, PathBuf, bool)>,
}

pub struct Installer<'a> {
    registry: &'a Registry,
    install_root: PathBuf,
}

impl<'a> Installer<'a> {
    pub fn new(registry: &'a Registry, install_root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            install_root: install_root.into(),
        }
    }

    pub fn install(&self, archive_path: &Path) -> Result<InstalledGameEntry> {
        info!("install: {}", archive_path.display());
        let mut archive = open_archive(archive_path)?;
        let layout = inspect(archive_path, &mut archive)?;
        debug!(
            "install: step {:?} done; game {} with {} entries",
            InstallStep::Inspect,
            layout.game_id,
            layout.entries.len()
        );

        let game_dir = self.install_root.join(layout.game_id.as_str());
        self.check_collision(&layout.game_id, &game_dir)
            .inspect_err(|err| debug!("install: {:?} failed: {err}", InstallStep::CheckCollision))?;

        let mut txn = InstallTransaction::default();
        match self.apply(archive_path, &mut archive, &layout, &game_dir, &mut txn) {
            Ok(entry) => {
                txn.commit();
                info!(
                    "install: {} installed at {}",
                    entry.game_id,
                    game_dir.display()
                );
                Ok(entry)
            }
            Err((step, err)) => {
                warn!("install: {step:?} failed for {}: {err}", layout.game_id);
                txn.rollback();
                Err(err)
            }
        }
    }

    fn check_collision(&self, game_id: &GameId, game_dir: &Path) -> Result<()> {
        if game_dir.exists() {
            debug!("install: {} already on disk", game_dir.display());
            return Err(HftError::AlreadyInstalled(game_id.to_string()));
        }
        if self.registry.find_by_id(game_id.as_str())?.is_some() {
            debug!("install: {game_id} already registered");
            return Err(HftError::AlreadyInstalled(game_id.to_string()));
        }
        Ok(())
    }

    fn apply(
        &self,
        archive_path: &Path,
        archive: &mut ZipArchive<File>,
        layout: &ArchiveLayout,
        game_dir: &Path,
        txn: &mut InstallTransaction,
    ) -> std::result::Result<InstalledGameEntry, (InstallStep, HftError)> {
        let staging = self
            .install_root
            .join(format!(".{}.staging", layout.game_id));
        self.stage(archive_path, archive, layout, &staging, txn)
            .map_err(|e| (InstallStep::Stage, e))?;

        fs::rename(&staging, game_dir)
            .map_err(|e| {
                HftError::io(
                    format!(
                        "failed to move {} to {}",
                        staging.display(),
                        game_dir.display()
                    ),
                    e,
                )
            })
            .map_err(|e| (InstallStep::Place, e))?;
        txn.placed(game_dir.to_path_buf());

        let manifest = manifest::read(game_dir).map_err(|e| (InstallStep::Verify, e))?;
        if manifest.game_id != layout.game_id {
            return Err((
                InstallStep::Verify,
                HftError::ArchiveMalformed {
                    path: archive_path.to_path_buf(),
                    reason: format!(
                        "manifest gameId {} does not match folder {}",
                        manifest.game_id, layout.game_id
                    ),
                },
            ));
        }

        let install_path = std::path::absolute(game_dir).unwrap_or_else(|_| game_dir.to_path_buf());
        let entry = InstalledGameEntry::installed(manifest, install_path);
        self.registry
            .add(entry.clone())
            .map_err(|e| (InstallStep::Register, e))?;
        Ok(entry)
    }

    fn stage(
        &self,
        archive_path: &Path,
        archive: &mut ZipArchive<File>,
        layout: &ArchiveLayout,
        staging: &Path,
        txn: &mut InstallTransaction,
    ) -> Result<()> {
        fs::create_dir_all(&self.install_root).map_err(|e| {
            HftError::io(
                format!(
                    "unable to create install dir {}",
                    self.install_root.display()
                ),
                e,
            )
        })?;
        if staging.exists() {
            warn!("install: removing stale staging dir {}", staging.display());
            fs::remove_dir_all(staging).map_err(|e| {
                HftError::io(format!("failed to clean {}", staging.display()), e)
            })?;
        }
        fs::create_dir(staging)
            .map_err(|e| HftError::io(format!("failed to create {}", staging.display()), e))?;
        txn.staged(staging.to_path_buf());

        for (index, rel, is_dir) in &layout.entries {
            let out_path = staging.join(rel);
            if *is_dir {
                fs::create_dir_all(&out_path).map_err(|e| {
                    HftError::io(format!("failed to create {}", out_path.display()), e)
                })?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    HftError::io(format!("failed to create {}", parent.display()), e)
                })?;
            }
            let mut entry = archive
                .by_index(*index)
                .map_err(|e| HftError::ArchiveUnreadable {
                    path: archive_path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            let mut out_file = File::create(&out_path)
                .map_err(|e| HftError::io(format!("failed to create {}", out_path.display()), e))?;
            io::copy(&mut entry, &mut out_file).map_err(|e| {
                HftError::io(format!("failed to extract {}", entry.name()), e)
            })?;
            debug!("install: extracted {}", rel.display());
        }
        Ok(())
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let unreadable = |reason: String| HftError::ArchiveUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    ZipArchive::new(file).map_err(|e| unreadable(e.to_string()))
}

fn inspect(path: &Path, archive: &mut ZipArchive<File>) -> Result<ArchiveLayout> {
    let malformed = |reason: String| HftError::ArchiveMalformed {
        path: path.to_path_buf(),
        reason,
    };

    let mut roots = BTreeSet::new();
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| HftError::ArchiveUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let name = entry.name().to_owned();
        let enclosed = entry
            .enclosed_name()
            .ok_or_else(|| malformed(format!("entry {name:?} escapes the archive root")))?;
        let mut components = enclosed.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        });
        let root = components
            .next()
            .and_then(|part| part.to_str())
            .ok_or_else(|| malformed(format!("entry {name:?} has no usable path")))?
            .to_owned();
        let rel: PathBuf = components.collect();
        if rel.as_os_str().is_empty() {
            if !entry.is_dir() {
                return Err(malformed(format!(
                    "file {name:?} lies outside a game folder"
                )));
            }
            roots.insert(root);
            continue;
        }
        roots.insert(root);
        entries.push((index, rel, entry.is_dir()));
    }

    let root = match roots.len() {
        0 => return Err(malformed("archive contains no game folder".into())),
        1 => roots.pop_first().unwrap_or_default(),
        _ => {
            let found: Vec<String> = roots.into_iter().collect();
            return Err(malformed(format!(
                "expected one top-level folder, found {}",
                found.join(", ")
            )));
        }
    };
    let game_id = GameId::parse(&root).map_err(malformed)?;
    let has_manifest = entries
        .iter()
        .any(|(_, rel, is_dir)| !is_dir && rel.as_path() == Path::new(MANIFEST_FILE));
    if !has_manifest {
        return Err(malformed(format!("missing {game_id}/{MANIFEST_FILE}")));
    }
    Ok(ArchiveLayout { game_id, entries })
}
