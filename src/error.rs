use std::io;
use std::path::PathBuf;

/// Coarse classification used at the CLI boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Malformed,
    IoFailure,
}

impl ErrorKind {
    /// Process exit code for this kind. Clap keeps 2 for usage errors.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::NotFound => 3,
            ErrorKind::AlreadyExists => 4,
            ErrorKind::Malformed => 5,
            ErrorKind::IoFailure => 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HftError {
    #[error("no package.json found in {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("invalid manifest {}: {reason}", .path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("installed games list already exists at {}", .0.display())]
    RegistryAlreadyExists(PathBuf),

    #[error("installed games list not found at {} (run init-game-list first)", .0.display())]
    RegistryMissing(PathBuf),

    #[error("installed games list {} is corrupt: {reason}", .path.display())]
    RegistryCorrupt { path: PathBuf, reason: String },

    #[error("game {0} is already in the installed games list")]
    DuplicateGame(String),

    #[error("game {0} is not in the installed games list")]
    GameNotFound(String),

    #[error("failed to build release from {}: {source}", .path.display())]
    BuildIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read archive {}: {reason}", .path.display())]
    ArchiveUnreadable { path: PathBuf, reason: String },

    #[error("malformed archive {}: {reason}", .path.display())]
    ArchiveMalformed { path: PathBuf, reason: String },

    #[error("game {0} is already installed")]
    AlreadyInstalled(String),

    #[error("game {0} was installed from an archive; use uninstall to remove it")]
    InstalledFromArchive(String),

    #[error("refusing to remove {}: not a directory named after game {game_id}", .path.display())]
    UnsafeRemoval { path: PathBuf, game_id: String },

    #[error("invalid config {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl HftError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        HftError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn build_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HftError::BuildIo {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HftError::ManifestNotFound(_)
            | HftError::RegistryMissing(_)
            | HftError::GameNotFound(_) => ErrorKind::NotFound,
            HftError::RegistryAlreadyExists(_)
            | HftError::DuplicateGame(_)
            | HftError::AlreadyInstalled(_)
            | HftError::InstalledFromArchive(_) => ErrorKind::AlreadyExists,
            HftError::ManifestInvalid { .. }
            | HftError::RegistryCorrupt { .. }
            | HftError::ArchiveUnreadable { .. }
            | HftError::ArchiveMalformed { .. }
            | HftError::UnsafeRemoval { .. }
            | HftError::ConfigInvalid { .. } => ErrorKind::Malformed,
            HftError::BuildIo { .. } | HftError::Io { .. } => ErrorKind::IoFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, HftError>;
