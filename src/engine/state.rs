use std::path::PathBuf;

use crate::registry::InstalledGameEntry;
use crate::release::ReleaseArchive;

// Requests coming in from the command line.
#[derive(Clone, Debug)]
pub enum Command {
    InitGameList,
    List,
    Add {
        source_dir: PathBuf,
    },
    /// Either a source directory holding a manifest or a bare gameId.
    Remove {
        target: String,
    },
    MakeRelease {
        src: PathBuf,
        dest: PathBuf,
    },
    Install {
        archive: PathBuf,
        install_dir: Option<PathBuf>,
    },
    Uninstall {
        game_id: String,
        install_dir: Option<PathBuf>,
    },
}

// What a finished command hands back for printing.
#[derive(Clone, Debug)]
pub enum Outcome {
    Initialised(PathBuf),
    Listed(Vec<InstalledGameEntry>),
    Added(InstalledGameEntry),
    Removed(InstalledGameEntry),
    Released(Vec<ReleaseArchive>),
    Installed(InstalledGameEntry),
    Uninstalled(InstalledGameEntry),
}
