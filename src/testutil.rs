//! Fixtures shared by the module tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Every file of the fakegame fixture, relative to its source directory.
pub const FAKEGAME_FILES: [&str; 11] = [
    "package.json",
    "file1.html",
    "somedir/file2.html",
    "game.html",
    "css/game.css",
    "scripts/game.js",
    "controller.html",
    "css/controller.css",
    "scripts/controller.js",
    "icon.png",
    "screenshot.png",
];

pub fn package_json(game_id: &str) -> String {
    format!(
        r#"{{
  "name": "fake-game",
  "version": "1.0.0",
  "description": "A game used by the tests",
  "happyFunTimes": {{
    "name": "Fake Game",
    "gameId": "{game_id}",
    "apiVersion": "1.0.0",
    "category": "game",
    "gameType": "html"
  }}
}}
"#
    )
}

/// Writes a complete game tree named `game_id` under `parent`.
pub fn write_game(parent: &Path, game_id: &str) -> PathBuf {
    let root = parent.join(game_id);
    for rel in FAKEGAME_FILES {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        if rel == "package.json" {
            fs::write(&path, package_json(game_id)).unwrap();
        } else {
            fs::write(&path, format!("contents of {rel}")).unwrap();
        }
    }
    root
}

pub fn fake_game(parent: &Path) -> PathBuf {
    write_game(parent, "fakegame")
}
