//! Strict decoding of a game's `package.json`.
//!
//! Only the typed [`GameManifest`] leaves this module; raw JSON is rejected
//! here if anything the rest of the pipeline relies on is missing.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{HftError, Result};

pub const MANIFEST_FILE: &str = "package.json";

/// Filesystem-safe game identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        if raw.is_empty() {
            return Err("gameId is empty".into());
        }
        if raw.contains("..") {
            return Err(format!("gameId {raw:?} may not contain '..'"));
        }
        // Dot names are reserved for staging and partial files.
        if raw.starts_with('.') {
            return Err(format!("gameId {raw:?} may not start with '.'"));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
        {
            return Err(format!("gameId {raw:?} contains forbidden character {bad:?}"));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GameId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GameId> for String {
    fn from(id: GameId) -> Self {
        id.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for GameId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameManifest {
    pub game_id: GameId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    /// Asset selectors; empty selects the whole source tree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(rename = "happyFunTimes")]
    happy_fun_times: Option<HftSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HftSection {
    game_id: Option<String>,
    name: Option<String>,
    category: Option<String>,
    api_version: Option<String>,
    game_type: Option<String>,
    files: Option<Vec<String>>,
}

pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Read and validate the manifest of the game in `source_dir`.
pub fn read(source_dir: &Path) -> Result<GameManifest> {
    let path = source_dir.join(MANIFEST_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(HftError::ManifestNotFound(source_dir.to_path_buf()));
        }
        Err(err) => {
            return Err(HftError::io(
                format!("failed to read {}", path.display()),
                err,
            ));
        }
    };
    let manifest = decode(&text).map_err(|reason| HftError::ManifestInvalid {
        path: path.clone(),
        reason,
    })?;
    debug!(
        "manifest: read {} ({}) from {}",
        manifest.game_id,
        manifest.name,
        path.display()
    );
    Ok(manifest)
}

/// Decode manifest text. The error is a human-readable reason.
pub fn decode(text: &str) -> std::result::Result<GameManifest, String> {
    let package: PackageJson = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let section = package
        .happy_fun_times
        .ok_or("missing \"happyFunTimes\" section")?;
    let raw_id = section
        .game_id
        .ok_or("missing \"happyFunTimes.gameId\"")?;
    let game_id = GameId::parse(raw_id.trim())?;

    let files = section.files.unwrap_or_default();
    for selector in &files {
        validate_selector(selector)?;
    }

    let name = section
        .name
        .or(package.name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| game_id.to_string());

    Ok(GameManifest {
        game_id,
        name,
        version: package.version.filter(|v| !v.trim().is_empty()),
        description: package.description,
        category: section.category,
        api_version: section.api_version,
        game_type: section.game_type,
        files,
    })
}

fn validate_selector(selector: &str) -> std::result::Result<(), String> {
    if selector.trim().is_empty() {
        return Err("empty entry in \"files\"".into());
    }
    if selector.contains('\\') {
        return Err(format!("files entry {selector:?} must use '/' separators"));
    }
    let as_path = Path::new(selector);
    if as_path.is_absolute()
        || selector.starts_with('/')
        || as_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(format!(
            "files entry {selector:?} must be relative to the game folder"
        ));
    }
    glob::Pattern::new(selector)
        .map(|_| ())
        .map_err(|e| format!("files entry {selector:?} is not a valid pattern: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn reads_fakegame_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let game = testutil::fake_game(dir.path());
        let manifest = read(&game).unwrap();
        assert_eq!(manifest.game_id.as_str(), "fakegame");
        assert_eq!(manifest.name, "Fake Game");
        assert_eq!(manifest.version.as_deref(), Some("1.0.0"));
        assert_eq!(manifest.category.as_deref(), Some("game"));
        assert!(manifest.files.is_empty());
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read(dir.path()).unwrap_err();
        assert!(matches!(err, HftError::ManifestNotFound(_)));
        assert!(!has_manifest(dir.path()));
    }

    #[test]
    fn malformed_json_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        let err = read(dir.path()).unwrap_err();
        assert!(matches!(err, HftError::ManifestInvalid { .. }));
    }

    #[test]
    fn requires_game_id() {
        let err = decode(r#"{"name": "x"}"#).unwrap_err();
        assert!(err.contains("happyFunTimes"));
        let err = decode(r#"{"happyFunTimes": {"category": "game"}}"#).unwrap_err();
        assert!(err.contains("gameId"));
    }

    #[test]
    fn rejects_unsafe_game_ids() {
        for bad in ["", ".", "..", "a/b", "a\\b", "x..y", "c:d", ".hidden", ".fakegame.staging"] {
            assert!(GameId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(GameId::parse("my-game_2.v1").is_ok());
        let text = r#"{"happyFunTimes": {"gameId": "../evil"}}"#;
        assert!(decode(text).is_err());
    }

    #[test]
    fn name_falls_back_to_package_name_then_id() {
        let m = decode(r#"{"name": "pkg", "happyFunTimes": {"gameId": "g"}}"#).unwrap();
        assert_eq!(m.name, "pkg");
        let m = decode(r#"{"happyFunTimes": {"gameId": "g"}}"#).unwrap();
        assert_eq!(m.name, "g");
        assert_eq!(m.version, None);
    }

    #[test]
    fn validates_file_selectors() {
        let ok = decode(r#"{"happyFunTimes": {"gameId": "g", "files": ["*.html", "css/**"]}}"#)
            .unwrap();
        assert_eq!(ok.files, vec!["*.html".to_string(), "css/**".to_string()]);
        for bad in [r#""/etc/passwd""#, r#""../x""#, r#""a\\b""#, r#""""#, r#""[""#] {
            let text = format!(r#"{{"happyFunTimes": {{"gameId": "g", "files": [{bad}]}}}}"#);
            assert!(decode(&text).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn game_id_deserialization_validates() {
        let parsed: std::result::Result<GameId, _> = serde_json::from_str(r#""a/b""#);
        assert!(parsed.is_err());
        let parsed: GameId = serde_json::from_str(r#""fakegame""#).unwrap();
        assert_eq!(parsed.as_str(), "fakegame");
    }
}
