use std::fmt;

use crate::registry::InstalledGameEntry;

/// One line of `list` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSummary {
    pub game_id: String,
    pub name: String,
    pub version: Option<String>,
    pub location: Option<String>,
}

impl From<&InstalledGameEntry> for GameSummary {
    fn from(entry: &InstalledGameEntry) -> Self {
        Self {
            game_id: entry.game_id.to_string(),
            name: entry.manifest.name.clone(),
            version: entry.manifest.version.clone(),
            location: entry.location().map(|p| p.display().to_string()),
        }
    }
}

impl fmt::Display for GameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} {}", self.game_id, self.name)?;
        if let Some(version) = &self.version {
            write!(f, " v{version}")?;
        }
        if let Some(location) = &self.location {
            write!(f, "  ({location})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;

    #[test]
    fn summary_line_names_game_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let source = crate::testutil::fake_game(dir.path());
        let entry = InstalledGameEntry::from_source(manifest::read(&source).unwrap(), source.clone());

        let line = GameSummary::from(&entry).to_string();
        assert!(line.starts_with("fakegame "));
        assert!(line.contains("Fake Game v1.0.0"));
        assert!(line.ends_with(&format!("({})", source.display())));
    }
}
