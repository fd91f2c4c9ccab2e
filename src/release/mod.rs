use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use log::{debug, info, warn};
use serde::Serialize;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{HftError, Result};
use crate::manifest::{self, GameManifest, MANIFEST_FILE};
use crate::util::{format_size, is_hidden, sha256_file, slash_relative};

const SELECTOR_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Descriptor of an archive produced by [`ReleaseBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseArchive {
    pub filename: PathBuf,
    pub game_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub size: u64,
    pub sha256: String,
    /// Entry names in archive order.
    pub files: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ReleaseBuilder {
    dest_dir: PathBuf,
}

impl ReleaseBuilder {
    pub fn new(dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    /// Package `src` if it is a game, otherwise every game directly below it.
    pub fn build_all(&self, src: &Path) -> Result<Vec<ReleaseArchive>> {
        if manifest::has_manifest(src) {
            return Ok(vec![self.build(src)?]);
        }

        let mut games = Vec::new();
        let entries = fs::read_dir(src)
            .map_err(|e| HftError::io(format!("failed to read {}", src.display()), e))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| HftError::io(format!("failed to read {}", src.display()), e))?;
            let path = entry.path();
            if path.is_dir() && manifest::has_manifest(&path) {
                games.push(path);
            }
        }
        if games.is_empty() {
            return Err(HftError::ManifestNotFound(src.to_path_buf()));
        }
        games.sort();
        info!("release: found {} games under {}", games.len(), src.display());

        games.iter().map(|game| self.build(game)).collect()
    }

    pub fn build(&self, source_dir: &Path) -> Result<ReleaseArchive> {
        let manifest = manifest::read(source_dir)?;
        let assets = collect_assets(source_dir, &manifest, Some(&self.dest_dir))?;

        fs::create_dir_all(&self.dest_dir)
            .map_err(|e| HftError::build_io(&self.dest_dir, e))?;
        let name = archive_name(&manifest);
        let target = self.dest_dir.join(&name);
        let partial = self.dest_dir.join(format!(".{name}.partial"));

        info!(
            "release: packaging {} ({} files) into {}",
            manifest.game_id,
            assets.len(),
            target.display()
        );
        let written = write_archive(&partial, source_dir, manifest.game_id.as_str(), &assets)
            .and_then(|files| {
                fs::rename(&partial, &target)
                    .map_err(|e| HftError::build_io(&target, e))
                    .map(|()| files)
            });
        let files = match written {
            Ok(files) => files,
            Err(err) => {
                discard_partial(&partial);
                return Err(err);
            }
        };

        let size = fs::metadata(&target)
            .map_err(|e| HftError::build_io(&target, e))?
            .len();
        let sha256 = sha256_file(&target).map_err(|e| HftError::build_io(&target, e))?;
        let filename = std::path::absolute(&target).unwrap_or(target);
        info!(
            "release: wrote {} ({})",
            filename.display(),
            format_size(size)
        );

        Ok(ReleaseArchive {
            filename,
            game_id: manifest.game_id.to_string(),
            version: manifest.version.clone(),
            size,
            sha256,
            files,
        })
    }
}

/// `<gameId>-<version>.zip`, or `<gameId>.zip` for unversioned games.
pub fn archive_name(manifest: &GameManifest) -> String {
    match &manifest.version {
        Some(version) => format!("{}-{}.zip", manifest.game_id, sanitize(version)),
        None => format!("{}.zip", manifest.game_id),
    }
}

fn sanitize(version: &str) -> String {
    version
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Relative `/`-separated paths of every file the game ships, sorted.
///
/// `skip` excludes a directory inside the source tree (the release output).
pub fn collect_assets(
    source_dir: &Path,
    manifest: &GameManifest,
    skip: Option<&Path>,
) -> Result<Vec<String>> {
    let selectors = manifest
        .files
        .iter()
        .map(|raw| {
            let trimmed = raw.trim_end_matches('/');
            Pattern::new(trimmed)
                .map(|pattern| (raw.as_str(), pattern))
                .map_err(|e| HftError::ManifestInvalid {
                    path: source_dir.join(MANIFEST_FILE),
                    reason: format!("files entry {raw:?}: {e}"),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    let mut matched = vec![false; selectors.len()];

    let skip = skip.and_then(|dir| fs::canonicalize(dir).ok());
    let mut assets = Vec::new();
    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source_dir.to_path_buf());
            HftError::build_io(path, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        if let Some(skip) = &skip
            && fs::canonicalize(path).is_ok_and(|p| p.starts_with(skip))
        {
            debug!("release: skipping output file {}", path.display());
            continue;
        }
        if !path.is_file() {
            debug!("release: skipping non-file {}", path.display());
            continue;
        }
        let rel = slash_relative(source_dir, path).ok_or_else(|| {
            HftError::build_io(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "path is not valid UTF-8"),
            )
        })?;

        let mut include = selectors.is_empty() || rel == MANIFEST_FILE;
        for (i, (_, pattern)) in selectors.iter().enumerate() {
            if selector_matches(pattern, &rel) {
                matched[i] = true;
                include = true;
            }
        }
        if include {
            assets.push(rel);
        }
    }

    for ((raw, _), hit) in selectors.iter().zip(&matched) {
        if !hit && !raw.contains(['*', '?', '[']) {
            return Err(HftError::build_io(
                source_dir.join(raw),
                io::Error::new(io::ErrorKind::NotFound, "declared file does not exist"),
            ));
        }
        if !hit {
            warn!("release: files pattern {raw:?} matched nothing");
        }
    }

    assets.sort();
    Ok(assets)
}

/// A selector names a file, or a folder whose contents are all included.
fn selector_matches(pattern: &Pattern, rel: &str) -> bool {
    if pattern.matches_with(rel, SELECTOR_MATCH) {
        return true;
    }
    rel.match_indices('/')
        .any(|(end, _)| pattern.matches_with(&rel[..end], SELECTOR_MATCH))
}

fn write_archive(
    target: &Path,
    source_dir: &Path,
    game_id: &str,
    assets: &[String],
) -> Result<Vec<String>> {
    let file = File::create(target).map_err(|e| HftError::build_io(target, e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    // Fixed metadata keeps repeated builds byte-identical.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut files = Vec::with_capacity(assets.len());
    for rel in assets {
        let source = source_dir.join(rel);
        let mut input = File::open(&source).map_err(|e| HftError::build_io(&source, e))?;
        let name = format!("{game_id}/{rel}");
        zip.start_file(name.clone(), options)
            .map_err(|e| HftError::build_io(target, io::Error::other(e)))?;
        io::copy(&mut input, &mut zip).map_err(|e| HftError::build_io(&source, e))?;
        debug!("release: added {name}");
        files.push(name);
    }

    let mut writer = zip
        .finish()
        .map_err(|e| HftError::build_io(target, io::Error::other(e)))?;
    writer.flush().map_err(|e| HftError::build_io(target, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| HftError::build_io(target, e.into_error()))?;
    file.sync_all().map_err(|e| HftError::build_io(target, e))?;
    Ok(files)
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => debug!("release: removed partial {}", partial.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            "release: failed to remove partial {}: {err}",
            partial.display()
        ),
    }
}
