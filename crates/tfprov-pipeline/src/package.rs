//! Packs a staged configuration directory into the `.tar.gz` archive an
//! API-driven configuration version expects.

use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;

use crate::error::ProvisionError;

/// Directory names never shipped to the remote.
const EXCLUDED_DIRS: &[&str] = &[".git", ".terraform"];

/// Build the archive synchronously. Entries are sorted and carry
/// deterministic headers, so identical trees yield identical bytes.
pub fn package_dir(source: &Path) -> Result<Vec<u8>, ProvisionError> {
    if !source.is_dir() {
        return Err(ProvisionError::not_found(
            "configuration directory",
            source.display().to_string(),
        ));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.mode(tar::HeaderMode::Deterministic);

    let walker = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && EXCLUDED_DIRS.iter().any(|d| e.file_name() == *d))
        });

    let mut files = 0usize;
    for entry in walker {
        let entry = entry.map_err(|e| ProvisionError::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ProvisionError::Config(format!("Bad archive path: {e}")))?;
        if entry.file_type().is_dir() {
            tar.append_dir(relative, entry.path())?;
        } else if entry.file_type().is_file() {
            tar.append_path_with_name(entry.path(), relative)?;
            files += 1;
        }
    }

    let bytes = tar.into_inner()?.finish()?;
    tracing::debug!(
        source = %source.display(),
        files,
        bytes = bytes.len(),
        "Packaged configuration"
    );
    Ok(bytes)
}

/// [`package_dir`] on the blocking pool.
pub async fn package(source: PathBuf) -> Result<Vec<u8>, ProvisionError> {
    tokio::task::spawn_blocking(move || package_dir(&source))
        .await
        .map_err(|e| ProvisionError::UnexpectedRemote(format!("Packaging task failed: {e}")))?
}
