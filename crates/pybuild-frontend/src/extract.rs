use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use fs_err as fs;
use fs_err::{DirEntry, File};
use regex::Regex;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, instrument};
use zip::ZipArchive;

/// Entries below the `.dist-info` directory of a wheel, e.g. `foo-1.0.dist-info/METADATA`.
static DIST_INFO_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/\\]+-[^/\\]+\.dist-info/").unwrap());

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to read zip file")]
    Zip(#[from] zip::result::ZipError),
    #[error("Unsupported archive format (extension not recognized): {0}")]
    UnsupportedArchiveType(String),
    #[error("Invalid source distribution: {0}")]
    InvalidSourceDist(String),
    #[error("No `.dist-info` directory found in wheel")]
    MissingDistInfo,
    #[error("Archive entry `{0}` would be written outside of the target directory")]
    UnsafePath(String),
}

/// Unpack a source distribution (`.tar.gz` or `.zip`) into `target`, returning the directory
/// with the `pyproject.toml`/`setup.py`.
#[instrument(skip_all, fields(sdist = %sdist.display()))]
pub(crate) fn extract_sdist(sdist: &Path, target: &Path) -> Result<PathBuf, ExtractError> {
    let filename = sdist
        .file_name()
        .unwrap_or(sdist.as_os_str())
        .to_string_lossy()
        .to_string();
    if filename.to_ascii_lowercase().ends_with(".tar.gz") {
        let mut archive = Archive::new(GzDecoder::new(File::open(sdist)?));
        archive.unpack(target)?;
    } else if filename.to_ascii_lowercase().ends_with(".zip") {
        let mut archive = ZipArchive::new(File::open(sdist)?)?;
        archive.extract(target)?;
    } else {
        return Err(ExtractError::UnsupportedArchiveType(filename));
    }

    // > A .tar.gz source distribution (sdist) contains a single top-level directory called
    // > `{name}-{version}` (e.g. foo-1.0), containing the source files of the package.
    let top_level = fs::read_dir(target)?.collect::<io::Result<Vec<DirEntry>>>()?;
    let [root] = top_level.as_slice() else {
        return Err(ExtractError::InvalidSourceDist(format!(
            "The top level of the archive must only contain a single directory, but it contains {} entries",
            top_level.len()
        )));
    };
    if !root.file_type()?.is_dir() {
        return Err(ExtractError::InvalidSourceDist(format!(
            "The top level of the archive must be a directory, but `{}` is a file",
            root.file_name().to_string_lossy()
        )));
    }
    debug!("Extracted sdist to {}", root.path().display());
    Ok(root.path())
}

/// Extract only the `.dist-info` directory of a wheel into `target`, returning its name.
#[instrument(skip_all, fields(wheel = %wheel.display()))]
pub(crate) fn extract_dist_info(wheel: &Path, target: &Path) -> Result<String, ExtractError> {
    let mut archive = ZipArchive::new(File::open(wheel)?)?;

    let mut dist_info = None;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !DIST_INFO_ENTRY.is_match(entry.name()) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::UnsafePath(entry.name().to_string()));
        };
        if dist_info.is_none() {
            dist_info = entry
                .name()
                .split('/')
                .next()
                .map(ToString::to_string);
        }

        let path = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        io::copy(&mut entry, &mut file)?;
    }

    dist_info.ok_or(ExtractError::MissingDistInfo)
}
