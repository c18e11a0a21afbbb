//! The file names backends must give their artifacts.
//!
//! <https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-name-convention>
//! <https://packaging.python.org/en/latest/specifications/source-distribution-format/#source-distribution-file-name>

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use pybuild_normalize::{InvalidNameError, PackageName};
use pybuild_pep440::{Version, VersionParseError};

use crate::BuildKind;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
    pub build_tag: Option<String>,
    pub python_tag: Vec<String>,
    pub abi_tag: Vec<String>,
    pub platform_tag: Vec<String>,
}

impl FromStr for WheelFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            FilenameError::InvalidWheelFilename(filename.to_string(), reason.to_string())
        };

        reject_paths(filename)?;
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| invalid("Must end with .whl"))?;

        // Five parts, or six if the third one is a build tag.
        let parts = stem.split('-').collect::<Vec<_>>();
        let (name, version, build_tag, python_tag, abi_tag, platform_tag) = match parts.as_slice() {
            [name, version, python_tag, abi_tag, platform_tag] => {
                (*name, *version, None, *python_tag, *abi_tag, *platform_tag)
            }
            [name, version, build_tag, python_tag, abi_tag, platform_tag] => {
                if !build_tag.starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(invalid("The build tag must start with a digit"));
                }
                (
                    *name,
                    *version,
                    Some((*build_tag).to_string()),
                    *python_tag,
                    *abi_tag,
                    *platform_tag,
                )
            }
            [_] => return Err(invalid("Must have a version")),
            [_, _] => return Err(invalid("Must have a Python tag")),
            [_, _, _] => return Err(invalid("Must have an ABI tag")),
            [_, _, _, _] => return Err(invalid("Must have a platform tag")),
            _ => return Err(invalid("Must have 5 or 6 components, but has more")),
        };

        let (name, version) = parse_name_and_version(filename, name, version)?;
        Ok(Self {
            name,
            version,
            build_tag,
            python_tag: python_tag.split('.').map(String::from).collect(),
            abi_tag: abi_tag.split('.').map(String::from).collect(),
            platform_tag: platform_tag.split('.').map(String::from).collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-", self.name.as_dist_info_name(), self.version)?;
        if let Some(build_tag) = &self.build_tag {
            write!(f, "{build_tag}-")?;
        }
        write!(
            f,
            "{}-{}-{}.whl",
            self.python_tag.join("."),
            self.abi_tag.join("."),
            self.platform_tag.join(".")
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SourceDistExtension {
    TarGz,
    /// Legacy sdists, still produced by some backends.
    Zip,
}

impl Display for SourceDistExtension {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TarGz => f.write_str("tar.gz"),
            Self::Zip => f.write_str("zip"),
        }
    }
}

impl SourceDistExtension {
    pub fn from_filename(filename: &str) -> Option<(&str, Self)> {
        if let Some(stem) = filename.strip_suffix(".tar.gz") {
            return Some((stem, Self::TarGz));
        }
        if let Some(stem) = filename.strip_suffix(".zip") {
            return Some((stem, Self::Zip));
        }
        None
    }
}

/// `{name}-{version}.tar.gz`.
///
/// The version can't contain a dash, so the name is everything before the last one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
    pub extension: SourceDistExtension,
}

impl SourceDistFilename {
    /// The name of the single top-level directory inside the archive.
    pub fn stem(&self, filename: &str) -> String {
        filename
            .strip_suffix(&format!(".{}", self.extension))
            .unwrap_or(filename)
            .to_string()
    }
}

impl FromStr for SourceDistFilename {
    type Err = FilenameError;

    fn from_str(filename: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            FilenameError::InvalidSdistFilename(filename.to_string(), reason.to_string())
        };

        reject_paths(filename)?;
        let (stem, extension) = SourceDistExtension::from_filename(filename)
            .ok_or_else(|| invalid("Must end with .tar.gz or .zip"))?;
        let (name, version) = stem
            .rsplit_once('-')
            .ok_or_else(|| invalid("Must have a version"))?;
        let (name, version) = parse_name_and_version(filename, name, version)?;
        Ok(Self {
            name,
            version,
            extension,
        })
    }
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}.{}",
            self.name.as_dist_info_name(),
            self.version,
            self.extension
        )
    }
}

/// Check that a backend returned a well-formed file name for the kind of artifact it was asked
/// to build.
pub fn validate_filename(kind: BuildKind, filename: &str) -> Result<(), FilenameError> {
    match kind {
        BuildKind::Sdist => SourceDistFilename::from_str(filename).map(|_| ()),
        BuildKind::Wheel => WheelFilename::from_str(filename).map(|_| ()),
    }
}

fn reject_paths(filename: &str) -> Result<(), FilenameError> {
    if filename.contains(['/', '\\']) || filename.is_empty() {
        return Err(FilenameError::NotAFilename(filename.to_string()));
    }
    Ok(())
}

fn parse_name_and_version(
    filename: &str,
    name: &str,
    version: &str,
) -> Result<(PackageName, Version), FilenameError> {
    let name = PackageName::from_str(name)
        .map_err(|err| FilenameError::InvalidPackageName(filename.to_string(), err))?;
    let version = Version::from_str(version)
        .map_err(|err| FilenameError::InvalidVersion(filename.to_string(), err))?;
    Ok((name, version))
}

#[derive(Error, Debug)]
pub enum FilenameError {
    #[error("Expected a file name, got a path: \"{0}\"")]
    NotAFilename(String),
    #[error("The wheel filename \"{0}\" is invalid: {1}")]
    InvalidWheelFilename(String, String),
    #[error("The source distribution filename \"{0}\" is invalid: {1}")]
    InvalidSdistFilename(String, String),
    #[error("The filename \"{0}\" has an invalid package name")]
    InvalidPackageName(String, #[source] InvalidNameError),
    #[error("The filename \"{0}\" has an invalid version part")]
    InvalidVersion(String, #[source] VersionParseError),
}
