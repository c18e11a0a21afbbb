use std::path::{Path, PathBuf};

use pybuild_normalize::{ExtraName, PackageName};
use pybuild_pep440::Version;
use pybuild_pep508::Requirement;

use crate::{Error, Metadata, RequiresTxt};

/// A distribution installed into an environment, as seen through its `.dist-info` or legacy
/// `.egg-info` metadata.
///
/// This is a read-only snapshot: it is taken once per dependency check and never refreshed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InstalledDistribution {
    pub name: PackageName,
    pub version: Version,
    pub requires_dist: Vec<Requirement>,
    pub provides_extras: Vec<ExtraName>,
    /// The `.dist-info` or `.egg-info` path, if the distribution was read from disk.
    pub path: Option<PathBuf>,
}

impl InstalledDistribution {
    /// Read the distribution from a `.dist-info` directory.
    pub fn read_dist_info(path: &Path) -> Result<Self, Error> {
        let content = fs_err::read(path.join("METADATA"))?;
        let metadata = Metadata::parse_metadata(&content)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::from(metadata)
        })
    }

    /// Read the distribution from an `.egg-info` directory or file.
    ///
    /// Directories (setuptools, `setup.py develop`) hold a `PKG-INFO` and, if the distribution has
    /// dependencies, a `requires.txt`. Files (distutils) are the `PKG-INFO` themselves.
    pub fn read_egg_info(path: &Path) -> Result<Self, Error> {
        if path.is_file() {
            let metadata = Metadata::parse_metadata(&fs_err::read(path)?)?;
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::from(metadata)
            });
        }

        let metadata = Metadata::parse_metadata(&fs_err::read(path.join("PKG-INFO"))?)?;
        let requires_txt = path.join("requires.txt");
        let (requires_dist, provides_extras) = if requires_txt.is_file() {
            let RequiresTxt {
                requires_dist,
                provides_extras,
            } = RequiresTxt::parse(&fs_err::read(&requires_txt)?)?;
            let mut extras = metadata.provides_extras;
            for extra in provides_extras {
                if !extras.contains(&extra) {
                    extras.push(extra);
                }
            }
            (requires_dist, extras)
        } else {
            (metadata.requires_dist, metadata.provides_extras)
        };
        Ok(Self {
            name: metadata.name,
            version: metadata.version,
            requires_dist,
            provides_extras,
            path: Some(path.to_path_buf()),
        })
    }

    /// Whether the distribution declares the given extra.
    pub fn provides_extra(&self, extra: &ExtraName) -> bool {
        self.provides_extras.contains(extra)
    }
}

impl From<Metadata> for InstalledDistribution {
    fn from(metadata: Metadata) -> Self {
        Self {
            name: metadata.name,
            version: metadata.version,
            requires_dist: metadata.requires_dist,
            provides_extras: metadata.provides_extras,
            path: None,
        }
    }
}
