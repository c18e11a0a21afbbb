use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use pybuild_normalize::PackageName;
use pybuild_pypi_types::InstalledDistribution;
use pybuild_resolver::InstalledPackages;

use crate::{Error, Interpreter};

/// An index of the distributions importable from an interpreter.
///
/// Entries earlier on `sys.path` shadow later ones with the same name, as with
/// `importlib.metadata`.
#[derive(Debug, Default, Clone)]
pub struct SitePackages(BTreeMap<PackageName, InstalledDistribution>);

impl SitePackages {
    /// Build an index of the distributions visible on the interpreter's `sys.path`.
    pub fn from_interpreter(interpreter: &Interpreter) -> Result<Self, Error> {
        Self::from_paths(interpreter.sys_path())
    }

    /// Build an index from the `.dist-info` and `.egg-info` entries in the given directories.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, Error> {
        let mut index = BTreeMap::new();
        for path in paths {
            if !path.is_dir() {
                continue;
            }
            for entry in fs_err::read_dir(path)? {
                let entry = entry?;
                let Some(distribution) = Self::read_entry(&entry.path()) else {
                    continue;
                };
                match index.entry(distribution.name.clone()) {
                    Entry::Vacant(entry) => {
                        entry.insert(distribution);
                    }
                    Entry::Occupied(entry) => {
                        debug!(
                            "Ignoring {} {} in {}, shadowed by {}",
                            distribution.name,
                            distribution.version,
                            path.display(),
                            entry.get().version
                        );
                    }
                }
            }
        }
        Ok(Self(index))
    }

    /// Try to read a (potential) `.dist-info` directory or legacy `.egg-info` directory or file.
    ///
    /// See: <https://packaging.python.org/en/latest/specifications/recording-installed-packages/>
    fn read_entry(path: &Path) -> Option<InstalledDistribution> {
        let distribution = match path.extension() {
            // Ex) `pip-24.0.dist-info`
            Some(ext) if ext == "dist-info" && path.is_dir() => {
                InstalledDistribution::read_dist_info(path)
            }
            // Ex) `setuptools-68.1.2.egg-info` (directory) or `distro-1.7.0.egg-info` (file)
            Some(ext) if ext == "egg-info" => InstalledDistribution::read_egg_info(path),
            _ => return None,
        };
        match distribution {
            Ok(distribution) => Some(distribution),
            Err(err) => {
                warn!("Ignoring invalid distribution at {}: {err}", path.display());
                None
            }
        }
    }

    /// Returns an iterator over the installed packages.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledDistribution> {
        self.0.values()
    }

    pub fn get(&self, name: &PackageName) -> Option<&InstalledDistribution> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<InstalledDistribution> for SitePackages {
    fn from_iter<T: IntoIterator<Item = InstalledDistribution>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|distribution| (distribution.name.clone(), distribution))
                .collect(),
        )
    }
}

impl InstalledPackages for SitePackages {
    fn get_package(&self, name: &PackageName) -> Option<&InstalledDistribution> {
        self.get(name)
    }
}
