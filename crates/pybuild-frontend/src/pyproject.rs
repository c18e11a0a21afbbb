//! The `[build-system]` table of `pyproject.toml`.
//!
//! <https://peps.python.org/pep-0517/#source-trees>
//! <https://peps.python.org/pep-0518/#build-system-table>

use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use toml::{Table, Value};
use tracing::{debug, warn};

use pybuild_normalize::PackageName;
use pybuild_pep508::Requirement;

use crate::Error;

/// The backend used when a project doesn't declare one.
pub const DEFAULT_BACKEND: &str = "setuptools.build_meta:__legacy__";

/// The requirement that comes with [`DEFAULT_BACKEND`].
pub const DEFAULT_REQUIRES: &str = "setuptools >= 40.8.0";

/// A validated `[build-system]` table, or the fallback for projects without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSystem {
    /// `build-system.requires`, each a valid PEP 508 requirement, kept as written.
    pub requires: Vec<String>,
    /// `build-system.build-backend` such as `setuptools.build_meta:__legacy__` or `flit_core.buildapi`.
    pub build_backend: String,
    /// `build-system.backend-path`, absolute and inside the source tree.
    ///
    /// <https://peps.python.org/pep-0517/#in-tree-build-backends>
    pub backend_path: Vec<PathBuf>,
}

impl BuildSystem {
    /// Read and validate the build system of the project in `source_tree`.
    ///
    /// A missing `pyproject.toml` is fine as long as there's a `setup.py`; both missing
    /// `pyproject.toml` and missing `[build-system]` select [`DEFAULT_BACKEND`].
    pub fn from_source_tree(source_tree: &Path) -> Result<Self, Error> {
        if !source_tree.is_dir() {
            return Err(Error::SourceNotDirectory(source_tree.to_path_buf()));
        }

        let pyproject_toml = source_tree.join("pyproject.toml");
        let table = match fs_err::read_to_string(&pyproject_toml) {
            Ok(contents) => toml::from_str::<Table>(&contents)
                .map_err(|err| Error::InvalidPyprojectToml(pyproject_toml, Box::new(err)))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if !source_tree.join("setup.py").is_file() {
                    return Err(Error::NotPythonProject(source_tree.to_path_buf()));
                }
                debug!("No pyproject.toml, using the setuptools fallback backend");
                Table::new()
            }
            Err(err) => return Err(err.into()),
        };

        Self::from_pyproject(&table, source_tree)
    }

    /// Validate the `[build-system]` table of an already parsed `pyproject.toml`.
    pub fn from_pyproject(pyproject: &Table, source_tree: &Path) -> Result<Self, Error> {
        let Some(build_system) = pyproject.get("build-system") else {
            warn_typos(pyproject, "build-system");
            return Ok(Self::fallback());
        };
        let Some(build_system) = build_system.as_table() else {
            return Err(Error::BuildSystemValidation(
                "`build-system` must be a table".to_string(),
            ));
        };

        let Some(requires) = build_system.get("requires") else {
            warn_typos(build_system, "requires");
            return Err(Error::BuildSystemValidation(
                "`requires` is a required property".to_string(),
            ));
        };
        let mut requires = string_array(requires).ok_or_else(|| {
            Error::BuildSystemValidation("`requires` must be an array of strings".to_string())
        })?;

        let build_backend = match build_system.get("build-backend") {
            None => {
                warn_typos(build_system, "build-backend");
                None
            }
            Some(Value::String(build_backend)) => Some(build_backend.clone()),
            Some(_) => {
                return Err(Error::BuildSystemValidation(
                    "`build-backend` must be a string".to_string(),
                ));
            }
        };

        let backend_path = match build_system.get("backend-path") {
            None => Vec::new(),
            Some(backend_path) => string_array(backend_path).ok_or_else(|| {
                Error::BuildSystemValidation(
                    "`backend-path` must be an array of strings".to_string(),
                )
            })?,
        };

        let unknown = build_system
            .keys()
            .filter(|key| !matches!(key.as_str(), "requires" | "build-backend" | "backend-path"))
            .sorted()
            .join(", ");
        if !unknown.is_empty() {
            return Err(Error::BuildSystemValidation(format!(
                "Unknown properties: {unknown}"
            )));
        }

        let parsed = requires
            .iter()
            .map(|requirement| {
                Requirement::from_str(requirement).map_err(|err| Error::InvalidBuildRequirement {
                    requirement: requirement.clone(),
                    err: Box::new(err),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let build_backend = if let Some(build_backend) = build_backend {
            build_backend
        } else {
            // Without a backend we fall back to setuptools, which then needs to be installed.
            if !parsed
                .iter()
                .any(|requirement| requirement.name.as_ref() == "setuptools")
            {
                requires.push(DEFAULT_REQUIRES.to_string());
            }
            DEFAULT_BACKEND.to_string()
        };

        if let Some(project) = project_name(pyproject) {
            if let Some((requirement, _)) = requires
                .iter()
                .zip(&parsed)
                .find(|(_, parsed)| parsed.name == project)
            {
                return Err(Error::CircularBuildDependency {
                    project,
                    backend: build_backend,
                    requirement: requirement.clone(),
                });
            }
        }

        let root = normalize_path(source_tree);
        let backend_path = backend_path
            .into_iter()
            .map(|entry| {
                let path = normalize_path(&root.join(&entry));
                if path.starts_with(&root) {
                    Ok(path)
                } else {
                    Err(Error::BuildSystemValidation(format!(
                        "`backend-path` entry `{entry}` is outside the source tree"
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            requires,
            build_backend,
            backend_path,
        })
    }

    /// The legacy setuptools backend, for projects that don't declare a backend.
    pub fn fallback() -> Self {
        Self {
            requires: vec![DEFAULT_REQUIRES.to_string()],
            build_backend: DEFAULT_BACKEND.to_string(),
            backend_path: Vec::new(),
        }
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(ToString::to_string))
        .collect()
}

/// `project.name`, if present and valid.
fn project_name(pyproject: &Table) -> Option<PackageName> {
    let name = pyproject.get("project")?.as_table()?.get("name")?.as_str()?;
    PackageName::from_str(name).ok()
}

/// Warn about keys that are spelled like `expected` but aren't, e.g. `build_system`.
fn warn_typos(table: &Table, expected: &str) {
    for key in table.keys() {
        if key != expected && key.to_lowercase().replace('_', "-") == expected {
            warn!("Found `{key}` in pyproject.toml, did you mean `{expected}`?");
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            component => normalized.push(component.as_os_str()),
        }
    }
    normalized
}
