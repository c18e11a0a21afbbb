use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use pybuild_normalize::PackageName;
use pybuild_pep508::Pep508Error;
use pybuild_python::InstallError;
use pybuild_resolver::{ResolutionResult, ResolveError};

use crate::extract::ExtractError;
use crate::filename::FilenameError;
use crate::hook::{Hook, ProtocolError};

/// e.g. `pygraphviz/graphviz_wrap.c:3020:10: fatal error: graphviz/cgraph.h: No such file or directory`
static MISSING_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r".*\.(?:c|c..|h|h..):\d+:\d+: fatal error: (?<header>.*\.(?:h|h..)): No such file or directory",
    )
    .unwrap()
});

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Source {} is not a directory", .0.display())]
    SourceNotDirectory(PathBuf),
    #[error("Source {} does not appear to be a Python project: no pyproject.toml or setup.py", .0.display())]
    NotPythonProject(PathBuf),
    #[error("Failed to parse {}", .0.display())]
    InvalidPyprojectToml(PathBuf, #[source] Box<toml::de::Error>),
    #[error("Failed to validate `build-system` in pyproject.toml: {0}")]
    BuildSystemValidation(String),
    #[error("Invalid requirement `{requirement}` in `build-system.requires`")]
    InvalidBuildRequirement {
        requirement: String,
        #[source]
        err: Box<Pep508Error>,
    },
    #[error(
        "Failed to validate `build-system` in pyproject.toml, dependency cycle detected: `{project}` -> `{backend}` -> `{requirement}`"
    )]
    CircularBuildDependency {
        project: PackageName,
        backend: String,
        requirement: String,
    },
    #[error("Build path {} exists and is not a directory", .0.display())]
    OutputNotDirectory(PathBuf),
    #[error("Missing dependencies:{}", format_missing(.0))]
    MissingDependencies(ResolutionResult),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Failed to install build dependencies")]
    Install(#[from] InstallError),
    #[error("Failed to create the isolated build environment")]
    Virtualenv(#[from] pybuild_virtualenv::Error),
    #[error("Failed to inspect the build environment")]
    Python(#[from] pybuild_python::Error),
    #[error(transparent)]
    Backend(Box<BackendError>),
    #[error("Build backend `{backend}` does not implement the mandatory hook `{hook}`")]
    MissingHook { hook: Hook, backend: String },
    #[error("Failed to call `{hook}` on the build backend")]
    Protocol {
        hook: Hook,
        #[source]
        err: ProtocolError,
    },
    #[error("The build backend returned an invalid result from `{hook}`: {value}")]
    InvalidHookResult {
        hook: Hook,
        value: serde_json::Value,
    },
    #[error("The build backend returned an invalid requirement from `{hook}`: `{requirement}`")]
    InvalidHookRequirement {
        hook: Hook,
        requirement: String,
        #[source]
        err: Box<Pep508Error>,
    },
    #[error("The build backend returned an invalid file name from `{hook}`")]
    InvalidFilename {
        hook: Hook,
        #[source]
        err: FilenameError,
    },
    #[error("The build backend did not create `{}`", .0.display())]
    MissingArtifact(PathBuf),
    #[error("Failed to extract {}", .0.display())]
    Extract(PathBuf, #[source] ExtractError),
    #[error("Failed to read the metadata in {}", .0.display())]
    Metadata(PathBuf, #[source] pybuild_pypi_types::Error),
}

/// `\n\t{root}` for every unsatisfied root, followed by `\n\t{a -> b}` when something below the
/// root broke it. Markers are left out of the chain.
fn format_missing(missing: &ResolutionResult) -> String {
    let mut formatted = String::new();
    for unsatisfied in missing {
        formatted.push_str("\n\t");
        formatted.push_str(unsatisfied.root());
        if let Some(dependency_chain) = unsatisfied.dependency_chain() {
            formatted.push_str("\n\t");
            formatted.push_str(&dependency_chain);
        }
    }
    formatted
}

/// A hook raised inside the build backend.
#[derive(Debug, Error)]
pub struct BackendError {
    pub hook: Hook,
    /// The exception, e.g. `Backend operation failed: ValueError('boom')`.
    pub message: String,
    /// The Python traceback of the exception.
    pub traceback: String,
    /// What the backend wrote to stdout and stderr, if it was captured.
    pub stderr: String,
    /// Nudge the user towards installing the missing dev library.
    #[source]
    pub missing_header_cause: Option<MissingHeaderCause>,
}

impl BackendError {
    pub fn new(hook: Hook, message: String, traceback: String, stderr: String) -> Self {
        // In the cases seen so far the error is among the last few lines.
        let missing_header_cause = stderr.lines().rev().take(10).find_map(|line| {
            Some(MissingHeaderCause {
                header: MISSING_HEADER_RE.captures(line.trim())?["header"].to_string(),
            })
        });
        Self {
            hook,
            message,
            traceback,
            stderr,
            missing_header_cause,
        }
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Build backend failed in `{}`: {}", self.hook, self.message)?;
        if !self.traceback.trim().is_empty() {
            write!(f, "\n--- traceback:\n{}", self.traceback.trim_end())?;
        }
        if !self.stderr.trim().is_empty() {
            write!(f, "\n--- stderr:\n{}", self.stderr.trim_end())?;
        }
        if !self.traceback.trim().is_empty() || !self.stderr.trim().is_empty() {
            write!(f, "\n---")?;
        }
        Ok(())
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Self::Backend(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub struct MissingHeaderCause {
    header: String,
}

impl Display for MissingHeaderCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "This error likely indicates that you need to install a library that provides \"{}\"",
            self.header
        )
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn missing_header() {
        let stderr = indoc! {r#"
            warning: no files found matching '*.png' under directory 'doc'
            [...]
            pygraphviz/graphviz_wrap.c:3020:10: fatal error: graphviz/cgraph.h: No such file or directory
             3020 | #include "graphviz/cgraph.h"
                  |          ^~~~~~~~~~~~~~~~~~~
            compilation terminated.
            error: command '/usr/bin/gcc' failed with exit code 1
        "#};
        let err = BackendError::new(
            Hook::BuildWheel,
            "Backend operation failed: SystemExit(1)".to_string(),
            "Traceback (most recent call last):\n  ...\nSystemExit: 1\n".to_string(),
            stderr.to_string(),
        );
        insta::assert_snapshot!(err, @r#"
        Build backend failed in `build_wheel`: Backend operation failed: SystemExit(1)
        --- traceback:
        Traceback (most recent call last):
          ...
        SystemExit: 1
        --- stderr:
        warning: no files found matching '*.png' under directory 'doc'
        [...]
        pygraphviz/graphviz_wrap.c:3020:10: fatal error: graphviz/cgraph.h: No such file or directory
         3020 | #include "graphviz/cgraph.h"
              |          ^~~~~~~~~~~~~~~~~~~
        compilation terminated.
        error: command '/usr/bin/gcc' failed with exit code 1
        ---
        "#);
        insta::assert_snapshot!(
            std::error::Error::source(&err).unwrap(),
            @r#"This error likely indicates that you need to install a library that provides "graphviz/cgraph.h""#
        );
    }

    #[test]
    fn message_only() {
        let err = BackendError::new(
            Hook::BuildSdist,
            "Backend 'missing_backend' is not available.".to_string(),
            String::new(),
            String::new(),
        );
        assert!(err.missing_header_cause.is_none());
        insta::assert_snapshot!(err, @"Build backend failed in `build_sdist`: Backend 'missing_backend' is not available.");
    }
}
