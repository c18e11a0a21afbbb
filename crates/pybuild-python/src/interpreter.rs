use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use pybuild_pep440::Version;
use pybuild_pep508::MarkerEnvironment;

use crate::Error;

/// A Python executable and what it reports about itself.
#[derive(Debug, Clone)]
pub struct Interpreter {
    markers: MarkerEnvironment,
    sys_executable: PathBuf,
    prefix: PathBuf,
    base_prefix: PathBuf,
    scripts: PathBuf,
    sys_path: Vec<PathBuf>,
}

impl Interpreter {
    /// Detect the interpreter info for the given Python executable.
    pub fn query(executable: &Path) -> Result<Self, Error> {
        let info = InterpreterQueryResult::query(executable)?;
        debug!(
            "Found Python {} at {}",
            info.markers.python_full_version.string,
            info.sys_executable.display()
        );
        Ok(Self {
            markers: info.markers,
            sys_executable: info.sys_executable,
            prefix: info.prefix,
            base_prefix: info.base_prefix,
            scripts: info.scripts,
            sys_path: info.sys_path,
        })
    }

    /// Find and query a base interpreter.
    ///
    /// `python` is an executable name or path; without one, `python3` and then `python` are
    /// looked up on `PATH`.
    pub fn find(python: Option<&OsString>) -> Result<Self, Error> {
        let executable = match python {
            Some(python) => which::which(python).map_err(|err| Error::NotFound {
                request: python.to_string_lossy().to_string(),
                err,
            })?,
            None => which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|err| Error::NotFound {
                    request: "python3".to_string(),
                    err,
                })?,
        };
        Self::query(&executable)
    }

    /// Returns the [`MarkerEnvironment`] for this Python executable.
    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    /// Returns the Python version.
    pub fn version(&self) -> &Version {
        &self.markers.python_full_version.version
    }

    pub fn sys_executable(&self) -> &Path {
        &self.sys_executable
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn base_prefix(&self) -> &Path {
        &self.base_prefix
    }

    /// The directory console scripts are installed into.
    pub fn scripts(&self) -> &Path {
        &self.scripts
    }

    /// The module search path, in lookup order.
    pub fn sys_path(&self) -> &[PathBuf] {
        &self.sys_path
    }

    /// Whether this interpreter runs inside a virtual environment.
    pub fn is_virtualenv(&self) -> bool {
        self.prefix != self.base_prefix
    }
}

#[derive(Debug, Deserialize)]
struct InterpreterQueryResult {
    markers: MarkerEnvironment,
    sys_executable: PathBuf,
    prefix: PathBuf,
    base_prefix: PathBuf,
    scripts: PathBuf,
    sys_path: Vec<PathBuf>,
}

impl InterpreterQueryResult {
    fn query(interpreter: &Path) -> Result<Self, Error> {
        let output = Command::new(interpreter)
            .args(["-c", include_str!("get_interpreter_info.py")])
            .output()
            .map_err(|err| Error::PythonSubcommandLaunch {
                interpreter: interpreter.to_path_buf(),
                err,
            })?;

        if !output.status.success() {
            return Err(Error::PythonSubcommandOutput {
                message: format!(
                    "Querying Python at `{}` failed with {}",
                    interpreter.display(),
                    output.status,
                ),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        serde_json::from_slice::<Self>(&output.stdout).map_err(|err| {
            Error::PythonSubcommandOutput {
                message: format!(
                    "Querying Python at `{}` did not return the expected data: {err}",
                    interpreter.display(),
                ),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
        })
    }
}
