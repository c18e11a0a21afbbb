//! A throwaway virtual environment, created per build step and removed when it is released or
//! dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use pybuild_pep508::MarkerEnvironment;
use pybuild_python::{InstallError, Interpreter, PythonEnvironment, SitePackages};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to create temporary virtual environment")]
    TempDir(#[source] io::Error),
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    Command {
        message: String,
        stdout: String,
        stderr: String,
    },
    #[error("Virtual environment creation failed, executable `{}` missing", .0.display())]
    MissingExecutable(PathBuf),
    #[error(transparent)]
    Interpreter(#[from] pybuild_python::Error),
}

impl Error {
    fn from_command_output(message: String, output: &Output) -> Self {
        Self::Command {
            message,
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// A virtual environment in a temporary directory, seeded with `pip` only.
///
/// The directory is owned by this value: it is removed by [`IsolatedEnvironment::release`] or on
/// drop, whichever comes first.
#[derive(Debug)]
pub struct IsolatedEnvironment {
    temp_dir: Option<TempDir>,
    root: PathBuf,
    interpreter: Interpreter,
}

impl IsolatedEnvironment {
    /// Create a new environment from a base interpreter.
    pub fn create(base: &Interpreter) -> Result<Self, Error> {
        let temp_dir = tempfile::Builder::new()
            .prefix("build-env-")
            .tempdir()
            .map_err(Error::TempDir)?;
        // Resolve symlinks such as `/tmp` -> `/private/tmp` up front, so the paths Python reports
        // match ours.
        let root = fs_err::canonicalize(temp_dir.path())?;

        info!("Creating isolated environment (venv)...");
        run(
            Command::new(base.sys_executable())
                .args(["-m", "venv"])
                .arg(&root),
            "Failed to create virtual environment",
        )?;

        let executable = venv_python(&root);
        if !executable.exists() {
            return Err(Error::MissingExecutable(executable));
        }

        // The `setuptools` seeded by `ensurepip` on older Pythons would leak into every build.
        run(
            Command::new(&executable).args(["-m", "pip", "uninstall", "setuptools", "-y"]),
            "Failed to remove setuptools from the virtual environment",
        )?;

        let interpreter = Interpreter::query(&executable)?;
        debug!("Created isolated environment at {}", root.display());
        Ok(Self {
            temp_dir: Some(temp_dir),
            root,
            interpreter,
        })
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Whether the environment's directory has been removed.
    pub fn is_released(&self) -> bool {
        self.temp_dir.is_none()
    }

    /// Remove the environment from disk. Calling this more than once is a no-op.
    pub fn release(&mut self) -> Result<(), Error> {
        if let Some(temp_dir) = self.temp_dir.take() {
            debug!("Removing isolated environment at {}", self.root.display());
            temp_dir.close()?;
        }
        Ok(())
    }
}

impl Drop for IsolatedEnvironment {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(
                "Failed to remove isolated environment at {}: {err}",
                self.root.display()
            );
        }
    }
}

impl PythonEnvironment for IsolatedEnvironment {
    fn executable(&self) -> &Path {
        self.interpreter.sys_executable()
    }

    fn scripts(&self) -> Option<&Path> {
        Some(self.interpreter.scripts())
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn markers(&self) -> &MarkerEnvironment {
        self.interpreter.markers()
    }

    fn installed(&self) -> Result<SitePackages, pybuild_python::Error> {
        SitePackages::from_interpreter(&self.interpreter)
    }

    fn install(&self, requirements: &[String]) -> Result<(), InstallError> {
        pybuild_python::pip_install(self.executable(), requirements)
    }
}

/// Returns the path to the `python` executable inside a virtual environment.
fn venv_python(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts").join("python.exe")
    } else {
        root.join("bin").join("python")
    }
}

fn run(command: &mut Command, message: &str) -> Result<(), Error> {
    debug!("Running {command:?}");
    let output = command.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::from_command_output(
            format!("{message} ({})", output.status),
            &output,
        ))
    }
}
