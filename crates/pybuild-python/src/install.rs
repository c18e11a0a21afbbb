use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

/// Populating an environment failed.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Failed to write the requirements file")]
    RequirementsFile(#[source] io::Error),
    #[error("Failed to run the installer at `{}`", python.display())]
    Launch {
        python: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("Failed to install requirements ({requirements}), installer exited with {exit_code}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    Installer {
        requirements: String,
        exit_code: String,
        stdout: String,
        stderr: String,
    },
    #[error("Installing requirements ({requirements}) into the ambient environment is disabled")]
    NotIsolated { requirements: String },
}

/// Install requirements with `pip` from the given interpreter.
///
/// The requirements go through a temporary requirements file so that markers and URLs reach
/// `pip` unchanged. They are installed sorted, which keeps the installer's output stable.
pub fn pip_install(python: &Path, requirements: &[String]) -> Result<(), InstallError> {
    if requirements.is_empty() {
        return Ok(());
    }
    let requirements: Vec<&str> = requirements
        .iter()
        .map(String::as_str)
        .sorted_unstable()
        .dedup()
        .collect();
    info!("Installing build dependencies... ({})", requirements.join(", "));

    let mut requirements_file = tempfile::Builder::new()
        .prefix("build-reqs-")
        .suffix(".txt")
        .tempfile()
        .map_err(InstallError::RequirementsFile)?;
    for requirement in &requirements {
        writeln!(requirements_file, "{requirement}").map_err(InstallError::RequirementsFile)?;
    }
    requirements_file
        .flush()
        .map_err(InstallError::RequirementsFile)?;

    let mut command = Command::new(python);
    command
        .args(["-m", "pip", "install", "--use-pep517", "-r"])
        .arg(requirements_file.path());
    debug!("Running {command:?}");
    let output = command.output().map_err(|err| InstallError::Launch {
        python: python.to_path_buf(),
        err,
    })?;

    if !output.status.success() {
        return Err(InstallError::Installer {
            requirements: requirements.join(", "),
            exit_code: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
