//! The Python side of a build: interpreters, the packages installed next to them, and the
//! [`PythonEnvironment`] trait that build backends are run in.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use crate::environment::{AmbientEnvironment, PythonEnvironment};
pub use crate::install::{InstallError, pip_install};
pub use crate::interpreter::Interpreter;
pub use crate::site_packages::SitePackages;

mod environment;
mod install;
mod interpreter;
mod site_packages;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to find a Python interpreter for `{request}`")]
    NotFound {
        request: String,
        #[source]
        err: which::Error,
    },
    #[error("Failed to run Python at `{}`", interpreter.display())]
    PythonSubcommandLaunch {
        interpreter: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("{message}:\n--- stdout:\n{stdout}\n--- stderr:\n{stderr}\n---")]
    PythonSubcommandOutput {
        message: String,
        stdout: String,
        stderr: String,
    },
}
