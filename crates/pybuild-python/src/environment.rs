use std::path::Path;

use pybuild_pep508::MarkerEnvironment;

use crate::{Error, InstallError, Interpreter, SitePackages};

/// A Python environment build backends can be run in.
///
/// Hook subprocesses are started with [`PythonEnvironment::executable`], with
/// [`PythonEnvironment::scripts`] prepended to `PATH` and `VIRTUAL_ENV` pointing to
/// [`PythonEnvironment::root`] when there is one.
pub trait PythonEnvironment {
    /// The Python executable to run backend code with.
    fn executable(&self) -> &Path;

    /// The directory console scripts of installed packages end up in.
    fn scripts(&self) -> Option<&Path>;

    /// The root of the virtual environment, if this is one.
    fn root(&self) -> Option<&Path>;

    /// The marker values requirements are evaluated against.
    fn markers(&self) -> &MarkerEnvironment;

    /// A fresh snapshot of the installed distributions.
    fn installed(&self) -> Result<SitePackages, Error>;

    /// Install the given requirement strings into this environment.
    fn install(&self, requirements: &[String]) -> Result<(), InstallError>;
}

/// The environment of an existing interpreter, used when build isolation is off.
///
/// Nothing is ever installed into it.
#[derive(Debug, Clone)]
pub struct AmbientEnvironment {
    interpreter: Interpreter,
}

impl AmbientEnvironment {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

impl PythonEnvironment for AmbientEnvironment {
    fn executable(&self) -> &Path {
        self.interpreter.sys_executable()
    }

    fn scripts(&self) -> Option<&Path> {
        Some(self.interpreter.scripts())
    }

    fn root(&self) -> Option<&Path> {
        self.interpreter
            .is_virtualenv()
            .then(|| self.interpreter.prefix())
    }

    fn markers(&self) -> &MarkerEnvironment {
        self.interpreter.markers()
    }

    fn installed(&self) -> Result<SitePackages, Error> {
        SitePackages::from_interpreter(&self.interpreter)
    }

    fn install(&self, requirements: &[String]) -> Result<(), InstallError> {
        Err(InstallError::NotIsolated {
            requirements: requirements.join(", "),
        })
    }
}
