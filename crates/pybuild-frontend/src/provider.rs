use pybuild_python::{AmbientEnvironment, Interpreter, PythonEnvironment};
use pybuild_virtualenv::IsolatedEnvironment;

use crate::Error;

/// Hands out the environments build targets run in.
pub trait EnvironmentProvider {
    /// A fresh environment, owned by a single build target and removed when dropped.
    fn create_isolated(&self) -> Result<Box<dyn PythonEnvironment>, Error>;

    /// The environment of the caller, used when isolation is off.
    fn ambient(&self) -> &dyn PythonEnvironment;
}

/// Isolated builds in temporary virtual environments created from one base interpreter.
#[derive(Debug, Clone)]
pub struct VirtualenvProvider {
    ambient: AmbientEnvironment,
}

impl VirtualenvProvider {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            ambient: AmbientEnvironment::new(interpreter),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        self.ambient.interpreter()
    }
}

impl EnvironmentProvider for VirtualenvProvider {
    fn create_isolated(&self) -> Result<Box<dyn PythonEnvironment>, Error> {
        Ok(Box::new(IsolatedEnvironment::create(
            self.ambient.interpreter(),
        )?))
    }

    fn ambient(&self) -> &dyn PythonEnvironment {
        &self.ambient
    }
}
