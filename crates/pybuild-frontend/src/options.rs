use std::fmt::{Display, Formatter};

/// The two kinds of distributions a backend can build.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildKind {
    /// A source distribution (`.tar.gz`).
    Sdist,
    /// A binary distribution (`.whl`).
    Wheel,
}

impl Display for BuildKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sdist => f.write_str("sdist"),
            Self::Wheel => f.write_str("wheel"),
        }
    }
}

/// Where backends run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BuildIsolation {
    /// Every build target gets a fresh virtual environment, populated with the build
    /// requirements.
    #[default]
    Isolated,
    /// Backends run in the ambient environment and nothing is installed. Builds depend on
    /// whatever happens to be installed there.
    Shared,
}

/// What to do with the output of the build backend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BuildOutput {
    /// Send the build backend output to `stderr`.
    #[default]
    Stderr,
    /// Send the build backend output to `tracing`.
    Debug,
    /// Capture the build backend output, only showing it when the build fails.
    Quiet,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub isolation: BuildIsolation,
    /// Don't fail a build target when its build requirements aren't satisfied.
    pub skip_dependency_check: bool,
    pub output: BuildOutput,
}
