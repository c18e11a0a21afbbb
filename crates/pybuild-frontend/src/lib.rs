//! A PEP 517 build frontend: build sdists and wheels of Python projects with the backend they
//! declare.
//!
//! <https://peps.python.org/pep-0517/>
//!
//! [`ProjectBuilder`] drives one project through the build targets. It reads the
//! `[build-system]` table ([`BuildSystem`]), prepares an environment per target through an
//! [`EnvironmentProvider`], checks the build requirements with
//! [`pybuild_resolver::DependencyResolver`] and calls the backend's hooks through a
//! [`HookRunner`], by default [`HookCaller`], which runs each hook in a worker subprocess.

pub use builder::{BuildState, BuiltDistributions, ProjectBuilder};
pub use config_settings::{
    ConfigSettingEntry, ConfigSettingParseError, ConfigSettingValue, ConfigSettings,
};
pub use error::{BackendError, Error, MissingHeaderCause};
pub use extract::ExtractError;
pub use filename::{
    FilenameError, SourceDistExtension, SourceDistFilename, WheelFilename, validate_filename,
};
pub use hook::{
    Hook, HookCaller, HookOutcome, HookRequest, HookRunner, PROTOCOL_VERSION, ProtocolError,
};
pub use options::{BuildIsolation, BuildKind, BuildOptions, BuildOutput};
pub use provider::{EnvironmentProvider, VirtualenvProvider};
pub use pyproject::{BuildSystem, DEFAULT_BACKEND, DEFAULT_REQUIRES};

mod builder;
mod config_settings;
mod error;
mod extract;
mod filename;
mod hook;
mod options;
mod provider;
mod pyproject;
