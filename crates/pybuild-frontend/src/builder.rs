//! The build of one project, one target at a time.
//!
//! Each target (sdist or wheel) goes through
//!
//! ```text
//! Init -> RequirementsChecked -> EnvironmentReady [-> MetadataPrepared] -> Built -> Done
//! ```
//!
//! and ends in `Failed` instead as soon as anything goes wrong. A failed target is not resumed,
//! the caller starts it over.

use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs_err as fs;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use pybuild_pep508::Requirement;
use pybuild_pypi_types::Metadata;
use pybuild_python::PythonEnvironment;
use pybuild_resolver::{DependencyResolver, ResolutionResult};

use crate::error::BackendError;
use crate::extract::{extract_dist_info, extract_sdist};
use crate::filename::validate_filename;
use crate::{
    BuildIsolation, BuildKind, BuildOptions, BuildSystem, ConfigSettings, EnvironmentProvider,
    Error, Hook, HookOutcome, HookRequest, HookRunner,
};

/// Where a build target is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Init,
    /// The build requirements were checked against the environment.
    RequirementsChecked,
    /// The environment has everything the backend asked for.
    EnvironmentReady,
    /// `prepare_metadata_for_build_wheel` produced a `.dist-info` directory.
    MetadataPrepared,
    /// The backend produced the artifact.
    Built,
    Done,
    Failed,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether a target may move from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (state, Self::Failed) => !state.is_terminal(),
            (Self::Init, Self::RequirementsChecked)
            | (Self::RequirementsChecked, Self::EnvironmentReady)
            | (Self::EnvironmentReady, Self::MetadataPrepared | Self::Built)
            | (Self::MetadataPrepared | Self::Built, Self::Done)
            | (Self::MetadataPrepared, Self::Built) => true,
            _ => false,
        }
    }
}

impl Display for BuildState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// The sdist and wheel built by [`ProjectBuilder::build_wheel_via_sdist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltDistributions {
    pub sdist: String,
    pub wheel: String,
}

/// The environment of a single build target.
enum BuildEnvironment<'a> {
    /// Removed when this is dropped.
    Isolated(Box<dyn PythonEnvironment>),
    Ambient(&'a dyn PythonEnvironment),
}

impl BuildEnvironment<'_> {
    fn as_dyn(&self) -> &dyn PythonEnvironment {
        match self {
            Self::Isolated(environment) => environment.as_ref(),
            Self::Ambient(environment) => *environment,
        }
    }
}

/// The state machine of one build target.
struct Target<'a> {
    kind: BuildKind,
    state: BuildState,
    transitions: &'a RefCell<Vec<(BuildKind, BuildState)>>,
}

impl<'a> Target<'a> {
    fn new(kind: BuildKind, transitions: &'a RefCell<Vec<(BuildKind, BuildState)>>) -> Self {
        transitions.borrow_mut().push((kind, BuildState::Init));
        Self {
            kind,
            state: BuildState::Init,
            transitions,
        }
    }

    fn advance(&mut self, next: BuildState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{}: {} -> {next}",
            self.kind,
            self.state
        );
        debug!("{}: {} -> {next}", self.kind, self.state);
        self.state = next;
        self.transitions.borrow_mut().push((self.kind, next));
    }
}

/// Builds the sdist and wheel of a project with its PEP 517 backend.
///
/// Every target gets its own environment: with [`BuildIsolation::Isolated`] a fresh one from the
/// [`EnvironmentProvider`], removed again when the target is done, otherwise the ambient one.
pub struct ProjectBuilder<'a, R: HookRunner, P: EnvironmentProvider> {
    source_tree: PathBuf,
    build_system: BuildSystem,
    runner: &'a R,
    provider: &'a P,
    config_settings: &'a ConfigSettings,
    options: BuildOptions,
    /// Every state each target entered, in order.
    transitions: RefCell<Vec<(BuildKind, BuildState)>>,
}

impl<'a, R: HookRunner, P: EnvironmentProvider> ProjectBuilder<'a, R, P> {
    /// Load the build system of the project in `source_tree`.
    pub fn new(
        source_tree: &Path,
        runner: &'a R,
        provider: &'a P,
        config_settings: &'a ConfigSettings,
        options: BuildOptions,
    ) -> Result<Self, Error> {
        if !source_tree.is_dir() {
            return Err(Error::SourceNotDirectory(source_tree.to_path_buf()));
        }
        // The hooks run with the source tree as working directory, all other paths we pass need
        // to be absolute.
        let source_tree = fs::canonicalize(source_tree)?;
        let build_system = BuildSystem::from_source_tree(&source_tree)?;
        debug!(
            "Using build backend `{}` for {}",
            build_system.build_backend,
            source_tree.display()
        );
        Ok(Self {
            source_tree,
            build_system,
            runner,
            provider,
            config_settings,
            options,
            transitions: RefCell::default(),
        })
    }

    pub fn source_tree(&self) -> &Path {
        &self.source_tree
    }

    pub fn build_system(&self) -> &BuildSystem {
        &self.build_system
    }

    /// The states the targets of this builder went through, in order.
    pub fn transitions(&self) -> Vec<(BuildKind, BuildState)> {
        self.transitions.borrow().clone()
    }

    /// The requirements the backend needs beyond `build-system.requires` to build `kind`.
    pub fn get_requires_for_build(&self, kind: BuildKind) -> Result<Vec<Requirement>, Error> {
        let environment = self.acquire_environment()?;
        let hook = Hook::get_requires(kind);
        self.call_get_requires(environment.as_dyn(), kind)?
            .into_iter()
            .map(|requirement| {
                Requirement::from_str(&requirement).map_err(|err| Error::InvalidHookRequirement {
                    hook,
                    requirement,
                    err: Box::new(err),
                })
            })
            .collect()
    }

    /// Build a source distribution into `output_dir`, returning its file name.
    pub fn build_sdist(&self, output_dir: &Path) -> Result<String, Error> {
        self.build(BuildKind::Sdist, output_dir)
    }

    /// Build a wheel from the source tree into `output_dir`, returning its file name.
    pub fn build_wheel(&self, output_dir: &Path) -> Result<String, Error> {
        self.build(BuildKind::Wheel, output_dir)
    }

    /// Build an sdist, then build the wheel from the unpacked sdist in a second environment.
    ///
    /// The wheel only ever sees the files that ship in the sdist.
    pub fn build_wheel_via_sdist(&self, output_dir: &Path) -> Result<BuiltDistributions, Error> {
        let sdist = self.build(BuildKind::Sdist, output_dir)?;
        let sdist_path = output_dir.join(&sdist);

        let temp_dir = tempfile::Builder::new()
            .prefix("build-via-sdist-")
            .tempdir()?;
        let source_tree = extract_sdist(&sdist_path, temp_dir.path())
            .map_err(|err| Error::Extract(sdist_path.clone(), err))?;

        info!("Building wheel from sdist");
        let builder = ProjectBuilder::new(
            &source_tree,
            self.runner,
            self.provider,
            self.config_settings,
            self.options,
        )?;
        let wheel = builder.build(BuildKind::Wheel, output_dir);
        self.transitions
            .borrow_mut()
            .extend(builder.transitions.into_inner());

        Ok(BuiltDistributions {
            sdist,
            wheel: wheel?,
        })
    }

    /// Build `kind` into `output_dir`, returning the file name of the artifact.
    pub fn build(&self, kind: BuildKind, output_dir: &Path) -> Result<String, Error> {
        self.run_target(kind, |target| {
            let output_dir = prepare_output_dir(output_dir)?;
            let environment = self.prepare_environment(target)?;

            // Passed on to `build_wheel`, which then must produce a wheel with the same metadata.
            let metadata_dir = if kind == BuildKind::Wheel {
                Some(
                    tempfile::Builder::new()
                        .prefix("build-metadata-")
                        .tempdir()?,
                )
            } else {
                None
            };
            let metadata_directory = match &metadata_dir {
                Some(metadata_dir) => {
                    let prepared =
                        self.call_prepare_metadata(environment.as_dyn(), metadata_dir.path())?;
                    if prepared.is_some() {
                        target.advance(BuildState::MetadataPrepared);
                    }
                    prepared
                }
                None => None,
            };

            let filename = self.call_build(
                environment.as_dyn(),
                kind,
                &output_dir,
                metadata_directory.as_deref(),
            )?;
            target.advance(BuildState::Built);
            Ok(filename)
        })
    }

    /// Write the `.dist-info` directory of the project's wheel into `output_dir` and return its
    /// path.
    ///
    /// Uses `prepare_metadata_for_build_wheel` if the backend has it, otherwise builds the wheel
    /// in a temporary directory and extracts the `.dist-info` directory from it.
    pub fn metadata_path(&self, output_dir: &Path) -> Result<PathBuf, Error> {
        self.run_target(BuildKind::Wheel, |target| {
            let output_dir = prepare_output_dir(output_dir)?;
            let environment = self.prepare_environment(target)?;

            if let Some(dist_info) = self.call_prepare_metadata(environment.as_dyn(), &output_dir)?
            {
                target.advance(BuildState::MetadataPrepared);
                return Ok(dist_info);
            }

            debug!("No `prepare_metadata_for_build_wheel`, building a wheel for its metadata");
            let wheel_dir = tempfile::Builder::new().prefix("build-wheel-").tempdir()?;
            let wheel =
                self.call_build(environment.as_dyn(), BuildKind::Wheel, wheel_dir.path(), None)?;
            target.advance(BuildState::Built);

            let wheel = wheel_dir.path().join(wheel);
            let dist_info = extract_dist_info(&wheel, &output_dir)
                .map_err(|err| Error::Extract(wheel.clone(), err))?;
            Ok(output_dir.join(dist_info))
        })
    }

    /// The core metadata of the wheel this project would build.
    pub fn project_wheel_metadata(&self) -> Result<Metadata, Error> {
        let temp_dir = tempfile::Builder::new()
            .prefix("build-metadata-")
            .tempdir()?;
        let dist_info = self.metadata_path(temp_dir.path())?;
        let path = dist_info.join("METADATA");
        let content = fs::read(&path)?;
        Metadata::parse_metadata(&content).map_err(|err| Error::Metadata(path, err))
    }

    /// Run one target through its state machine, ending in `Done` or `Failed`.
    fn run_target<T>(
        &self,
        kind: BuildKind,
        pipeline: impl FnOnce(&mut Target<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut target = Target::new(kind, &self.transitions);
        let result = pipeline(&mut target);
        match &result {
            Ok(_) => target.advance(BuildState::Done),
            Err(err) => {
                debug!("{kind} failed: {err}");
                target.advance(BuildState::Failed);
            }
        }
        result
    }

    /// A fresh environment with `build-system.requires` installed, or the ambient one.
    fn acquire_environment(&self) -> Result<BuildEnvironment<'a>, Error> {
        match self.options.isolation {
            BuildIsolation::Isolated => {
                let environment = self.provider.create_isolated()?;
                environment.install(&self.build_system.requires)?;
                Ok(BuildEnvironment::Isolated(environment))
            }
            BuildIsolation::Shared => Ok(BuildEnvironment::Ambient(self.provider.ambient())),
        }
    }

    /// Get the target's environment to `EnvironmentReady`.
    ///
    /// The backend must be importable to report its extra requirements, so in an isolated
    /// environment `build-system.requires` is installed first. The requirements are then checked,
    /// whatever is missing is installed, and they are checked once more. Without isolation
    /// nothing can be installed, and the first check decides.
    fn prepare_environment(&self, target: &mut Target<'_>) -> Result<BuildEnvironment<'a>, Error> {
        let environment = self.acquire_environment()?;
        let extra = self.call_get_requires(environment.as_dyn(), target.kind)?;
        let requires = self
            .build_system
            .requires
            .iter()
            .chain(&extra)
            .fold(Vec::new(), |mut requires, requirement| {
                if !requires.contains(requirement) {
                    requires.push(requirement.clone());
                }
                requires
            });

        let missing = self.unsatisfied(environment.as_dyn(), &requires)?;
        target.advance(BuildState::RequirementsChecked);

        let missing = match &environment {
            BuildEnvironment::Isolated(isolated) if !missing.is_empty() => {
                let roots = missing
                    .roots()
                    .into_iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>();
                isolated.install(&roots)?;
                self.unsatisfied(isolated.as_ref(), &requires)?
            }
            _ => missing,
        };
        if !missing.is_empty() {
            if self.options.skip_dependency_check {
                warn!(
                    "Missing build dependencies for {} (ignored):\n{missing}",
                    target.kind
                );
            } else {
                return Err(Error::MissingDependencies(missing));
            }
        }

        target.advance(BuildState::EnvironmentReady);
        Ok(environment)
    }

    fn unsatisfied(
        &self,
        environment: &dyn PythonEnvironment,
        requires: &[String],
    ) -> Result<ResolutionResult, Error> {
        let installed = environment.installed()?;
        let missing =
            DependencyResolver::new(environment.markers()).unsatisfied(requires, &installed)?;
        for unsatisfied in &missing {
            debug!("Unsatisfied: {unsatisfied} ({})", unsatisfied.reason);
        }
        Ok(missing)
    }

    /// Call a hook, translating the outcome. `Ok(None)` means the backend doesn't have the hook.
    fn call_hook(
        &self,
        environment: &dyn PythonEnvironment,
        hook: Hook,
        arguments: Map<String, Value>,
    ) -> Result<Option<Value>, Error> {
        let request = HookRequest {
            source_tree: &self.source_tree,
            build_system: &self.build_system,
            hook,
            arguments,
            config_settings: self.config_settings,
        };
        match self.runner.call(environment, &request) {
            HookOutcome::Success(value) => Ok(Some(value)),
            HookOutcome::HookUnavailable => Ok(None),
            HookOutcome::BackendError {
                message,
                traceback,
                stderr,
            } => Err(BackendError::new(hook, message, traceback, stderr).into()),
            HookOutcome::ProtocolError(err) => Err(Error::Protocol { hook, err }),
        }
    }

    /// `get_requires_for_build_{kind}`, where a missing hook means no extra requirements.
    fn call_get_requires(
        &self,
        environment: &dyn PythonEnvironment,
        kind: BuildKind,
    ) -> Result<Vec<String>, Error> {
        info!("Getting build dependencies for {kind}...");
        let hook = Hook::get_requires(kind);
        let Some(value) = self.call_hook(environment, hook, Map::new())? else {
            debug!("The backend has no `{hook}`, assuming no extra requirements");
            return Ok(Vec::new());
        };
        serde_json::from_value::<Vec<String>>(value.clone())
            .map_err(|_| Error::InvalidHookResult { hook, value })
    }

    /// `prepare_metadata_for_build_wheel` into `metadata_directory`, returning the `.dist-info`
    /// directory it created, or `None` if the backend doesn't have the hook.
    fn call_prepare_metadata(
        &self,
        environment: &dyn PythonEnvironment,
        metadata_directory: &Path,
    ) -> Result<Option<PathBuf>, Error> {
        info!("Getting metadata for wheel...");
        let hook = Hook::PrepareMetadataForBuildWheel;
        let mut arguments = Map::new();
        arguments.insert(
            "metadata_directory".to_string(),
            path_to_value(metadata_directory),
        );
        match self.call_hook(environment, hook, arguments)? {
            None => {
                debug!("The backend has no `{hook}`");
                Ok(None)
            }
            Some(Value::String(dist_info)) => {
                let path = metadata_directory.join(dist_info);
                if !path.is_dir() {
                    return Err(Error::MissingArtifact(path));
                }
                Ok(Some(path))
            }
            Some(value) => Err(Error::InvalidHookResult { hook, value }),
        }
    }

    /// `build_{kind}`, moving the artifact into `output_dir` once it's complete.
    fn call_build(
        &self,
        environment: &dyn PythonEnvironment,
        kind: BuildKind,
        output_dir: &Path,
        metadata_directory: Option<&Path>,
    ) -> Result<String, Error> {
        info!("Building {kind}...");
        // Concurrent builds into the same directory must never see a partial artifact.
        let temp_dir = tempfile::tempdir_in(output_dir)?;

        let hook = Hook::build(kind);
        let mut arguments = Map::new();
        let directory = match kind {
            BuildKind::Sdist => "sdist_directory",
            BuildKind::Wheel => "wheel_directory",
        };
        arguments.insert(directory.to_string(), path_to_value(temp_dir.path()));
        if let Some(metadata_directory) = metadata_directory {
            arguments.insert(
                "metadata_directory".to_string(),
                path_to_value(metadata_directory),
            );
        }

        let value = self
            .call_hook(environment, hook, arguments)?
            .ok_or_else(|| Error::MissingHook {
                hook,
                backend: self.build_system.build_backend.clone(),
            })?;
        let Value::String(filename) = value else {
            return Err(Error::InvalidHookResult { hook, value });
        };
        validate_filename(kind, &filename).map_err(|err| Error::InvalidFilename { hook, err })?;

        let from = temp_dir.path().join(&filename);
        if !from.is_file() {
            return Err(Error::MissingArtifact(from));
        }
        fs::rename(&from, output_dir.join(&filename))?;
        Ok(filename)
    }
}

/// Create the output directory if needed and make it absolute.
fn prepare_output_dir(output_dir: &Path) -> Result<PathBuf, Error> {
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(Error::OutputNotDirectory(output_dir.to_path_buf()));
    }
    fs::create_dir_all(output_dir)?;
    Ok(fs::canonicalize(output_dir)?)
}

fn path_to_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
