//! Run the build pipeline against a simulated backend and simulated environments.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use assert_fs::prelude::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use zip::write::SimpleFileOptions;

use pybuild_frontend::{
    BuildIsolation, BuildKind, BuildOptions, BuildState, ConfigSettingEntry, ConfigSettings,
    EnvironmentProvider, Error, Hook, HookOutcome, HookRequest, HookRunner, ProjectBuilder,
};
use pybuild_normalize::PackageName;
use pybuild_pep440::Version;
use pybuild_pep508::{MarkerEnvironment, Requirement, StringVersion};
use pybuild_pypi_types::InstalledDistribution;
use pybuild_python::{InstallError, PythonEnvironment, SitePackages};

use BuildKind::{Sdist, Wheel};
use BuildState::{
    Built, Done, EnvironmentReady, Failed, Init, MetadataPrepared, RequirementsChecked,
};

const PYPROJECT_TOML: &str = r#"
[build-system]
requires = ["fake-backend>=1.0"]
build-backend = "fake_backend"

[project]
name = "fake-project"
version = "1.0"
"#;

const METADATA: &str = "Metadata-Version: 2.1\nName: fake-project\nVersion: 1.0\nRequires-Dist: anyio\n";

fn markers() -> MarkerEnvironment {
    MarkerEnvironment {
        implementation_name: "cpython".to_string(),
        implementation_version: StringVersion::from_str("3.12.1").unwrap(),
        os_name: "posix".to_string(),
        platform_machine: "x86_64".to_string(),
        platform_python_implementation: "CPython".to_string(),
        platform_release: "6.5.0".to_string(),
        platform_system: "Linux".to_string(),
        platform_version: "#1 SMP".to_string(),
        python_full_version: StringVersion::from_str("3.12.1").unwrap(),
        python_version: StringVersion::from_str("3.12").unwrap(),
        sys_platform: "linux".to_string(),
    }
}

fn distribution(name: &str, version: &str) -> InstalledDistribution {
    InstalledDistribution {
        name: PackageName::from_str(name).unwrap(),
        version: Version::from_str(version).unwrap(),
        requires_dist: Vec::new(),
        provides_extras: Vec::new(),
        path: None,
    }
}

/// What happened to the environments, in order.
type EventLog = Rc<RefCell<Vec<String>>>;

/// An environment whose installer picks packages from a fixed index.
struct FakeEnvironment {
    markers: MarkerEnvironment,
    installed: RefCell<Vec<InstalledDistribution>>,
    index: Vec<InstalledDistribution>,
    isolated: bool,
    events: EventLog,
}

impl PythonEnvironment for FakeEnvironment {
    fn executable(&self) -> &Path {
        Path::new("python")
    }

    fn scripts(&self) -> Option<&Path> {
        None
    }

    fn root(&self) -> Option<&Path> {
        None
    }

    fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    fn installed(&self) -> Result<SitePackages, pybuild_python::Error> {
        Ok(self.installed.borrow().iter().cloned().collect())
    }

    fn install(&self, requirements: &[String]) -> Result<(), InstallError> {
        self.events
            .borrow_mut()
            .push(format!("install {}", requirements.join(", ")));
        for requirement in requirements {
            let name = Requirement::from_str(requirement).unwrap().name;
            let Some(distribution) = self.index.iter().find(|dist| dist.name == name) else {
                return Err(InstallError::Installer {
                    requirements: requirements.join(", "),
                    exit_code: "exit status: 1".to_string(),
                    stdout: String::new(),
                    stderr: format!("ERROR: No matching distribution found for {requirement}"),
                });
            };
            let mut installed = self.installed.borrow_mut();
            installed.retain(|dist| dist.name != name);
            installed.push(distribution.clone());
        }
        Ok(())
    }
}

impl Drop for FakeEnvironment {
    fn drop(&mut self) {
        if self.isolated {
            self.events.borrow_mut().push("release".to_string());
        }
    }
}

struct FakeProvider {
    ambient: FakeEnvironment,
    index: Vec<InstalledDistribution>,
    events: EventLog,
}

impl FakeProvider {
    /// `ambient` is what's installed in the ambient environment, `index` what isolated
    /// environments can install.
    fn new(ambient: &[(&str, &str)], index: &[(&str, &str)]) -> Self {
        let events = EventLog::default();
        let index: Vec<_> = index
            .iter()
            .map(|(name, version)| distribution(name, version))
            .collect();
        Self {
            ambient: FakeEnvironment {
                markers: markers(),
                installed: RefCell::new(
                    ambient
                        .iter()
                        .map(|(name, version)| distribution(name, version))
                        .collect(),
                ),
                index: Vec::new(),
                isolated: false,
                events: events.clone(),
            },
            index,
            events,
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl EnvironmentProvider for FakeProvider {
    fn create_isolated(&self) -> Result<Box<dyn PythonEnvironment>, Error> {
        self.events.borrow_mut().push("create".to_string());
        Ok(Box::new(FakeEnvironment {
            markers: markers(),
            installed: RefCell::default(),
            index: self.index.clone(),
            isolated: true,
            events: self.events.clone(),
        }))
    }

    fn ambient(&self) -> &dyn PythonEnvironment {
        &self.ambient
    }
}

/// A backend that builds `fake-project 1.0` from `pyproject.toml` and `fake_project.py`.
struct FakeBackend {
    hooks: HashSet<Hook>,
    extra_requires: Vec<String>,
    /// Raise in this hook.
    fail: Option<Hook>,
    /// Return this file name from the build hooks instead of the one that was written.
    filename: Option<String>,
    /// The hooks that were called, with the source tree they ran in.
    calls: RefCell<Vec<(Hook, PathBuf)>>,
    /// The `metadata_directory` argument `build_wheel` received.
    metadata_directory: RefCell<Option<Value>>,
    /// Whether `untracked.txt` was in the source tree when `build_wheel` ran.
    saw_untracked: RefCell<Option<bool>>,
    config_settings: RefCell<Option<Value>>,
}

impl FakeBackend {
    fn new() -> Self {
        Self::with_hooks(&[
            Hook::GetRequiresForBuildSdist,
            Hook::GetRequiresForBuildWheel,
            Hook::PrepareMetadataForBuildWheel,
            Hook::BuildSdist,
            Hook::BuildWheel,
        ])
    }

    fn with_hooks(hooks: &[Hook]) -> Self {
        Self {
            hooks: hooks.iter().copied().collect(),
            extra_requires: Vec::new(),
            fail: None,
            filename: None,
            calls: RefCell::default(),
            metadata_directory: RefCell::default(),
            saw_untracked: RefCell::default(),
            config_settings: RefCell::default(),
        }
    }

    fn without(mut self, hook: Hook) -> Self {
        self.hooks.remove(&hook);
        self
    }

    fn called(&self) -> Vec<Hook> {
        self.calls.borrow().iter().map(|(hook, _)| *hook).collect()
    }

    fn directory(request: &HookRequest<'_>, argument: &str) -> PathBuf {
        PathBuf::from(request.arguments[argument].as_str().unwrap())
    }

    fn write_sdist(source_tree: &Path, path: &Path) {
        let encoder = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for name in ["pyproject.toml", "fake_project.py"] {
            builder
                .append_path_with_name(source_tree.join(name), format!("fake_project-1.0/{name}"))
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_wheel(path: &Path) {
        let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, contents) in [
            ("fake_project.py", ""),
            ("fake_project-1.0.dist-info/METADATA", METADATA),
            ("fake_project-1.0.dist-info/RECORD", ""),
        ] {
            writer
                .start_file(name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
}

impl HookRunner for FakeBackend {
    fn call(&self, _environment: &dyn PythonEnvironment, request: &HookRequest<'_>) -> HookOutcome {
        self.calls
            .borrow_mut()
            .push((request.hook, request.source_tree.to_path_buf()));
        *self.config_settings.borrow_mut() =
            Some(serde_json::to_value(request.config_settings).unwrap());

        if !self.hooks.contains(&request.hook) {
            return HookOutcome::HookUnavailable;
        }
        if self.fail == Some(request.hook) {
            return HookOutcome::BackendError {
                message: "Backend operation failed: ValueError('boom')".to_string(),
                traceback: String::new(),
                stderr: String::new(),
            };
        }

        match request.hook {
            Hook::GetRequiresForBuildSdist | Hook::GetRequiresForBuildWheel => {
                HookOutcome::Success(json!(self.extra_requires))
            }
            Hook::PrepareMetadataForBuildWheel => {
                let dist_info = Self::directory(request, "metadata_directory")
                    .join("fake_project-1.0.dist-info");
                fs_err::create_dir_all(&dist_info).unwrap();
                fs_err::write(dist_info.join("METADATA"), METADATA).unwrap();
                HookOutcome::Success(json!("fake_project-1.0.dist-info"))
            }
            Hook::BuildSdist => {
                let filename = "fake_project-1.0.tar.gz";
                let directory = Self::directory(request, "sdist_directory");
                Self::write_sdist(request.source_tree, &directory.join(filename));
                HookOutcome::Success(json!(self.filename.as_deref().unwrap_or(filename)))
            }
            Hook::BuildWheel => {
                let filename = "fake_project-1.0-py3-none-any.whl";
                *self.saw_untracked.borrow_mut() =
                    Some(request.source_tree.join("untracked.txt").exists());
                *self.metadata_directory.borrow_mut() =
                    request.arguments.get("metadata_directory").cloned();
                let directory = Self::directory(request, "wheel_directory");
                Self::write_wheel(&directory.join(filename));
                HookOutcome::Success(json!(self.filename.as_deref().unwrap_or(filename)))
            }
        }
    }
}

fn project() -> assert_fs::TempDir {
    let project = assert_fs::TempDir::new().unwrap();
    project
        .child("pyproject.toml")
        .write_str(PYPROJECT_TOML)
        .unwrap();
    project
        .child("fake_project.py")
        .write_str("def hello(): ...\n")
        .unwrap();
    project
        .child("untracked.txt")
        .write_str("not part of the sdist\n")
        .unwrap();
    project
}

fn isolated() -> BuildOptions {
    BuildOptions::default()
}

fn shared() -> BuildOptions {
    BuildOptions {
        isolation: BuildIsolation::Shared,
        ..BuildOptions::default()
    }
}

fn states(kind: BuildKind, states: &[BuildState]) -> Vec<(BuildKind, BuildState)> {
    states.iter().map(|state| (kind, *state)).collect()
}

#[test]
fn build_sdist_isolated() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let sdist = builder.build_sdist(&output).unwrap();

    assert_eq!(sdist, "fake_project-1.0.tar.gz");
    output.child("fake_project-1.0.tar.gz").assert(predicates::path::is_file());
    assert_eq!(
        provider.events(),
        ["create", "install fake-backend>=1.0", "release"]
    );
    assert_eq!(
        backend.called(),
        [Hook::GetRequiresForBuildSdist, Hook::BuildSdist]
    );
    assert_eq!(
        builder.transitions(),
        states(
            Sdist,
            &[Init, RequirementsChecked, EnvironmentReady, Built, Done]
        )
    );
}

#[test]
fn build_wheel_with_prepared_metadata() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let wheel = builder.build_wheel(&output).unwrap();

    assert_eq!(wheel, "fake_project-1.0-py3-none-any.whl");
    output
        .child("fake_project-1.0-py3-none-any.whl")
        .assert(predicates::path::is_file());
    assert_eq!(
        backend.called(),
        [
            Hook::GetRequiresForBuildWheel,
            Hook::PrepareMetadataForBuildWheel,
            Hook::BuildWheel
        ]
    );
    // `build_wheel` gets the directory `prepare_metadata_for_build_wheel` wrote to.
    let metadata_directory = backend.metadata_directory.borrow().clone().unwrap();
    assert!(
        metadata_directory
            .as_str()
            .unwrap()
            .ends_with("fake_project-1.0.dist-info")
    );
    assert_eq!(
        builder.transitions(),
        states(
            Wheel,
            &[
                Init,
                RequirementsChecked,
                EnvironmentReady,
                MetadataPrepared,
                Built,
                Done
            ]
        )
    );
}

#[test]
fn build_wheel_without_prepare_metadata() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new().without(Hook::PrepareMetadataForBuildWheel);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let wheel = builder.build_wheel(&output).unwrap();

    assert_eq!(wheel, "fake_project-1.0-py3-none-any.whl");
    assert_eq!(*backend.metadata_directory.borrow(), None);
    assert_eq!(
        builder.transitions(),
        states(
            Wheel,
            &[Init, RequirementsChecked, EnvironmentReady, Built, Done]
        )
    );
}

#[test]
fn missing_build_wheel() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new().without(Hook::BuildWheel);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_wheel(&output).unwrap_err();

    assert!(matches!(
        err,
        Error::MissingHook {
            hook: Hook::BuildWheel,
            ..
        }
    ));
    insta::assert_snapshot!(err, @"Build backend `fake_backend` does not implement the mandatory hook `build_wheel`");
    assert_eq!(builder.transitions().last(), Some(&(Wheel, Failed)));
    // Nothing is left behind in the output directory.
    assert_eq!(fs_err::read_dir(output.path()).unwrap().count(), 0);
    assert_eq!(provider.events().last().map(String::as_str), Some("release"));
}

#[test]
fn missing_get_requires() {
    let project = project();
    let backend = FakeBackend::with_hooks(&[Hook::BuildSdist]);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    assert!(builder.get_requires_for_build(Sdist).unwrap().is_empty());
    builder.build_sdist(&project.child("dist")).unwrap();
}

#[test]
fn get_requires_for_build() {
    let project = project();
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec![
        "wheel".to_string(),
        "cython>=3 ; python_version >= '3.8'".to_string(),
    ];
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let requires = builder.get_requires_for_build(Wheel).unwrap();

    let names: Vec<_> = requires
        .iter()
        .map(|requirement| requirement.name.to_string())
        .collect();
    assert_eq!(names, ["wheel", "cython"]);
    assert_eq!(
        provider.events(),
        ["create", "install fake-backend>=1.0", "release"]
    );
}

#[test]
fn invalid_get_requires_result() {
    let project = project();
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec!["not a requirement!".to_string()];
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.get_requires_for_build(Sdist).unwrap_err();
    assert!(matches!(err, Error::InvalidHookRequirement { .. }));
}

#[test]
fn isolated_installs_missing_requirements() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec!["helper-dep>=2".to_string()];
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2"), ("helper-dep", "2.1")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    builder.build_sdist(&output).unwrap();

    assert_eq!(
        provider.events(),
        [
            "create",
            "install fake-backend>=1.0",
            "install helper-dep>=2",
            "release"
        ]
    );
}

#[test]
fn isolated_still_missing_after_install() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec!["helper-dep>=2".to_string()];
    // The index only has a version that doesn't satisfy the requirement.
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2"), ("helper-dep", "1.0")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    assert!(matches!(err, Error::MissingDependencies(_)));
    assert_eq!(err.to_string(), "Missing dependencies:\n\thelper-dep>=2");
    assert_eq!(
        builder.transitions(),
        states(Sdist, &[Init, RequirementsChecked, Failed])
    );
    assert!(!backend.called().contains(&Hook::BuildSdist));
}

#[test]
fn isolated_skip_dependency_check() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec!["helper-dep>=2".to_string()];
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2"), ("helper-dep", "1.0")]);
    let config_settings = ConfigSettings::default();
    let options = BuildOptions {
        skip_dependency_check: true,
        ..BuildOptions::default()
    };

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, options).unwrap();
    let sdist = builder.build_sdist(&output).unwrap();
    assert_eq!(sdist, "fake_project-1.0.tar.gz");
}

#[test]
fn isolated_install_failure() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.extra_requires = vec!["not-on-the-index".to_string()];
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    assert!(matches!(err, Error::Install(InstallError::Installer { .. })));
    assert_eq!(builder.transitions().last(), Some(&(Sdist, Failed)));
    assert_eq!(provider.events().last().map(String::as_str), Some("release"));
}

#[test]
fn shared_missing_dependencies() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[("fake-backend", "0.9")], &[]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, shared()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    assert_eq!(err.to_string(), "Missing dependencies:\n\tfake-backend>=1.0");
    // Nothing is created or installed without isolation.
    assert!(provider.events().is_empty());
    assert_eq!(
        builder.transitions(),
        states(Sdist, &[Init, RequirementsChecked, Failed])
    );
}

#[test]
fn shared_missing_transitive_dependency() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[("helper-dep", "1.0")], &[]);
    provider.ambient.installed.borrow_mut().push(InstalledDistribution {
        requires_dist: vec![
            Requirement::from_str("helper-dep>=2 ; python_version >= '3'").unwrap(),
        ],
        ..distribution("fake-backend", "1.2")
    });
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, shared()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Missing dependencies:\n\tfake-backend>=1.0\n\thelper-dep>=2"
    );
}

#[test]
fn shared_skip_dependency_check() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[("fake-backend", "0.9")], &[]);
    let config_settings = ConfigSettings::default();
    let options = BuildOptions {
        skip_dependency_check: true,
        ..shared()
    };

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, options).unwrap();
    builder.build_sdist(&output).unwrap();
    assert!(provider.events().is_empty());
}

#[test]
fn shared_satisfied() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[("fake-backend", "1.0")], &[]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, shared()).unwrap();
    builder.build_wheel(&output).unwrap();
    assert!(provider.events().is_empty());
}

#[test]
fn wheel_via_sdist() {
    let project = project();
    let output = project.child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let built = builder.build_wheel_via_sdist(&output).unwrap();

    assert_eq!(built.sdist, "fake_project-1.0.tar.gz");
    assert_eq!(built.wheel, "fake_project-1.0-py3-none-any.whl");
    output.child(&built.sdist).assert(predicates::path::is_file());
    output.child(&built.wheel).assert(predicates::path::is_file());

    // The wheel is built from the unpacked sdist, which lacks the untracked file.
    assert_eq!(*backend.saw_untracked.borrow(), Some(false));
    let calls = backend.calls.borrow();
    let (_, wheel_tree) = calls
        .iter()
        .find(|(hook, _)| *hook == Hook::BuildWheel)
        .unwrap();
    assert_ne!(wheel_tree, builder.source_tree());
    assert!(wheel_tree.ends_with("fake_project-1.0"));
    // The unpacked sdist is gone once the wheel is built.
    assert!(!wheel_tree.exists());

    // Two independent environments, each released when its target is done.
    assert_eq!(
        provider.events(),
        [
            "create",
            "install fake-backend>=1.0",
            "release",
            "create",
            "install fake-backend>=1.0",
            "release"
        ]
    );
    let mut expected = states(
        Sdist,
        &[Init, RequirementsChecked, EnvironmentReady, Built, Done],
    );
    expected.extend(states(
        Wheel,
        &[
            Init,
            RequirementsChecked,
            EnvironmentReady,
            MetadataPrepared,
            Built,
            Done,
        ],
    ));
    assert_eq!(builder.transitions(), expected);
}

#[test]
fn wheel_from_tree_sees_untracked_files() {
    let project = project();
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    builder.build_wheel(&project.child("dist")).unwrap();
    assert_eq!(*backend.saw_untracked.borrow(), Some(true));
}

#[test]
fn backend_error() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.fail = Some(Hook::BuildSdist);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    let Error::Backend(err) = err else {
        panic!("expected a backend error");
    };
    assert_eq!(err.hook, Hook::BuildSdist);
    insta::assert_snapshot!(err, @"Build backend failed in `build_sdist`: Backend operation failed: ValueError('boom')");
    assert_eq!(
        builder.transitions(),
        states(
            Sdist,
            &[Init, RequirementsChecked, EnvironmentReady, Failed]
        )
    );
}

#[test]
fn output_is_a_file() {
    let project = project();
    let output = project.child("dist");
    output.write_str("").unwrap();
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();

    assert!(matches!(err, Error::OutputNotDirectory(_)));
    assert!(backend.called().is_empty());
    assert!(provider.events().is_empty());
}

#[test]
fn output_dir_is_created() {
    let project = project();
    let output = project.child("build").child("nested").child("dist");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    builder.build_sdist(&output).unwrap();
    output
        .child("fake_project-1.0.tar.gz")
        .assert(predicates::path::is_file());
}

#[test]
fn invalid_filename() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    backend.filename = Some("../fake_project-1.0.tar.gz".to_string());
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidFilename {
            hook: Hook::BuildSdist,
            ..
        }
    ));
}

#[test]
fn missing_artifact() {
    let project = project();
    let output = project.child("dist");
    let mut backend = FakeBackend::new();
    // Valid, but not what the backend wrote.
    backend.filename = Some("fake_project-2.0.tar.gz".to_string());
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let err = builder.build_sdist(&output).unwrap_err();
    assert!(matches!(err, Error::MissingArtifact(_)));
}

#[test]
fn metadata_path_prepared() {
    let project = project();
    let output = project.child("metadata");
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let dist_info = builder.metadata_path(&output).unwrap();

    assert!(dist_info.ends_with("fake_project-1.0.dist-info"));
    assert!(dist_info.join("METADATA").is_file());
    assert!(!backend.called().contains(&Hook::BuildWheel));
    assert_eq!(
        builder.transitions(),
        states(
            Wheel,
            &[
                Init,
                RequirementsChecked,
                EnvironmentReady,
                MetadataPrepared,
                Done
            ]
        )
    );
}

#[test]
fn metadata_path_from_wheel() {
    let project = project();
    let output = project.child("metadata");
    let backend = FakeBackend::new().without(Hook::PrepareMetadataForBuildWheel);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let dist_info = builder.metadata_path(&output).unwrap();

    assert!(dist_info.ends_with("fake_project-1.0.dist-info"));
    assert!(dist_info.join("METADATA").is_file());
    assert!(dist_info.join("RECORD").is_file());
    // Only the `.dist-info` directory of the wheel ends up in the output directory.
    output.child("fake_project.py").assert(predicates::path::missing());
    output
        .child("fake_project-1.0-py3-none-any.whl")
        .assert(predicates::path::missing());
    assert_eq!(
        builder.transitions(),
        states(
            Wheel,
            &[Init, RequirementsChecked, EnvironmentReady, Built, Done]
        )
    );
}

#[test]
fn project_wheel_metadata() {
    let project = project();
    let backend = FakeBackend::new().without(Hook::PrepareMetadataForBuildWheel);
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings = ConfigSettings::default();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    let metadata = builder.project_wheel_metadata().unwrap();

    assert_eq!(metadata.name.to_string(), "fake-project");
    assert_eq!(metadata.version.to_string(), "1.0");
    assert_eq!(metadata.requires_dist.len(), 1);
}

#[test]
fn config_settings_are_passed_through() {
    let project = project();
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[("fake-backend", "1.2")]);
    let config_settings: ConfigSettings = ["--build-option=--quiet", "verbose", "a=1", "a=2"]
        .into_iter()
        .map(|entry| ConfigSettingEntry::from_str(entry).unwrap())
        .collect();

    let builder =
        ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated()).unwrap();
    builder.build_sdist(&project.child("dist")).unwrap();

    assert_eq!(
        backend.config_settings.borrow().clone().unwrap(),
        json!({
            "--build-option": "--quiet",
            "a": ["1", "2"],
            "verbose": "",
        })
    );
}

#[test]
fn source_not_a_project() {
    let project = assert_fs::TempDir::new().unwrap();
    let backend = FakeBackend::new();
    let provider = FakeProvider::new(&[], &[]);
    let config_settings = ConfigSettings::default();

    let err = ProjectBuilder::new(&project, &backend, &provider, &config_settings, isolated())
        .err()
        .unwrap();
    assert!(matches!(err, Error::NotPythonProject(_)));
}
