//! Calling PEP 517 hooks in a worker subprocess.
//!
//! Every call starts `python -c <hook_worker.py>` inside the build environment, with the source
//! tree as working directory. The worker reads one JSON request from stdin, imports the backend
//! (after prepending `backend-path` to `sys.path`), runs the hook and answers with line-based
//! responses on its stdout:
//!
//! ```text
//! READY 1
//! DEBUG Calling flit_core.buildapi.build_wheel()
//! OK "foo-1.0-py3-none-any.whl"
//! ```
//!
//! The final line is one of `OK <json>`, `MISSING` (the backend doesn't define the hook) or
//! `ERROR <json>` (the backend raised). Anything else, including the worker dying before it
//! answered, is a [`ProtocolError`].

use std::env;
use std::fmt::{Display, Formatter};
use std::io;
use std::io::Write;
use std::iter;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info_span};

use pybuild_python::PythonEnvironment;

use crate::{BuildKind, BuildOutput, BuildSystem, ConfigSettings};

/// The version of the line protocol spoken with `hook_worker.py`.
pub const PROTOCOL_VERSION: u32 = 1;

static HOOK_WORKER_SOURCE: &str = include_str!("hook_worker.py");

/// The PEP 517 hooks a frontend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    GetRequiresForBuildSdist,
    GetRequiresForBuildWheel,
    PrepareMetadataForBuildWheel,
    BuildSdist,
    BuildWheel,
}

impl Hook {
    /// `get_requires_for_build_{kind}`.
    pub fn get_requires(kind: BuildKind) -> Self {
        match kind {
            BuildKind::Sdist => Self::GetRequiresForBuildSdist,
            BuildKind::Wheel => Self::GetRequiresForBuildWheel,
        }
    }

    /// `build_{kind}`.
    pub fn build(kind: BuildKind) -> Self {
        match kind {
            BuildKind::Sdist => Self::BuildSdist,
            BuildKind::Wheel => Self::BuildWheel,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetRequiresForBuildSdist => "get_requires_for_build_sdist",
            Self::GetRequiresForBuildWheel => "get_requires_for_build_wheel",
            Self::PrepareMetadataForBuildWheel => "prepare_metadata_for_build_wheel",
            Self::BuildSdist => "build_sdist",
            Self::BuildWheel => "build_wheel",
        }
    }
}

impl Display for Hook {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hook call: which hook, in which project, with which arguments.
#[derive(Debug)]
pub struct HookRequest<'a> {
    pub source_tree: &'a Path,
    pub build_system: &'a BuildSystem,
    pub hook: Hook,
    /// The keyword arguments besides `config_settings`, e.g. `wheel_directory`.
    pub arguments: Map<String, Value>,
    pub config_settings: &'a ConfigSettings,
}

/// How a hook call ended.
#[derive(Debug)]
pub enum HookOutcome {
    /// The hook returned this value.
    Success(Value),
    /// The backend doesn't define the hook.
    HookUnavailable,
    /// The backend raised, or couldn't be imported.
    BackendError {
        message: String,
        traceback: String,
        /// The captured stderr of the worker, empty if it was streamed to the terminal.
        stderr: String,
    },
    /// The worker died or didn't follow the protocol.
    ProtocolError(ProtocolError),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to start the hook worker with `{}`", python.display())]
    Launch {
        python: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("Failed to wait for the hook worker")]
    Wait(#[source] io::Error),
    #[error("Failed to serialize the hook request")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to add the scripts directory to `PATH`")]
    Path(#[source] env::JoinPathsError),
    #[error("The hook worker exited ({status}) without a response:\n--- stderr:\n{stderr}\n---")]
    NoResponse { status: ExitStatus, stderr: String },
    #[error("The hook worker speaks protocol version {found}, expected {expected}")]
    VersionMismatch { found: String, expected: u32 },
    #[error("Malformed response from the hook worker: `{0}`")]
    Malformed(String),
    #[error("Malformed payload in response from the hook worker: `{line}`")]
    MalformedPayload {
        line: String,
        #[source]
        err: serde_json::Error,
    },
}

/// Runs hooks of a build backend inside an environment.
///
/// Calls are never retried, and only one is in flight at a time.
pub trait HookRunner {
    fn call(&self, environment: &dyn PythonEnvironment, request: &HookRequest<'_>) -> HookOutcome;
}

/// The [`HookRunner`] that runs each hook in a fresh `hook_worker.py` subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookCaller {
    output: BuildOutput,
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    version: u32,
    backend: &'a str,
    backend_path: &'a [PathBuf],
    hook: Hook,
    arguments: &'a Map<String, Value>,
    config_settings: &'a ConfigSettings,
}

#[derive(Deserialize)]
struct WorkerError {
    message: String,
    #[serde(default)]
    traceback: String,
}

impl HookCaller {
    pub fn new(output: BuildOutput) -> Self {
        Self { output }
    }

    fn run(
        &self,
        environment: &dyn PythonEnvironment,
        request: &HookRequest<'_>,
    ) -> Result<HookOutcome, ProtocolError> {
        let backend = &request.build_system.build_backend;
        let payload = serde_json::to_string(&WorkerRequest {
            version: PROTOCOL_VERSION,
            backend,
            backend_path: &request.build_system.backend_path,
            hook: request.hook,
            arguments: &request.arguments,
            config_settings: request.config_settings,
        })
        .map_err(ProtocolError::Serialize)?;

        let _span = info_span!("hook", hook = %request.hook, backend = %backend).entered();
        debug!("Calling `{backend}.{}()`", request.hook);

        let python = environment.executable();
        let mut command = Command::new(python);
        command
            .arg("-c")
            .arg(HOOK_WORKER_SOURCE)
            .current_dir(request.source_tree)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match self.output {
                BuildOutput::Stderr => Stdio::inherit(),
                BuildOutput::Debug | BuildOutput::Quiet => Stdio::piped(),
            });
        // Activate the environment.
        if let Some(root) = environment.root() {
            command.env("VIRTUAL_ENV", root);
        }
        if let Some(scripts) = environment.scripts() {
            let path = env::var_os("PATH").unwrap_or_default();
            let path = env::join_paths(
                iter::once(scripts.to_path_buf()).chain(env::split_paths(&path)),
            )
            .map_err(ProtocolError::Path)?;
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|err| ProtocolError::Launch {
            python: python.to_path_buf(),
            err,
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            // A worker that died early is reported from its (missing) response.
            if let Err(err) = stdin
                .write_all(payload.as_bytes())
                .and_then(|()| stdin.write_all(b"\n"))
            {
                debug!("Failed to send the hook request: {err}");
            }
        }
        let output = child.wait_with_output().map_err(ProtocolError::Wait)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        if self.output == BuildOutput::Debug {
            for line in stderr.lines() {
                debug!("{line}");
            }
        }
        parse_response(&stdout, output.status, stderr)
    }
}

impl HookRunner for HookCaller {
    fn call(&self, environment: &dyn PythonEnvironment, request: &HookRequest<'_>) -> HookOutcome {
        self.run(environment, request)
            .unwrap_or_else(HookOutcome::ProtocolError)
    }
}

/// Read the worker's responses, up to and including the one that ends the call.
fn parse_response(
    stdout: &str,
    status: ExitStatus,
    stderr: String,
) -> Result<HookOutcome, ProtocolError> {
    let mut lines = stdout.lines();

    let Some(ready) = lines.next() else {
        return Err(ProtocolError::NoResponse { status, stderr });
    };
    let Some(version) = ready.strip_prefix("READY ") else {
        return Err(ProtocolError::Malformed(ready.to_string()));
    };
    if version.trim() != PROTOCOL_VERSION.to_string() {
        return Err(ProtocolError::VersionMismatch {
            found: version.trim().to_string(),
            expected: PROTOCOL_VERSION,
        });
    }

    for line in lines {
        let (kind, payload) = line.split_once(' ').unwrap_or((line, ""));
        match kind {
            "DEBUG" => debug!("{payload}"),
            "OK" => {
                let value = serde_json::from_str(payload).map_err(|err| {
                    ProtocolError::MalformedPayload {
                        line: line.to_string(),
                        err,
                    }
                })?;
                return Ok(HookOutcome::Success(value));
            }
            "MISSING" => return Ok(HookOutcome::HookUnavailable),
            "ERROR" => {
                let WorkerError { message, traceback } = serde_json::from_str(payload)
                    .map_err(|err| ProtocolError::MalformedPayload {
                        line: line.to_string(),
                        err,
                    })?;
                return Ok(HookOutcome::BackendError {
                    message,
                    traceback,
                    stderr,
                });
            }
            _ => return Err(ProtocolError::Malformed(line.to_string())),
        }
    }

    Err(ProtocolError::NoResponse { status, stderr })
}
