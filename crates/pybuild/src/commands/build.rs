use std::ffi::OsString;
use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::debug;

use pybuild_frontend::{
    BuildOptions, BuiltDistributions, ConfigSettings, HookCaller, ProjectBuilder,
    VirtualenvProvider,
};
use pybuild_python::Interpreter;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// The artifacts requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuildTargets {
    /// An sdist, then a wheel built from the unpacked sdist.
    WheelViaSdist,
    /// Any of the two, each straight from the source tree.
    Direct { sdist: bool, wheel: bool },
}

impl BuildTargets {
    pub(crate) fn from_args(sdist: bool, wheel: bool) -> Self {
        if sdist || wheel {
            Self::Direct { sdist, wheel }
        } else {
            Self::WheelViaSdist
        }
    }
}

/// Build the project in `srcdir`.
pub(crate) fn build(
    srcdir: &Path,
    outdir: Option<&Path>,
    targets: BuildTargets,
    python: Option<&OsString>,
    config_settings: &ConfigSettings,
    options: BuildOptions,
    printer: Printer,
) -> Result<ExitStatus> {
    // Relative to the source directory only if omitted.
    let outdir = outdir.map_or_else(|| srcdir.join("dist"), Path::to_path_buf);

    let interpreter = Interpreter::find(python)?;
    debug!(
        "Using Python {} at {}",
        interpreter.version(),
        interpreter.sys_executable().display()
    );
    let provider = VirtualenvProvider::new(interpreter);
    let runner = HookCaller::new(options.output);
    let builder = ProjectBuilder::new(srcdir, &runner, &provider, config_settings, options)?;

    let built = match targets {
        BuildTargets::WheelViaSdist => {
            let BuiltDistributions { sdist, wheel } = builder.build_wheel_via_sdist(&outdir)?;
            vec![sdist, wheel]
        }
        BuildTargets::Direct { sdist, wheel } => {
            let mut built = Vec::new();
            if sdist {
                built.push(builder.build_sdist(&outdir)?);
            }
            if wheel {
                built.push(builder.build_wheel(&outdir)?);
            }
            built
        }
    };

    writeln!(
        printer.stderr(),
        "{}",
        format!("Successfully built {}", natural_language_list(&built))
            .green()
            .bold()
    )?;

    Ok(ExitStatus::Success)
}

/// `a`, `a and b`, `a, b and c`.
fn natural_language_list(elements: &[String]) -> String {
    match elements {
        [] => String::new(),
        [single] => single.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets() {
        assert_eq!(
            BuildTargets::from_args(false, false),
            BuildTargets::WheelViaSdist
        );
        assert_eq!(
            BuildTargets::from_args(true, false),
            BuildTargets::Direct {
                sdist: true,
                wheel: false
            }
        );
    }

    #[test]
    fn natural_language() {
        let list = |elements: &[&str]| {
            natural_language_list(
                &elements
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            )
        };
        assert_eq!(list(&["a.tar.gz"]), "a.tar.gz");
        assert_eq!(list(&["a.tar.gz", "a.whl"]), "a.tar.gz and a.whl");
        assert_eq!(list(&["a", "b", "c"]), "a, b and c");
    }
}
