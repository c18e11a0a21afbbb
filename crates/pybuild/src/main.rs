use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anstream::eprintln;
use anyhow::Result;
use clap::Parser;
use clap::builder::BoolishValueParser;
use owo_colors::OwoColorize;

use pybuild_frontend::{BuildIsolation, BuildOptions, ConfigSettingEntry, ConfigSettings};

use crate::commands::{BuildTargets, ExitStatus};
use crate::printer::Printer;

mod commands;
mod logging;
mod printer;

/// Build sdists and wheels of Python projects with their PEP 517 build backend.
#[derive(Parser)]
#[command(name = "pybuild", author, version, about)]
struct Cli {
    /// The source directory.
    #[arg(default_value = ".")]
    srcdir: PathBuf,

    /// Build a source distribution (disables the default behavior).
    #[arg(long, short)]
    sdist: bool,

    /// Build a wheel (disables the default behavior).
    ///
    /// Without `--sdist` and `--wheel`, an sdist is built and the wheel is built from it.
    #[arg(long, short)]
    wheel: bool,

    /// The output directory, `{srcdir}/dist` by default.
    #[arg(long, short)]
    outdir: Option<PathBuf>,

    /// Do not check that build dependencies are installed.
    #[arg(long, short = 'x', env = "PYBUILD_SKIP_DEPENDENCY_CHECK", value_parser = BoolishValueParser::new())]
    skip_dependency_check: bool,

    /// Do not isolate the build in a virtual environment.
    ///
    /// The build dependencies must already be installed for the selected Python.
    #[arg(long, short = 'n', env = "PYBUILD_NO_ISOLATION", value_parser = BoolishValueParser::new())]
    no_isolation: bool,

    /// Settings to pass to the build backend, as `KEY=VALUE` or `KEY`.
    ///
    /// Repeating a key passes a list of values.
    #[arg(long, short = 'C', alias = "config-settings", allow_hyphen_values = true)]
    config_setting: Vec<ConfigSettingEntry>,

    /// The Python interpreter to build with, `python3` or `python` on the `PATH` by default.
    #[arg(long, env = "PYBUILD_PYTHON")]
    python: Option<OsString>,

    /// Do not print any output.
    #[arg(long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(long, short, conflicts_with = "quiet")]
    verbose: bool,
}

fn run() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    })?;

    let printer = if cli.quiet {
        Printer::Quiet
    } else if cli.verbose {
        Printer::Verbose
    } else {
        Printer::Default
    };

    let options = BuildOptions {
        isolation: if cli.no_isolation {
            BuildIsolation::Shared
        } else {
            BuildIsolation::Isolated
        },
        skip_dependency_check: cli.skip_dependency_check,
        output: printer.build_output(),
    };
    let config_settings = cli
        .config_setting
        .into_iter()
        .collect::<ConfigSettings>();

    commands::build(
        &cli.srcdir,
        cli.outdir.as_deref(),
        BuildTargets::from_args(cli.sdist, cli.wheel),
        cli.python.as_ref(),
        &config_settings,
        options,
        printer,
    )
}

fn main() -> ExitCode {
    match run() {
        Ok(status) => status.into(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                for (index, cause) in err.chain().enumerate() {
                    if index == 0 {
                        eprintln!("{}: {cause}", "error".red().bold());
                    } else {
                        eprintln!("  {}: {cause}", "Caused by".red().bold());
                    }
                }
            }
            ExitStatus::Failure.into()
        }
    }
}
