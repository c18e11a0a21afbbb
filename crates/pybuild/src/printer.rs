use anstream::eprint;

use pybuild_frontend::BuildOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Printer {
    /// A printer that prints to standard streams (e.g., stderr).
    Default,
    /// A printer that suppresses all output.
    Quiet,
    /// A printer that prints all output, including debug messages.
    Verbose,
}

impl Printer {
    /// Return the [`Stderr`] for this printer.
    pub(crate) fn stderr(self) -> Stderr {
        match self {
            Self::Default | Self::Verbose => Stderr::Enabled,
            Self::Quiet => Stderr::Disabled,
        }
    }

    /// Where the output of the build backend goes.
    pub(crate) fn build_output(self) -> BuildOutput {
        match self {
            Self::Default => BuildOutput::Stderr,
            Self::Quiet => BuildOutput::Quiet,
            // Interleaved with the debug log.
            Self::Verbose => BuildOutput::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stderr {
    Enabled,
    Disabled,
}

impl std::fmt::Write for Stderr {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match self {
            Self::Enabled => {
                #[allow(clippy::print_stderr, clippy::ignored_unit_patterns)]
                {
                    eprint!("{s}");
                }
            }
            Self::Disabled => {}
        }

        Ok(())
    }
}
