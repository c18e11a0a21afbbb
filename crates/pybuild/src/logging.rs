use std::fmt;

use anstream::ColorChoice;
use anyhow::Context;
use owo_colors::OwoColorize;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_tree::HierarchicalLayer;
use tracing_tree::time::Uptime;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Only warnings and errors (overridable by `RUST_LOG`).
    Quiet,
    /// Show the progress of the build (overridable by `RUST_LOG`).
    #[default]
    Default,
    /// Show debug messages in a hierarchical span tree (overridable by `RUST_LOG`).
    Verbose,
}

/// Progress messages as `* Building wheel...`, everything else prefixed with its level.
struct ProgressFormat;

impl<S, N> FormatEvent<S, N> for ProgressFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        let ansi = writer.has_ansi_escapes();

        // Same colors as tracing
        match (level, ansi) {
            (tracing::Level::INFO, true) => write!(writer, "{} ", "*".bold())?,
            (tracing::Level::INFO, false) => write!(writer, "* ")?,
            (tracing::Level::WARN, true) => write!(writer, "{}: ", "warning".yellow().bold())?,
            (tracing::Level::ERROR, true) => write!(writer, "{}: ", "error".red().bold())?,
            (tracing::Level::DEBUG, true) => write!(writer, "{} ", level.blue())?,
            (tracing::Level::TRACE, true) => write!(writer, "{} ", level.purple())?,
            (tracing::Level::WARN, false) => write!(writer, "warning: ")?,
            (tracing::Level::ERROR, false) => write!(writer, "error: ")?,
            (level, _) => write!(writer, "{level} ")?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Configure `tracing` based on the given [`Level`], taking into account the `RUST_LOG` environment
/// variable.
///
/// [`Level::Verbose`] switches to a `tracing-tree` layer that includes targets and the uptime,
/// the other levels print compact progress messages.
pub(crate) fn setup_logging(level: Level) -> anyhow::Result<()> {
    let default_directive = match level {
        Level::Quiet => LevelFilter::WARN,
        Level::Default => LevelFilter::INFO,
        Level::Verbose => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive.into())
        .from_env()
        .context("Invalid RUST_LOG directives")?;

    match level {
        Level::Quiet | Level::Default => {
            let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
                ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
                ColorChoice::Never | ColorChoice::Auto => false,
            };
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .event_format(ProgressFormat)
                        .with_writer(std::io::stderr)
                        .with_ansi(ansi)
                        .with_filter(filter),
                )
                .init();
        }
        Level::Verbose => {
            // Regardless of the tracing level, include the uptime and target for each message.
            tracing_subscriber::registry()
                .with(
                    HierarchicalLayer::default()
                        .with_targets(true)
                        .with_timer(Uptime::default())
                        .with_writer(std::io::stderr)
                        .with_filter(filter),
                )
                .init();
        }
    }

    Ok(())
}
