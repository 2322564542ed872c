#[cfg(not(unix))]
compile_error!("renametree relies on inode numbers and only supports unix platforms");

mod align;
mod cli;
mod conflicts;
mod dir_list;
mod identity;
mod identity_source;
mod index_file;
mod reconcile;
mod replica;
mod report;
mod scan;

use align::{AlignOptions, align_roots};
use cli::Cli;
use scan::ScanOptions;
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber, error, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct RenametreeExitCode;

impl RenametreeExitCode {
    /// Exit code used with --strict when conflicts or recoverable errors were found.
    fn unresolved() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for fatal errors (unusable root, failed save, invalid arguments).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_level);

    match run(cli) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            RenametreeExitCode::any_error()
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let options = AlignOptions {
        scan: ScanOptions {
            associate_changed_inodes: cli.associate_changed_inodes,
            always_generate_uuid: !cli.no_generate,
        },
        bootstrap: !cli.no_bootstrap,
        dry_run: cli.dry_run,
    };

    let result = align_roots(&cli.root_a, &cli.root_b, &options, current_scan_time())?;

    report::print_result(&result);

    if cli.dry_run {
        info!("DRY RUN - no files were renamed");
    }

    let conflicts = result.conflict_count();
    let errors = result.error_count();
    if conflicts > 0 {
        warn!("{} conflicts need manual resolution", conflicts);
    }
    if errors > 0 {
        warn!("{} errors occurred, see above", errors);
    }

    if cli.strict && (conflicts > 0 || errors > 0) {
        return Ok(RenametreeExitCode::unresolved());
    }

    Ok(ExitCode::SUCCESS)
}

/// Seconds since the Unix epoch, used to stamp every record of this run.
fn current_scan_time() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

fn init_tracing(verbose: u8, log_level: Option<Level>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(build_filter(verbose, log_level))
        .with(fmt_layer)
        .init();
}

/// `--log-level` or `-v` win over RUST_LOG, which wins over the warn default.
fn build_filter(verbose: u8, log_level: Option<Level>) -> EnvFilter {
    let requested = match (log_level, verbose) {
        (Some(level), _) => Some(LevelFilter::from_level(level)),
        (None, 0) => None,
        (None, 1) => Some(LevelFilter::INFO),
        (None, _) => Some(LevelFilter::DEBUG),
    };

    match requested {
        Some(level) => EnvFilter::new("").add_directive(level.into()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    }
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
