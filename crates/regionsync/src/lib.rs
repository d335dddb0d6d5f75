//! Shared plumbing for the `batch-writer` and `region-reporter` binaries.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use regionsync_core::config::{Config, LogFormat};
use regionsync_core::logging;

/// Exit code for every failure path (argument, config, load, write).
pub const EXIT_FAILURE: u8 = 1;

/// Flags common to both binaries.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// TOML configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, value_name = "FORMAT", value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse()
}

/// Build configuration: file (when given), then environment, then flags.
pub fn load_config<F>(args: &CommonArgs, lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config
        .apply_env(lookup)
        .context("applying environment overrides")?;
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

/// Install the tracing subscriber; failure is reported but not fatal.
pub fn init_logging(config: &Config) {
    if let Err(err) = logging::init_logging(&config.logging) {
        eprintln!("{} Logging disabled: {err}", stamp());
    }
}

/// Local timestamp prefix for operator status lines.
pub fn stamp() -> String {
    format!("[{}]", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f"))
}

/// Print a fatal error with its remediation, if any, to stderr.
pub fn report_failure(err: &regionsync_core::Error) {
    eprintln!("{} {err}", stamp());
    if let Some(remediation) = err.remediation() {
        eprint!("{remediation}");
    }
}

/// Print a fatal `anyhow` error chain to stderr, with remediation when the
/// root cause is a library error.
pub fn report_anyhow(err: &anyhow::Error) {
    eprintln!("{} {err:#}", stamp());
    if let Some(remediation) = err
        .downcast_ref::<regionsync_core::error::ConfigError>()
        .map(regionsync_core::error::ConfigError::remediation)
    {
        eprint!("{remediation}");
    }
}

/// Map a clap parse error: help/version exit 0, usage errors exit 1.
pub fn exit_for_clap_error(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    if err.use_stderr() {
        ExitCode::from(EXIT_FAILURE)
    } else {
        ExitCode::SUCCESS
    }
}
