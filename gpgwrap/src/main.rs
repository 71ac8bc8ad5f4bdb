//! `GpgWrap` console host.
//!
//! Runs the plugin against a line-oriented terminal host so the `/gpg` and
//! `/gpgs` commands and inbound decryption can be used without a chat
//! client. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/gpgwrap/config.toml`).
//!
//! ```bash
//! cargo run --bin gpgwrap -- --channel '#secret' --nick alice
//!
//! # Use a separate keyring
//! GNUPGHOME=/tmp/chat-keys cargo run --bin gpgwrap
//! ```

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use gpgwrap::config::{AppConfig, CliArgs};
use gpgwrap::console::{self, ConsoleHost};
use gpgwrap::gpg::GpgCli;
use gpgwrap::plugin::Plugin;

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // CLI args > env > config file > defaults.
    let config = match AppConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            AppConfig::default()
        }
    };

    // Logs go to a file; stdout belongs to the console.
    let _log_guard = init_logging(cli.log_level.as_deref(), cli.log_file.as_deref());

    tracing::info!("gpgwrap starting");

    let host = Arc::new(ConsoleHost::new(
        io::stdout(),
        config.channel.as_str(),
        config.nick.as_str(),
        config.timestamp_format.as_str(),
    ));
    let plugin = match Plugin::load(Arc::clone(&host), Arc::new(GpgCli), &config.plugin) {
        Ok(plugin) => plugin,
        Err(e) => {
            tracing::error!(error = %e, "plugin failed to load");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = console::run(io::stdin().lock(), &*host, &plugin);
    plugin.unload();

    tracing::info!("gpgwrap exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// The filter comes from `level` (`--log-level` / `GPGWRAP_LOG`) when given,
/// otherwise from `RUST_LOG`, otherwise `info`.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: Option<&str>, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("gpgwrap.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(log_filter(level))
        .with_ansi(false)
        .init();

    Some(guard)
}

fn log_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}
