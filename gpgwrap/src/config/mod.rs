//! Configuration system for `GpgWrap`.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/gpgwrap/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use gpgwrap_proto::armor::DEFAULT_MAX_LINES;

use crate::gpg::{GpgProgram, default_program};
use crate::pool::PoolConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting parsed but has an unusable value.
    #[error("invalid setting {key}: {reason}")]
    Invalid {
        /// Dotted name of the setting.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    gpg: GpgFileConfig,
    decrypt: DecryptFileConfig,
    capture: CaptureFileConfig,
    console: ConsoleFileConfig,
}

/// `[gpg]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GpgFileConfig {
    program: Option<String>,
    homedir: Option<String>,
    encrypt_timeout_secs: Option<u64>,
    decrypt_timeout_secs: Option<u64>,
}

/// `[decrypt]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DecryptFileConfig {
    worker_threads: Option<usize>,
    max_concurrent: Option<usize>,
    shutdown_grace_ms: Option<u64>,
}

/// `[capture]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CaptureFileConfig {
    max_lines: Option<usize>,
}

/// `[console]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConsoleFileConfig {
    channel: Option<String>,
    nick: Option<String>,
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Settings the plugin itself needs (used by `Plugin::load`).
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Executable and global options for tool invocations.
    pub gpg: GpgProgram,
    /// Limit on a single encrypt call.
    pub encrypt_timeout: Duration,
    /// Limit on a single decrypt call (includes time at a passphrase prompt).
    pub decrypt_timeout: Duration,
    /// Worker pool sizing and shutdown grace.
    pub pool: PoolConfig,
    /// Maximum lines buffered per armored block. Must be at least 1; a
    /// very large value effectively leaves captures unbounded.
    pub max_capture_lines: usize,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            gpg: GpgProgram::default(),
            encrypt_timeout: Duration::from_secs(30),
            decrypt_timeout: Duration::from_secs(300),
            pool: PoolConfig::default(),
            max_capture_lines: DEFAULT_MAX_LINES,
        }
    }
}

/// Fully resolved configuration for the console binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Plugin --
    /// Plugin settings.
    pub plugin: PluginConfig,

    // -- Console host --
    /// Channel the console starts in.
    pub channel: String,
    /// Local nickname shown on sent lines.
    pub nick: String,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugin: PluginConfig::default(),
            channel: "#gpg".to_string(),
            nick: "me".to_string(),
            timestamp_format: "%H:%M".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// CLI args and env vars are parsed via `clap`. If `--config` is given
    /// and the file does not exist, returns an error. If no `--config` is
    /// given, the default path (`~/.config/gpgwrap/config.toml`) is tried
    /// and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if a setting has an unusable value.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file).validate()
    }

    /// Reject values that parse but cannot work.
    fn validate(self) -> Result<Self, ConfigError> {
        if self.plugin.max_capture_lines == 0 {
            return Err(ConfigError::Invalid {
                key: "capture.max_lines",
                reason: "must be at least 1",
            });
        }
        Ok(self)
    }

    /// Resolve an `AppConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. This is separated from `load()` to
    /// enable unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let plugin = defaults.plugin;

        Self {
            plugin: PluginConfig {
                gpg: GpgProgram {
                    program: cli
                        .gpg
                        .clone()
                        .or_else(|| file.gpg.program.as_ref().map(PathBuf::from))
                        .unwrap_or_else(|| PathBuf::from(default_program())),
                    homedir: cli
                        .homedir
                        .clone()
                        .or_else(|| file.gpg.homedir.clone()),
                },
                encrypt_timeout: file
                    .gpg
                    .encrypt_timeout_secs
                    .map_or(plugin.encrypt_timeout, Duration::from_secs),
                decrypt_timeout: file
                    .gpg
                    .decrypt_timeout_secs
                    .map_or(plugin.decrypt_timeout, Duration::from_secs),
                pool: PoolConfig {
                    worker_threads: file
                        .decrypt
                        .worker_threads
                        .unwrap_or(plugin.pool.worker_threads),
                    max_concurrent: file
                        .decrypt
                        .max_concurrent
                        .unwrap_or(plugin.pool.max_concurrent),
                    shutdown_grace: file
                        .decrypt
                        .shutdown_grace_ms
                        .map_or(plugin.pool.shutdown_grace, Duration::from_millis),
                },
                max_capture_lines: file
                    .capture
                    .max_lines
                    .unwrap_or(plugin.max_capture_lines),
            },
            channel: cli
                .channel
                .clone()
                .or_else(|| file.console.channel.clone())
                .unwrap_or(defaults.channel),
            nick: cli
                .nick
                .clone()
                .or_else(|| file.console.nick.clone())
                .unwrap_or(defaults.nick),
            timestamp_format: cli
                .timestamp_format
                .clone()
                .or_else(|| file.console.timestamp_format.clone())
                .unwrap_or(defaults.timestamp_format),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "OpenPGP message wrapper for IRC-style chat")]
pub struct CliArgs {
    /// Path to the gpg executable.
    #[arg(long, env = "GPGWRAP_GPG")]
    pub gpg: Option<PathBuf>,

    /// GnuPG home directory passed as `--homedir`.
    #[arg(long, env = "GNUPGHOME")]
    pub homedir: Option<String>,

    /// Channel the console starts in.
    #[arg(long)]
    pub channel: Option<String>,

    /// Local nickname.
    #[arg(long)]
    pub nick: Option<String>,

    /// Path to config file (default: `~/.config/gpgwrap/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Log level filter (trace, debug, info, warn, error). Takes
    /// precedence over `RUST_LOG`; with neither set the level is `info`.
    #[arg(long, env = "GPGWRAP_LOG")]
    pub log_level: Option<String>,

    /// Path to log file (default: `$TMPDIR/gpgwrap.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("gpgwrap").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
