//! External OpenPGP tool layer.
//!
//! Describes a single tool call as an [`Invocation`] and runs it through the
//! [`CryptoTool`] trait. [`GpgCli`] is the real implementation: it spawns
//! the configured `gpg` executable with piped standard streams. The tool is
//! opaque to the rest of the crate: key management, trust and the actual
//! cryptography all happen on the other side of the pipe.
//!
//! [`GpgProgram`] builds the argument lists for the two operations:
//!
//! ```text
//! encrypt: --trust-model always --encrypt --recipient <id> --armor [--sign --local-user <id>]
//! decrypt: --batch --decrypt
//! ```

pub mod scripted;

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors that can occur while running the external tool.
#[derive(Debug, thiserror::Error)]
pub enum GpgError {
    /// The executable could not be started (missing, not executable, ...).
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that was attempted.
        program: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Reading from or writing to the child process failed.
    #[error("tool I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool did not finish in time and was killed.
    #[error("tool did not finish within {0:?}")]
    Timeout(Duration),
}

/// One call of the external tool. Exists only for the duration of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Text piped to standard input (sent as UTF-8).
    pub stdin: String,
}

/// Captured result of an [`Invocation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    /// Whether the process reported success.
    pub success: bool,
    /// Standard output (primary result: ciphertext or plaintext).
    pub stdout: String,
    /// Standard error (diagnostic stream).
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given streams.
    pub fn ok(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Failed output with exit code `status` and the given diagnostics.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs tool invocations.
///
/// Implementations must be shareable across the decrypt worker pool.
/// Dropping the returned future must stop the call (the real
/// implementation kills the child process), which is how timeouts and
/// pool shutdown cancel a hung tool.
pub trait CryptoTool: Send + Sync + 'static {
    /// Run `invocation` to completion and capture its output.
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<ToolOutput, GpgError>> + Send;
}

/// Runs `invocation` on `tool`, giving up after `limit`.
///
/// # Errors
///
/// Returns [`GpgError::Timeout`] if the call takes longer than `limit`,
/// or whatever error the tool itself reports.
pub async fn run_with_timeout<T: CryptoTool>(
    tool: &T,
    invocation: &Invocation,
    limit: Duration,
) -> Result<ToolOutput, GpgError> {
    tokio::time::timeout(limit, tool.run(invocation))
        .await
        .map_err(|_| GpgError::Timeout(limit))?
}

/// Real tool: spawns the executable named in the invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpgCli;

impl GpgCli {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: keep a console window from flashing up.
            command.creation_flags(0x0800_0000);
        }
        command
    }
}

impl CryptoTool for GpgCli {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput, GpgError> {
        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|source| GpgError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("child stdin was not piped"))?;
        let input = invocation.stdin.clone().into_bytes();

        // Feed stdin while draining stdout/stderr so a large payload
        // cannot deadlock on a full pipe.
        let writer = async move {
            let written = stdin.write_all(&input).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(writer, child.wait_with_output());
        let output = output?;

        if let Err(e) = written {
            // The tool may exit before reading all of its input.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                tracing::debug!(program = %invocation.program.display(), "tool closed stdin early");
            } else {
                return Err(GpgError::Io(e));
            }
        }

        Ok(ToolOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Default executable name for the current platform.
#[must_use]
pub const fn default_program() -> &'static str {
    if cfg!(windows) { "gpg.exe" } else { "gpg" }
}

/// Executable and global options used to build invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpgProgram {
    /// Executable to run.
    pub program: PathBuf,
    /// Optional `--homedir` passed ahead of every operation.
    pub homedir: Option<String>,
}

impl Default for GpgProgram {
    fn default() -> Self {
        Self {
            program: PathBuf::from(default_program()),
            homedir: None,
        }
    }
}

impl GpgProgram {
    fn base_args(&self) -> Vec<String> {
        self.homedir
            .as_ref()
            .map(|dir| vec!["--homedir".to_string(), dir.clone()])
            .unwrap_or_default()
    }

    /// Invocation that encrypts `plaintext` to `recipient`.
    ///
    /// The signing options are added only when `should_sign` is set and a
    /// signer is given; otherwise `signer` never reaches the argument list.
    #[must_use]
    pub fn encrypt(
        &self,
        recipient: &str,
        signer: Option<&str>,
        should_sign: bool,
        plaintext: &str,
    ) -> Invocation {
        let mut args = self.base_args();
        args.extend(
            ["--trust-model", "always", "--encrypt", "--recipient", recipient, "--armor"]
                .map(str::to_string),
        );
        if let Some(signer) = signer.filter(|_| should_sign) {
            args.extend(["--sign", "--local-user", signer].map(str::to_string));
        }
        Invocation {
            program: self.program.clone(),
            args,
            stdin: plaintext.to_string(),
        }
    }

    /// Invocation that decrypts an armored block.
    #[must_use]
    pub fn decrypt(&self, armored: &str) -> Invocation {
        let mut args = self.base_args();
        args.extend(["--batch", "--decrypt"].map(str::to_string));
        Invocation {
            program: self.program.clone(),
            args,
            stdin: armored.to_string(),
        }
    }
}
