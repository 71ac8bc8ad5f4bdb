//! Outbound encryptor: the `/gpg` and `/gpgs` commands.
//!
//! Parses the command words into an [`EncryptRequest`], runs the tool's
//! encrypt operation and returns the armored output as sendable lines.
//! The plugin then echoes each line locally and sends it as a `PRIVMSG`
//! (see [`deliver`]).

use std::sync::Arc;
use std::time::Duration;

use gpgwrap_proto::lines::{diagnostic_lines, sendable_lines};
use gpgwrap_proto::words::Words;

use crate::gpg::{CryptoTool, GpgError, GpgProgram, run_with_timeout};
use crate::host::{Context, Host, PrintEvent};

/// Help text for `/gpg`.
pub const HELP_GPG: &str = "Usage: /gpg recipient message";

/// Help text for `/gpgs`.
pub const HELP_GPGS: &str = "Usage: /gpgs recipient sign_as message";

/// The two command forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptCommand {
    /// `/gpg recipient message...`
    Encrypt,
    /// `/gpgs recipient sign_as message...`
    EncryptSigned,
}

impl EncryptCommand {
    /// Both forms, in registration order.
    pub const ALL: [Self; 2] = [Self::Encrypt, Self::EncryptSigned];

    /// Command name as typed after the slash.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "gpg",
            Self::EncryptSigned => "gpgs",
        }
    }

    /// Usage line shown on bad input and registered as help text.
    #[must_use]
    pub const fn help(self) -> &'static str {
        match self {
            Self::Encrypt => HELP_GPG,
            Self::EncryptSigned => HELP_GPGS,
        }
    }

    /// Look up a command form by name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    /// Arguments required after the command name.
    const fn min_args(self) -> usize {
        match self {
            Self::Encrypt => 2,
            Self::EncryptSigned => 3,
        }
    }
}

/// Too few arguments for a command form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.help())]
pub struct UsageError(pub EncryptCommand);

/// Everything needed to encrypt one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    /// Key identifier of the recipient.
    pub recipient: String,
    /// Key identifier to sign with.
    pub signer: Option<String>,
    /// Whether to sign. The signer is ignored when this is `false`.
    pub should_sign: bool,
    /// Message text, spacing preserved.
    pub plaintext: String,
}

impl EncryptRequest {
    /// Build a request from the words of a command line (word 0 is the
    /// command name itself).
    ///
    /// # Errors
    ///
    /// Returns [`UsageError`] if fewer arguments than the form needs follow
    /// the command name.
    pub fn parse(command: EncryptCommand, words: &Words<'_>) -> Result<Self, UsageError> {
        if words.len() < command.min_args() + 1 {
            return Err(UsageError(command));
        }
        let word = |i| words.word(i).map(str::to_string).ok_or(UsageError(command));
        let rest = |i| words.rest(i).map(str::to_string).ok_or(UsageError(command));

        match command {
            EncryptCommand::Encrypt => Ok(Self {
                recipient: word(1)?,
                signer: None,
                should_sign: false,
                plaintext: rest(2)?,
            }),
            EncryptCommand::EncryptSigned => Ok(Self {
                recipient: word(1)?,
                signer: Some(word(2)?),
                should_sign: true,
                plaintext: rest(3)?,
            }),
        }
    }
}

/// Errors that can occur while encrypting.
#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    /// The tool could not be run (missing executable, I/O, timeout).
    #[error(transparent)]
    Tool(#[from] GpgError),

    /// The tool ran but produced no usable ciphertext.
    #[error("encryption failed (exit status {status:?})")]
    Failed {
        /// Exit code, if any.
        status: Option<i32>,
        /// The tool's diagnostic lines.
        diagnostics: Vec<String>,
    },
}

/// Runs encrypt invocations against a [`CryptoTool`].
pub struct Encryptor<T: CryptoTool> {
    tool: Arc<T>,
    program: GpgProgram,
    timeout: Duration,
}

impl<T: CryptoTool> Encryptor<T> {
    /// Create an encryptor that gives up on the tool after `timeout`.
    pub const fn new(tool: Arc<T>, program: GpgProgram, timeout: Duration) -> Self {
        Self {
            tool,
            program,
            timeout,
        }
    }

    /// Encrypt `request` and return the armored lines to send.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptError::Tool`] if the tool cannot be run or times
    /// out, and [`EncryptError::Failed`] if it exits unsuccessfully or
    /// prints no ciphertext.
    pub async fn encrypt(&self, request: &EncryptRequest) -> Result<Vec<String>, EncryptError> {
        let invocation = self.program.encrypt(
            &request.recipient,
            request.signer.as_deref(),
            request.should_sign,
            &request.plaintext,
        );
        tracing::debug!(
            recipient = %request.recipient,
            signed = request.should_sign,
            "encrypting message"
        );

        let output = run_with_timeout(self.tool.as_ref(), &invocation, self.timeout).await?;
        let lines = sendable_lines(&output.stdout);
        if !output.success || lines.is_empty() {
            tracing::warn!(status = ?output.status, "encryption produced no ciphertext");
            return Err(EncryptError::Failed {
                status: output.status,
                diagnostics: diagnostic_lines(&output.stderr),
            });
        }
        Ok(lines)
    }
}

/// Echo each ciphertext line locally as `nick` and send it to `context`.
pub fn deliver<H: Host>(host: &H, context: &Context, nick: &str, lines: &[String]) {
    for line in lines {
        host.emit_print(context, PrintEvent::ChannelMessage, nick, line);
        host.command(context, &format!("PRIVMSG {} {line}", context.as_str()));
    }
    tracing::info!(target_ctx = %context, lines = lines.len(), "sent encrypted message");
}
