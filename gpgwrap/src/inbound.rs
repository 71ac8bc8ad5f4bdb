//! Inbound decryptor: watches incoming lines for armored blocks.
//!
//! Every incoming message line is fed to the [`CaptureTable`] entry of the
//! conversation it arrived in. A completed block is handed to the
//! [`DecryptPool`] so the host thread never waits on `gpg` (which may be
//! sitting on a passphrase prompt). When the tool finishes, its diagnostic
//! lines are printed under [`LABEL_GPG`] and the plaintext under
//! [`LABEL_MESSAGE`], in the same conversation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use gpgwrap_proto::armor::{CaptureTable, Feed};
use gpgwrap_proto::lines::diagnostic_lines;

use crate::gpg::{CryptoTool, GpgProgram, run_with_timeout};
use crate::host::{Context, Host, PrintEvent};
use crate::pool::{DecryptPool, PoolError};

/// Label for diagnostic lines from the tool.
pub const LABEL_GPG: &str = "GPG";

/// Label for decrypted plaintext.
pub const LABEL_MESSAGE: &str = "Message";

/// Observes incoming lines and decrypts completed blocks in the background.
pub struct Decryptor<H: Host, T: CryptoTool> {
    captures: Mutex<CaptureTable>,
    host: Arc<H>,
    tool: Arc<T>,
    program: GpgProgram,
    timeout: Duration,
    pool: Arc<DecryptPool>,
}

impl<H: Host, T: CryptoTool> Decryptor<H, T> {
    /// Create a decryptor whose captures hold at most `max_lines` lines.
    pub fn new(
        host: Arc<H>,
        tool: Arc<T>,
        program: GpgProgram,
        timeout: Duration,
        pool: Arc<DecryptPool>,
        max_lines: usize,
    ) -> Self {
        Self {
            captures: Mutex::new(CaptureTable::new(max_lines)),
            host,
            tool,
            program,
            timeout,
            pool,
        }
    }

    /// Feed one incoming line from `context`.
    ///
    /// Returns what the capture did with it. Completed blocks are already
    /// submitted for decryption when this returns.
    pub fn observe(&self, context: &Context, line: &str) -> Feed {
        let outcome = self.captures.lock().feed(context.as_str(), line);
        match &outcome {
            Feed::Ignored | Feed::Buffered => {}
            Feed::Started => tracing::debug!(conversation = %context, "armored block started"),
            Feed::Restarted { discarded } => {
                tracing::warn!(
                    conversation = %context,
                    discarded,
                    "new armored block before previous one ended"
                );
                self.host.emit_print(
                    context,
                    PrintEvent::ChannelMessage,
                    LABEL_GPG,
                    "Incomplete PGP message discarded (a new one started)",
                );
            }
            Feed::Overflow { discarded } => {
                tracing::warn!(conversation = %context, discarded, "armored block too long");
                self.host.emit_print(
                    context,
                    PrintEvent::ChannelMessage,
                    LABEL_GPG,
                    "PGP message discarded (too many lines)",
                );
            }
            Feed::Complete(block) => {
                if let Err(e) = self.submit(context.clone(), block.clone()) {
                    tracing::warn!(conversation = %context, error = %e, "could not queue decryption");
                    self.host.emit_print(
                        context,
                        PrintEvent::ChannelMessage,
                        LABEL_GPG,
                        &format!("Could not decrypt: {e}"),
                    );
                }
            }
        }
        outcome
    }

    /// Returns `true` if `context` has a block in progress.
    #[must_use]
    pub fn is_capturing(&self, context: &Context) -> bool {
        self.captures.lock().is_capturing(context.as_str())
    }

    /// Number of lines buffered for `context`.
    #[must_use]
    pub fn buffered_lines(&self, context: &Context) -> usize {
        self.captures.lock().buffered_lines(context.as_str())
    }

    /// Drop every partial block.
    pub fn clear(&self) {
        self.captures.lock().clear();
    }

    fn submit(&self, context: Context, block: String) -> Result<(), PoolError> {
        let host = Arc::clone(&self.host);
        let tool = Arc::clone(&self.tool);
        let invocation = self.program.decrypt(&block);
        let timeout = self.timeout;
        tracing::debug!(conversation = %context, bytes = block.len(), "queueing decryption");

        self.pool.submit(async move {
            match run_with_timeout(tool.as_ref(), &invocation, timeout).await {
                Ok(output) => {
                    tracing::info!(
                        conversation = %context,
                        status = ?output.status,
                        "decryption finished"
                    );
                    render_output(host.as_ref(), &context, &output.stderr, &output.stdout);
                }
                Err(e) => {
                    tracing::warn!(conversation = %context, error = %e, "decryption failed");
                    host.emit_print(
                        &context,
                        PrintEvent::ChannelMessage,
                        LABEL_GPG,
                        &e.to_string(),
                    );
                }
            }
        })
    }
}

/// Print the tool's diagnostics line by line, then the plaintext unsplit.
pub fn render_output<H: Host + ?Sized>(host: &H, context: &Context, stderr: &str, stdout: &str) {
    for line in diagnostic_lines(stderr) {
        host.emit_print(context, PrintEvent::ChannelMessage, LABEL_GPG, &line);
    }
    host.emit_print(context, PrintEvent::ChannelMessage, LABEL_MESSAGE, stdout);
}
