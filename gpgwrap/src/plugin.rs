//! Plugin lifecycle: load, host callbacks, unload.
//!
//! [`Plugin::load`] registers the `/gpg` and `/gpgs` commands and the print
//! hooks with the host. The host then routes matching input to
//! [`Plugin::on_command`] and incoming messages to [`Plugin::on_print`].
//! [`Plugin::unload`] removes every hook and drains the decrypt pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gpgwrap_proto::words::Words;

use crate::config::PluginConfig;
use crate::gpg::CryptoTool;
use crate::host::{Context, Eat, Host, Info, PrintEvent};
use crate::inbound::{Decryptor, LABEL_GPG};
use crate::outbound::{EncryptCommand, EncryptError, EncryptRequest, Encryptor, deliver};
use crate::pool::{DecryptPool, PoolError};

/// Name shown in load/unload notices and usage messages.
pub const PLUGIN_NAME: &str = "GpgWrap";

/// Plugin version.
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors that can occur when loading the plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The decrypt worker pool could not be started.
    #[error("failed to start decrypt workers: {0}")]
    Pool(#[from] PoolError),
}

/// The loaded plugin.
pub struct Plugin<H: Host, T: CryptoTool> {
    host: Arc<H>,
    encryptor: Encryptor<T>,
    decryptor: Decryptor<H, T>,
    pool: Arc<DecryptPool>,
    unloaded: AtomicBool,
}

impl<H: Host, T: CryptoTool> Plugin<H, T> {
    /// Register hooks with `host` and announce the plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Pool`] if the decrypt workers cannot start.
    pub fn load(host: Arc<H>, tool: Arc<T>, config: &PluginConfig) -> Result<Self, PluginError> {
        let pool = Arc::new(DecryptPool::start(&config.pool)?);
        let encryptor = Encryptor::new(
            Arc::clone(&tool),
            config.gpg.clone(),
            config.encrypt_timeout,
        );
        let decryptor = Decryptor::new(
            Arc::clone(&host),
            tool,
            config.gpg.clone(),
            config.decrypt_timeout,
            Arc::clone(&pool),
            config.max_capture_lines,
        );

        for command in EncryptCommand::ALL {
            host.hook_command(command.name(), command.help());
        }
        for event in PrintEvent::WATCHED {
            host.hook_print(event);
        }

        tracing::info!(
            version = PLUGIN_VERSION,
            program = %config.gpg.program.display(),
            "plugin loaded"
        );
        host.emit_print(
            &active_context(host.as_ref()),
            PrintEvent::ChannelMessage,
            PLUGIN_NAME,
            &format!("{PLUGIN_NAME} loaded!"),
        );

        Ok(Self {
            host,
            encryptor,
            decryptor,
            pool,
            unloaded: AtomicBool::new(false),
        })
    }

    /// Command callback. `input` is the command line without the leading
    /// slash, starting with the command name (`gpg bob hello`).
    ///
    /// Always returns [`Eat::All`] for the plugin's own commands; other
    /// commands are passed through with [`Eat::None`].
    pub fn on_command(&self, input: &str) -> Eat {
        let words = Words::split(input);
        let Some(command) = words.word(0).and_then(EncryptCommand::from_name) else {
            return Eat::None;
        };
        if self.is_unloaded() {
            return Eat::None;
        }

        let context = active_context(self.host.as_ref());
        let request = match EncryptRequest::parse(command, &words) {
            Ok(request) => request,
            Err(usage) => {
                self.host.emit_print(
                    &context,
                    PrintEvent::ChannelMessage,
                    PLUGIN_NAME,
                    &usage.to_string(),
                );
                return Eat::All;
            }
        };

        if context.as_str().is_empty() {
            self.host.emit_print(
                &context,
                PrintEvent::ChannelMessage,
                PLUGIN_NAME,
                "No active channel or query to send to",
            );
            return Eat::All;
        }

        match self.pool.block_on(self.encryptor.encrypt(&request)) {
            Ok(Ok(lines)) => {
                let nick = self.host.get_info(Info::Nick).unwrap_or_default();
                deliver(self.host.as_ref(), &context, &nick, &lines);
            }
            Ok(Err(EncryptError::Failed { diagnostics, .. })) => {
                for line in &diagnostics {
                    self.host
                        .emit_print(&context, PrintEvent::ChannelMessage, LABEL_GPG, line);
                }
                self.host.emit_print(
                    &context,
                    PrintEvent::ChannelMessage,
                    PLUGIN_NAME,
                    "Encryption failed, nothing was sent",
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "encryption could not run");
                self.host.emit_print(
                    &context,
                    PrintEvent::ChannelMessage,
                    LABEL_GPG,
                    &e.to_string(),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "encryption rejected");
                self.host.emit_print(
                    &context,
                    PrintEvent::ChannelMessage,
                    PLUGIN_NAME,
                    &e.to_string(),
                );
            }
        }
        Eat::All
    }

    /// Print-event callback for an incoming message `text` from `sender`
    /// in `context`. Never consumes the event.
    pub fn on_print(&self, event: PrintEvent, context: &Context, sender: &str, text: &str) -> Eat {
        if self.is_unloaded() || !PrintEvent::WATCHED.contains(&event) {
            return Eat::None;
        }
        tracing::trace!(%event, conversation = %context, sender, "observed line");
        self.decryptor.observe(context, text);
        Eat::None
    }

    /// Returns `true` if `context` has an armored block in progress.
    #[must_use]
    pub fn is_capturing(&self, context: &Context) -> bool {
        self.decryptor.is_capturing(context)
    }

    /// Returns `true` once [`unload`](Self::unload) has run.
    #[must_use]
    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    /// Remove every hook, drain the decrypt pool and announce the unload.
    ///
    /// Running it more than once has no further effect.
    pub fn unload(&self) {
        if self.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }
        for event in PrintEvent::WATCHED {
            self.host.unhook_print(event);
        }
        for command in EncryptCommand::ALL {
            self.host.unhook_command(command.name());
        }
        self.decryptor.clear();
        let report = self.pool.shutdown();
        tracing::info!(
            drained = report.drained,
            aborted = report.aborted,
            "plugin unloaded"
        );
        self.host.emit_print(
            &active_context(self.host.as_ref()),
            PrintEvent::ChannelMessage,
            PLUGIN_NAME,
            &format!("{PLUGIN_NAME} unloaded!"),
        );
    }
}

impl<H: Host, T: CryptoTool> Drop for Plugin<H, T> {
    fn drop(&mut self) {
        self.unload();
    }
}

fn active_context<H: Host + ?Sized>(host: &H) -> Context {
    Context::new(host.get_info(Info::Channel).unwrap_or_default())
}
