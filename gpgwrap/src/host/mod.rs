//! Host chat client abstraction.
//!
//! Defines the [`Host`] trait: the narrow slice of a chat client's plugin
//! API that `GpgWrap` relies on. Concrete implementations include:
//! - [`recording::RecordingHost`]: in-memory host that records everything, for tests
//! - [`crate::console::ConsoleHost`]: line-oriented terminal host used by the binary

pub mod recording;

use std::fmt;

/// Conversation a line belongs to: a channel name or a query target.
///
/// Decrypted output is printed back into the context the armored block
/// arrived in, and outgoing ciphertext is sent to the active context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context(String);

impl Context {
    /// Create a context from a channel or nick.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the channel or nick this context refers to.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text events a host can print and a plugin can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrintEvent {
    /// A message in a channel.
    ChannelMessage,
    /// A private message shown in a channel or server tab.
    PrivateMessage,
    /// A private message shown in its own dialog.
    PrivateMessageToDialog,
}

impl PrintEvent {
    /// Every event the inbound decryptor watches.
    pub const WATCHED: [Self; 3] = [
        Self::ChannelMessage,
        Self::PrivateMessage,
        Self::PrivateMessageToDialog,
    ];

    /// Host-facing name of the event.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ChannelMessage => "Channel Message",
            Self::PrivateMessage => "Private Message",
            Self::PrivateMessageToDialog => "Private Message to Dialog",
        }
    }
}

impl fmt::Display for PrintEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contextual information a plugin can look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Info {
    /// The active channel or query target.
    Channel,
    /// The local user's nickname.
    Nick,
}

/// Whether a callback consumed its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eat {
    /// Let the host and other plugins process the event as usual.
    None,
    /// Stop all further processing of the event.
    All,
}

/// The plugin API of the host chat client.
///
/// Hooks are registered by name; the host routes matching commands and
/// print events back to the plugin's `on_command` / `on_print`. Printing
/// may happen from background threads (decryption results), so
/// implementations must be `Send + Sync`.
pub trait Host: Send + Sync + 'static {
    /// Register a command handler for `/name` with its help text.
    fn hook_command(&self, name: &str, help: &str);

    /// Remove a command registered with [`hook_command`](Self::hook_command).
    fn unhook_command(&self, name: &str);

    /// Start observing a print event.
    fn hook_print(&self, event: PrintEvent);

    /// Stop observing a print event.
    fn unhook_print(&self, event: PrintEvent);

    /// Look up contextual information. `None` if the host has no answer.
    fn get_info(&self, info: Info) -> Option<String>;

    /// Render a line locally in `context`, tagged with `event` and `label`.
    fn emit_print(&self, context: &Context, event: PrintEvent, label: &str, text: &str);

    /// Send a raw protocol command (e.g. `PRIVMSG #chan text`) from `context`.
    fn command(&self, context: &Context, raw: &str);
}
