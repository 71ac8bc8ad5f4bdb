//! In-memory host for testing.
//!
//! [`RecordingHost`] answers `get_info` from settable values and records
//! every hook, printed line and raw command so tests can assert on what a
//! plugin did. Decryption prints arrive from background threads; use
//! [`RecordingHost::wait_for_prints`] to wait for them.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{Context, Host, Info, PrintEvent};

/// A line rendered through [`Host::emit_print`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintedLine {
    /// Conversation the line was printed in.
    pub context: Context,
    /// Event the line was tagged with.
    pub event: PrintEvent,
    /// Label (sender column).
    pub label: String,
    /// Line text.
    pub text: String,
}

/// A raw command issued through [`Host::command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// Conversation the command was issued from.
    pub context: Context,
    /// Raw protocol text.
    pub raw: String,
}

#[derive(Debug, Default)]
struct Recorded {
    channel: Option<String>,
    nick: Option<String>,
    commands_hooked: BTreeMap<String, String>,
    prints_hooked: Vec<PrintEvent>,
    printed: Vec<PrintedLine>,
    sent: Vec<SentCommand>,
}

/// Host that records everything a plugin does.
#[derive(Debug, Default)]
pub struct RecordingHost {
    inner: Mutex<Recorded>,
    printed_changed: Condvar,
}

impl RecordingHost {
    /// Create a host whose active channel is `channel` and nick is `nick`.
    #[must_use]
    pub fn new(channel: &str, nick: &str) -> Self {
        let host = Self::default();
        host.set_channel(Some(channel));
        host.set_nick(nick);
        host
    }

    /// Change the active channel (`None` for no active conversation).
    pub fn set_channel(&self, channel: Option<&str>) {
        self.inner.lock().channel = channel.map(str::to_string);
    }

    /// Change the local nickname.
    pub fn set_nick(&self, nick: &str) {
        self.inner.lock().nick = Some(nick.to_string());
    }

    /// Registered commands and their help text.
    #[must_use]
    pub fn hooked_commands(&self) -> BTreeMap<String, String> {
        self.inner.lock().commands_hooked.clone()
    }

    /// Print events currently observed.
    #[must_use]
    pub fn hooked_prints(&self) -> Vec<PrintEvent> {
        self.inner.lock().prints_hooked.clone()
    }

    /// Every line printed so far, in order.
    #[must_use]
    pub fn printed(&self) -> Vec<PrintedLine> {
        self.inner.lock().printed.clone()
    }

    /// Printed lines carrying `label`.
    #[must_use]
    pub fn printed_with_label(&self, label: &str) -> Vec<PrintedLine> {
        self.inner
            .lock()
            .printed
            .iter()
            .filter(|line| line.label == label)
            .cloned()
            .collect()
    }

    /// Every raw command sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCommand> {
        self.inner.lock().sent.clone()
    }

    /// Block until at least `count` lines have been printed or `timeout`
    /// elapses. Returns `true` if the count was reached.
    pub fn wait_for_prints(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.printed.len() < count {
            if self
                .printed_changed
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.printed.len() >= count;
            }
        }
        true
    }
}

impl Host for RecordingHost {
    fn hook_command(&self, name: &str, help: &str) {
        self.inner
            .lock()
            .commands_hooked
            .insert(name.to_string(), help.to_string());
    }

    fn unhook_command(&self, name: &str) {
        self.inner.lock().commands_hooked.remove(name);
    }

    fn hook_print(&self, event: PrintEvent) {
        let mut inner = self.inner.lock();
        if !inner.prints_hooked.contains(&event) {
            inner.prints_hooked.push(event);
        }
    }

    fn unhook_print(&self, event: PrintEvent) {
        self.inner.lock().prints_hooked.retain(|e| *e != event);
    }

    fn get_info(&self, info: Info) -> Option<String> {
        let inner = self.inner.lock();
        match info {
            Info::Channel => inner.channel.clone(),
            Info::Nick => inner.nick.clone(),
        }
    }

    fn emit_print(&self, context: &Context, event: PrintEvent, label: &str, text: &str) {
        self.inner.lock().printed.push(PrintedLine {
            context: context.clone(),
            event,
            label: label.to_string(),
            text: text.to_string(),
        });
        self.printed_changed.notify_all();
    }

    fn command(&self, context: &Context, raw: &str) {
        self.inner.lock().sent.push(SentCommand {
            context: context.clone(),
            raw: raw.to_string(),
        });
    }
}
