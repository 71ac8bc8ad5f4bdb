//! Line-oriented terminal host.
//!
//! [`ConsoleHost`] stands in for a chat client so the plugin can be driven
//! from a terminal: output lines are written to any [`Write`] sink, and
//! [`run`] reads input lines and routes them the way a client would.
//!
//! Input forms:
//!
//! | Input               | Meaning                                         |
//! |---------------------|-------------------------------------------------|
//! | `/quit`             | unload the plugin and exit                      |
//! | `/join <target>`    | switch the active channel or query              |
//! | `/help <command>`   | show a command's registered help text           |
//! | `/<command> args`   | run a hooked command                            |
//! | `<nick> text`       | simulate an incoming channel message            |
//! | `*nick* text`       | simulate an incoming private message            |
//! | anything else       | say `text` in the active channel                |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use chrono::format::{Item, StrftimeItems};
use parking_lot::Mutex;

use crate::gpg::CryptoTool;
use crate::host::{Context, Eat, Host, Info, PrintEvent};
use crate::plugin::Plugin;

/// One parsed line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Blank line.
    Empty,
    /// `/quit`
    Quit,
    /// `/join <target>`
    Join(String),
    /// `/help <command>`
    Help(String),
    /// Any other slash command, without the slash.
    Command(String),
    /// A simulated line from someone else.
    Incoming {
        /// Which print event the line arrives as.
        event: PrintEvent,
        /// Nick of the sender.
        sender: String,
        /// Message text.
        text: String,
    },
    /// Plain text to say in the active channel.
    Say(String),
}

impl ConsoleInput {
    /// Parse one input line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }

        if let Some(command) = line.strip_prefix('/') {
            let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
            let rest = rest.trim();
            return match name.to_ascii_lowercase().as_str() {
                "quit" | "exit" => Self::Quit,
                "join" | "query" if !rest.is_empty() => Self::Join(rest.to_string()),
                "help" if !rest.is_empty() => Self::Help(rest.trim_start_matches('/').to_string()),
                _ => Self::Command(command.to_string()),
            };
        }

        if let Some(incoming) = parse_incoming(line, '<', '>', PrintEvent::ChannelMessage)
            .or_else(|| parse_incoming(line, '*', '*', PrintEvent::PrivateMessage))
        {
            return incoming;
        }

        Self::Say(line.to_string())
    }
}

fn parse_incoming(line: &str, open: char, close: char, event: PrintEvent) -> Option<ConsoleInput> {
    let rest = line.strip_prefix(open)?;
    let (sender, text) = rest.split_once(close)?;
    if sender.is_empty() || sender.contains(' ') {
        return None;
    }
    Some(ConsoleInput::Incoming {
        event,
        sender: sender.to_string(),
        text: text.strip_prefix(' ').unwrap_or(text).to_string(),
    })
}

/// Timestamp format used when the configured one is invalid.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%H:%M";

/// Returns `true` if chrono can render every item of `format`.
#[must_use]
pub fn is_valid_timestamp_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

struct ConsoleState<W> {
    out: W,
    channel: Option<String>,
    nick: String,
    commands: BTreeMap<String, String>,
    prints: BTreeSet<PrintEvent>,
}

/// A [`Host`] that writes to a terminal-like sink.
pub struct ConsoleHost<W> {
    state: Mutex<ConsoleState<W>>,
    timestamp_format: String,
}

impl<W: Write + Send + 'static> ConsoleHost<W> {
    /// Create a console host writing to `out`.
    ///
    /// An empty `timestamp_format` omits timestamps. A format chrono cannot
    /// render is replaced by [`DEFAULT_TIMESTAMP_FORMAT`].
    pub fn new(
        out: W,
        channel: impl Into<String>,
        nick: impl Into<String>,
        timestamp_format: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        let mut timestamp_format = timestamp_format.into();
        if !is_valid_timestamp_format(&timestamp_format) {
            tracing::warn!(
                format = %timestamp_format,
                fallback = DEFAULT_TIMESTAMP_FORMAT,
                "invalid timestamp format"
            );
            timestamp_format = DEFAULT_TIMESTAMP_FORMAT.to_string();
        }
        Self {
            state: Mutex::new(ConsoleState {
                out,
                channel: (!channel.is_empty()).then_some(channel),
                nick: nick.into(),
                commands: BTreeMap::new(),
                prints: BTreeSet::new(),
            }),
            timestamp_format,
        }
    }

    /// Switch the active channel or query.
    pub fn set_channel(&self, channel: &str) {
        self.state.lock().channel = Some(channel.to_string());
    }

    /// Help text registered for `name`, if the command is hooked.
    #[must_use]
    pub fn help_for(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .commands
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// Returns `true` if a plugin registered `/name`.
    #[must_use]
    pub fn is_command_hooked(&self, name: &str) -> bool {
        self.help_for(name).is_some()
    }

    /// Returns `true` if a plugin is observing `event`.
    #[must_use]
    pub fn is_print_hooked(&self, event: PrintEvent) -> bool {
        self.state.lock().prints.contains(&event)
    }

    /// Inspect the output sink.
    pub fn with_output<R>(&self, f: impl FnOnce(&W) -> R) -> R {
        f(&self.state.lock().out)
    }

    fn write_line(&self, line: &str) {
        let mut state = self.state.lock();
        let out = &mut state.out;
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    fn timestamp(&self) -> String {
        let mut ts = String::new();
        if !self.timestamp_format.is_empty()
            && write!(ts, "{} ", chrono::Local::now().format(&self.timestamp_format)).is_err()
        {
            ts.clear();
        }
        ts
    }
}

impl<W: Write + Send + 'static> Host for ConsoleHost<W> {
    fn hook_command(&self, name: &str, help: &str) {
        self.state
            .lock()
            .commands
            .insert(name.to_ascii_lowercase(), help.to_string());
    }

    fn unhook_command(&self, name: &str) {
        self.state.lock().commands.remove(&name.to_ascii_lowercase());
    }

    fn hook_print(&self, event: PrintEvent) {
        self.state.lock().prints.insert(event);
    }

    fn unhook_print(&self, event: PrintEvent) {
        self.state.lock().prints.remove(&event);
    }

    fn get_info(&self, info: Info) -> Option<String> {
        let state = self.state.lock();
        match info {
            Info::Channel => state.channel.clone(),
            Info::Nick => Some(state.nick.clone()),
        }
    }

    fn emit_print(&self, context: &Context, _event: PrintEvent, label: &str, text: &str) {
        let ts = self.timestamp();
        let text = text.trim_end_matches(['\r', '\n']);
        let mut block = String::new();
        for (i, line) in text.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if i == 0 {
                block.push_str(&format!("{ts}[{context}] <{label}> {line}"));
            } else {
                block.push_str(&format!("\n{ts}[{context}]   {line}"));
            }
        }
        self.write_line(&block);
    }

    fn command(&self, _context: &Context, raw: &str) {
        self.write_line(&format!(">> {raw}"));
    }
}

/// Read lines from `input` and route them to `host` and `plugin` until
/// `/quit` or end of input.
///
/// # Errors
///
/// Returns any I/O error from reading `input`.
pub fn run<R, W, T>(input: R, host: &ConsoleHost<W>, plugin: &Plugin<ConsoleHost<W>, T>) -> io::Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
    T: CryptoTool,
{
    for line in input.lines() {
        let line = line?;
        match ConsoleInput::parse(&line) {
            ConsoleInput::Empty => {}
            ConsoleInput::Quit => break,
            ConsoleInput::Join(target) => {
                host.set_channel(&target);
                tracing::debug!(%target, "switched context");
            }
            ConsoleInput::Help(name) => {
                let ctx = active(host);
                match host.help_for(&name) {
                    Some(help) => host.emit_print(&ctx, PrintEvent::ChannelMessage, "Help", &help),
                    None => host.emit_print(
                        &ctx,
                        PrintEvent::ChannelMessage,
                        "Help",
                        &format!("No help available for /{name}"),
                    ),
                }
            }
            ConsoleInput::Command(command) => {
                let name = command.split(' ').next().unwrap_or_default();
                if !host.is_command_hooked(name) || plugin.on_command(&command) == Eat::None {
                    host.emit_print(
                        &active(host),
                        PrintEvent::ChannelMessage,
                        "Error",
                        &format!("Unknown command: /{name}"),
                    );
                }
            }
            ConsoleInput::Incoming {
                event,
                sender,
                text,
            } => {
                let ctx = match event {
                    PrintEvent::ChannelMessage => active(host),
                    PrintEvent::PrivateMessage | PrintEvent::PrivateMessageToDialog => {
                        Context::new(sender.as_str())
                    }
                };
                let eat = if host.is_print_hooked(event) {
                    plugin.on_print(event, &ctx, &sender, &text)
                } else {
                    Eat::None
                };
                if eat == Eat::None {
                    host.emit_print(&ctx, event, &sender, &text);
                }
            }
            ConsoleInput::Say(text) => {
                let ctx = active(host);
                let nick = host.get_info(Info::Nick).unwrap_or_default();
                host.emit_print(&ctx, PrintEvent::ChannelMessage, &nick, &text);
                host.command(&ctx, &format!("PRIVMSG {ctx} {text}"));
            }
        }
    }
    Ok(())
}

fn active<W: Write + Send + 'static>(host: &ConsoleHost<W>) -> Context {
    Context::new(host.get_info(Info::Channel).unwrap_or_default())
}
