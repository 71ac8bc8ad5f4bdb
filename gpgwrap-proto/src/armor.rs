//! OpenPGP armor framing as it appears in chat.
//!
//! Armored blocks arrive one line per chat message, with blank lines
//! stripped by the sender (chat networks cannot carry empty messages). A
//! [`Capture`] collects the lines of one block and restores the blank line
//! that separates the armor headers from the base64 body, so the result can
//! be piped straight into `gpg --decrypt`.
//!
//! [`CaptureTable`] keeps one [`Capture`] per conversation so that blocks
//! arriving interleaved in different channels do not corrupt each other.

use std::collections::HashMap;

/// Line that opens an armored PGP message.
pub const BEGIN_MARKER: &str = "-----BEGIN PGP MESSAGE-----";

/// Line that closes an armored PGP message.
pub const END_MARKER: &str = "-----END PGP MESSAGE-----";

/// Default upper bound on the number of buffered lines per capture.
pub const DEFAULT_MAX_LINES: usize = 4096;

/// Returns `true` if `line` is shaped like an armor header (`Key: Value`).
///
/// Keys start with an ASCII letter and continue with letters, digits or
/// `-`. Base64 body lines can never match since they contain neither a
/// colon nor a space.
#[must_use]
pub fn is_armor_header(line: &str) -> bool {
    let Some((key, _value)) = line.split_once(": ") else {
        return false;
    };
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// What a single call to [`Capture::feed`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Not capturing and the line is not a begin marker.
    Ignored,
    /// A begin marker opened a new capture.
    Started,
    /// A begin marker arrived mid-capture; the partial block was dropped
    /// and a fresh capture opened.
    Restarted {
        /// Number of buffered lines that were thrown away.
        discarded: usize,
    },
    /// The line was appended to the open capture.
    Buffered,
    /// An end marker closed the capture. Holds the full block, lines
    /// joined with `\n`, ready for decryption.
    Complete(String),
    /// The capture grew past its line limit and was dropped.
    Overflow {
        /// Number of buffered lines that were thrown away.
        discarded: usize,
    },
}

/// Where in the block an open capture currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Right after the begin marker; armor headers may follow.
    Headers,
    /// Past the header separator; collecting base64 and checksum lines.
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Capturing { phase: Phase, lines: Vec<String> },
}

/// Capture state machine for one conversation.
///
/// `Idle` until a line equal to [`BEGIN_MARKER`] arrives, then every line is
/// buffered in order until [`END_MARKER`], at which point the block is
/// returned as [`Feed::Complete`] and the capture goes back to `Idle` with
/// an empty buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    state: State,
    max_lines: usize,
}

impl Capture {
    /// Creates an idle capture that drops blocks longer than `max_lines`.
    #[must_use]
    pub const fn new(max_lines: usize) -> Self {
        Self {
            state: State::Idle,
            max_lines,
        }
    }

    /// Returns `true` while a block is being collected.
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing { .. })
    }

    /// Number of lines currently buffered (zero when idle).
    #[must_use]
    pub fn buffered_lines(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Capturing { lines, .. } => lines.len(),
        }
    }

    /// Drops any partial block and returns to idle.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Feeds one observed chat line through the state machine.
    pub fn feed(&mut self, line: &str) -> Feed {
        if line == BEGIN_MARKER {
            let discarded = self.buffered_lines();
            let was_capturing = self.is_capturing();
            self.state = State::Capturing {
                phase: Phase::Headers,
                lines: vec![BEGIN_MARKER.to_string()],
            };
            return if was_capturing {
                Feed::Restarted { discarded }
            } else {
                Feed::Started
            };
        }

        let State::Capturing { phase, lines } = &mut self.state else {
            return Feed::Ignored;
        };

        if *phase == Phase::Headers {
            if line.is_empty() {
                lines.push(String::new());
                *phase = Phase::Body;
                return self.check_overflow();
            }
            if is_armor_header(line) {
                lines.push(line.to_string());
                return self.check_overflow();
            }
            // Senders drop the blank separator; put it back.
            lines.push(String::new());
            *phase = Phase::Body;
        }

        lines.push(line.to_string());
        if line == END_MARKER {
            let block = lines.join("\n");
            self.state = State::Idle;
            return Feed::Complete(block);
        }
        self.check_overflow()
    }

    fn check_overflow(&mut self) -> Feed {
        let buffered = self.buffered_lines();
        if buffered > self.max_lines {
            self.state = State::Idle;
            Feed::Overflow {
                discarded: buffered,
            }
        } else {
            Feed::Buffered
        }
    }
}

impl Default for Capture {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

/// Per-conversation captures, keyed by channel or query target.
///
/// Only conversations with an open capture hold an entry; an entry is
/// removed as soon as its capture returns to idle.
#[derive(Debug, Clone)]
pub struct CaptureTable {
    captures: HashMap<String, Capture>,
    max_lines: usize,
}

impl CaptureTable {
    /// Creates an empty table whose captures drop blocks longer than `max_lines`.
    #[must_use]
    pub fn new(max_lines: usize) -> Self {
        Self {
            captures: HashMap::new(),
            max_lines,
        }
    }

    /// Feeds `line` to the capture belonging to `conversation`.
    pub fn feed(&mut self, conversation: &str, line: &str) -> Feed {
        if let Some(capture) = self.captures.get_mut(conversation) {
            let outcome = capture.feed(line);
            if !capture.is_capturing() {
                self.captures.remove(conversation);
            }
            return outcome;
        }

        if line != BEGIN_MARKER {
            return Feed::Ignored;
        }
        let mut capture = Capture::new(self.max_lines);
        let outcome = capture.feed(line);
        self.captures.insert(conversation.to_string(), capture);
        outcome
    }

    /// Returns `true` if `conversation` has a block in progress.
    #[must_use]
    pub fn is_capturing(&self, conversation: &str) -> bool {
        self.captures
            .get(conversation)
            .is_some_and(Capture::is_capturing)
    }

    /// Number of lines buffered for `conversation`.
    #[must_use]
    pub fn buffered_lines(&self, conversation: &str) -> usize {
        self.captures
            .get(conversation)
            .map_or(0, Capture::buffered_lines)
    }

    /// Number of conversations with a block in progress.
    #[must_use]
    pub fn active(&self) -> usize {
        self.captures.len()
    }

    /// Drops every partial block.
    pub fn clear(&mut self) {
        self.captures.clear();
    }
}

impl Default for CaptureTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}
