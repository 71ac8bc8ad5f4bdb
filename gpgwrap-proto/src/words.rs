//! Host-style splitting of command input into words.
//!
//! Chat clients hand command callbacks two views of the input: the list of
//! space-separated words and, for each word, the remainder of the line
//! starting at that word ("word to end of line"). Message text is taken
//! from the latter so its internal spacing survives untouched.

/// Space-separated words of one command line, with their byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Words<'a> {
    input: &'a str,
    spans: Vec<(usize, usize)>,
}

impl<'a> Words<'a> {
    /// Splits `input` on runs of spaces.
    #[must_use]
    pub fn split(input: &'a str) -> Self {
        let mut spans = Vec::new();
        let mut start = None;
        for (idx, ch) in input.char_indices() {
            match (ch == ' ', start) {
                (true, Some(s)) => {
                    spans.push((s, idx));
                    start = None;
                }
                (false, None) => start = Some(idx),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((s, input.len()));
        }
        Self { input, spans }
    }

    /// Number of words, including the command name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns `true` if the input holds no words at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Word at `index`.
    #[must_use]
    pub fn word(&self, index: usize) -> Option<&'a str> {
        self.spans.get(index).map(|&(s, e)| &self.input[s..e])
    }

    /// Remainder of the input starting at word `index`.
    #[must_use]
    pub fn rest(&self, index: usize) -> Option<&'a str> {
        self.spans.get(index).map(|&(s, _)| &self.input[s..])
    }
}
