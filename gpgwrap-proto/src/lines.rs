//! Splitting tool output into chat-sized lines.
//!
//! Output from `gpg` may use `\r\n` line endings (it does on Windows).
//! Carriage returns are removed everywhere before splitting on `\n`.

/// Splits `text` on `\n` after removing every `\r`.
///
/// Mirrors a plain split: interior and trailing empty segments are kept.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.replace('\r', "")
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// Lines of armored ciphertext that are safe to send as chat messages.
///
/// Lines that are empty once carriage returns are removed are dropped;
/// chat networks cannot carry them and the receiving side restores the
/// only blank line that matters (the armor header separator).
#[must_use]
pub fn sendable_lines(text: &str) -> Vec<String> {
    split_lines(text)
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect()
}

/// Lines of diagnostic output to show the user.
///
/// Interior blank lines are kept. The empty segment produced by a final
/// newline is not a line of its own and is dropped, so empty output yields
/// no lines at all.
#[must_use]
pub fn diagnostic_lines(text: &str) -> Vec<String> {
    let mut lines = split_lines(text);
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}
