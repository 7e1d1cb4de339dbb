//! Helpers for text that was produced for a terminal.
//!
//! Upstream agents frequently colour their output. Before such text is shown
//! anywhere else the escape sequences have to go.

use regex::Regex;
use std::sync::LazyLock;

/// CSI sequences (`ESC [ params final`), e.g. `\x1b[32m`, `\x1b[0m`, `\x1b[2K`.
static ANSI_CSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("static ANSI pattern is valid"));

/// Removes ANSI escape sequences from `input`.
pub fn strip_ansi(input: &str) -> String {
    ANSI_CSI.replace_all(input, "").into_owned()
}

/// Strips ANSI escape sequences and trims surrounding whitespace.
pub fn clean_output(input: &str) -> String {
    strip_ansi(input).trim().to_string()
}

/// Returns at most `max_chars` characters of `input`, for log lines.
pub fn preview(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}
