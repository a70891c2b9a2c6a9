//! Logging helpers that keep player-supplied text on a single log line.
//!
//! Chat lines, lobby names and display names all come straight from clients, so
//! anything that reaches `log::*` macros goes through [escape_log] first.

use std::fmt::Write;

/// Longest preview of client text written to a log line.
const MAX_PREVIEW: usize = 200;

/// Escape a client-supplied string for single-line logging.
///
/// Newlines, carriage returns and tabs become their backslash forms, other
/// control characters become `\xNN`, and text past [MAX_PREVIEW] characters is
/// cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Render a lobby/name pair the way every lobby-scoped log line starts.
pub fn lobby_tag(lobby: &str, who: &str) -> String {
    format!("[{}] {}", escape_log(lobby), escape_log(who))
}
