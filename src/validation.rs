//! Input sanitizing shared by every lobby engine.
//!
//! Clients are untrusted: any string may be empty, enormous or full of control
//! characters, and any number may be out of range. Nothing here fails; every
//! helper turns hostile input into a bounded value.

/// Trim, drop control characters and cut to at most `max_chars` characters.
pub fn clean_text(raw: &str, max_chars: usize) -> String {
    raw.trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Like [clean_text] but keeps line breaks, for multi-line scene content and notes.
pub fn clean_multiline(raw: &str, max_chars: usize) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .take(max_chars)
        .collect()
}

/// Clean a value and fall back to `default` when nothing printable is left.
pub fn clean_or(raw: &str, max_chars: usize, default: &str) -> String {
    let cleaned = clean_text(raw, max_chars);
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

/// Identifier-like keys (macro names, token ids): lowercase ASCII letters,
/// digits, `-` and `_` only.
pub fn clean_key(raw: &str, max_chars: usize) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(max_chars)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Accept `#rgb`/`#rrggbb` hex colors or short alphabetic CSS names; anything
/// else becomes `default`.
pub fn clean_color(raw: &str, default: &str) -> String {
    let c = raw.trim();
    let is_hex = c.starts_with('#')
        && matches!(c.len(), 4 | 7)
        && c[1..].chars().all(|ch| ch.is_ascii_hexdigit());
    let is_named = !c.is_empty() && c.len() <= 20 && c.chars().all(|ch| ch.is_ascii_alphabetic());
    if is_hex || is_named {
        c.to_ascii_lowercase()
    } else {
        default.to_string()
    }
}

/// Case-folded form used for bans and name collisions.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_and_truncates() {
        assert_eq!(clean_text("  Rin\u{0}\n ", 24), "Rin");
        assert_eq!(clean_text("abcdef", 3), "abc");
        assert_eq!(clean_text("ab   cd", 4), "ab");
    }

    #[test]
    fn clean_or_defaults_when_empty() {
        assert_eq!(clean_or("   ", 10, "Adventurer"), "Adventurer");
        assert_eq!(clean_or("\u{1b}", 10, "x"), "x");
    }

    #[test]
    fn multiline_keeps_newlines() {
        assert_eq!(clean_multiline("a\nb\u{7}", 10), "a\nb");
    }

    #[test]
    fn keys_are_lowercase_ascii() {
        assert_eq!(clean_key(" Fire Bolt! ", 20), "firebolt");
        assert_eq!(clean_key("tok_1-A", 20), "tok_1-a");
    }

    #[test]
    fn colors_fall_back() {
        assert_eq!(clean_color("#FFAA00", "#000"), "#ffaa00");
        assert_eq!(clean_color("teal", "#000"), "teal");
        assert_eq!(clean_color("url(javascript:x)", "#000"), "#000");
        assert_eq!(clean_color("#12", "#000"), "#000");
    }
}
