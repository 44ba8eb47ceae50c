/// Escapes `input` for use inside a JSON string.
///
/// Quote, backslash and the five named control characters get their short
/// escapes; any other control character below `0x20` becomes a space.
#[must_use]
pub fn json_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if u32::from(c) < 0x20 => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Grammar terminal matching the JSON string literal for `name`.
///
/// The name is first rendered as JSON text (`"..."`, escaped), and that text
/// is escaped again so the terminal itself is a well-formed quoted literal.
/// Reading the terminal as a JSON string gives the JSON text; reading that
/// gives `name` back.
#[must_use]
pub fn grammar_literal(name: &str) -> String {
    let json_text = format!("\"{}\"", json_escape(name));
    let mut out = String::with_capacity(json_text.len() * 2 + 2);
    out.push('"');
    for c in json_text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unwrap_twice(literal: &str) -> String {
        let json_text: String = serde_json::from_str(literal).unwrap();
        serde_json::from_str(&json_text).unwrap()
    }

    #[test]
    fn escapes_named_and_other_control_characters() {
        assert_eq!(json_escape("a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(json_escape("x\u{08}\u{0c}\n\r\ty"), "x\\b\\f\\n\\r\\ty");
        assert_eq!(json_escape("bell\u{07}end"), "bell end");
        assert_eq!(json_escape("stat fps"), "stat fps");
    }

    #[test]
    fn plain_literal_matches_quoted_json() {
        assert_eq!(grammar_literal("MoveTo"), "\"\\\"MoveTo\\\"\"");
    }

    #[test]
    fn literal_round_trips_awkward_names() {
        for name in [
            "MoveTo",
            "say \"hi\"",
            "C:\\path\\to",
            "line\nbreak\ttab\rret",
            "\\\"",
            "r.ScreenPercentage 50",
            "ünïcödé",
        ] {
            assert_eq!(unwrap_twice(&grammar_literal(name)), name, "{name:?}");
        }
    }

    #[test]
    fn unnamed_control_characters_become_spaces() {
        assert_eq!(unwrap_twice(&grammar_literal("a\u{01}b")), "a b");
    }
}
