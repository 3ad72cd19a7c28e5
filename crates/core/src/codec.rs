//! Line codec for structured message bodies
//!
//! Tokens are joined with single spaces. A token is quote-enclosed when it
//! is empty or contains a space or a double quote; inside quotes, `\` and
//! `"` are escaped with a backslash.
//!
//! ```
//! use relay_core::codec::{decode, encode};
//!
//! let line = encode(["MOVE", "north east", "3"]);
//! assert_eq!(line, r#"MOVE "north east" 3"#);
//! assert_eq!(decode(&line), vec!["MOVE", "north east", "3"]);
//! ```

use std::fmt::Display;

/// Encode a sequence of displayable values as a single line
pub fn encode<I>(parts: I) -> String
where
    I: IntoIterator,
    I::Item: Display,
{
    let mut line = String::new();

    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        push_token(&mut line, &part.to_string());
    }

    line
}

fn push_token(line: &mut String, token: &str) {
    let needs_quotes = token.is_empty() || token.contains(' ') || token.contains('"');
    if !needs_quotes {
        line.push_str(token);
        return;
    }

    line.push('"');
    for c in token.chars() {
        if c == '\\' || c == '"' {
            line.push('\\');
        }
        line.push(c);
    }
    line.push('"');
}

/// Lexer state for [`decode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    Quoted,
    Escape,
}

/// Decode a line produced by [`encode`] back into its tokens
///
/// Never fails: an unterminated quote or a trailing escape keeps whatever
/// was collected so far. An empty line yields no tokens at all.
pub fn decode(line: &str) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut state = LexState::Normal;
    // `None` until a character (or an opening quote) starts the token
    let mut current: Option<String> = None;

    for c in line.chars() {
        match state {
            LexState::Normal => match c {
                ' ' => tokens.push(current.take().unwrap_or_default()),
                '"' => {
                    current.get_or_insert_with(String::new);
                    state = LexState::Quoted;
                }
                _ => current.get_or_insert_with(String::new).push(c),
            },
            LexState::Quoted => match c {
                '"' => state = LexState::Normal,
                '\\' => state = LexState::Escape,
                _ => current.get_or_insert_with(String::new).push(c),
            },
            LexState::Escape => {
                current.get_or_insert_with(String::new).push(c);
                state = LexState::Quoted;
            }
        }
    }

    tokens.push(current.unwrap_or_default());
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(parts: &[&str]) {
        let line = encode(parts);
        assert_eq!(decode(&line), parts, "line was {line:?}");
    }

    #[test]
    fn test_plain_tokens() {
        assert_eq!(encode(["GET_REALM_INFO"]), "GET_REALM_INFO");
        assert_eq!(encode(["REALM_INFO", "4", "2"]), "REALM_INFO 4 2");
        assert_eq!(decode("REALM_INFO 4 2"), vec!["REALM_INFO", "4", "2"]);
    }

    #[test]
    fn test_mixed_display_values() {
        let line = encode([&"SCORE" as &dyn Display, &12u32, &-3i64]);
        assert_eq!(line, "SCORE 12 -3");
    }

    #[test]
    fn test_quoting_rules() {
        assert_eq!(encode([""]), r#""""#);
        assert_eq!(encode(["a b"]), r#""a b""#);
        assert_eq!(encode([r#"say "hi""#]), r#""say \"hi\"""#);
        // Backslashes are only escaped inside quotes
        assert_eq!(encode([r"a\b"]), r"a\b");
        assert_eq!(encode([r"a \b"]), r#""a \\b""#);
    }

    #[test]
    fn test_roundtrip_awkward_tokens() {
        roundtrip(&["CHAT", "hello world", "", r#"she said "no""#]);
        roundtrip(&[r"C:\path\to", r"trailing\", r#"\""#]);
        roundtrip(&["", "", ""]);
        roundtrip(&["  leading and trailing  "]);
        roundtrip(&["unicode ✓", "ünïcödé"]);
    }

    #[test]
    fn test_empty_line_has_no_tokens() {
        assert!(decode("").is_empty());
        assert_eq!(encode(Vec::<String>::new()), "");
    }

    #[test]
    fn test_non_empty_line_has_tokens() {
        assert_eq!(decode(" "), vec!["", ""]);
        assert_eq!(decode("x"), vec!["x"]);
        assert_eq!(decode("a  b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_lenient_malformed_quoting() {
        assert_eq!(decode(r#"CMD "unterminated arg"#), vec!["CMD", "unterminated arg"]);
        assert_eq!(decode(r#""dangling\"#), vec!["dangling"]);
        assert_eq!(decode(r#"ab"c d"e"#), vec!["abc de"]);
    }
}
