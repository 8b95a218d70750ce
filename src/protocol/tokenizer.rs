//! Quote-aware tokenizer for reply content.
//!
//! Content is split on spaces that fall outside a double-quoted region. A
//! backslash inside quotes escapes the following character, so `\"` never
//! closes the region. Tokens carrying exactly one unquoted `=` are also
//! exposed as `key=value` pairs.

use std::collections::HashMap;

/// Split `content` into whitespace-separated tokens, keeping quoted runs intact.
///
/// Runs of spaces collapse; leading and trailing spaces produce no empty
/// tokens. Quote characters are preserved in the token text.
#[must_use]
pub fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in content.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }

        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Build the `key=value` map from a token sequence.
///
/// Only tokens with exactly one `=` outside quotes qualify; the key is the
/// text left of that `=` and must be non-empty. On key collisions the last
/// occurrence wins.
#[must_use]
pub fn pairs(tokens: &[String]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for token in tokens {
        if let Some((key, value)) = split_pair(token) {
            map.insert(key.to_owned(), value.to_owned());
        }
    }
    map
}

/// Strip surrounding double quotes and resolve backslash escapes.
///
/// Values that are not quoted are returned unchanged.
#[must_use]
pub fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_owned();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Quote `value` for transmission, escaping backslashes and quotes.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Split a token at its single unquoted `=`, if it has exactly one.
fn split_pair(token: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut split_at = None;

    for (idx, ch) in token.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '=' if !in_quotes => {
                if split_at.is_some() {
                    return None;
                }
                split_at = Some(idx);
            }
            _ => {}
        }
    }

    let idx = split_at?;
    let (key, value) = (&token[..idx], &token[idx + 1..]);
    if key.is_empty() {
        return None;
    }
    Some((key, value))
}
