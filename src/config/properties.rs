//! The `.properties` text format.
//!
//! Supported syntax: `#` and `!` comment lines, `=`, `:` or whitespace
//! between key and value, backslash line continuation, and the escapes
//! `\t \n \r \f \uXXXX`. Any other escaped character stands for itself.

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxError {
    pub line: usize,
    pub message: String,
}

pub(crate) fn parse(content: &str) -> Result<BTreeMap<String, String>, SyntaxError> {
    let mut result = BTreeMap::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, raw)) = lines.next() {
        let line_no = index + 1;
        let first = raw.trim_start();
        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = first.to_string();
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let key = unescape(key).map_err(|message| SyntaxError { line: line_no, message })?;
        let value = unescape(value).map_err(|message| SyntaxError { line: line_no, message })?;
        result.insert(key, value);
    }

    Ok(result)
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Splits a logical line at the first unescaped separator.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches([' ', '\t', '\u{c}']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t', '\u{c}']);
    }
    (key, rest)
}

fn unescape(s: &str) -> Result<String, String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let (code, hex) = code_unit(&mut chars)?;
                let ch = if (0xD800..0xDC00).contains(&code) {
                    // high surrogate; the low half must follow as another escape
                    let low = match (chars.next(), chars.next()) {
                        (Some('\\'), Some('u')) => code_unit(&mut chars)?.0,
                        _ => return Err(format!("unpaired surrogate \\u{hex}")),
                    };
                    if !(0xDC00..0xE000).contains(&low) {
                        return Err(format!("unpaired surrogate \\u{hex}"));
                    }
                    char::from_u32(0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00))
                } else {
                    char::from_u32(code)
                };
                out.push(ch.ok_or_else(|| format!("invalid character code \\u{hex}"))?);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

fn code_unit(chars: &mut std::str::Chars<'_>) -> Result<(u32, String), String> {
    let hex: String = chars.by_ref().take(4).collect();
    let code = (hex.len() == 4)
        .then(|| u32::from_str_radix(&hex, 16).ok())
        .flatten()
        .ok_or_else(|| format!("malformed \\u escape: \\u{hex}"))?;
    Ok((code, hex))
}

/// Renders entries in `.properties` format, optionally headed by a comment.
pub(crate) fn write(entries: &BTreeMap<String, String>, comment: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(comment) = comment {
        for line in comment.lines() {
            let _ = writeln!(out, "# {line}");
        }
    }
    for (key, value) in entries {
        let _ = writeln!(out, "{}={}", escape(key, true), escape(value, false));
    }
    out
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{c}' => out.push_str("\\f"),
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '=' | ':' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            '#' | '!' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
