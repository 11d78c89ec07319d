//! Scalar and hash-key quoting shared by the in-process backends.

/// Integers printed without quotes: `0` or an optionally negative
/// number of at most nine digits without a leading zero.
pub fn is_bare_number(s: &str) -> bool {
    if s == "0" {
        return true;
    }
    let digits = s.strip_prefix('-').unwrap_or(s);
    let bytes = digits.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 9
        && (b'1'..=b'9').contains(&bytes[0])
        && bytes.iter().all(u8::is_ascii_digit)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Single-quoted form: only `\` and `'` are escaped.
pub fn single_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn named_escape(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{07}' => "\\a",
        '\u{08}' => "\\b",
        '\t' => "\\t",
        '\n' => "\\n",
        '\u{0c}' => "\\f",
        '\r' => "\\r",
        '\u{1b}' => "\\e",
        _ => return None,
    })
}

/// Double-quoted form used with `useqq`.
pub fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(esc) = named_escape(c) {
            out.push_str(esc);
            continue;
        }
        match c {
            '\\' | '"' | '@' | '$' => {
                out.push('\\');
                out.push(c);
            }
            '\u{00}'..='\u{1f}' | '\u{7f}' => {
                // a following digit would be read as part of a short octal escape
                let next_is_digit = chars.peek().is_some_and(char::is_ascii_digit);
                if next_is_digit || c == '\u{7f}' {
                    out.push_str(&format!("\\{:03o}", c as u32));
                } else {
                    out.push_str(&format!("\\{:o}", c as u32));
                }
            }
            _ if !c.is_ascii() => out.push_str(&format!("\\x{{{:x}}}", c as u32)),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A scalar value as it appears in dump output.
pub fn scalar(s: &str, useqq: bool) -> String {
    if is_bare_number(s) {
        s.to_string()
    } else if useqq {
        double_quote(s)
    } else {
        single_quote(s)
    }
}

/// A hash key as it appears in dump output.
pub fn key(k: &str, quotekeys: bool, useqq: bool) -> String {
    let plain = is_identifier(k)
        || k.strip_prefix('-').map_or(is_bare_number(k), |rest| {
            rest != "0" && is_bare_number(rest)
        });
    if !quotekeys && plain {
        k.to_string()
    } else if useqq {
        double_quote(k)
    } else {
        single_quote(k)
    }
}
