//! Double-quoted string literal formatting.

use std::fmt::Write;

use crate::token;

/// Returns a double-quoted string literal representing `bytes`.
///
/// Per code unit: the short escapes `\a \b \f \n \r \t \v \\ \"` where they
/// exist, the literal character for printable ASCII (0x20..=0x7E), and a
/// decimal `\DDD` escape otherwise. Decimal escapes carry no leading zeros
/// unless the following input byte is itself a decimal digit, in which case
/// they are padded to three digits so the literal re-lexes to the same bytes.
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 / 2 + 2);
    out.push('"');
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\v"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let next_is_digit = bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                if next_is_digit {
                    let _ = write!(out, "\\{b:03}");
                } else {
                    let _ = write!(out, "\\{b}");
                }
            }
        }
    }
    out.push('"');
    out
}

/// True if `bytes` form a valid bare identifier: `[A-Za-z_][A-Za-z0-9_]*`
/// and not a reserved word. Used to decide between `name = v` and
/// `["name"] = v` in table constructors and between `.name` and `["name"]`
/// in attribute access.
pub fn is_valid_name(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let ok = b == b'_' || b.is_ascii_alphabetic() || (b.is_ascii_digit() && i > 0);
        if !ok {
            return false;
        }
    }
    // bytes are ASCII here, so the conversion cannot fail
    let name = std::str::from_utf8(bytes).expect("identifier bytes are ASCII");
    !token::is_reserved(name)
}
