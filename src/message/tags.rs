//! IRCv3 message tag escaping.
//!
//! | raw | escaped |
//! |-----|---------|
//! | `;` | `\:`    |
//! | ` ` | `\s`    |
//! | `\` | `\\`    |
//! | CR  | `\r`    |
//! | LF  | `\n`    |

use std::fmt::{Result as FmtResult, Write};

/// Write `value` in escaped wire form.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> FmtResult {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

/// Reverse [`escape_tag_value`].
///
/// Unknown escapes drop the backslash; a lone trailing backslash is dropped.
pub(crate) fn unescape_tag_value(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut iter = value.chars();
    while let Some(c) = iter.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match iter.next() {
            Some(':') => unescaped.push(';'),
            Some('s') => unescaped.push(' '),
            Some('r') => unescaped.push('\r'),
            Some('n') => unescaped.push('\n'),
            Some(other) => unescaped.push(other),
            None => break,
        }
    }
    unescaped
}

/// Whether `key` can appear as a tag key on the wire.
pub fn is_valid_tag_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| !matches!(c, ' ' | ';' | '=' | '\r' | '\n' | '\0'))
}
