//! Various utils for picodisk.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub(crate) mod time;

/// Uppercase an ASCII byte.  Filenames arrive from the computer in the
/// upper/graphics character set, so plain ASCII uppercasing is sufficient
/// for extension and prefix matching.
pub fn ascii_upper(b: u8) -> u8 {
    if b.is_ascii_lowercase() { b - 0x20 } else { b }
}

/// Case-insensitive ASCII prefix test.
pub fn starts_with(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()
            .iter()
            .zip(prefix.as_bytes())
            .all(|(a, b)| ascii_upper(*a) == ascii_upper(*b))
}

/// Trim ASCII whitespace and unprintable padding from both ends.
pub fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\r' || c == '\n' || c == '\0')
}

/// The extension of a filename, uppercased into `buf`.  Returns the empty
/// string when there is no dot, the dot is first, or the extension is
/// implausibly long.
pub fn extension<'a>(name: &str, buf: &'a mut [u8]) -> &'a str {
    let Some(dot) = name.rfind('.') else {
        return "";
    };
    let ext = &name[dot + 1..];
    if dot == 0 || ext.is_empty() || ext.len() > buf.len() {
        return "";
    }
    for (dst, src) in buf.iter_mut().zip(ext.bytes()) {
        *dst = ascii_upper(src);
    }
    // Just-written ASCII is valid UTF-8.
    core::str::from_utf8(&buf[..ext.len()]).unwrap_or("")
}
