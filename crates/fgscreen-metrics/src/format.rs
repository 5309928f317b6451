//! Newline-delimited `key=value` serialization of a [`MetricsStore`].
//!
//! Each entry is written as a single `key=value` line. Backslashes, carriage returns and
//! newlines are escaped (`\\`, `\r`, `\n`) in keys and values, and `=` is escaped as `\=` in
//! keys, so every entry stays on one line and the first unescaped `=` always ends the key.
//! When reading, lines without an unescaped `=` are ignored. Keys and values go back through
//! [`MetricsStore::put`] and are normalized again, which makes `read_from(write_to(store))`
//! reproduce the same mapping.

use std::io::{self, BufRead, Write};

use crate::store::MetricsStore;

/// Renders every entry as a `key=value` line (without the trailing newline).
pub fn to_lines(store: &MetricsStore) -> impl Iterator<Item = String> + '_ {
    store.iter().map(|(key, value)| format!("{}={}", escape(key, true), escape(value, false)))
}

/// Builds a store from `key=value` lines.
pub fn from_lines<I, S>(lines: I) -> MetricsStore
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut store = MetricsStore::new();
    for line in lines {
        if let Some((key, value)) = split_entry(line.as_ref()) {
            store.put(unescape(key), unescape(value));
        }
    }
    store
}

fn escape(text: &str, escape_separator: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '=' if escape_separator => escaped.push_str("\\="),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Reverses [`escape`]. Unknown escapes are kept verbatim.
fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(c @ ('\\' | '=')) => unescaped.push(c),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

/// Splits a line at its first unescaped `=`.
fn split_entry(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' if !escaped => return Some((&line[..i], &line[i + 1..])),
            _ => escaped = false,
        }
    }
    None
}

/// Writes `store` to `writer`, one entry per line.
///
/// # Errors
/// Returns any error raised by the underlying writer.
pub fn write_to<W: Write>(store: &MetricsStore, mut writer: W) -> io::Result<()> {
    for line in to_lines(store) {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}

/// Reads a store from `reader`, merging duplicate keys with last-writer-wins.
///
/// # Errors
/// Returns any error raised by the underlying reader, including invalid UTF-8.
pub fn read_from<R: BufRead>(reader: R) -> io::Result<MetricsStore> {
    let lines = reader.lines().collect::<io::Result<Vec<_>>>()?;
    Ok(from_lines(lines))
}
