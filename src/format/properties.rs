//! `.properties` parsing
//!
//! Implements the line-oriented Java properties grammar:
//!
//! - `key=value`, `key: value` and `key value` separators
//! - `#` and `!` comment lines
//! - line continuation with a trailing backslash (leading whitespace of the
//!   continued line is dropped)
//! - `\t`, `\n`, `\r`, `\f`, `\uXXXX` escapes; any other escaped character
//!   stands for itself
//!
//! A line consisting of exactly `#---` separates documents, so one file can
//! carry profile-specific sections the same way a multi-document YAML file
//! does.

use std::ops::Range;

use crate::error::{Error, Result};

/// One `key=value` entry with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyLine {
    pub key: String,
    pub value: String,
    pub line: usize,
    /// Byte range of the raw, still escaped value in the parsed text,
    /// continuation lines included.
    pub span: Range<usize>,
}

/// Where a piece of a logical line starts, in the logical line and in the
/// text.
struct Segment {
    logical: usize,
    offset: usize,
}

/// Parses a properties file into documents of entries, in file order.
///
/// `source_name` is only used in error messages.
pub fn parse_documents(text: &str, source_name: &str) -> Result<Vec<Vec<PropertyLine>>> {
    let mut documents = vec![Vec::new()];
    let mut lines = physical_lines(text).into_iter().enumerate();

    while let Some((index, (offset, raw))) = lines.next() {
        let start_line = index + 1;
        if raw.trim_end() == "#---" {
            documents.push(Vec::new());
            continue;
        }
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        let mut segments = vec![Segment {
            logical: 0,
            offset: offset + raw.len() - trimmed.len(),
        }];
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, (next_offset, next))) => {
                    let next_trimmed = next.trim_start();
                    segments.push(Segment {
                        logical: logical.len(),
                        offset: next_offset + next.len() - next_trimmed.len(),
                    });
                    logical.push_str(next_trimmed);
                }
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let span = raw_offset(&segments, logical.len() - value.len())..raw_offset(&segments, logical.len());
        let entry = PropertyLine {
            key: unescape(key, source_name, start_line)?,
            value: unescape(value, source_name, start_line)?,
            line: start_line,
            span,
        };
        if let Some(current) = documents.last_mut() {
            current.push(entry);
        }
    }

    Ok(documents)
}

/// Lines of `text` with the byte offset each starts at, terminators removed.
fn physical_lines(text: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|chunk| {
            let start = offset;
            offset += chunk.len();
            let line = chunk.strip_suffix('\n').unwrap_or(chunk);
            (start, line.strip_suffix('\r').unwrap_or(line))
        })
        .collect()
}

/// Maps a position in a logical line back to a byte offset in the text.
fn raw_offset(segments: &[Segment], position: usize) -> usize {
    segments
        .iter()
        .rev()
        .find(|segment| segment.logical <= position)
        .map(|segment| segment.offset + position - segment.logical)
        .unwrap_or(position)
}

/// Escapes `value` so it reads back unchanged as a property value.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{c}' => out.push_str("\\f"),
            ' ' if i == 0 => out.push_str("\\ "),
            c => out.push(c),
        }
    }
    out
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Splits a logical line into raw (still escaped) key and value.
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

fn unescape(raw: &str, source_name: &str, line: usize) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
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
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 4)
                    .and_then(char::from_u32)
                    .ok_or_else(|| Error::PropertySource {
                        source_name: source_name.to_string(),
                        message: format!("malformed \\uxxxx encoding on line {}", line),
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}
