//! `{name:value}` prefix tags
//!
//! Encrypted values and plaintexts handed to `encrypt` may start with any
//! number of tags selecting how they are processed:
//!
//! ```text
//! {key:legacy}{secret:xyz}payload
//! ```
//!
//! The grammar is read by a small state machine over the characters:
//!
//! - Between tags, `{` opens a tag; anything else starts the payload.
//! - A tag name is made of ASCII letters, digits, `-`, `_` and `.`. It ends
//!   with `:` (a value follows) or `}` (no value).
//! - Inside a value `\}` and `\\` are escapes and `}` closes the tag. `{key:}`
//!   has an empty value.
//! - The bare tag `{plain}` stops tag parsing: everything after it is payload,
//!   even text that looks like a tag.
//! - Input that does not form a tag (an invalid name, an unclosed brace) is
//!   payload, starting at the offending `{`.
//!
//! The tags `name` and `profiles` are reserved: they always describe the
//! application and profiles of the request, whatever the value carried.

use indexmap::IndexMap;

/// Tag carrying the application name.
pub const NAME_TAG: &str = "name";
/// Tag carrying the comma-separated profiles.
pub const PROFILES_TAG: &str = "profiles";
/// Tag selecting a key alias.
pub const KEY_TAG: &str = "key";
/// Tag ending tag parsing.
pub const PLAIN_TAG: &str = "plain";

/// A value split into its tags and payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefixed {
    pub tags: IndexMap<String, String>,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between tags.
    Boundary,
    /// Reading a tag name; the field is the byte offset of its `{`.
    Name(usize),
    Value(usize),
    Escape(usize),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Splits `input` into tags and payload.
pub fn parse(input: &str) -> Prefixed {
    let mut tags = IndexMap::new();
    let mut state = State::Boundary;
    let mut name = String::new();
    let mut value = String::new();

    for (i, c) in input.char_indices() {
        state = match (state, c) {
            (State::Boundary, '{') => {
                name.clear();
                value.clear();
                State::Name(i)
            }
            (State::Boundary, _) => return finish(tags, &input[i..]),

            (State::Name(_), '}') if !name.is_empty() => {
                if name == PLAIN_TAG {
                    return finish(tags, &input[i + 1..]);
                }
                tags.insert(name.clone(), String::new());
                State::Boundary
            }
            (State::Name(start), ':') if !name.is_empty() => State::Value(start),
            (State::Name(_), c) if is_name_char(c) => {
                name.push(c);
                state
            }
            (State::Name(start), _) => return finish(tags, &input[start..]),

            (State::Value(start), '\\') => State::Escape(start),
            (State::Value(_), '}') => {
                tags.insert(name.clone(), value.clone());
                State::Boundary
            }
            (State::Value(_), c) => {
                value.push(c);
                state
            }

            (State::Escape(start), c) => {
                if c != '}' && c != '\\' {
                    value.push('\\');
                }
                value.push(c);
                State::Value(start)
            }
        };
    }

    match state {
        State::Boundary => finish(tags, ""),
        State::Name(start) | State::Value(start) | State::Escape(start) => {
            finish(tags, &input[start..])
        }
    }
}

fn finish(tags: IndexMap<String, String>, payload: &str) -> Prefixed {
    Prefixed {
        tags,
        payload: payload.to_string(),
    }
}

/// Parses `input` and overrides the reserved tags with the request context.
pub fn parse_with_context(input: &str, application: &str, profiles: &str) -> Prefixed {
    let mut prefixed = parse(input);
    prefixed.tags.shift_remove(NAME_TAG);
    prefixed.tags.shift_remove(PROFILES_TAG);
    prefixed.tags.insert(NAME_TAG.to_string(), application.to_string());
    prefixed.tags.insert(PROFILES_TAG.to_string(), profiles.to_string());
    prefixed
}

/// Renders tags back into prefix form, leaving out the reserved ones.
///
/// `{plain}` is appended when the payload itself starts with `{`, so the
/// result parses back to the same tags and payload.
pub fn render(tags: &IndexMap<String, String>, payload: &str) -> String {
    let mut out = String::new();
    for (name, value) in tags {
        if name == NAME_TAG || name == PROFILES_TAG {
            continue;
        }
        out.push('{');
        out.push_str(name);
        if !value.is_empty() {
            out.push(':');
            for c in value.chars() {
                if c == '}' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
        }
        out.push('}');
    }
    if payload.starts_with('{') {
        out.push_str("{plain}");
    }
    out.push_str(payload);
    out
}
