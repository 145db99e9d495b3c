//! JSON path parsing and rendering.
//!
//! Paths arrive either as strings (`items[0].tags[*]`, optionally prefixed
//! with `$.`) or as pre-split segment lists. The canonical form is a list of
//! [`PathSegment`]s; all operators consume the list. Rendering back to
//! string form is the separate inverse, [`segments_to_string`].

use crate::error::{Error, Result};
use nom::{
    bytes::complete::{take_till1, take_until},
    character::complete::char,
    sequence::{delimited, preceded},
    IResult,
};
use serde_json::Value;

/// One step into a JSONB value.
///
/// `Last` is produced only by normalizing `[-1]`; `Wildcard` only by `[*]`
/// or the pre-split list element `"*"`. `[last]` is the literal property
/// `last`, and a bare `*` between dots is the literal property `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// Object property (or, for `#>` purposes, a stringified array index).
    Key(String),
    /// Non-negative array index.
    Index(u64),
    /// Final array element, rendered as `-1` for PostgreSQL.
    Last,
    /// Every element of the enclosing array.
    Wildcard,
}

impl PathSegment {
    /// The text-array element PostgreSQL sees for this segment.
    pub fn as_pg_text(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(n) => n.to_string(),
            Self::Last => "-1".to_string(),
            Self::Wildcard => "*".to_string(),
        }
    }
}

/// Parse a string path into canonical segments.
pub fn parse_json_path(input: &str) -> Result<Vec<PathSegment>> {
    if input.trim().is_empty() {
        return Err(Error::EmptyPath);
    }

    let mut rest = strip_root_marker(input)?;
    if rest.is_empty() {
        return Err(Error::EmptyPath);
    }

    let mut segments = Vec::new();
    while !rest.is_empty() {
        // Consecutive, leading and trailing dots collapse silently.
        if let Some(r) = rest.strip_prefix('.') {
            rest = r;
            continue;
        }

        if rest.starts_with('[') {
            let (r, segment) = parse_bracket(rest, input)?;
            segments.push(segment);
            rest = r;
        } else {
            let (r, part) = plain_part(rest)
                .map_err(|_: nom::Err<nom::error::Error<&str>>| Error::EmptyPath)?;
            segments.push(PathSegment::Key(part.to_string()));
            rest = r;
        }
    }

    Ok(segments)
}

/// Validate a string path without keeping the segments.
pub fn validate_json_path(input: &str) -> Result<()> {
    parse_json_path(input).map(|_| ())
}

/// Normalize a pre-split segment list.
///
/// List elements are used as-is apart from negative-index normalization:
/// `"-1"` (or `-1`) becomes [`PathSegment::Last`], `"*"` becomes
/// [`PathSegment::Wildcard`], decimal strings become indices.
pub fn segments_from_list(list: &[Value]) -> Result<Vec<PathSegment>> {
    list.iter().map(segment_from_value).collect()
}

/// Convert an input path value (string or list) to canonical segments.
/// The empty string and the empty list both denote the root of the value.
pub fn path_from_value(path: &Value) -> Result<Vec<PathSegment>> {
    match path {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => parse_json_path(s),
        Value::Array(list) => segments_from_list(list),
        other => Err(Error::invalid_value(
            "path",
            format!("expected a string or list of segments, got {}", other),
        )),
    }
}

/// Render canonical segments back to bracket/dot string form.
///
/// Keys containing `.`, `[`, `]` or `"` (and empty keys) are quoted as
/// `["..."]` with `"` escaped; parsing the result yields the same segments.
pub fn segments_to_string(segments: &[PathSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            PathSegment::Key(k) => {
                if k.is_empty() || k.contains(['.', '[', ']', '"']) {
                    out.push_str("[\"");
                    out.push_str(&k.replace('\\', "\\\\").replace('"', "\\\""));
                    out.push_str("\"]");
                } else {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(k);
                }
            }
            PathSegment::Index(n) => {
                out.push('[');
                out.push_str(&n.to_string());
                out.push(']');
            }
            PathSegment::Last => out.push_str("[-1]"),
            PathSegment::Wildcard => out.push_str("[*]"),
        }
    }
    out
}

/// Render segments as the `text[]` value bound for `#>` / `#>>`.
pub fn segments_to_text_array(segments: &[PathSegment]) -> Vec<String> {
    segments.iter().map(PathSegment::as_pg_text).collect()
}

/// Whether any segment is a wildcard.
pub fn has_wildcard(segments: &[PathSegment]) -> bool {
    segments.contains(&PathSegment::Wildcard)
}

/// Split at the first wildcard: `(before, after)`, wildcard excluded.
pub fn split_at_wildcard(segments: &[PathSegment]) -> Option<(&[PathSegment], &[PathSegment])> {
    segments
        .iter()
        .position(|s| *s == PathSegment::Wildcard)
        .map(|i| (&segments[..i], &segments[i + 1..]))
}

fn strip_root_marker(input: &str) -> Result<&str> {
    if input.trim() == "$" {
        return Err(Error::RootPathNotSupported(input.to_string()));
    }
    if let Some(rest) = input.strip_prefix("$.") {
        return Ok(rest);
    }
    if input.starts_with("$[") {
        return Ok(&input[1..]);
    }
    Ok(input)
}

/// A property-name run: everything up to the next `.` or `[`.
fn plain_part(input: &str) -> IResult<&str, &str> {
    take_till1(|c| c == '.' || c == '[')(input)
}

/// An unquoted bracket body: `[` content `]`.
fn bracket_body(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_until("]"), char(']'))(input)
}

/// A quoted bracket body: `["` content `"]` with `\"` and `\\` escapes.
fn quoted_bracket(input: &str) -> IResult<&str, String> {
    let (body, _) = preceded(char('['), char('"'))(input)?;

    let mut out = String::new();
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => out.push(escaped),
                None => {
                    return Err(nom::Err::Error(nom::error::Error::new(
                        body,
                        nom::error::ErrorKind::Escaped,
                    )))
                }
            },
            '"' => {
                let (rest, _) = char(']')(&body[i + 1..])?;
                return Ok((rest, out));
            }
            _ => out.push(c),
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        body,
        nom::error::ErrorKind::TakeUntil,
    )))
}

fn parse_bracket<'a>(rest: &'a str, whole: &str) -> Result<(&'a str, PathSegment)> {
    if rest.starts_with("[\"") {
        return match quoted_bracket(rest) {
            Ok((r, key)) => Ok((r, PathSegment::Key(key))),
            Err(_) => Err(Error::UnclosedBracket(whole.to_string())),
        };
    }

    match bracket_body(rest) {
        Ok((r, body)) => Ok((r, classify_bracket_body(body)?)),
        Err(_) => Err(Error::UnclosedBracket(whole.to_string())),
    }
}

fn classify_bracket_body(body: &str) -> Result<PathSegment> {
    if body == "*" {
        return Ok(PathSegment::Wildcard);
    }
    if let Ok(n) = body.parse::<i64>() {
        return normalize_index(n);
    }
    Ok(PathSegment::Key(body.to_string()))
}

fn normalize_index(n: i64) -> Result<PathSegment> {
    match n {
        -1 => Ok(PathSegment::Last),
        n if n < 0 => Err(Error::UnsupportedNegativeIndex(n)),
        n => Ok(PathSegment::Index(n as u64)),
    }
}

fn segment_from_value(value: &Value) -> Result<PathSegment> {
    match value {
        Value::String(s) => {
            if s == "*" {
                Ok(PathSegment::Wildcard)
            } else if let Ok(n) = s.parse::<i64>() {
                normalize_index(n)
            } else {
                Ok(PathSegment::Key(s.clone()))
            }
        }
        Value::Number(n) => match n.as_i64() {
            Some(n) => normalize_index(n),
            None => Err(Error::invalid_value(
                "path",
                format!("non-integer path segment: {}", n),
            )),
        },
        other => Err(Error::invalid_value(
            "path",
            format!("path segments must be strings or integers, got {}", other),
        )),
    }
}
