//! JSON path walker - minimal subset
//!
//! Supports the tail of a step reference, after `result`:
//! - `.a.b.c` (dot notation)
//! - `[0].b` and `a[0][1]` (array index)
//! - `a.0` (numeric segment, same as `a[0]`)
//!
//! Does NOT support:
//! - Filters: `[?(@.x==1)]`
//! - Wildcards: `[*]`
//! - Slices: `[0:5]`

use std::fmt;

use serde_json::Value;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access: .field
    Field(String),
    /// Array index access: [0]
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, ".{}", name),
            Segment::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// Why a path could not be walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Miss {
    /// Field absent (or the value is not an object)
    Field(String),
    /// Index beyond the end of an array
    OutOfRange { index: usize, len: usize },
    /// Index applied to something that is not an array
    NotArray { index: usize },
}

/// Parse a path tail into segments
///
/// Examples:
/// - "" → []
/// - "[0].id" → [Index(0), Field("id")]
/// - ".items[2].name" → [Field("items"), Index(2), Field("name")]
pub fn parse(path: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let bytes = path.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != b'.' && bytes[end] != b'[' {
                    end += 1;
                }
                let name = &path[start..end];
                if name.is_empty() {
                    return Err(format!("empty field name at offset {}", i));
                }
                if let Ok(index) = name.parse::<usize>() {
                    // Numeric segment treated as array index (e.g., "items.0")
                    segments.push(Segment::Index(index));
                } else {
                    segments.push(Segment::Field(name.to_string()));
                }
                i = end;
            }
            b'[' => {
                let close = path[i..]
                    .find(']')
                    .map(|off| i + off)
                    .ok_or_else(|| format!("unclosed '[' at offset {}", i))?;
                let index = path[i + 1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid index '{}'", &path[i + 1..close]))?;
                segments.push(Segment::Index(index));
                i = close + 1;
            }
            other => {
                return Err(format!(
                    "unexpected '{}' at offset {}",
                    other as char, i
                ));
            }
        }
    }

    Ok(segments)
}

/// Walk segments through a value, borrowing until the caller decides to clone
pub fn walk<'v>(value: &'v Value, segments: &[Segment]) -> Result<&'v Value, Miss> {
    let mut current = value;

    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.get(name.as_str()).ok_or_else(|| Miss::Field(name.clone()))?,
            Segment::Index(idx) => match current {
                Value::Array(items) => items.get(*idx).ok_or(Miss::OutOfRange {
                    index: *idx,
                    len: items.len(),
                })?,
                // "a.0" on an object means the key "0"
                Value::Object(map) => map
                    .get(&idx.to_string())
                    .ok_or(Miss::NotArray { index: *idx })?,
                _ => return Err(Miss::NotArray { index: *idx }),
            },
        };
    }

    Ok(current)
}

/// Render segments back into path text
pub fn render(segments: &[Segment]) -> String {
    segments.iter().map(ToString::to_string).collect()
}
