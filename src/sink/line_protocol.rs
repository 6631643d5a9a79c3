//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=v1,tag2=v2 field1="text",field2=42i 1709294400000000000
//! ```
//!
//! Escaping rules:
//!
//! | Element | Escaped characters |
//! |---------|--------------------|
//! | measurement | `,` and space |
//! | tag key, tag value, field key | `,` `=` and space |
//! | string field value | `"` and `\` |
//!
//! Newlines cannot appear anywhere in a line, so they are written as the
//! two characters `\n` in every element.
//!
//! Identifiers have no escape for a backslash itself: one in front of a
//! special character or at the end of the element would swallow the next
//! separator. Such backslashes are dropped; others are written as-is.

use crate::model::{FieldValue, Point};

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Encode one point as a line of line protocol (without trailing newline).
///
/// Tags whose key or value is empty once escaped are dropped, since
/// InfluxDB rejects them. A point without fields is invalid line protocol;
/// callers always supply at least one.
pub fn encode(point: &Point) -> String {
    let mut line = escape_identifier(&point.measurement, MEASUREMENT_SPECIAL);

    for (key, value) in &point.tags {
        let key = escape_identifier(key, KEY_SPECIAL);
        let value = escape_identifier(value, KEY_SPECIAL);
        if key.is_empty() || value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&key);
        line.push('=');
        line.push_str(&value);
    }

    let fields: Vec<String> = point
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", escape_identifier(key, KEY_SPECIAL), encode_field(value)))
        .collect();
    line.push(' ');
    line.push_str(&fields.join(","));

    if let Some(nanos) = point.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
        line.push(' ');
        line.push_str(&nanos.to_string());
    }

    line
}

/// Encode a batch of points, one per line.
pub fn encode_batch(points: &[Point]) -> String {
    points.iter().map(encode).collect::<Vec<_>>().join("\n")
}

fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Integer(i) => format!("{}i", i),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::String(s) => format!("\"{}\"", escape_string(s)),
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_identifier(s: &str, special: &[char]) -> String {
    let chars: Vec<char> = s.chars().filter(|&c| c != '\r').collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let run_end = chars[i..]
                    .iter()
                    .position(|&c| c != '\\')
                    .map_or(chars.len(), |offset| i + offset);
                let dangling = chars
                    .get(run_end)
                    .is_none_or(|next| special.contains(next));
                if !dangling {
                    out.extend(&chars[i..run_end]);
                }
                i = run_end;
                continue;
            }
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}
