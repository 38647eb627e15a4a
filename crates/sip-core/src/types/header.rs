//! Raw header fields.
//!
//! Headers are stored in arrival order as name/value pairs. Lookups compare
//! names case-insensitively and treat the RFC 3261 compact forms (`v`, `i`,
//! `f`, `t`, ...) as aliases of their long names.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const VIA: &str = "Via";
pub const FROM: &str = "From";
pub const TO: &str = "To";
pub const CALL_ID: &str = "Call-ID";
pub const CSEQ: &str = "CSeq";
pub const CONTACT: &str = "Contact";
pub const ROUTE: &str = "Route";
pub const RECORD_ROUTE: &str = "Record-Route";
pub const MAX_FORWARDS: &str = "Max-Forwards";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const USER_AGENT: &str = "User-Agent";

const COMPACT_FORMS: &[(&str, &str)] = &[
    ("v", VIA),
    ("f", FROM),
    ("t", TO),
    ("i", CALL_ID),
    ("m", CONTACT),
    ("c", CONTENT_TYPE),
    ("l", CONTENT_LENGTH),
    ("k", "Supported"),
    ("s", "Subject"),
    ("e", "Content-Encoding"),
];

/// Expands a compact header name to its long form.
pub fn canonical_name(name: &str) -> &str {
    COMPACT_FORMS
        .iter()
        .find(|(short, _)| short.eq_ignore_ascii_case(name))
        .map(|(_, long)| *long)
        .unwrap_or(name)
}

/// Compares two header names the way SIP does.
pub fn names_match(a: &str, b: &str) -> bool {
    canonical_name(a).eq_ignore_ascii_case(canonical_name(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Splits a header value on commas that are not inside quotes or angle brackets.
pub fn split_comma_values(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut angle_depth = 0usize;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth = angle_depth.saturating_sub(1),
            ',' if !in_quotes && angle_depth == 0 => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}
