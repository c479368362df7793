#![forbid(unsafe_code)]

//! Escaping and start-tag rendering shared by the canonicalizers.
//!
//! Text nodes escape `&`, `<`, `>` and CR; attribute values additionally
//! escape `"`, TAB and LF; processing-instruction data escapes only CR.

use std::cmp::Ordering;

/// Where a string is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    Text,
    Attr,
    Pi,
}

/// Escape `s` for the given output position.
pub fn escape(s: &str, ctx: Escape) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match (ch, ctx) {
            ('\r', _) => out.push_str("&#xD;"),
            (_, Escape::Pi) => out.push(ch),
            ('&', _) => out.push_str("&amp;"),
            ('<', _) => out.push_str("&lt;"),
            ('>', Escape::Text) => out.push_str("&gt;"),
            ('"', Escape::Attr) => out.push_str("&quot;"),
            ('\t', Escape::Attr) => out.push_str("&#x9;"),
            ('\n', Escape::Attr) => out.push_str("&#xA;"),
            _ => out.push(ch),
        }
    }
    out
}

/// A namespace declaration on a rendered start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// "" for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn write(&self, out: &mut Vec<u8>) {
        if self.prefix.is_empty() {
            out.extend_from_slice(b" xmlns=\"");
        } else {
            out.extend_from_slice(b" xmlns:");
            out.extend_from_slice(self.prefix.as_bytes());
            out.extend_from_slice(b"=\"");
        }
        out.extend_from_slice(escape(&self.uri, Escape::Attr).as_bytes());
        out.push(b'"');
    }
}

// Default namespace first, then by prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute on a rendered start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// "" when the attribute has no namespace.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(escape(&self.value, Escape::Attr).as_bytes());
        out.push(b'"');
    }
}

// Unqualified attributes first by local name, then by (namespace, local name).
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
