#![forbid(unsafe_code)]

//! Canonical form of SOAP-with-Attachments MIME parts.
//!
//! The content form is the canonical body alone. The complete form is the
//! canonical MIME headers, a blank line, then the canonical body. Only the
//! five headers the SwA profile protects are kept:
//! `Content-Description`, `Content-Disposition`, `Content-ID`,
//! `Content-Location` and `Content-Type`.

use wssec_core::Error;
use wssec_xml::Document;

use crate::exclusive;

/// Content-Type assumed for a part that does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=\"us-ascii\"";

const PROTECTED_HEADERS: [&str; 5] = [
    "Content-Description",
    "Content-Disposition",
    "Content-ID",
    "Content-Location",
    "Content-Type",
];

/// A MIME body part: raw headers as received plus the decoded body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MimePart {
    pub fn new(headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The lower-cased `type/subtype`, defaulting to `text/plain`.
    pub fn media_type(&self) -> String {
        self.header("Content-Type")
            .and_then(|v| v.split(';').next())
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "text/plain".to_owned())
    }

    /// The `Content-ID` without surrounding angle brackets.
    pub fn content_id(&self) -> Option<String> {
        self.header("Content-ID")
            .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').to_owned())
    }
}

/// Canonicalize an attachment, either the content alone or the complete
/// part including its protected headers.
pub fn canonicalize_attachment(part: &MimePart, complete: bool) -> Result<Vec<u8>, Error> {
    let body = canonical_body(part)?;
    if !complete {
        return Ok(body);
    }
    let mut out = canonical_headers(part).into_bytes();
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body);
    Ok(out)
}

fn is_xml_media_type(media: &str) -> bool {
    media == "text/xml" || media == "application/xml" || media.ends_with("+xml")
}

fn canonical_body(part: &MimePart) -> Result<Vec<u8>, Error> {
    let media = part.media_type();
    if is_xml_media_type(&media) {
        let doc = Document::parse_bytes(&part.body)?;
        return exclusive::canonicalize(&doc, doc.root(), false, None, &[]);
    }
    if media.starts_with("text/") {
        return Ok(crlf_line_endings(&part.body));
    }
    Ok(part.body.clone())
}

/// Rewrite bare CR and bare LF line breaks as CRLF.
fn crlf_line_endings(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 16);
    let mut i = 0;
    while i < body.len() {
        match body[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if body.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn canonical_headers(part: &MimePart) -> String {
    let mut lines: Vec<(String, String)> = Vec::new();
    for name in PROTECTED_HEADERS {
        let value = match part.header(name) {
            Some(raw) => canonical_header_value(name, raw),
            None if name == "Content-Type" => DEFAULT_CONTENT_TYPE.to_owned(),
            None => continue,
        };
        lines.push((name.to_owned(), value));
    }
    lines.sort();
    let mut out = String::new();
    for (name, value) in lines {
        out.push_str(&name);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\r\n");
    }
    out
}

fn canonical_header_value(name: &str, raw: &str) -> String {
    let unfolded = strip_comments(&unfold(raw));
    match name {
        "Content-Type" | "Content-Disposition" => canonical_parameterized(&unfolded, name == "Content-Type"),
        _ => collapse_whitespace(&unfolded),
    }
}

fn unfold(raw: &str) -> String {
    raw.replace("\r\n", "").replace(['\r', '\n'], "")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop RFC 822 comments (parenthesized, outside quoted strings).
fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            if depth == 0 {
                out.push(c);
            }
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                if depth == 0 {
                    out.push(c);
                }
            }
            '"' if depth == 0 => {
                quoted = !quoted;
                out.push(c);
            }
            '(' if !quoted => depth += 1,
            ')' if !quoted && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// `token; name="value"; ...` with the token and names lower-cased, the
/// parameters sorted by name and every value quoted.
fn canonical_parameterized(value: &str, lower_token: bool) -> String {
    let mut pieces = split_params(value).into_iter();
    let token = pieces.next().unwrap_or_default();
    let token = token.trim();
    let token = if lower_token {
        token.to_ascii_lowercase()
    } else {
        token.to_owned()
    };
    let mut params: Vec<(String, String)> = pieces
        .filter_map(|p| {
            let (name, val) = p.split_once('=')?;
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .map(|v| v.replace("\\\"", "\"").replace("\\\\", "\\"))
                .unwrap_or_else(|| val.to_owned());
            Some((name.trim().to_ascii_lowercase(), val))
        })
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = token;
    for (name, val) in params {
        out.push_str("; ");
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&val.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
    }
    out
}

fn split_params(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}
