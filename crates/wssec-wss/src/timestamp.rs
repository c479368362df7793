#![forbid(unsafe_code)]

//! `wsu:Timestamp` creation and parsing.

use chrono::{DateTime, Utc};
use wssec_core::{ns, Error, Result};
use wssec_xml::{Document, NodeId, Placement};

use crate::config::TimestampResolution;
use crate::result::WssTimestamp;

/// Emit `<wsu:Timestamp><wsu:Created/><wsu:Expires/></wsu:Timestamp>`.
pub fn create_timestamp(
    doc: &mut Document,
    at: Placement,
    wsu_ns: &str,
    created: DateTime<Utc>,
    timeout: chrono::Duration,
    resolution: TimestampResolution,
) -> Result<NodeId> {
    let ts = doc.new_element_at(at, wsu_ns, "wsu", ns::node::TIMESTAMP)?;
    doc.append_text_element(ts, wsu_ns, "wsu", ns::node::CREATED, &resolution.format(created));
    doc.append_text_element(ts, wsu_ns, "wsu", ns::node::EXPIRES, &resolution.format(created + timeout));
    Ok(ts)
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::DocumentFormat(format!("bad timestamp value {text:?}: {e}")))
}

/// Read a Timestamp element. Created and Expires are optional, but when
/// present they must be well-formed dates.
pub fn parse_timestamp(doc: &Document, element: NodeId) -> Result<WssTimestamp> {
    let wsu_ns = doc.namespace_uri(element).unwrap_or(ns::WSU).to_owned();
    let created = doc
        .find_child(element, &wsu_ns, ns::node::CREATED)
        .map(|c| doc.text(c).trim().to_owned());
    let expires = doc
        .find_child(element, &wsu_ns, ns::node::EXPIRES)
        .map(|c| doc.text(c).trim().to_owned());
    Ok(WssTimestamp {
        element,
        created_at: created.as_deref().map(parse_instant).transpose()?,
        expires_at: expires.as_deref().map(parse_instant).transpose()?,
        created,
        expires,
        signed: false,
        signing_tokens: Vec::new(),
    })
}
