#![forbid(unsafe_code)]

//! Same-document reference handling.
//!
//! WS-Security signatures and encryption references are restricted to
//! bare-name fragment identifiers (`#id`). XPointer forms such as
//! `#xpointer(id('x'))` or `#xpointer(/)` are recognized only so they can be
//! rejected.

use wssec_core::Error;

use crate::document::{Document, NodeId};

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// True for any fragment using XPointer syntax.
pub fn is_xpointer(uri: &str) -> bool {
    uri.strip_prefix('#')
        .is_some_and(|frag| frag.starts_with("xpointer(") || frag.contains('('))
}

/// Parse a bare-name `#id` reference, rejecting XPointer, empty and
/// external forms.
pub fn parse_bare_name_ref(uri: &str) -> Result<&str, Error> {
    if uri.is_empty() {
        return Err(Error::DocumentFormat(
            "whole-document references are not permitted".into(),
        ));
    }
    if is_xpointer(uri) {
        return Err(Error::DocumentFormat(format!(
            "XPointer references are not permitted: {uri}"
        )));
    }
    match parse_same_document_ref(uri) {
        Some(id) if !id.is_empty() => Ok(id),
        Some(_) => Err(Error::DocumentFormat("empty fragment reference".into())),
        None => Err(Error::DocumentFormat(format!(
            "external references are not permitted: {uri}"
        ))),
    }
}

/// Resolve a bare-name reference against the document.
pub fn resolve_bare_name(doc: &Document, uri: &str) -> Result<NodeId, Error> {
    let id = parse_bare_name_ref(uri)?;
    doc.find_by_id(id)
        .ok_or_else(|| Error::DocumentFormat(format!("referenced element not found: {id}")))
}
