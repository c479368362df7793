#![forbid(unsafe_code)]

//! Reference URI classification and resolution.
//!
//! Two forms are accepted: a bare-name `#id` pointing at an element in the
//! envelope, and `cid:` pointing at a MIME attachment. XPointer, empty and
//! external references are rejected as document format errors.

use wssec_core::Error;
use wssec_xml::{xpath, Document, NodeId};

use crate::attachment::AttachmentStore;
use crate::pipeline::TransformData;

/// What a reference URI names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceUri<'u> {
    Element(&'u str),
    Attachment(String),
}

/// The resolved target of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    Element(NodeId),
    Attachment(String),
}

/// Classify a reference URI without resolving it.
pub fn classify(uri: &str) -> Result<ReferenceUri<'_>, Error> {
    if let Some(cid) = uri.strip_prefix("cid:") {
        let cid = percent_decode(cid);
        if cid.is_empty() {
            return Err(Error::DocumentFormat("empty cid: reference".into()));
        }
        return Ok(ReferenceUri::Attachment(cid));
    }
    xpath::parse_bare_name_ref(uri).map(ReferenceUri::Element)
}

/// Resolve a reference URI to its target and the initial transform input.
pub fn resolve<'a>(
    doc: &'a Document,
    uri: &str,
    attachments: Option<&'a dyn AttachmentStore>,
) -> Result<(ReferenceTarget, TransformData<'a>), Error> {
    match classify(uri)? {
        ReferenceUri::Element(id) => {
            let node = doc
                .find_by_id(id)
                .ok_or_else(|| Error::DocumentFormat(format!("referenced element not found: {id}")))?;
            Ok((ReferenceTarget::Element(node), TransformData::subtree(doc, node)))
        }
        ReferenceUri::Attachment(cid) => {
            let part = attachments
                .and_then(|store| store.attachment(&cid))
                .ok_or_else(|| Error::DocumentFormat(format!("referenced attachment not found: {cid}")))?;
            Ok((ReferenceTarget::Attachment(cid), TransformData::Attachment(part)))
        }
    }
}

/// Decode `%XX` escapes as used in `cid:` URLs (RFC 2392).
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(b) = s.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::Attachment;
    use wssec_core::ErrorKind;

    #[test]
    fn test_classify() {
        assert_eq!(classify("#Body-1").unwrap(), ReferenceUri::Element("Body-1"));
        assert_eq!(
            classify("cid:part%401").unwrap(),
            ReferenceUri::Attachment("part@1".into())
        );
        for bad in ["", "#xpointer(/)", "#xpointer(id('Body-1'))", "http://example.com/#a", "cid:"] {
            assert_eq!(classify(bad).unwrap_err().kind(), ErrorKind::DocumentFormat, "{bad}");
        }
    }

    #[test]
    fn test_resolve() {
        let doc = Document::parse(r#"<r><b Id="x">t</b></r>"#).unwrap();
        let (target, _) = resolve(&doc, "#x", None).unwrap();
        assert_eq!(target, ReferenceTarget::Element(doc.find_by_id("x").unwrap()));
        assert!(resolve(&doc, "#missing", None).is_err());

        let parts = vec![Attachment::new(vec![("Content-ID".into(), "<p1>".into())], "x")];
        let (target, data) = resolve(&doc, "cid:p1", Some(&parts as &dyn AttachmentStore)).unwrap();
        assert_eq!(target, ReferenceTarget::Attachment("p1".into()));
        assert_eq!(data.to_binary().unwrap(), b"x".to_vec());
        assert!(resolve(&doc, "cid:p2", Some(&parts as &dyn AttachmentStore)).is_err());
        assert!(resolve(&doc, "cid:p1", None).is_err());
    }
}
