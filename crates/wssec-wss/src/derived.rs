#![forbid(unsafe_code)]

//! WS-SecureConversation DerivedKeyTokens.
//!
//! Keys are `P_SHA1(secret, label ‖ nonce)`, cut at `offset..offset+length`.

use base64::Engine;
use wssec_core::{algorithm, ns, Error, Result};
use wssec_xml::{Document, NodeId, Placement};

use crate::keyinfo::{self, KeyReference};

/// Label used when a token carries none.
pub const DEFAULT_LABEL: &str = "WS-SecureConversationWS-SecureConversation";
/// Label for keys derived from a session secret.
pub const SESSION_LABEL: &str = "WS-SecureConversation";
/// Label for keys derived from an EncryptedKey secret.
pub const ENCRYPTED_KEY_LABEL: &str = "DerivedKey";

const DEFAULT_LENGTH: usize = 32;

/// The P_SHA1 algorithm URI of a WS-SC namespace.
pub fn p_sha1_uri(sc_ns: &str) -> String {
    match sc_ns {
        ns::WSSC_2004_04 => algorithm::P_SHA1_2004_04.to_owned(),
        ns::WSSC_2005_02 => algorithm::P_SHA1_2005_02.to_owned(),
        other => format!("{other}/dk/p_sha1"),
    }
}

/// A freshly emitted DerivedKeyToken and its key.
#[derive(Clone)]
pub struct CreatedDerivedKey {
    pub element: NodeId,
    pub id: String,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for CreatedDerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedDerivedKey")
            .field("element", &self.element)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Parameters of a new DerivedKeyToken.
#[derive(Debug, Clone, Copy)]
pub struct DerivedKeySpec<'a> {
    pub sc_ns: &'a str,
    pub label: &'a str,
    pub length: usize,
    pub id: &'a str,
}

/// Derive a key from `secret` under a fresh nonce and write the
/// DerivedKeyToken describing it at `at`.
pub fn create_derived_key_token(
    doc: &mut Document,
    at: Placement,
    spec: &DerivedKeySpec<'_>,
    source: &KeyReference<'_>,
    secret: &[u8],
) -> Result<CreatedDerivedKey> {
    let DerivedKeySpec { sc_ns, label, length, id } = *spec;
    let nonce = wssec_crypto::random_bytes(length);
    let key = wssec_crypto::kdf::derive_key(secret, label.as_bytes(), &nonce, 0, length)?;

    let element = doc.new_element_at(at, sc_ns, "wssc", ns::node::DERIVED_KEY_TOKEN)?;
    doc.set_attribute_ns(element, ns::WSU, "wsu", ns::attr::ID, id);
    doc.set_attribute(element, ns::attr::ALGORITHM, &p_sha1_uri(sc_ns));
    keyinfo::append_key_reference(doc, element, source)?;
    doc.append_text_element(element, sc_ns, "wssc", ns::node::GENERATION, "0");
    doc.append_text_element(element, sc_ns, "wssc", ns::node::LENGTH, &length.to_string());
    doc.append_text_element(element, sc_ns, "wssc", ns::node::LABEL, label);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&nonce);
    doc.append_text_element(element, sc_ns, "wssc", ns::node::NONCE, &encoded);

    Ok(CreatedDerivedKey {
        element,
        id: id.to_owned(),
        key,
    })
}

/// A DerivedKeyToken as read from a message, before its source is known.
#[derive(Debug, Clone)]
pub struct ParsedDerivedKey {
    pub element: NodeId,
    pub id: Option<String>,
    /// The SecurityTokenReference naming the source secret.
    pub reference: NodeId,
    pub generation: usize,
    pub offset: usize,
    pub length: usize,
    pub label: String,
    pub nonce: Vec<u8>,
}

impl ParsedDerivedKey {
    /// Derive the key from the source token's secret.
    pub fn derive(&self, secret: &[u8]) -> Result<Vec<u8>> {
        wssec_crypto::kdf::derive_key(secret, self.label.as_bytes(), &self.nonce, self.offset, self.length)
    }
}

fn number(doc: &Document, parent: NodeId, sc_ns: &str, local: &str) -> Result<Option<usize>> {
    doc.find_child(parent, sc_ns, local)
        .map(|n| {
            let text = doc.text(n);
            text.trim()
                .parse::<usize>()
                .map_err(|_| Error::DocumentFormat(format!("bad {local} in DerivedKeyToken: {text:?}")))
        })
        .transpose()
}

/// Read a DerivedKeyToken. Offset defaults to `generation × length`, and
/// `offset + length` may not exceed `max_length` bytes of key stream.
pub fn parse_derived_key_token(doc: &Document, element: NodeId, max_length: usize) -> Result<ParsedDerivedKey> {
    let sc_ns = doc.namespace_uri(element).unwrap_or(ns::WSSC_2005_02).to_owned();
    if let Some(alg) = doc.attribute(element, ns::attr::ALGORITHM) {
        if !alg.ends_with("/dk/p_sha1") {
            return Err(Error::UnsupportedAlgorithm(format!("key derivation: {alg}")));
        }
    }
    let reference = doc
        .child_elements(element)
        .into_iter()
        .find(|&c| {
            doc.local_name(c) == Some(ns::node::SECURITY_TOKEN_REFERENCE)
                && doc.namespace_uri(c).is_some_and(ns::is_wsse)
        })
        .ok_or_else(|| Error::MissingElement("SecurityTokenReference in DerivedKeyToken".into()))?;

    let length = number(doc, element, &sc_ns, ns::node::LENGTH)?.unwrap_or(DEFAULT_LENGTH);
    let generation = number(doc, element, &sc_ns, ns::node::GENERATION)?.unwrap_or(0);
    if length == 0 || length > max_length {
        return Err(Error::DocumentFormat(format!(
            "DerivedKeyToken Length {length} is outside 1..={max_length}"
        )));
    }
    let offset = match number(doc, element, &sc_ns, ns::node::OFFSET)? {
        Some(offset) => offset,
        None => generation
            .checked_mul(length)
            .ok_or_else(|| Error::DocumentFormat("DerivedKeyToken offset overflows".into()))?,
    };
    match offset.checked_add(length) {
        Some(end) if end <= max_length => {}
        _ => {
            return Err(Error::DocumentFormat(format!(
                "DerivedKeyToken key stream beyond {max_length} bytes"
            )))
        }
    }
    let label = doc
        .find_child(element, &sc_ns, ns::node::LABEL)
        .map(|n| doc.text(n))
        .unwrap_or_else(|| DEFAULT_LABEL.to_owned());
    let nonce_node = doc
        .find_child(element, &sc_ns, ns::node::NONCE)
        .ok_or_else(|| Error::MissingElement("Nonce in DerivedKeyToken".into()))?;
    let clean: String = doc.text(nonce_node).chars().filter(|c| !c.is_whitespace()).collect();
    let nonce = base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("DerivedKeyToken Nonce: {e}")))?;

    Ok(ParsedDerivedKey {
        element,
        id: doc.element_id(element).map(str::to_owned),
        reference,
        generation,
        offset,
        length,
        label,
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyinfo::TokenReference;
    use wssec_core::ErrorKind;

    const LIMIT: usize = 1024;

    fn token_with(fields: &str) -> Document {
        Document::parse(&format!(
            r#"<c:DerivedKeyToken xmlns:c="{sc}" xmlns:wsse="{wsse}"><wsse:SecurityTokenReference><wsse:Reference URI="urn:ctx"/></wsse:SecurityTokenReference>{fields}<c:Nonce>AAECAw==</c:Nonce></c:DerivedKeyToken>"#,
            sc = ns::WSSC_2005_02,
            wsse = ns::WSSE
        ))
        .unwrap()
    }

    #[test]
    fn test_created_token_rederives_same_key() {
        let mut doc = Document::parse("<h/>").unwrap();
        let root = doc.document_element().unwrap();
        let secret = [7u8; 32];
        let spec = DerivedKeySpec {
            sc_ns: ns::WSSC_2005_02,
            label: SESSION_LABEL,
            length: 32,
            id: "DerivedKey-Sig-1",
        };
        let source = KeyReference::SecurityContext {
            uri: "#SCT-1",
            sc_ns: ns::WSSC_2005_02,
        };
        let created = create_derived_key_token(&mut doc, Placement::Append(root), &spec, &source, &secret).unwrap();
        assert_eq!(created.key.len(), 32);

        let doc = Document::parse(&doc.to_xml()).unwrap();
        let dkt = doc.find_descendant(doc.root(), ns::WSSC_2005_02, ns::node::DERIVED_KEY_TOKEN).unwrap();
        let parsed = parse_derived_key_token(&doc, dkt, LIMIT).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("DerivedKey-Sig-1"));
        assert_eq!(parsed.label, SESSION_LABEL);
        assert_eq!(parsed.nonce.len(), 32);
        assert_eq!(parsed.derive(&secret).unwrap(), created.key);
        assert_eq!(
            keyinfo::parse_security_token_reference(&doc, parsed.reference).unwrap(),
            TokenReference::Local("SCT-1".into())
        );
    }

    #[test]
    fn test_defaults_and_generation_offset() {
        let doc = Document::parse(&format!(
            r#"<c:DerivedKeyToken xmlns:c="{sc}" xmlns:wsse="{wsse}"><wsse:SecurityTokenReference><wsse:Reference URI="urn:ctx"/></wsse:SecurityTokenReference><c:Generation>2</c:Generation><c:Length>16</c:Length><c:Nonce>AAECAw==</c:Nonce></c:DerivedKeyToken>"#,
            sc = ns::WSSC_2004_04,
            wsse = ns::WSSE
        ))
        .unwrap();
        let parsed = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap();
        assert_eq!(parsed.offset, 32);
        assert_eq!(parsed.length, 16);
        assert_eq!(parsed.label, DEFAULT_LABEL);
        let stream = wssec_crypto::kdf::p_sha1(b"s", format!("{DEFAULT_LABEL}\u{0}\u{1}\u{2}\u{3}").as_bytes(), 48).unwrap();
        assert_eq!(parsed.derive(b"s").unwrap(), stream[32..48].to_vec());
    }

    #[test]
    fn test_unknown_derivation_algorithm() {
        let doc = Document::parse(&format!(
            r#"<c:DerivedKeyToken xmlns:c="{}" Algorithm="urn:other"/>"#,
            ns::WSSC_2005_02
        ))
        .unwrap();
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn test_huge_offset_is_a_format_error() {
        let doc = token_with("<c:Offset>18446744073709551615</c:Offset><c:Length>32</c:Length>");
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }

    #[test]
    fn test_length_over_limit_is_a_format_error() {
        let doc = token_with("<c:Length>1025</c:Length>");
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);

        let doc = token_with("<c:Length>0</c:Length>");
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }

    #[test]
    fn test_generation_overflow_is_a_format_error() {
        let doc = token_with("<c:Generation>18446744073709551615</c:Generation><c:Length>32</c:Length>");
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);

        // In range for the multiplication, past the stream limit.
        let doc = token_with("<c:Generation>32</c:Generation><c:Length>32</c:Length>");
        let err = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }

    #[test]
    fn test_window_ending_at_limit_is_accepted() {
        let doc = token_with("<c:Offset>992</c:Offset><c:Length>32</c:Length>");
        let parsed = parse_derived_key_token(&doc, doc.document_element().unwrap(), LIMIT).unwrap();
        assert_eq!(parsed.derive(b"s").unwrap().len(), 32);
    }

    #[test]
    fn test_p_sha1_uri_per_namespace() {
        assert_eq!(p_sha1_uri(ns::WSSC_2004_04), algorithm::P_SHA1_2004_04);
        assert_eq!(p_sha1_uri(ns::WSSC_2005_02), algorithm::P_SHA1_2005_02);
        assert!(p_sha1_uri(ns::WSSC_1_3).ends_with("/200512/dk/p_sha1"));
    }
}
