#![forbid(unsafe_code)]

//! Checks the processor applies while walking a Security header.

use tracing::warn;
use wssec_core::{algorithm, ns, Error, ErrorKind, Result};
use wssec_transforms::uri::{self, ReferenceUri};
use wssec_xml::{Document, NodeId};

use crate::config::WssConfig;
use crate::result::ProcessorResult;
use crate::soap::Envelope;
use crate::token::TokenIndex;

/// Longest EncryptedKey/DerivedKeyToken chain the processor will follow.
pub const MAX_KEY_CHAIN_DEPTH: usize = 8;

/// Reject SOAP header blocks we are expected to understand but do not.
///
/// A block counts when mustUnderstand is true and it is addressed to the
/// default actor, the "next" actor or one of our own actor names. The
/// Security header being processed and `wsu:Timestamp` blocks are exempt.
pub fn check_must_understand(doc: &Document, envelope: &Envelope, security: Option<NodeId>, config: &WssConfig) -> Result<()> {
    if !config.reject_on_must_understand {
        return Ok(());
    }
    let Some(header) = envelope.header(doc) else {
        return Ok(());
    };
    for block in doc.child_elements(header) {
        if Some(block) == security || !envelope.must_understand(doc, block) {
            continue;
        }
        if doc.local_name(block) == Some(ns::node::TIMESTAMP) && doc.namespace_uri(block).is_some_and(ns::is_wsu) {
            continue;
        }
        let actor = envelope.actor_of(doc, block);
        if envelope.is_default_actor(actor) || actor.is_some_and(|a| config.is_own_actor(a)) {
            let name = doc.element(block).map(|e| e.name.prefixed_name().into_owned()).unwrap_or_default();
            warn!(header = %name, "unrecognized header marked mustUnderstand");
            return Err(Error::Validation(format!("unrecognized header {name} is marked mustUnderstand")));
        }
    }
    Ok(())
}

/// Same-document bare-name and `cid:` references only.
pub fn check_reference_uri(reference: &str) -> Result<()> {
    match uri::classify(reference)? {
        ReferenceUri::Element(_) | ReferenceUri::Attachment(_) => Ok(()),
    }
}

/// Transforms a WS-Security signature may use.
pub fn check_transform_allowed(transform: &str) -> Result<()> {
    match transform {
        algorithm::EXC_C14N
        | algorithm::EXC_C14N_WITH_COMMENTS
        | algorithm::ENVELOPED_SIGNATURE
        | ns::SWA_CONTENT_TRANSFORM
        | ns::SWA_COMPLETE_TRANSFORM => Ok(()),
        other => Err(Error::DocumentFormat(format!("transform not permitted: {other}"))),
    }
}

/// Bounded walk over EncryptedKey/DerivedKeyToken dependencies.
///
/// Each key whose secret depends on another unresolved key is pushed; a key
/// that is already on the stack means the chain refers back to itself.
#[derive(Debug)]
pub struct EncryptedKeyWalk {
    stack: Vec<NodeId>,
    max_depth: usize,
}

impl EncryptedKeyWalk {
    pub fn new(start: NodeId) -> Self {
        Self {
            stack: vec![start],
            max_depth: MAX_KEY_CHAIN_DEPTH,
        }
    }

    /// The key being resolved.
    pub fn current(&self) -> Option<NodeId> {
        self.stack.last().copied()
    }

    /// Resolve `dependency` before the current key.
    pub fn enter(&mut self, dependency: NodeId) -> Result<()> {
        if self.stack.contains(&dependency) {
            warn!("encrypted key chain refers back to itself");
            return Err(Error::DocumentFormat("circular EncryptedKey reference".into()));
        }
        if self.stack.len() >= self.max_depth {
            return Err(Error::DocumentFormat("EncryptedKey chain is too deep".into()));
        }
        self.stack.push(dependency);
        Ok(())
    }

    /// The current key is resolved.
    pub fn leave(&mut self) -> Option<NodeId> {
        self.stack.pop()
    }
}

/// At most one token may sign the Timestamp unless configured otherwise.
pub fn check_timestamp_signers(result: &ProcessorResult, config: &WssConfig) -> Result<()> {
    let Some(ts) = &result.timestamp else {
        return Ok(());
    };
    let mut signers: Vec<TokenIndex> = result
        .signed_elements
        .iter()
        .filter(|s| s.element == ts.element)
        .map(|s| s.signing_token)
        .collect();
    signers.sort_unstable();
    signers.dedup();
    if signers.len() > 1 && !config.permit_multiple_timestamp_signatures {
        return Err(Error::Validation("Timestamp is signed by more than one token".into()));
    }
    Ok(())
}

/// Policy for a BinarySecurityToken of an unrecognized ValueType: `Ok`
/// means skip it.
pub fn check_unknown_binary_security_token(value_type: &str, config: &WssConfig) -> Result<()> {
    if config.permit_unknown_binary_security_tokens {
        return Ok(());
    }
    Err(Error::Generic(format!("unknown BinarySecurityToken: {value_type}")))
}

/// Collapse failures a caller could use as a padding or signature oracle
/// onto one masked error.
pub fn mask_if_oracle_safe(err: Error, oracle_safe: bool) -> Error {
    if !oracle_safe {
        return err;
    }
    let maskable = match &err {
        Error::Generic(msg) => msg.starts_with("unknown BinarySecurityToken"),
        // wrong key type or size for the algorithm the message names
        Error::Key(_) => true,
        other => matches!(other.kind(), ErrorKind::Decryption | ErrorKind::SignatureInvalid),
    };
    if maskable {
        Error::masked()
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(headers: &str) -> Document {
        Document::parse(&format!(
            r#"<S:Envelope xmlns:S="{soap}" xmlns:wsse="{wsse}" xmlns:wsu="{wsu}"><S:Header>{headers}</S:Header><S:Body/></S:Envelope>"#,
            soap = ns::SOAP11_ENV,
            wsse = ns::WSSE,
            wsu = ns::WSU
        ))
        .unwrap()
    }

    #[test]
    fn test_must_understand_rejects_only_our_headers() {
        let config = WssConfig::default();
        let doc = envelope(r#"<wsse:Security S:mustUnderstand="1"/><x:Foo xmlns:x="urn:x" S:mustUnderstand="1" S:actor="urn:elsewhere"/>"#);
        let env = Envelope::of(&doc).unwrap();
        let sec = env.security_header_for(&doc, None);
        assert!(check_must_understand(&doc, &env, sec, &config).is_ok());

        let doc = envelope(r#"<wsse:Security/><x:Foo xmlns:x="urn:x" S:mustUnderstand="1"/>"#);
        let env = Envelope::of(&doc).unwrap();
        let sec = env.security_header_for(&doc, None);
        let err = check_must_understand(&doc, &env, sec, &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let doc = envelope(r#"<x:Foo xmlns:x="urn:x" S:mustUnderstand="true" S:actor="secure_span"/>"#);
        let env = Envelope::of(&doc).unwrap();
        assert!(check_must_understand(&doc, &env, None, &config).is_err());

        let lenient = WssConfig {
            reject_on_must_understand: false,
            ..WssConfig::default()
        };
        assert!(check_must_understand(&doc, &env, None, &lenient).is_ok());
    }

    #[test]
    fn test_timestamp_header_exempt() {
        let doc = envelope(r#"<wsu:Timestamp S:mustUnderstand="1"/>"#);
        let env = Envelope::of(&doc).unwrap();
        assert!(check_must_understand(&doc, &env, None, &WssConfig::default()).is_ok());
    }

    #[test]
    fn test_reference_uris() {
        assert!(check_reference_uri("#Body-1").is_ok());
        assert!(check_reference_uri("cid:part1@example.com").is_ok());
        for bad in ["#xpointer(/)", "", "http://example.com/doc#x"] {
            assert_eq!(check_reference_uri(bad).unwrap_err().kind(), ErrorKind::DocumentFormat, "{bad}");
        }
    }

    #[test]
    fn test_transform_allow_list() {
        assert!(check_transform_allowed(algorithm::EXC_C14N).is_ok());
        assert!(check_transform_allowed(ns::SWA_COMPLETE_TRANSFORM).is_ok());
        let err = check_transform_allowed("http://www.w3.org/TR/1999/REC-xpath-19991116").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }

    #[test]
    fn test_key_walk_detects_cycles() {
        let doc = Document::parse("<r><a/><b/></r>").unwrap();
        let kids = doc.child_elements(doc.document_element().unwrap());
        let mut walk = EncryptedKeyWalk::new(kids[0]);
        assert_eq!(walk.enter(kids[0]).unwrap_err().kind(), ErrorKind::DocumentFormat);
        walk.enter(kids[1]).unwrap();
        assert_eq!(walk.current(), Some(kids[1]));
        assert!(walk.enter(kids[0]).is_err());
        assert_eq!(walk.leave(), Some(kids[1]));
        assert_eq!(walk.current(), Some(kids[0]));
    }

    #[test]
    fn test_masking() {
        let masked = mask_if_oracle_safe(Error::Decryption("bad padding".into()), true);
        assert!(masked.is_masked());
        assert!(mask_if_oracle_safe(Error::DigestMismatch("#Body".into()), true).is_masked());
        assert!(mask_if_oracle_safe(Error::Generic("unknown BinarySecurityToken: x".into()), true).is_masked());
        assert!(!mask_if_oracle_safe(Error::Validation("v".into()), true).is_masked());
        assert!(mask_if_oracle_safe(Error::Key("HMAC key required".into()), true).is_masked());
        assert!(matches!(
            mask_if_oracle_safe(Error::Key("RSA key required".into()), false),
            Error::Key(_)
        ));
        assert!(matches!(
            mask_if_oracle_safe(Error::Decryption("bad padding".into()), false),
            Error::Decryption(_)
        ));
    }
}
