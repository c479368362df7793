#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Parse `<Signature>`: SignedInfo canonicalization (exclusive only),
//!    SignatureMethod, References and their transforms
//! 2. For each `<Reference>`: resolve the URI, run transforms, compare digests
//! 3. Canonicalize `<SignedInfo>` and check `<SignatureValue>` with the key
//!    the caller resolved from `<KeyInfo>`

use base64::Engine;
use tracing::debug;
use wssec_c14n::C14nMode;
use wssec_core::{ns, Error};
use wssec_crypto::sign::SigningKey;
use wssec_transforms::{transform_from_uri, uri, AttachmentStore, ReferenceTarget, TransformPipeline};
use wssec_xml::{Document, NodeId};

/// A `<Reference>` as read from SignedInfo.
#[derive(Debug, Clone)]
pub struct ParsedReference {
    pub uri: String,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
    /// Transform algorithm URIs with their PrefixList, in document order.
    pub transforms: Vec<(String, Vec<String>)>,
}

impl ParsedReference {
    pub fn has_transform(&self, uri: &str) -> bool {
        self.transforms.iter().any(|(t, _)| t == uri)
    }
}

/// A `<Signature>` as read from the document.
#[derive(Debug, Clone)]
pub struct ParsedSignature {
    pub signature: NodeId,
    pub signed_info: NodeId,
    pub c14n_mode: C14nMode,
    pub c14n_prefixes: Vec<String>,
    pub signature_method: String,
    pub references: Vec<ParsedReference>,
    pub signature_value: Vec<u8>,
    pub key_info: Option<NodeId>,
}

/// A reference whose digest matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedReference {
    pub uri: String,
    pub target: ReferenceTarget,
}

fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

fn required_child(doc: &Document, parent: NodeId, local: &str) -> Result<NodeId, Error> {
    doc.find_child(parent, ns::DSIG, local)
        .ok_or_else(|| Error::MissingElement(local.to_owned()))
}

fn algorithm_of(doc: &Document, node: NodeId) -> Result<String, Error> {
    doc.attribute(node, wssec_core::ns::attr::ALGORITHM)
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::MissingAttribute(format!(
                "Algorithm on {}",
                doc.local_name(node).unwrap_or_default()
            ))
        })
}

fn prefix_list(doc: &Document, node: NodeId) -> Vec<String> {
    doc.find_child(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|incl| doc.attribute(incl, ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Read a `ds:Signature` element.
///
/// SignedInfo must use exclusive canonicalization, each reference URI must
/// be a bare-name `#id` or a `cid:` and each transform must be one the
/// pipeline accepts; violations are document format errors.
pub fn parse_signature(doc: &Document, signature: NodeId) -> Result<ParsedSignature, Error> {
    let signed_info = required_child(doc, signature, ns::node::SIGNED_INFO)?;

    let c14n_node = required_child(doc, signed_info, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(doc, c14n_node)?;
    let c14n_mode = C14nMode::from_uri(&c14n_uri).ok_or_else(|| {
        Error::DocumentFormat(format!("SignedInfo canonicalization must be exclusive: {c14n_uri}"))
    })?;
    let c14n_prefixes = prefix_list(doc, c14n_node);

    let method_node = required_child(doc, signed_info, ns::node::SIGNATURE_METHOD)?;
    let signature_method = algorithm_of(doc, method_node)?;

    let mut references = Vec::new();
    for reference in doc.find_children(signed_info, ns::DSIG, ns::node::REFERENCE) {
        let uri = doc.attribute(reference, ns::attr::URI).unwrap_or("").to_owned();
        uri::classify(&uri)?;

        let mut transforms = Vec::new();
        if let Some(tlist) = doc.find_child(reference, ns::DSIG, ns::node::TRANSFORMS) {
            for t in doc.find_children(tlist, ns::DSIG, ns::node::TRANSFORM) {
                let alg = algorithm_of(doc, t)?;
                let prefixes = prefix_list(doc, t);
                transform_from_uri(&alg, prefixes.clone(), Some(signature))?;
                transforms.push((alg, prefixes));
            }
        }

        let dm = required_child(doc, reference, ns::node::DIGEST_METHOD)?;
        let digest_method = algorithm_of(doc, dm)?;
        let dv = required_child(doc, reference, ns::node::DIGEST_VALUE)?;
        let digest_value = decode_b64(&doc.text(dv), "DigestValue")?;

        references.push(ParsedReference {
            uri,
            digest_method,
            digest_value,
            transforms,
        });
    }
    if references.is_empty() {
        return Err(Error::MissingElement("Reference".into()));
    }

    let value_node = required_child(doc, signature, ns::node::SIGNATURE_VALUE)?;
    let signature_value = decode_b64(&doc.text(value_node), "SignatureValue")?;

    Ok(ParsedSignature {
        signature,
        signed_info,
        c14n_mode,
        c14n_prefixes,
        signature_method,
        references,
        signature_value,
        key_info: doc.find_child(signature, ns::DSIG, ns::node::KEY_INFO),
    })
}

fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Recompute every reference digest.
pub fn verify_references(
    doc: &Document,
    parsed: &ParsedSignature,
    attachments: Option<&dyn AttachmentStore>,
) -> Result<Vec<VerifiedReference>, Error> {
    let mut verified = Vec::with_capacity(parsed.references.len());
    for r in &parsed.references {
        let mut pipeline = TransformPipeline::new();
        for (alg, prefixes) in &r.transforms {
            pipeline.push(transform_from_uri(alg, prefixes.clone(), Some(parsed.signature))?);
        }
        let (target, input) = uri::resolve(doc, &r.uri, attachments)?;
        let bytes = pipeline.digest_input(input)?;
        let computed = wssec_crypto::digest::digest(&r.digest_method, &bytes)?;
        if !digests_equal(&computed, &r.digest_value) {
            debug!(uri = %r.uri, "reference digest mismatch");
            return Err(Error::DigestMismatch(format!("reference {}", r.uri)));
        }
        verified.push(VerifiedReference {
            uri: r.uri.clone(),
            target,
        });
    }
    Ok(verified)
}

/// Check the SignatureValue over the canonical SignedInfo.
pub fn verify_signature_value(doc: &Document, parsed: &ParsedSignature, key: &SigningKey) -> Result<(), Error> {
    let c14n_signed_info = wssec_c14n::canonicalize_node_set(
        doc,
        parsed.signed_info,
        parsed.c14n_mode,
        None,
        &parsed.c14n_prefixes,
    )?;
    let sig_alg = wssec_crypto::sign::from_uri(&parsed.signature_method)?;
    if sig_alg.verify(key, &c14n_signed_info, &parsed.signature_value)? {
        Ok(())
    } else {
        Err(Error::SignatureInvalid("signature value verification failed".into()))
    }
}

/// Parse and fully verify a signature with a known key.
pub fn verify(
    doc: &Document,
    signature: NodeId,
    key: &SigningKey,
    attachments: Option<&dyn AttachmentStore>,
) -> Result<Vec<VerifiedReference>, Error> {
    let parsed = parse_signature(doc, signature)?;
    let verified = verify_references(doc, &parsed, attachments)?;
    verify_signature_value(doc, &parsed, key)?;
    Ok(verified)
}
