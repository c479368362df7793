#![forbid(unsafe_code)]

//! XML-DSig signature creation over elements of an in-memory document.
//!
//! The `ds:Signature` is built in place, so that an enveloped-signature
//! transform can exclude it while the references are digested. `KeyInfo` is
//! left empty for the caller to fill with whatever token reference it uses.

use base64::Engine;
use tracing::debug;
use wssec_c14n::C14nMode;
use wssec_core::{algorithm, ns, Error};
use wssec_crypto::sign::SigningKey;
use wssec_transforms::{transform_from_uri, uri, AttachmentStore, TransformPipeline};
use wssec_xml::{Document, NodeId, Placement};

/// One `ds:Transform` to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub algorithm: String,
    /// InclusiveNamespaces PrefixList for exclusive C14N.
    pub prefix_list: Vec<String>,
}

impl TransformSpec {
    pub fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.to_owned(),
            prefix_list: Vec::new(),
        }
    }

    pub fn exc_c14n() -> Self {
        Self::new(algorithm::EXC_C14N)
    }

    pub fn enveloped() -> Self {
        Self::new(algorithm::ENVELOPED_SIGNATURE)
    }

    pub fn attachment(complete: bool) -> Self {
        if complete {
            Self::new(ns::SWA_COMPLETE_TRANSFORM)
        } else {
            Self::new(ns::SWA_CONTENT_TRANSFORM)
        }
    }
}

/// One `ds:Reference` to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub uri: String,
    pub transforms: Vec<TransformSpec>,
    pub digest_method: String,
}

/// Everything needed to build a `ds:Signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureSpec {
    pub signature_method: String,
    pub references: Vec<ReferenceSpec>,
    /// PrefixList for the SignedInfo canonicalization.
    pub signed_info_prefixes: Vec<String>,
    pub id: Option<String>,
}

/// Handles into the created signature.
#[derive(Debug, Clone)]
pub struct CreatedSignature {
    pub signature: NodeId,
    pub key_info: NodeId,
    pub signature_value: Vec<u8>,
}

/// Build, digest and sign a `ds:Signature` at `placement`.
pub fn create_signature(
    doc: &mut Document,
    placement: Placement,
    spec: &SignatureSpec,
    key: &SigningKey,
    attachments: Option<&dyn AttachmentStore>,
) -> Result<CreatedSignature, Error> {
    let sig_alg = wssec_crypto::sign::from_uri(&spec.signature_method)?;

    let signature = doc.new_element_at(placement, ns::DSIG, "ds", ns::node::SIGNATURE)?;
    if let Some(id) = &spec.id {
        doc.set_attribute(signature, ns::attr::ID, id);
    }

    let signed_info = doc.append_new_element(signature, ns::DSIG, "ds", ns::node::SIGNED_INFO);
    let c14n = doc.append_new_element(signed_info, ns::DSIG, "ds", ns::node::CANONICALIZATION_METHOD);
    doc.set_attribute(c14n, ns::attr::ALGORITHM, algorithm::EXC_C14N);
    append_prefix_list(doc, c14n, &spec.signed_info_prefixes);
    let method = doc.append_new_element(signed_info, ns::DSIG, "ds", ns::node::SIGNATURE_METHOD);
    doc.set_attribute(method, ns::attr::ALGORITHM, sig_alg.uri());

    let mut digest_nodes = Vec::with_capacity(spec.references.len());
    for r in &spec.references {
        let reference = doc.append_new_element(signed_info, ns::DSIG, "ds", ns::node::REFERENCE);
        doc.set_attribute(reference, ns::attr::URI, &r.uri);
        if !r.transforms.is_empty() {
            let transforms = doc.append_new_element(reference, ns::DSIG, "ds", ns::node::TRANSFORMS);
            for t in &r.transforms {
                let tnode = doc.append_new_element(transforms, ns::DSIG, "ds", ns::node::TRANSFORM);
                doc.set_attribute(tnode, ns::attr::ALGORITHM, &t.algorithm);
                append_prefix_list(doc, tnode, &t.prefix_list);
            }
        }
        let dm = doc.append_new_element(reference, ns::DSIG, "ds", ns::node::DIGEST_METHOD);
        doc.set_attribute(dm, ns::attr::ALGORITHM, &r.digest_method);
        digest_nodes.push(doc.append_new_element(reference, ns::DSIG, "ds", ns::node::DIGEST_VALUE));
    }
    let value_node = doc.append_new_element(signature, ns::DSIG, "ds", ns::node::SIGNATURE_VALUE);
    let key_info = doc.append_new_element(signature, ns::DSIG, "ds", ns::node::KEY_INFO);

    let engine = base64::engine::general_purpose::STANDARD;
    let mut digests = Vec::with_capacity(spec.references.len());
    for r in &spec.references {
        let mut pipeline = TransformPipeline::new();
        for t in &r.transforms {
            pipeline.push(transform_from_uri(&t.algorithm, t.prefix_list.clone(), Some(signature))?);
        }
        let (_, input) = uri::resolve(doc, &r.uri, attachments)?;
        let bytes = pipeline.digest_input(input)?;
        let digest = wssec_crypto::digest::digest(&r.digest_method, &bytes)?;
        debug!(uri = %r.uri, octets = bytes.len(), "digested reference");
        digests.push(engine.encode(digest));
    }
    for (node, value) in digest_nodes.into_iter().zip(digests) {
        doc.set_text(node, &value);
    }

    let c14n_signed_info = wssec_c14n::canonicalize_node_set(
        doc,
        signed_info,
        C14nMode::Exclusive,
        None,
        &spec.signed_info_prefixes,
    )?;
    let signature_value = sig_alg.sign(key, &c14n_signed_info)?;
    doc.set_text(value_node, &engine.encode(&signature_value));

    Ok(CreatedSignature {
        signature,
        key_info,
        signature_value,
    })
}

fn append_prefix_list(doc: &mut Document, parent: NodeId, prefixes: &[String]) {
    if prefixes.is_empty() {
        return;
    }
    let incl = doc.append_new_element(parent, ns::EXC_C14N, "ec", ns::node::INCLUSIVE_NAMESPACES);
    doc.set_attribute(incl, ns::attr::PREFIX_LIST, &prefixes.join(" "));
}
