#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use wssec_c14n::C14nMode;
use wssec_core::{algorithm, Error};
use wssec_xml::{Document, NodeId, NodeSet};

use crate::attachment::Attachment;

/// Data flowing through the transform pipeline.
pub enum TransformData<'a> {
    /// A node set within a document, rooted at `apex`.
    Xml {
        doc: &'a Document,
        apex: NodeId,
        node_set: NodeSet,
    },
    /// A MIME attachment part, before any attachment transform.
    Attachment(&'a Attachment),
    /// Raw octets.
    Binary(Vec<u8>),
}

impl<'a> TransformData<'a> {
    /// The subtree rooted at `apex`, comments excluded.
    pub fn subtree(doc: &'a Document, apex: NodeId) -> Self {
        TransformData::Xml {
            doc,
            apex,
            node_set: NodeSet::tree_without_comments(apex, doc),
        }
    }

    /// Convert to octets for digesting.
    ///
    /// A node set left unserialized by the transform chain is rendered with
    /// exclusive C14N; an untransformed attachment contributes its body.
    pub fn to_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Attachment(part) => Ok(part.body.clone()),
            TransformData::Xml { doc, apex, node_set } => {
                wssec_c14n::canonicalize_node_set(doc, apex, C14nMode::Exclusive, Some(&node_set), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute<'a>(&self, input: TransformData<'a>) -> Result<TransformData<'a>, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute<'a>(&self, input: TransformData<'a>) -> Result<TransformData<'a>, Error> {
        let mut data = input;
        for transform in &self.transforms {
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    /// Run the pipeline and produce the octets to digest.
    pub fn digest_input(&self, input: TransformData<'_>) -> Result<Vec<u8>, Error> {
        self.execute(input)?.to_binary()
    }

    pub fn uris(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.uri()).collect()
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// Build a transform for a `ds:Transform` Algorithm.
///
/// Only exclusive C14N, the enveloped-signature transform and the two SwA
/// attachment transforms are accepted; anything else is a document format
/// error. `signature` is the `ds:Signature` element the reference lives in.
pub fn transform_from_uri(
    uri: &str,
    inclusive_prefixes: Vec<String>,
    signature: Option<NodeId>,
) -> Result<Box<dyn Transform>, Error> {
    if let Some(mode) = C14nMode::from_uri(uri) {
        return Ok(Box::new(C14nTransform::new(mode, inclusive_prefixes)));
    }
    match uri {
        algorithm::ENVELOPED_SIGNATURE => {
            let signature = signature.ok_or_else(|| {
                Error::DocumentFormat("enveloped-signature transform outside a signature".into())
            })?;
            Ok(Box::new(crate::enveloped::EnvelopedSignatureTransform::new(signature)))
        }
        wssec_core::ns::SWA_CONTENT_TRANSFORM => Ok(Box::new(crate::attachment::AttachmentTransform::content())),
        wssec_core::ns::SWA_COMPLETE_TRANSFORM => Ok(Box::new(crate::attachment::AttachmentTransform::complete())),
        _ => Err(Error::DocumentFormat(format!("transform not permitted: {uri}"))),
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// An exclusive canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute<'a>(&self, input: TransformData<'a>) -> Result<TransformData<'a>, Error> {
        match input {
            TransformData::Xml { doc, apex, node_set } => {
                let bytes = wssec_c14n::canonicalize_node_set(
                    doc,
                    apex,
                    self.mode,
                    Some(&node_set),
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Binary(data) => {
                let doc = Document::parse_bytes(&data)?;
                let bytes = wssec_c14n::canonicalize_node_set(
                    &doc,
                    doc.root(),
                    self.mode,
                    None,
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Attachment(_) => Err(Error::Transform(
                "exclusive C14N cannot be applied to an attachment".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_transform_rejected() {
        let err = transform_from_uri("http://www.w3.org/TR/1999/REC-xpath-19991116", Vec::new(), None)
            .err()
            .unwrap();
        assert_eq!(err.kind(), wssec_core::ErrorKind::DocumentFormat);
        assert!(transform_from_uri("http://www.w3.org/2000/09/xmldsig#base64", Vec::new(), None).is_err());
    }

    #[test]
    fn test_c14n_pipeline_with_prefix_list() {
        let doc = Document::parse(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"><a:c/></a:r>"#).unwrap();
        let c = doc.child_elements(doc.document_element().unwrap())[0];
        let mut pipeline = TransformPipeline::new();
        pipeline.push(transform_from_uri(algorithm::EXC_C14N, vec!["b".into()], None).unwrap());
        assert_eq!(pipeline.uris(), vec![algorithm::EXC_C14N]);
        let out = pipeline.digest_input(TransformData::subtree(&doc, c)).unwrap();
        assert_eq!(out, br#"<a:c xmlns:a="urn:a" xmlns:b="urn:b"></a:c>"#.to_vec());
    }

    #[test]
    fn test_empty_pipeline_defaults_to_exclusive() {
        let doc = Document::parse(r#"<r xmlns:u="urn:u"><!--c--><x/></r>"#).unwrap();
        let r = doc.document_element().unwrap();
        let out = TransformPipeline::new().digest_input(TransformData::subtree(&doc, r)).unwrap();
        assert_eq!(out, b"<r><x></x></r>".to_vec());
    }
}
