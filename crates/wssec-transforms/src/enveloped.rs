#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element holding the reference from the node set.

use crate::pipeline::{Transform, TransformData};
use wssec_core::{algorithm, Error};
use wssec_xml::NodeId;

/// Removes the `<Signature>` element and its descendants from the node set.
pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute<'a>(&self, input: TransformData<'a>) -> Result<TransformData<'a>, Error> {
        match input {
            TransformData::Xml {
                doc,
                apex,
                mut node_set,
            } => {
                node_set.subtract_tree(self.signature, doc);
                Ok(TransformData::Xml { doc, apex, node_set })
            }
            _ => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TransformPipeline;
    use wssec_xml::Document;

    #[test]
    fn test_signature_subtree_excluded() {
        let doc = Document::parse(
            r#"<r><data>1</data><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo/></ds:Signature></r>"#,
        )
        .unwrap();
        let r = doc.document_element().unwrap();
        let sig = doc.child_elements(r)[1];
        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(EnvelopedSignatureTransform::new(sig)));
        let out = pipeline.digest_input(TransformData::subtree(&doc, r)).unwrap();
        assert_eq!(out, b"<r><data>1</data></r>".to_vec());
    }
}
