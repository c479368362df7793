#![forbid(unsafe_code)]

//! `wsu:Id` assignment for elements the decorator signs or encrypts.
//!
//! Generated values look like `Body-1-<32 hex digits>`: a basename, a
//! per-message counter and 16 random bytes.

use std::collections::HashMap;

use wssec_core::ns;
use wssec_xml::{Document, NodeId};

/// Per-message id allocator.
#[derive(Debug)]
pub struct IdGenerator {
    use_element_name: bool,
    counters: HashMap<String, u32>,
}

impl IdGenerator {
    pub fn new(use_element_name: bool) -> Self {
        Self {
            use_element_name,
            counters: HashMap::new(),
        }
    }

    /// A fresh identifier for `basename`.
    pub fn next(&mut self, basename: &str) -> String {
        let count = self.counters.entry(basename.to_owned()).or_insert(0);
        *count += 1;
        format!("{basename}-{count}-{}", hex::encode(wssec_crypto::random_bytes(16)))
    }

    /// Identifier of `element`, giving it a `wsu:Id` first if it has none.
    pub fn ensure_id(&mut self, doc: &mut Document, element: NodeId) -> String {
        if let Some(existing) = doc.element_id(element) {
            return existing.to_owned();
        }
        let basename = if self.use_element_name {
            doc.local_name(element).unwrap_or("id").to_owned()
        } else {
            "id".to_owned()
        };
        let id = self.next(&basename);
        doc.set_attribute_ns(element, ns::WSU, "wsu", ns::attr::ID, &id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_shape() {
        let mut ids = IdGenerator::new(true);
        let a = ids.next("Body");
        let b = ids.next("Body");
        assert!(a.starts_with("Body-1-"));
        assert!(b.starts_with("Body-2-"));
        assert_eq!(a.len(), "Body-1-".len() + 32);
        assert!(ids.next("Timestamp").starts_with("Timestamp-1-"));
    }

    #[test]
    fn test_existing_id_reused() {
        let mut doc = Document::parse(
            r#"<r xmlns:u="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><a u:Id="keep"/><b/></r>"#,
        )
        .unwrap();
        let root = doc.document_element().unwrap();
        let kids = doc.child_elements(root);
        let mut ids = IdGenerator::new(false);
        assert_eq!(ids.ensure_id(&mut doc, kids[0]), "keep");
        let generated = ids.ensure_id(&mut doc, kids[1]);
        assert!(generated.starts_with("id-1-"));
        assert_eq!(doc.attribute_ns(kids[1], ns::WSU, "Id"), Some(generated.as_str()));
        // the existing wsu prefix is reused
        assert!(doc.to_xml().contains(&format!(r#"<b u:Id="{generated}"/>"#)));
    }
}
