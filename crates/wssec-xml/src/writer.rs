#![forbid(unsafe_code)]

//! XML output: subtree serialization through `uppsala`, and a small
//! `XmlWriter` wrapper for building markup around pre-serialized content.
//!
//! Output keeps prefixes and the namespace declarations recorded on each
//! element. It is not canonical; use `wssec-c14n` for digest input.

use wssec_core::Error;

use crate::document::{Document, NodeId};

/// Serialize `node` and its subtree. Namespaces declared on ancestors are
/// taken as in scope and not repeated.
pub fn serialize(doc: &Document, node: NodeId) -> String {
    if node == doc.root() {
        return doc.to_xml();
    }
    doc.as_uppsala().node_to_xml(node)
}

/// Serialize `node` so that it parses on its own: namespaces it inherits
/// from ancestors are declared on the top element.
pub fn serialize_standalone(doc: &Document, node: NodeId) -> String {
    if !doc.is_element(node) {
        return serialize(doc, node);
    }
    let mut detached = Document::default();
    match detached.import_subtree(doc, node) {
        Ok(copy) => {
            let root = detached.root();
            detached.append_child(root, copy);
            detached.to_xml()
        }
        Err(_) => serialize(doc, node),
    }
}

/// A simple XML writer wrapping uppsala's XmlWriter.
pub struct XmlWriter {
    writer: uppsala::XmlWriter,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            writer: uppsala::XmlWriter::new(),
        }
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), Error> {
        self.writer.start_element(name, attrs);
        Ok(())
    }

    pub fn end_element(&mut self, name: &str) -> Result<(), Error> {
        self.writer.end_element(name);
        Ok(())
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) -> Result<(), Error> {
        self.writer.text(text);
        Ok(())
    }

    /// Write markup that is already well-formed XML.
    pub fn write_raw(&mut self, xml: &str) -> Result<(), Error> {
        self.writer.raw(xml);
        Ok(())
    }

    pub fn into_string(self) -> Result<String, Error> {
        Ok(self.writer.into_string())
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}
