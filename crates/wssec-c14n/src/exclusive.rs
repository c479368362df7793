#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output.  A namespace is
//! visibly utilized on an element if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.
//!
//! Canonicalization works on an apex node plus an optional [`NodeSet`]; nodes
//! outside the set are skipped but their visible descendants still render.

use std::collections::{BTreeMap, HashSet};

use wssec_core::{ns, Error};
use wssec_xml::{Attribute, Document, NodeId, NodeKind, NodeSet};

use crate::render::{escape, Attr, Escape, NsDecl};

/// Canonicalize the subtree rooted at `apex`.
pub fn canonicalize(
    doc: &Document,
    apex: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    if doc.node_kind(apex).is_none() {
        return Err(Error::Canonicalization(format!(
            "node {} is not part of the document",
            apex.index()
        )));
    }
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        doc,
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
    };
    ctx.process_node(apex, &mut output, &BTreeMap::new());
    Ok(output)
}

struct ExcC14nContext<'a> {
    doc: &'a Document,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    /// PrefixList entries; "" stands for `#default`.
    inclusive_prefixes: HashSet<String>,
}

impl<'a> ExcC14nContext<'a> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |ns| ns.contains_id(id))
    }

    fn process_node(&self, id: NodeId, output: &mut Vec<u8>, rendered_ns: &BTreeMap<String, String>) {
        match self.doc.node_kind(id) {
            Some(NodeKind::Document) => {
                for child in self.doc.children(id) {
                    self.process_node(child, output, rendered_ns);
                }
            }
            Some(NodeKind::Element(_)) => self.process_element(id, output, rendered_ns),
            Some(NodeKind::Text(text) | NodeKind::CData(text)) => {
                if self.is_visible(id) {
                    output.extend_from_slice(escape(text, Escape::Text).as_bytes());
                }
            }
            Some(NodeKind::Comment(text)) => {
                if self.with_comments && self.is_visible(id) {
                    self.top_level_break_before(id, output);
                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(text.as_bytes());
                    output.extend_from_slice(b"-->");
                    self.top_level_break_after(id, output);
                }
            }
            Some(NodeKind::ProcessingInstruction(pi)) => {
                if self.is_visible(id) {
                    self.top_level_break_before(id, output);
                    output.extend_from_slice(b"<?");
                    output.extend_from_slice(pi.target.as_bytes());
                    if let Some(value) = pi.data.as_deref().filter(|v| !v.is_empty()) {
                        output.push(b' ');
                        output.extend_from_slice(escape(value, Escape::Pi).as_bytes());
                    }
                    output.extend_from_slice(b"?>");
                    self.top_level_break_after(id, output);
                }
            }
            Some(NodeKind::Attribute(..)) | None => {}
        }
    }

    fn parent_is_root(&self, id: NodeId) -> bool {
        self.doc
            .parent(id)
            .is_some_and(|p| matches!(self.doc.node_kind(p), Some(NodeKind::Document)))
    }

    // Comments and PIs outside the document element are separated from it
    // by a single LF.
    fn top_level_break_before(&self, id: NodeId, output: &mut Vec<u8>) {
        if self.parent_is_root(id) && has_preceding_element(self.doc, id) {
            output.push(b'\n');
        }
    }

    fn top_level_break_after(&self, id: NodeId, output: &mut Vec<u8>) {
        if self.parent_is_root(id) && self.doc.next_element_sibling(id).is_some() {
            output.push(b'\n');
        }
    }

    fn process_element(&self, id: NodeId, output: &mut Vec<u8>, rendered_ns: &BTreeMap<String, String>) {
        let Some(elem) = self.doc.element(id) else {
            return;
        };

        if !self.is_visible(id) {
            // An element outside the node set renders nothing itself; its
            // visible descendants see the same rendered namespace context.
            for child in self.doc.children(id) {
                self.process_node(child, output, rendered_ns);
            }
            return;
        }

        let elem_prefix = elem.name.prefix.as_deref().unwrap_or_default().to_owned();
        let mut utilized: HashSet<String> = HashSet::new();
        utilized.insert(elem_prefix.clone());
        for attr in &elem.attributes {
            if let Some(prefix) = attr_prefix(attr) {
                if !prefix.is_empty() {
                    utilized.insert(prefix);
                }
            }
        }
        utilized.extend(self.inclusive_prefixes.iter().cloned());

        let mut inscope = self.doc.in_scope_namespaces(id);
        // The element's own binding always wins, even when the tree was
        // assembled without an explicit declaration for it.
        if let Some(uri) = elem.name.namespace_uri.as_deref() {
            inscope.entry(elem_prefix.clone()).or_insert_with(|| uri.to_owned());
        }

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            match inscope.get(prefix) {
                Some(uri) => {
                    if rendered_ns.get(prefix) != Some(uri) {
                        ns_decls.push(NsDecl {
                            prefix: prefix.clone(),
                            uri: uri.clone(),
                        });
                    }
                }
                None if prefix.is_empty() => {
                    // Default namespace went out of scope below a rendered
                    // non-empty default: undeclare it.
                    if rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                        ns_decls.push(NsDecl {
                            prefix: String::new(),
                            uri: String::new(),
                        });
                    }
                }
                None => {}
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = elem
            .attributes
            .iter()
            .map(|attr| Attr {
                ns_uri: attr.name.namespace_uri.as_deref().unwrap_or_default().to_owned(),
                local_name: attr.name.local_name.to_string(),
                qualified_name: match attr_prefix(attr) {
                    Some(p) if !p.is_empty() => format!("{p}:{}", attr.name.local_name),
                    _ => attr.name.local_name.to_string(),
                },
                value: attr.value.to_string(),
            })
            .collect();
        attrs.sort();

        let elem_name = elem.name.prefixed_name();
        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for decl in &ns_decls {
            decl.write(output);
        }
        for attr in &attrs {
            attr.write(output);
        }
        output.push(b'>');

        let mut child_rendered_ns = rendered_ns.clone();
        for decl in &ns_decls {
            child_rendered_ns.insert(decl.prefix.clone(), decl.uri.clone());
        }

        for child in self.doc.children(id) {
            self.process_node(child, output, &child_rendered_ns);
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
    }
}

fn has_preceding_element(doc: &Document, id: NodeId) -> bool {
    let mut sib = doc.previous_sibling(id);
    while let Some(s) = sib {
        if doc.is_element(s) {
            return true;
        }
        sib = doc.previous_sibling(s);
    }
    false
}

/// Prefix of a namespaced attribute; `None` for unqualified attributes.
fn attr_prefix(attr: &Attribute) -> Option<String> {
    let uri = attr.name.namespace_uri.as_deref()?;
    if uri == ns::XML {
        return Some("xml".to_owned());
    }
    Some(attr.name.prefix.as_deref().unwrap_or_default().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str, prefixes: &[&str]) -> String {
        let doc = Document::parse(xml).unwrap();
        let root = doc.document_element().unwrap();
        let p: Vec<String> = prefixes.iter().map(|s| s.to_string()).collect();
        String::from_utf8(canonicalize(&doc, root, false, None, &p).unwrap()).unwrap()
    }

    #[test]
    fn test_unused_namespaces_dropped() {
        let out = c14n(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"><a:c/></a:r>"#, &[]);
        assert_eq!(out, r#"<a:r xmlns:a="urn:a"><a:c></a:c></a:r>"#);
    }

    #[test]
    fn test_inclusive_prefix_list() {
        let out = c14n(r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"/>"#, &["b"]);
        assert_eq!(out, r#"<a:r xmlns:a="urn:a" xmlns:b="urn:b"></a:r>"#);
    }

    #[test]
    fn test_subtree_pulls_inherited_binding() {
        let doc = Document::parse(r#"<a:r xmlns:a="urn:a" xmlns:q="urn:q"><a:c q:x="1" y="2">t</a:c></a:r>"#).unwrap();
        let r = doc.document_element().unwrap();
        let c = doc.child_elements(r)[0];
        let out = canonicalize(&doc, c, false, None, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<a:c xmlns:a="urn:a" xmlns:q="urn:q" y="2" q:x="1">t</a:c>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let out = c14n(r#"<r xmlns="urn:d"><c xmlns=""/></r>"#, &[]);
        assert_eq!(out, r#"<r xmlns="urn:d"><c xmlns=""></c></r>"#);
    }

    #[test]
    fn test_excluded_subtree() {
        let doc = Document::parse("<r><keep/><drop><x/></drop></r>").unwrap();
        let r = doc.document_element().unwrap();
        let mut set = NodeSet::tree_without_comments(r, &doc);
        set.subtract_tree(doc.child_elements(r)[1], &doc);
        let out = canonicalize(&doc, r, false, Some(&set), &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<r><keep></keep></r>");
    }

    #[test]
    fn test_idempotent() {
        let xml = r#"<s:E xmlns:s="urn:s" xmlns:u="urn:u"><s:B u:Id="b" z="1" a="2">x &amp; y</s:B></s:E>"#;
        let first = c14n(xml, &[]);
        let second = c14n(&first, &[]);
        assert_eq!(first, second);
    }
}
