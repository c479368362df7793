#![forbid(unsafe_code)]

//! Mutable XML document built on `uppsala`'s arena DOM.
//!
//! Security processing rewrites the tree in place: it replaces an
//! `EncryptedData` with its plaintext, inserts header children and moves a
//! signature. `uppsala::Document` owns the nodes and keeps every [`NodeId`]
//! stable for the life of the document; this wrapper adds the namespace
//! bookkeeping and identifier lookups the WS-Security layers share.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use wssec_core::{ns, Error};

pub use uppsala::NodeId;

/// A namespace-qualified name.
pub type QName = uppsala::QName<'static>;
pub type Attribute = uppsala::Attribute<'static>;
pub type Element = uppsala::Element<'static>;
pub type NodeKind = uppsala::NodeKind<'static>;

/// Where a newly created element goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// As the last child of the node.
    Append(NodeId),
    /// Immediately before the node, under the same parent.
    Before(NodeId),
}

/// An owned, mutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    inner: uppsala::Document<'static>,
}

fn owned(s: &str) -> Cow<'static, str> {
    Cow::Owned(s.to_owned())
}

fn no_parent() -> Error {
    Error::XmlStructure("reference node has no parent".into())
}

impl Document {
    /// Parse XML text into a new document.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let doc = uppsala::parse(text).map_err(|e| Error::XmlParse(e.to_string()))?;
        Ok(Self {
            inner: doc.into_static(),
        })
    }

    /// Parse XML from bytes, which must be UTF-8.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    /// The underlying `uppsala` document.
    pub fn as_uppsala(&self) -> &uppsala::Document<'static> {
        &self.inner
    }

    // ── Navigation ───────────────────────────────────────────────────

    pub fn root(&self) -> NodeId {
        self.inner.root()
    }

    /// The top-level element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.inner.document_element()
    }

    pub fn node_kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.inner.node_kind(id)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.inner.element(id)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.inner.element_mut(id)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| &*e.name.local_name)
    }

    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|e| e.name.namespace_uri.as_deref())
    }

    /// True if `id` is an element with the given namespace and local name.
    pub fn is_named(&self, id: NodeId, ns: &str, local_name: &str) -> bool {
        self.element(id).is_some_and(|e| name_is(&e.name, ns, local_name))
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.children(id)
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .children_iter(id)
            .filter(|c| self.is_element(*c))
            .collect()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.parent(id)
    }

    /// True while the node is reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_ancestor_or_self(self.root(), id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.inner.previous_sibling(id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.inner.next_sibling(id)
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let mut sib = self.next_sibling(id);
        while let Some(s) = sib {
            if self.is_element(s) {
                return Some(s);
            }
            sib = self.next_sibling(s);
        }
        None
    }

    /// All descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.inner.descendants(id)
    }

    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// First child element with the given namespace and local name.
    pub fn find_child(&self, id: NodeId, ns: &str, local_name: &str) -> Option<NodeId> {
        self.inner
            .children_iter(id)
            .find(|c| self.is_named(*c, ns, local_name))
    }

    pub fn find_children(&self, id: NodeId, ns: &str, local_name: &str) -> Vec<NodeId> {
        self.inner
            .children_iter(id)
            .filter(|c| self.is_named(*c, ns, local_name))
            .collect()
    }

    /// First descendant element with the given namespace and local name.
    pub fn find_descendant(&self, id: NodeId, ns: &str, local_name: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|c| self.is_named(*c, ns, local_name))
    }

    // ── Attributes ───────────────────────────────────────────────────

    /// Value of an attribute with no namespace.
    pub fn attribute(&self, id: NodeId, local_name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| a.name.namespace_uri.is_none() && a.name.local_name == local_name)
            .map(|a| &*a.value)
    }

    pub fn attribute_ns(&self, id: NodeId, ns: &str, local_name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| name_is(&a.name, ns, local_name))
            .map(|a| &*a.value)
    }

    /// Set (or overwrite) an attribute with no namespace.
    pub fn set_attribute(&mut self, id: NodeId, local_name: &str, value: &str) {
        if let Some(elem) = self.element_mut(id) {
            match elem
                .attributes
                .iter_mut()
                .find(|a| a.name.namespace_uri.is_none() && a.name.local_name == local_name)
            {
                Some(attr) => attr.value = owned(value),
                None => elem.attributes.push(Attribute {
                    name: QName::local(local_name.to_owned()),
                    value: owned(value),
                }),
            }
        }
    }

    /// Set a namespaced attribute, declaring `prefix` on the element when the
    /// namespace is not already in scope. Returns the prefix actually used.
    pub fn set_attribute_ns(
        &mut self,
        id: NodeId,
        ns: &str,
        prefix: &str,
        local_name: &str,
        value: &str,
    ) -> String {
        let prefix = self.ensure_prefix(id, ns, prefix);
        if let Some(elem) = self.element_mut(id) {
            match elem.attributes.iter_mut().find(|a| name_is(&a.name, ns, local_name)) {
                Some(attr) => attr.value = owned(value),
                None => elem.attributes.push(Attribute {
                    name: QName::full(prefix.clone(), ns.to_owned(), local_name.to_owned()),
                    value: owned(value),
                }),
            }
        }
        prefix
    }

    pub fn remove_attribute(&mut self, id: NodeId, local_name: &str) {
        if let Some(elem) = self.element_mut(id) {
            elem.attributes
                .retain(|a| !(a.name.namespace_uri.is_none() && a.name.local_name == local_name));
        }
    }

    pub fn remove_attribute_ns(&mut self, id: NodeId, ns: &str, local_name: &str) {
        if let Some(elem) = self.element_mut(id) {
            elem.attributes.retain(|a| !name_is(&a.name, ns, local_name));
        }
    }

    // ── Namespaces ───────────────────────────────────────────────────

    /// All namespace bindings in scope at `id`, keyed by prefix ("" = default).
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut chain = vec![id];
        chain.extend(self.inner.ancestors(id));
        let mut result = BTreeMap::new();
        for n in chain.into_iter().rev() {
            if let Some(elem) = self.element(n) {
                for (prefix, uri) in &elem.namespace_declarations {
                    if uri.is_empty() {
                        result.remove(&prefix[..]);
                    } else {
                        result.insert(prefix.to_string(), uri.to_string());
                    }
                }
            }
        }
        result
    }

    /// Namespace URI bound to `prefix` at `id`.
    pub fn lookup_namespace_uri(&self, id: NodeId, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(ns::XML.to_owned());
        }
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(elem) = self.element(n) {
                if let Some((_, uri)) = elem.namespace_declarations.iter().find(|(p, _)| p == prefix) {
                    return (!uri.is_empty()).then(|| uri.to_string());
                }
            }
            current = self.parent(n);
        }
        None
    }

    /// A non-default prefix bound to `uri` at `id` that is not shadowed.
    pub fn lookup_prefix(&self, id: NodeId, uri: &str) -> Option<String> {
        self.in_scope_namespaces(id)
            .into_iter()
            .find(|(p, u)| !p.is_empty() && u == uri)
            .map(|(p, _)| p)
    }

    pub fn declare_namespace(&mut self, id: NodeId, prefix: &str, uri: &str) {
        self.inner.declare_namespace(id, Some(prefix), uri.to_owned());
    }

    /// Make sure some prefix for `ns` is usable on `id`; prefer an existing
    /// binding, else declare `preferred` (suffixed if it is taken).
    fn ensure_prefix(&mut self, id: NodeId, ns: &str, preferred: &str) -> String {
        if let Some(existing) = self.lookup_prefix(id, ns) {
            return existing;
        }
        let scope = self.in_scope_namespaces(id);
        let mut prefix = preferred.to_owned();
        let mut n = 1;
        while scope.get(&prefix).is_some_and(|u| u != ns) {
            prefix = format!("{preferred}{n}");
            n += 1;
        }
        self.declare_namespace(id, &prefix, ns);
        prefix
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Create a detached element. No namespace declaration is added; use
    /// [`Document::append_new_element`] to get one automatically.
    pub fn create_element(&mut self, ns: Option<&str>, prefix: Option<&str>, local_name: &str) -> NodeId {
        self.inner.create_element(QName {
            namespace_uri: ns.map(owned),
            prefix: prefix.filter(|p| !p.is_empty()).map(owned),
            local_name: owned(local_name),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.inner.create_text(text.to_owned())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.inner.append_child(parent, child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        match self.inner.first_child(parent) {
            Some(first) => self.inner.insert_before(parent, child, first),
            None => self.inner.append_child(parent, child),
        }
    }

    /// Insert `new` immediately before `reference` under the same parent.
    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) -> Result<(), Error> {
        let parent = self.parent(reference).ok_or_else(no_parent)?;
        self.inner.insert_before(parent, new, reference);
        Ok(())
    }

    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) -> Result<(), Error> {
        let parent = self.parent(reference).ok_or_else(no_parent)?;
        self.inner.insert_after(parent, new, reference);
        Ok(())
    }

    /// Detach a node (and its subtree) from the tree.
    pub fn remove(&mut self, id: NodeId) {
        self.inner.detach(id);
    }

    /// Put `replacements` where `old` was, then detach `old`.
    pub fn replace(&mut self, old: NodeId, replacements: &[NodeId]) -> Result<(), Error> {
        let parent = self
            .parent(old)
            .ok_or_else(|| Error::XmlStructure("replaced node has no parent".into()))?;
        for r in replacements {
            self.inner.insert_before(parent, *r, old);
        }
        self.inner.detach(old);
        Ok(())
    }

    /// Remove every child of `id`.
    pub fn clear_children(&mut self, id: NodeId) {
        while let Some(child) = self.inner.first_child(id) {
            self.inner.detach(child);
        }
    }

    fn new_scoped_element(&mut self, scope: NodeId, ns: &str, prefix: &str, local_name: &str) -> NodeId {
        if prefix.is_empty() && self.lookup_namespace_uri(scope, "").as_deref() == Some(ns) {
            return self.create_element(Some(ns), None, local_name);
        }
        match self.lookup_prefix(scope, ns) {
            Some(p) => self.create_element(Some(ns), Some(&p), local_name),
            None => {
                let id = self.create_element(Some(ns), Some(prefix), local_name);
                self.declare_namespace(id, prefix, ns);
                id
            }
        }
    }

    /// Create an element in `ns` and append it to `parent`, declaring the
    /// namespace on the new element when it is not already in scope.
    pub fn append_new_element(&mut self, parent: NodeId, ns: &str, prefix: &str, local_name: &str) -> NodeId {
        let id = self.new_scoped_element(parent, ns, prefix, local_name);
        self.append_child(parent, id);
        id
    }

    /// Like [`Document::append_new_element`], inserting before `reference`.
    pub fn insert_new_element_before(
        &mut self,
        reference: NodeId,
        ns: &str,
        prefix: &str,
        local_name: &str,
    ) -> Result<NodeId, Error> {
        let parent = self.parent(reference).ok_or_else(no_parent)?;
        let id = self.new_scoped_element(parent, ns, prefix, local_name);
        self.inner.insert_before(parent, id, reference);
        Ok(id)
    }

    /// Create an element at `at`, declaring its namespace when needed.
    pub fn new_element_at(&mut self, at: Placement, ns: &str, prefix: &str, local_name: &str) -> Result<NodeId, Error> {
        match at {
            Placement::Append(parent) => Ok(self.append_new_element(parent, ns, prefix, local_name)),
            Placement::Before(reference) => self.insert_new_element_before(reference, ns, prefix, local_name),
        }
    }

    /// Append an element whose only content is `text`.
    pub fn append_text_element(
        &mut self,
        parent: NodeId,
        ns: &str,
        prefix: &str,
        local_name: &str,
        text: &str,
    ) -> NodeId {
        let id = self.append_new_element(parent, ns, prefix, local_name);
        self.set_text(id, text);
        id
    }

    // ── Text ─────────────────────────────────────────────────────────

    /// Concatenated text content of `id` and its descendants. CDATA sections
    /// count as text.
    pub fn text(&self, id: NodeId) -> String {
        if let Some(NodeKind::Text(t) | NodeKind::CData(t)) = self.node_kind(id) {
            return t.to_string();
        }
        let mut out = String::new();
        for d in self.descendants(id) {
            if let Some(NodeKind::Text(t) | NodeKind::CData(t)) = self.node_kind(d) {
                out.push_str(t);
            }
        }
        out
    }

    /// Replace the children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        let t = self.create_text(text);
        self.append_child(id, t);
    }

    /// True if the element has no element children and only whitespace text.
    pub fn is_empty_element(&self, id: NodeId) -> bool {
        self.inner.children_iter(id).all(|c| match self.node_kind(c) {
            Some(NodeKind::Text(t) | NodeKind::CData(t)) => t.trim().is_empty(),
            Some(NodeKind::Comment(_)) | Some(NodeKind::ProcessingInstruction(_)) => true,
            _ => false,
        })
    }

    // ── Identifiers ──────────────────────────────────────────────────

    /// The identifier of an element: `wsu:Id`, then `Id`, `ID`, `AssertionID`.
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        let elem = self.element(id)?;
        elem.attributes
            .iter()
            .find(|a| {
                a.name.local_name == "Id"
                    && a.name.namespace_uri.as_deref().is_some_and(ns::is_wsu)
            })
            .or_else(|| {
                elem.attributes.iter().find(|a| {
                    a.name.namespace_uri.is_none()
                        && matches!(&*a.name.local_name, "Id" | "ID" | "AssertionID")
                })
            })
            .map(|a| &*a.value)
    }

    /// Map of identifier value → element for every attached element.
    /// The first occurrence of a duplicated value wins.
    pub fn build_id_map(&self) -> HashMap<String, NodeId> {
        let mut map = HashMap::new();
        for node in self.descendants(self.root()) {
            if let Some(v) = self.element_id(node) {
                map.entry(v.to_owned()).or_insert(node);
            }
        }
        map
    }

    /// Find an attached element by identifier.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|n| self.element_id(*n) == Some(value))
    }

    // ── Fragments ────────────────────────────────────────────────────

    /// Parse `xml` as content appearing inside `context`, using the
    /// namespaces in scope there. Returns detached top-level nodes.
    pub fn parse_fragment(&mut self, xml: &str, context: NodeId) -> Result<Vec<NodeId>, Error> {
        let scope = self.in_scope_namespaces(context);
        let decls: Vec<(String, &str)> = scope
            .iter()
            .map(|(prefix, uri)| {
                let name = if prefix.is_empty() {
                    "xmlns".to_owned()
                } else {
                    format!("xmlns:{prefix}")
                };
                (name, uri.as_str())
            })
            .collect();
        let attrs: Vec<(&str, &str)> = decls.iter().map(|(n, v)| (n.as_str(), *v)).collect();

        let mut w = crate::writer::XmlWriter::new();
        w.start_element(FRAGMENT_HOLDER, &attrs)?;
        w.write_raw(xml)?;
        w.end_element(FRAGMENT_HOLDER)?;
        let tmp = Document::parse(&w.into_string()?)?;

        let holder = tmp
            .document_element()
            .ok_or_else(|| Error::XmlParse("empty fragment".into()))?;
        tmp.inner
            .children_iter(holder)
            .map(|child| {
                self.inner
                    .import_subtree(&tmp.inner, child)
                    .ok_or_else(|| Error::XmlStructure("fragment node cannot be imported".into()))
            })
            .collect()
    }

    /// Deep-copy `node` from `other` into this document as a detached
    /// subtree; namespaces it inherited in `other` are declared on the copy.
    pub fn import_subtree(&mut self, other: &Document, node: NodeId) -> Result<NodeId, Error> {
        let copy = self
            .inner
            .import_subtree(&other.inner, node)
            .ok_or_else(|| Error::XmlStructure("node cannot be imported".into()))?;
        if self.is_element(copy) {
            let own: Vec<String> = self
                .element(copy)
                .map(|e| e.namespace_declarations.iter().map(|(p, _)| p.to_string()).collect())
                .unwrap_or_default();
            for (prefix, uri) in other.in_scope_namespaces(node) {
                if !own.contains(&prefix) {
                    self.declare_namespace(copy, &prefix, &uri);
                }
            }
        }
        Ok(copy)
    }

    /// Serialize the whole document.
    pub fn to_xml(&self) -> String {
        self.inner.to_xml()
    }
}

const FRAGMENT_HOLDER: &str = "wssec-fragment";

fn name_is(name: &QName, ns: &str, local_name: &str) -> bool {
    name.local_name == local_name && name.namespace_uri.as_deref().unwrap_or("") == ns
}

impl Default for Document {
    fn default() -> Self {
        Self {
            inner: uppsala::Document::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Header/><s:Body xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd" wsu:Id="body"><p:a xmlns:p="urn:p" x="1">hi</p:a></s:Body></s:Envelope>"#;

    #[test]
    fn test_parse_keeps_prefixes_and_declarations() {
        let doc = Document::parse(SAMPLE).unwrap();
        let env = doc.document_element().unwrap();
        let e = doc.element(env).unwrap();
        assert_eq!(e.name.prefix.as_deref(), Some("s"));
        assert_eq!(e.namespace_declarations.len(), 1);
        assert_eq!(e.namespace_declarations[0].0, "s");
        assert_eq!(e.namespace_declarations[0].1, ns::SOAP11_ENV);
        let body = doc.find_child(env, ns::SOAP11_ENV, "Body").unwrap();
        assert_eq!(doc.element_id(body), Some("body"));
        let a = doc.child_elements(body)[0];
        assert_eq!(doc.attribute(a, "x"), Some("1"));
        assert_eq!(doc.text(a), "hi");
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.to_xml(), SAMPLE);
        let again = Document::parse(&doc.to_xml()).unwrap();
        assert_eq!(doc.to_xml(), again.to_xml());
    }

    #[test]
    fn test_append_declares_namespace_once() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let env = doc.document_element().unwrap();
        let header = doc.find_child(env, ns::SOAP11_ENV, "Header").unwrap();
        let sec = doc.append_new_element(header, ns::WSSE, "wsse", "Security");
        let inner = doc.append_new_element(sec, ns::WSSE, "wsse", "UsernameToken");
        assert_eq!(doc.element(sec).unwrap().namespace_declarations.len(), 1);
        assert!(doc.element(inner).unwrap().namespace_declarations.is_empty());
        let xml = doc.to_xml();
        assert_eq!(xml.matches(ns::WSSE).count(), 1);
        let reparsed = Document::parse(&xml).unwrap();
        assert!(reparsed.find_descendant(reparsed.root(), ns::WSSE, "UsernameToken").is_some());
    }

    #[test]
    fn test_fragment_uses_context_namespaces() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let body = doc.find_descendant(doc.root(), ns::SOAP11_ENV, "Body").unwrap();
        let nodes = doc.parse_fragment("<s:Fault>x</s:Fault>text", body).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(doc.is_named(nodes[0], ns::SOAP11_ENV, "Fault"));
        assert!(doc.element(nodes[0]).unwrap().namespace_declarations.is_empty());
        assert_eq!(doc.text(nodes[1]), "text");
        assert!(!doc.is_attached(nodes[0]));
    }

    #[test]
    fn test_replace_keeps_sibling_walk() {
        let mut doc = Document::parse("<r><a/><b/><c/></r>").unwrap();
        let r = doc.document_element().unwrap();
        let kids = doc.child_elements(r);
        let x = doc.create_element(None, None, "x");
        let y = doc.create_element(None, None, "y");
        doc.replace(kids[1], &[x, y]).unwrap();
        assert_eq!(doc.next_element_sibling(kids[0]), Some(x));
        assert_eq!(doc.next_element_sibling(y), Some(kids[2]));
        assert!(!doc.is_attached(kids[1]));
        assert_eq!(doc.to_xml(), "<r><a/><x/><y/><c/></r>");
    }

    #[test]
    fn test_cdata_reads_as_text() {
        let doc = Document::parse("<r><![CDATA[a<b]]> c</r>").unwrap();
        let r = doc.document_element().unwrap();
        assert_eq!(doc.text(r), "a<b c");
    }

    #[test]
    fn test_import_declares_inherited_namespaces() {
        let src = Document::parse(r#"<a:r xmlns:a="urn:a"><a:c>1</a:c></a:r>"#).unwrap();
        let c = src.child_elements(src.document_element().unwrap())[0];
        let mut doc = Document::parse("<x/>").unwrap();
        let x = doc.document_element().unwrap();
        let copy = doc.import_subtree(&src, c).unwrap();
        doc.append_child(x, copy);
        assert_eq!(doc.lookup_namespace_uri(copy, "a").as_deref(), Some("urn:a"));
        assert_eq!(doc.to_xml(), r#"<x><a:c xmlns:a="urn:a">1</a:c></x>"#);
    }
}
