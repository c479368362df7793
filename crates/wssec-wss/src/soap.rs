#![forbid(unsafe_code)]

//! SOAP envelope navigation: version detection, Header/Body lookup and the
//! actor/role and mustUnderstand attributes of header blocks.

use wssec_core::{ns, Error, Result};
use wssec_xml::{Document, NodeId};

use crate::config::MustUnderstandFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => ns::SOAP11_ENV,
            Self::Soap12 => ns::SOAP12_ENV,
        }
    }

    /// Name of the attribute that addresses a header block.
    pub fn actor_attribute(self) -> &'static str {
        match self {
            Self::Soap11 => ns::attr::ACTOR,
            Self::Soap12 => ns::attr::ROLE,
        }
    }

    /// The actor/role value that means "the next intermediary".
    pub fn next_actor(self) -> &'static str {
        match self {
            Self::Soap11 => ns::SOAP11_ACTOR_NEXT,
            Self::Soap12 => ns::SOAP12_ROLE_NEXT,
        }
    }
}

/// The envelope of a SOAP message.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    pub element: NodeId,
    pub version: SoapVersion,
}

impl Envelope {
    /// Check that `doc` is a SOAP 1.1 or 1.2 envelope.
    pub fn of(doc: &Document) -> Result<Self> {
        let element = doc
            .document_element()
            .ok_or_else(|| Error::NotSoap("document has no root element".into()))?;
        if doc.local_name(element) != Some(ns::node::ENVELOPE) {
            return Err(Error::NotSoap(format!(
                "root element is {}",
                doc.local_name(element).unwrap_or_default()
            )));
        }
        let version = match doc.namespace_uri(element) {
            Some(ns::SOAP11_ENV) => SoapVersion::Soap11,
            Some(ns::SOAP12_ENV) => SoapVersion::Soap12,
            other => {
                return Err(Error::NotSoap(format!(
                    "unknown envelope namespace {}",
                    other.unwrap_or("(none)")
                )))
            }
        };
        Ok(Self { element, version })
    }

    pub fn namespace(&self) -> &'static str {
        self.version.namespace()
    }

    pub fn header(&self, doc: &Document) -> Option<NodeId> {
        doc.find_child(self.element, self.namespace(), ns::node::HEADER)
    }

    pub fn body(&self, doc: &Document) -> Result<NodeId> {
        doc.find_child(self.element, self.namespace(), ns::node::BODY)
            .ok_or_else(|| Error::NotSoap("envelope has no Body".into()))
    }

    /// The Header, created as the first child of the envelope if missing.
    pub fn header_or_create(&self, doc: &mut Document) -> Result<NodeId> {
        if let Some(header) = self.header(doc) {
            return Ok(header);
        }
        let prefix = envelope_prefix(doc, self.element);
        match doc.child_elements(self.element).first() {
            Some(&first) => doc.insert_new_element_before(first, self.namespace(), &prefix, ns::node::HEADER),
            None => Ok(doc.append_new_element(self.element, self.namespace(), &prefix, ns::node::HEADER)),
        }
    }

    /// Actor (1.1) or role (1.2) of a header block. The unqualified
    /// attribute is accepted as well.
    pub fn actor_of<'d>(&self, doc: &'d Document, block: NodeId) -> Option<&'d str> {
        let name = self.version.actor_attribute();
        doc.attribute_ns(block, self.namespace(), name)
            .or_else(|| doc.attribute(block, name))
            .map(str::trim)
    }

    /// Whether a block's actor is absent or names the next intermediary.
    pub fn is_default_actor(&self, actor: Option<&str>) -> bool {
        match actor {
            None => true,
            Some(a) => a.is_empty() || a == self.version.next_actor(),
        }
    }

    pub fn set_actor(&self, doc: &mut Document, block: NodeId, actor: &str) {
        let prefix = envelope_prefix(doc, self.element);
        doc.set_attribute_ns(block, self.namespace(), &prefix, self.version.actor_attribute(), actor);
    }

    /// Whether a header block carries mustUnderstand set to true.
    pub fn must_understand(&self, doc: &Document, block: NodeId) -> bool {
        doc.attribute_ns(block, self.namespace(), ns::attr::MUST_UNDERSTAND)
            .map(str::trim)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    /// Write mustUnderstand; SOAP 1.2 always uses the boolean spelling.
    pub fn set_must_understand(&self, doc: &mut Document, block: NodeId, flag: bool, format: MustUnderstandFormat) {
        let format = match self.version {
            SoapVersion::Soap12 => MustUnderstandFormat::Boolean,
            SoapVersion::Soap11 => format,
        };
        let prefix = envelope_prefix(doc, self.element);
        doc.set_attribute_ns(block, self.namespace(), &prefix, ns::attr::MUST_UNDERSTAND, format.value(flag));
    }

    /// Security headers in the Header, in document order.
    pub fn security_headers(&self, doc: &Document) -> Vec<NodeId> {
        let Some(header) = self.header(doc) else {
            return Vec::new();
        };
        doc.child_elements(header)
            .into_iter()
            .filter(|&c| {
                doc.local_name(c) == Some(ns::node::SECURITY)
                    && doc.namespace_uri(c).is_some_and(ns::is_wsse)
            })
            .collect()
    }

    /// The Security header addressed to `actor` (`None` for the default
    /// actor, which also matches the "next" actor).
    pub fn security_header_for(&self, doc: &Document, actor: Option<&str>) -> Option<NodeId> {
        self.security_headers(doc).into_iter().find(|&h| {
            let found = self.actor_of(doc, h);
            match actor {
                Some(wanted) => found == Some(wanted),
                None => self.is_default_actor(found),
            }
        })
    }
}

/// Prefix the envelope element uses for its own namespace.
fn envelope_prefix(doc: &Document, envelope: NodeId) -> String {
    doc.element(envelope)
        .and_then(|e| e.name.prefix.as_deref().map(str::to_owned))
        .unwrap_or_else(|| "soapenv".to_owned())
}
