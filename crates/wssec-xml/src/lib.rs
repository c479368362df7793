#![forbid(unsafe_code)]

//! XML document model for the wssec WS-Security engine.
//!
//! Wraps `uppsala`'s mutable DOM with namespace and identifier helpers, and
//! provides serialization, `NodeSet` selection for canonicalization, and
//! same-document reference parsing.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use document::{Attribute, Document, Element, NodeId, NodeKind, Placement, QName};
pub use nodeset::NodeSet;
