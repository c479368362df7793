#![forbid(unsafe_code)]

//! XML Digital Signature over WS-Security messages.
//!
//! Builds `ds:Signature` elements whose references point at elements by
//! `#id` or at attachments by `cid:`, and verifies them.

pub mod sign;
pub mod verify;

pub use sign::{create_signature, CreatedSignature, ReferenceSpec, SignatureSpec, TransformSpec};
pub use wssec_xml::Placement;
pub use verify::{parse_signature, verify, ParsedReference, ParsedSignature, VerifiedReference};
