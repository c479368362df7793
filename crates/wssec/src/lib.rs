#![forbid(unsafe_code)]

//! WS-Security message protection for SOAP.
//!
//! The engine lives in [`wss`]; the other modules are the XML, canonical
//! form, cryptography and key layers it is built on.

pub use wssec_c14n as c14n;
pub use wssec_core as core;
pub use wssec_crypto as crypto;
pub use wssec_dsig as dsig;
pub use wssec_enc as enc;
pub use wssec_keys as keys;
pub use wssec_transforms as transforms;
pub use wssec_wss as wss;
pub use wssec_xml as xml;

pub use wssec_core::{Error, ErrorKind, Result};
pub use wssec_wss::{DecorationRequirements, ProcessorResult, WssConfig, WssDecorator, WssProcessor};
