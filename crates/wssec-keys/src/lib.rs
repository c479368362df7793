#![forbid(unsafe_code)]

//! Key management for the wssec WS-Security engine.
//!
//! Loads keys and certificates from PEM, DER and PKCS#8, extracts the
//! certificate facts token references are built from, and provides the
//! [`SecurityTokenResolver`] seam through which the processor finds keys.

pub mod key;
pub mod loader;
pub mod resolver;
pub mod x509;

pub use key::{Key, KeyData};
pub use resolver::{DelegatingSecurityTokenResolver, SecurityTokenResolver, SimpleSecurityTokenResolver};
pub use x509::Certificate;
