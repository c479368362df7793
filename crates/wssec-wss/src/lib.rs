#![forbid(unsafe_code)]

//! WS-Security 1.0/1.1 for SOAP envelopes.
//!
//! [`WssDecorator`] applies a [`DecorationRequirements`] to an outbound
//! envelope: tokens, timestamp, signatures and encryption in one Security
//! header. [`WssProcessor`] walks the Security header of an inbound envelope,
//! decrypts in place, verifies signatures and reports what it found in a
//! [`ProcessorResult`].

pub mod config;
pub mod decorator;
pub mod derived;
pub mod ids;
pub mod keyinfo;
pub mod processor;
pub mod requirements;
pub mod result;
pub mod session;
pub mod soap;
pub mod timestamp;
pub mod token;
pub mod validators;

pub use config::{MustUnderstandFormat, TimestampResolution, WssConfig};
pub use decorator::WssDecorator;
pub use keyinfo::TokenReference;
pub use processor::WssProcessor;
pub use requirements::{
    DecorationRequirements, EncryptionConfig, KeyInfoInclusionType, MustUnderstandMode, PreferredSigningTokenType,
    SamlAssertion, UsernameTokenCredentials, WsaSigningStrategy,
};
pub use result::{DecorationResult, EncryptedElement, ProcessorResult, SignedElement, SignedPart, WssTimestamp};
pub use session::{SecureConversationSession, SecurityContextFinder};
pub use soap::{Envelope, SoapVersion};
pub use token::{
    DerivedKeyToken, EncryptedKeyToken, SamlToken, SamlVersion, SecurityContextToken, SecurityTokenType,
    SigningInfo, TokenIndex, UsernameToken, X509Token, XmlSecurityToken,
};
