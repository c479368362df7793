#![forbid(unsafe_code)]

//! What the decorator is asked to do to one message.

use std::sync::Arc;

use wssec_core::algorithm;
use wssec_keys::{Certificate, Key};
use wssec_xml::{Document, NodeId};

use crate::session::SecureConversationSession;

/// How a KeyInfo refers to the signer's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyInfoInclusionType {
    /// STR Reference to a BinarySecurityToken carrying the certificate.
    #[default]
    Cert,
    /// STR KeyIdentifier with the SubjectKeyIdentifier.
    StrSki,
    /// STR with X509Data/X509IssuerSerial.
    IssuerSerial,
    /// `ds:KeyName` with the subject DN.
    KeyName,
    /// STR KeyIdentifier with the SHA-1 thumbprint.
    Thumbprint,
    /// STR KeyIdentifier with an EncryptedKeySHA1.
    EncryptedKeySha1,
}

impl KeyInfoInclusionType {
    /// Whether the certificate travels in a BinarySecurityToken.
    pub fn needs_binary_security_token(self) -> bool {
        self == Self::Cert
    }
}

/// When WS-Addressing headers join the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WsaSigningStrategy {
    /// Whenever any other element is signed.
    Always,
    Never,
    /// Whenever a message element other than the Timestamp is signed.
    #[default]
    Default,
}

/// Forces the signing key to come from one kind of token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredSigningTokenType {
    X509,
    SecureConversation,
    EncryptedKey,
    Saml,
}

/// mustUnderstand on a newly created Security header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MustUnderstandMode {
    /// mustUnderstand true.
    #[default]
    Default,
    Yes,
    No,
    /// No attribute at all.
    Skip,
}

/// Per-element encryption choices.
#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    /// Encrypt the children only, keeping the element itself.
    pub content_only: bool,
    /// Overrides [`DecorationRequirements::encryption_algorithm`].
    pub algorithm: Option<String>,
    /// Overrides [`DecorationRequirements::recipient_certificate`].
    pub recipient: Option<Arc<Certificate>>,
}

impl EncryptionConfig {
    pub fn content() -> Self {
        Self {
            content_only: true,
            ..Self::default()
        }
    }

    pub fn element() -> Self {
        Self::default()
    }

    pub fn with_algorithm(mut self, uri: &str) -> Self {
        self.algorithm = Some(uri.to_owned());
        self
    }

    pub fn with_recipient(mut self, cert: Arc<Certificate>) -> Self {
        self.recipient = Some(cert);
        self
    }
}

#[derive(Clone)]
pub struct UsernameTokenCredentials {
    pub username: String,
    pub password: Option<String>,
}

impl UsernameTokenCredentials {
    pub fn new(username: impl Into<String>, password: Option<&str>) -> Self {
        Self {
            username: username.into(),
            password: password.map(str::to_owned),
        }
    }
}

impl std::fmt::Debug for UsernameTokenCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameTokenCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A SAML assertion to embed, produced elsewhere.
#[derive(Clone)]
pub struct SamlAssertion {
    /// Document whose root element is the assertion.
    pub document: Arc<Document>,
    /// Holder-of-key private key, when the assertion is to sign.
    pub subject_private_key: Option<Arc<Key>>,
}

impl std::fmt::Debug for SamlAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamlAssertion")
            .field("has_subject_private_key", &self.subject_private_key.is_some())
            .finish()
    }
}

/// Everything the decorator should apply to one message.
///
/// Element handles refer to the document later passed to
/// [`WssDecorator::decorate`](crate::WssDecorator::decorate).
#[derive(Clone)]
pub struct DecorationRequirements {
    pub sender_certificate: Option<Arc<Certificate>>,
    pub sender_private_key: Option<Arc<Key>>,
    pub recipient_certificate: Option<Arc<Certificate>>,
    pub elements_to_sign: Vec<NodeId>,
    /// Content-IDs of attachments to sign.
    pub parts_to_sign: Vec<String>,
    /// Sign attachment MIME headers too.
    pub sign_part_headers: bool,
    pub elements_to_encrypt: Vec<(NodeId, EncryptionConfig)>,
    pub encryption_algorithm: String,
    pub key_encryption_algorithm: String,
    /// Digest for references and the signature method. DSA always uses SHA-1.
    pub signature_digest: Option<String>,
    pub secure_conversation_session: Option<SecureConversationSession>,
    /// A key already shared with the recipient as an EncryptedKey.
    pub encrypted_key: Option<Vec<u8>>,
    pub encrypted_key_sha1: Option<String>,
    pub saml_assertion: Option<SamlAssertion>,
    pub include_saml_token_in_signature: bool,
    pub username_token: Option<UsernameTokenCredentials>,
    pub sign_username_token: bool,
    pub encrypt_username_token: bool,
    pub include_timestamp: bool,
    pub sign_timestamp: bool,
    pub timestamp_created: Option<chrono::DateTime<chrono::Utc>>,
    /// Overrides the configured timestamp timeout.
    pub timestamp_timeout: Option<chrono::Duration>,
    pub security_header_actor: Option<String>,
    pub security_header_reusable: bool,
    pub must_understand: MustUnderstandMode,
    pub key_info_inclusion_type: KeyInfoInclusionType,
    /// Never emit a BinarySecurityToken for the sender certificate.
    pub suppress_bst: bool,
    pub protect_tokens: bool,
    /// SignatureValues of the request being answered.
    pub signature_confirmations: Vec<String>,
    pub wsa_signing_strategy: WsaSigningStrategy,
    pub preferred_signing_token_type: Option<PreferredSigningTokenType>,
    pub use_derived_keys: bool,
    pub omit_security_context_token: bool,
    pub encrypt_signature: bool,
}

impl Default for DecorationRequirements {
    fn default() -> Self {
        Self {
            sender_certificate: None,
            sender_private_key: None,
            recipient_certificate: None,
            elements_to_sign: Vec::new(),
            parts_to_sign: Vec::new(),
            sign_part_headers: false,
            elements_to_encrypt: Vec::new(),
            encryption_algorithm: algorithm::AES128_CBC.to_owned(),
            key_encryption_algorithm: algorithm::RSA_PKCS1.to_owned(),
            signature_digest: None,
            secure_conversation_session: None,
            encrypted_key: None,
            encrypted_key_sha1: None,
            saml_assertion: None,
            include_saml_token_in_signature: false,
            username_token: None,
            sign_username_token: false,
            encrypt_username_token: false,
            include_timestamp: true,
            sign_timestamp: false,
            timestamp_created: None,
            timestamp_timeout: None,
            security_header_actor: None,
            security_header_reusable: false,
            must_understand: MustUnderstandMode::Default,
            key_info_inclusion_type: KeyInfoInclusionType::Cert,
            suppress_bst: false,
            protect_tokens: false,
            signature_confirmations: Vec::new(),
            wsa_signing_strategy: WsaSigningStrategy::Default,
            preferred_signing_token_type: None,
            use_derived_keys: false,
            omit_security_context_token: false,
            encrypt_signature: false,
        }
    }
}

impl DecorationRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element to the signature set once.
    pub fn sign(&mut self, element: NodeId) {
        if !self.elements_to_sign.contains(&element) {
            self.elements_to_sign.push(element);
        }
    }

    /// Add or replace an element in the encryption set.
    pub fn encrypt(&mut self, element: NodeId, config: EncryptionConfig) {
        match self.elements_to_encrypt.iter_mut().find(|(e, _)| *e == element) {
            Some(entry) => entry.1 = config,
            None => self.elements_to_encrypt.push((element, config)),
        }
    }

    /// Sender certificate and private key.
    pub fn with_sender(mut self, cert: Certificate, key: Key) -> Self {
        self.sender_certificate = Some(Arc::new(cert));
        self.sender_private_key = Some(Arc::new(key));
        self
    }

    pub fn with_recipient(mut self, cert: Certificate) -> Self {
        self.recipient_certificate = Some(Arc::new(cert));
        self
    }
}

impl std::fmt::Debug for DecorationRequirements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationRequirements")
            .field("sender", &self.sender_certificate.as_ref().map(|c| c.subject_name().to_owned()))
            .field("recipient", &self.recipient_certificate.as_ref().map(|c| c.subject_name().to_owned()))
            .field("elements_to_sign", &self.elements_to_sign.len())
            .field("elements_to_encrypt", &self.elements_to_encrypt.len())
            .field("actor", &self.security_header_actor)
            .field("key_info_inclusion_type", &self.key_info_inclusion_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_do_not_duplicate() {
        let doc = Document::parse("<r><a/><b/></r>").unwrap();
        let root = doc.document_element().unwrap();
        let kids = doc.child_elements(root);
        let mut req = DecorationRequirements::new();
        req.sign(kids[0]);
        req.sign(kids[0]);
        req.encrypt(kids[1], EncryptionConfig::element());
        req.encrypt(kids[1], EncryptionConfig::content().with_algorithm(algorithm::AES256_GCM));
        assert_eq!(req.elements_to_sign, vec![kids[0]]);
        assert_eq!(req.elements_to_encrypt.len(), 1);
        assert!(req.elements_to_encrypt[0].1.content_only);
        assert!(req.include_timestamp);
        assert_eq!(req.key_encryption_algorithm, algorithm::RSA_PKCS1);
    }

    #[test]
    fn test_only_cert_inclusion_needs_bst() {
        assert!(KeyInfoInclusionType::Cert.needs_binary_security_token());
        assert!(!KeyInfoInclusionType::StrSki.needs_binary_security_token());
        assert!(!KeyInfoInclusionType::IssuerSerial.needs_binary_security_token());
    }
}
