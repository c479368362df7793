#![forbid(unsafe_code)]

//! Security tokens found in (or synthesized from) a processed message.
//!
//! Tokens live in one vector per processed message and refer to each other
//! by index, so a DerivedKeyToken names its source token by position.

use std::sync::Arc;

use wssec_keys::Certificate;
use wssec_xml::NodeId;

use crate::requirements::KeyInfoInclusionType;

/// Index of a token in [`ProcessorResult::tokens`](crate::ProcessorResult::tokens).
pub type TokenIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityTokenType {
    X509,
    X509PkiPath,
    Username,
    Saml,
    SecureConversation,
    DerivedKey,
    EncryptedKey,
}

/// What a signing token has proven.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningInfo {
    pub possession_proved: bool,
    pub signed_elements: Vec<NodeId>,
}

impl SigningInfo {
    pub(crate) fn record(&mut self, element: NodeId) {
        self.possession_proved = true;
        if !self.signed_elements.contains(&element) {
            self.signed_elements.push(element);
        }
    }
}

#[derive(Debug, Clone)]
pub struct X509Token {
    /// The BinarySecurityToken; `None` when the certificate was located
    /// through a key identifier or embedded KeyInfo.
    pub element: Option<NodeId>,
    pub element_id: Option<String>,
    pub certificate: Arc<Certificate>,
    /// Full path for PKIPath tokens, leaf first.
    pub chain: Vec<Certificate>,
    pub value_type: String,
    /// How the signature that used this token referred to it.
    pub reference_type: Option<KeyInfoInclusionType>,
    pub signing: SigningInfo,
}

#[derive(Clone)]
pub struct UsernameToken {
    pub element: Option<NodeId>,
    pub element_id: Option<String>,
    pub username: String,
    /// Exactly as carried, trailing whitespace included.
    pub password: Option<String>,
    pub password_type: Option<String>,
    pub nonce: Option<Vec<u8>>,
    pub created: Option<String>,
}

impl std::fmt::Debug for UsernameToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameToken")
            .field("element", &self.element)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("password_type", &self.password_type)
            .field("created", &self.created)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlVersion {
    V1_1,
    V2_0,
}

#[derive(Debug, Clone)]
pub struct SamlToken {
    pub element: Option<NodeId>,
    pub assertion_id: String,
    pub version: SamlVersion,
    /// Holder-of-key certificate from the subject confirmation.
    pub subject_certificate: Option<Arc<Certificate>>,
    /// Signer of the assertion's own enveloped signature, if it had one.
    pub issuer_certificate: Option<Arc<Certificate>>,
    pub signing: SigningInfo,
}

#[derive(Clone)]
pub struct SecurityContextToken {
    pub element: Option<NodeId>,
    pub element_id: Option<String>,
    pub identifier: String,
    pub secret: Vec<u8>,
    /// Synthesized for a DerivedKeyToken that named the identifier without
    /// a SecurityContextToken in the message.
    pub is_virtual: bool,
    pub signing: SigningInfo,
}

impl std::fmt::Debug for SecurityContextToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContextToken")
            .field("element", &self.element)
            .field("identifier", &self.identifier)
            .field("is_virtual", &self.is_virtual)
            .field("signing", &self.signing)
            .finish()
    }
}

#[derive(Clone)]
pub struct DerivedKeyToken {
    pub element: Option<NodeId>,
    pub element_id: Option<String>,
    pub key: Vec<u8>,
    pub source: TokenIndex,
    pub generation: usize,
    pub offset: usize,
    pub length: usize,
    pub label: String,
    pub nonce: Vec<u8>,
}

impl std::fmt::Debug for DerivedKeyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeyToken")
            .field("element", &self.element)
            .field("element_id", &self.element_id)
            .field("source", &self.source)
            .field("generation", &self.generation)
            .field("length", &self.length)
            .field("label", &self.label)
            .finish()
    }
}

#[derive(Clone)]
pub struct EncryptedKeyToken {
    /// `None` when the secret came from the resolver's EncryptedKeySHA1 cache.
    pub element: Option<NodeId>,
    pub element_id: Option<String>,
    pub secret: Vec<u8>,
    pub encrypted_key_sha1: String,
    pub algorithm: Option<String>,
    /// How the signature that used this key referred to it.
    pub reference_type: Option<KeyInfoInclusionType>,
    pub signing: SigningInfo,
}

impl std::fmt::Debug for EncryptedKeyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedKeyToken")
            .field("element", &self.element)
            .field("element_id", &self.element_id)
            .field("encrypted_key_sha1", &self.encrypted_key_sha1)
            .field("algorithm", &self.algorithm)
            .field("reference_type", &self.reference_type)
            .field("signing", &self.signing)
            .finish()
    }
}

/// One security token.
#[derive(Debug, Clone)]
pub enum XmlSecurityToken {
    X509(X509Token),
    Username(UsernameToken),
    Saml(SamlToken),
    SecurityContext(SecurityContextToken),
    DerivedKey(DerivedKeyToken),
    EncryptedKey(EncryptedKeyToken),
}

impl XmlSecurityToken {
    pub fn token_type(&self) -> SecurityTokenType {
        match self {
            Self::X509(t) if t.chain.len() > 1 || t.value_type == wssec_core::ns::VALUE_TYPE_X509_PKIPATH => {
                SecurityTokenType::X509PkiPath
            }
            Self::X509(_) => SecurityTokenType::X509,
            Self::Username(_) => SecurityTokenType::Username,
            Self::Saml(_) => SecurityTokenType::Saml,
            Self::SecurityContext(_) => SecurityTokenType::SecureConversation,
            Self::DerivedKey(_) => SecurityTokenType::DerivedKey,
            Self::EncryptedKey(_) => SecurityTokenType::EncryptedKey,
        }
    }

    /// The element the token was read from.
    pub fn element(&self) -> Option<NodeId> {
        match self {
            Self::X509(t) => t.element,
            Self::Username(t) => t.element,
            Self::Saml(t) => t.element,
            Self::SecurityContext(t) => t.element,
            Self::DerivedKey(t) => t.element,
            Self::EncryptedKey(t) => t.element,
        }
    }

    /// `wsu:Id` (or assertion id) of the token element.
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Self::X509(t) => t.element_id.as_deref(),
            Self::Username(t) => t.element_id.as_deref(),
            Self::Saml(t) => Some(&t.assertion_id),
            Self::SecurityContext(t) => t.element_id.as_deref(),
            Self::DerivedKey(t) => t.element_id.as_deref(),
            Self::EncryptedKey(t) => t.element_id.as_deref(),
        }
    }

    fn signing(&self) -> Option<&SigningInfo> {
        match self {
            Self::X509(t) => Some(&t.signing),
            Self::Saml(t) => Some(&t.signing),
            Self::SecurityContext(t) => Some(&t.signing),
            Self::EncryptedKey(t) => Some(&t.signing),
            Self::Username(_) | Self::DerivedKey(_) => None,
        }
    }

    pub(crate) fn signing_mut(&mut self) -> Option<&mut SigningInfo> {
        match self {
            Self::X509(t) => Some(&mut t.signing),
            Self::Saml(t) => Some(&mut t.signing),
            Self::SecurityContext(t) => Some(&mut t.signing),
            Self::EncryptedKey(t) => Some(&mut t.signing),
            Self::Username(_) | Self::DerivedKey(_) => None,
        }
    }

    /// Whether the token can be credited with signatures.
    pub fn is_signing_token(&self) -> bool {
        self.signing().is_some()
    }

    pub fn is_possession_proved(&self) -> bool {
        self.signing().is_some_and(|s| s.possession_proved)
    }

    pub fn signed_elements(&self) -> &[NodeId] {
        self.signing().map_or(&[], |s| s.signed_elements.as_slice())
    }

    /// Symmetric key material carried by the token.
    pub fn secret(&self) -> Option<&[u8]> {
        match self {
            Self::SecurityContext(t) => Some(&t.secret),
            Self::DerivedKey(t) => Some(&t.key),
            Self::EncryptedKey(t) => Some(&t.secret),
            _ => None,
        }
    }

    pub fn as_x509(&self) -> Option<&X509Token> {
        match self {
            Self::X509(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_saml(&self) -> Option<&SamlToken> {
        match self {
            Self::Saml(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_username(&self) -> Option<&UsernameToken> {
        match self {
            Self::Username(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_security_context(&self) -> Option<&SecurityContextToken> {
        match self {
            Self::SecurityContext(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_derived_key(&self) -> Option<&DerivedKeyToken> {
        match self {
            Self::DerivedKey(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_encrypted_key(&self) -> Option<&EncryptedKeyToken> {
        match self {
            Self::EncryptedKey(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sct() -> XmlSecurityToken {
        XmlSecurityToken::SecurityContext(SecurityContextToken {
            element: None,
            element_id: None,
            identifier: "urn:sc:1".into(),
            secret: vec![3u8; 32],
            is_virtual: true,
            signing: SigningInfo::default(),
        })
    }

    #[test]
    fn test_capabilities() {
        let mut token = sct();
        assert!(token.is_signing_token());
        assert!(!token.is_possession_proved());
        assert_eq!(token.token_type(), SecurityTokenType::SecureConversation);
        assert_eq!(token.secret().map(<[u8]>::len), Some(32));

        let doc = wssec_xml::Document::parse("<r/>").unwrap();
        let el = doc.document_element().unwrap();
        token.signing_mut().unwrap().record(el);
        token.signing_mut().unwrap().record(el);
        assert!(token.is_possession_proved());
        assert_eq!(token.signed_elements(), &[el]);
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn test_username_is_not_signing() {
        let token = XmlSecurityToken::Username(UsernameToken {
            element: None,
            element_id: None,
            username: "alice".into(),
            password: Some("pw  ".into()),
            password_type: None,
            nonce: None,
            created: None,
        });
        assert!(!token.is_signing_token());
        assert!(token.signed_elements().is_empty());
        assert!(!format!("{token:?}").contains("pw"));
    }
}
