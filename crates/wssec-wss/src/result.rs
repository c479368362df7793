#![forbid(unsafe_code)]

//! What decoration produced and what processing found.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use wssec_core::{Error, Result};
use wssec_xml::NodeId;

use crate::token::{TokenIndex, XmlSecurityToken};

/// Outcome of [`WssDecorator::decorate`](crate::WssDecorator::decorate).
#[derive(Clone, Default)]
pub struct DecorationResult {
    /// EncryptedKeySHA1 of the key shared with the recipient, for
    /// referencing it in later messages.
    pub encrypted_key_sha1: Option<String>,
    pub encrypted_key: Option<Vec<u8>>,
    /// Identifier of the WS-SC session used.
    pub security_context_id: Option<String>,
    pub actor: Option<String>,
    /// Base64 SignatureValue → whether the signature was then encrypted.
    pub signatures: BTreeMap<String, bool>,
}

impl DecorationResult {
    /// SignatureValues whose Signature element ended up encrypted.
    pub fn encrypted_signature_values(&self) -> Vec<&str> {
        self.signatures
            .iter()
            .filter(|(_, encrypted)| **encrypted)
            .map(|(value, _)| value.as_str())
            .collect()
    }

    pub fn signature_values(&self) -> Vec<&str> {
        self.signatures.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for DecorationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationResult")
            .field("encrypted_key_sha1", &self.encrypted_key_sha1)
            .field("security_context_id", &self.security_context_id)
            .field("actor", &self.actor)
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}

/// An element covered by a verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedElement {
    pub element: NodeId,
    pub signing_token: TokenIndex,
    pub signature: NodeId,
}

/// An attachment covered by a verified signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPart {
    pub content_id: String,
    pub signing_token: TokenIndex,
    /// Whether the MIME headers were covered too.
    pub headers_signed: bool,
}

/// An element that was (or whose content was) decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedElement {
    pub element: NodeId,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WssTimestamp {
    pub element: NodeId,
    pub created: Option<String>,
    pub expires: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub signed: bool,
    pub signing_tokens: Vec<TokenIndex>,
}

/// Facts established while processing one Security header.
#[derive(Debug, Clone, Default)]
pub struct ProcessorResult {
    pub signed_elements: Vec<SignedElement>,
    pub signed_parts: Vec<SignedPart>,
    pub encrypted_elements: Vec<EncryptedElement>,
    pub tokens: Vec<XmlSecurityToken>,
    pub timestamp: Option<WssTimestamp>,
    /// Values of wsse11:SignatureConfirmation elements; `None` for one
    /// without a Value.
    pub signature_confirmations: Vec<Option<String>>,
    /// SignatureValues of the signatures that verified.
    pub validated_signature_values: Vec<String>,
    pub security_namespace: Option<String>,
    pub wsu_namespace: Option<String>,
    /// Actor of the processed header; `None` for the default actor.
    pub actor: Option<String>,
    pub security_header_found: bool,
    pub wsse11_seen: bool,
    pub derived_key_seen: bool,
}

impl ProcessorResult {
    pub fn is_signed(&self, element: NodeId) -> bool {
        self.signed_elements.iter().any(|s| s.element == element)
    }

    pub fn is_encrypted(&self, element: NodeId) -> bool {
        self.encrypted_elements.iter().any(|e| e.element == element)
    }

    /// Tokens whose signatures covered `element`.
    pub fn signers_of(&self, element: NodeId) -> Vec<&XmlSecurityToken> {
        let mut indexes: Vec<TokenIndex> = self
            .signed_elements
            .iter()
            .filter(|s| s.element == element)
            .map(|s| s.signing_token)
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        indexes.iter().filter_map(|&i| self.tokens.get(i)).collect()
    }

    pub fn is_part_signed(&self, content_id: &str) -> bool {
        self.signed_parts.iter().any(|p| p.content_id == content_id)
    }

    /// Check the SignatureConfirmations against the SignatureValues we sent.
    ///
    /// Every sent value must be confirmed and nothing else may be. A
    /// confirmation without a Value only fits a request that had no
    /// signature.
    pub fn validate_signature_confirmations(&self, sent: &[String]) -> Result<()> {
        let mut confirmed: Vec<&str> = Vec::new();
        for confirmation in &self.signature_confirmations {
            match confirmation {
                Some(value) if sent.iter().any(|s| s == value) => confirmed.push(value),
                Some(value) => {
                    return Err(Error::Validation(format!("unexpected SignatureConfirmation value {value}")))
                }
                None if sent.is_empty() => {}
                None => {
                    return Err(Error::Validation(
                        "empty SignatureConfirmation but the request was signed".into(),
                    ))
                }
            }
        }
        if let Some(missing) = sent.iter().find(|s| !confirmed.contains(&s.as_str())) {
            return Err(Error::Validation(format!("signature {missing} was not confirmed")));
        }
        Ok(())
    }
}
