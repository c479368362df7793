#![forbid(unsafe_code)]

//! Outbound decoration: applies [`DecorationRequirements`] to a SOAP
//! envelope.
//!
//! Within a new Security header elements are laid out as Timestamp,
//! SignatureConfirmations, SAML assertion, BinarySecurityToken,
//! SecurityContextToken, UsernameToken, DerivedKeyTokens, then
//! EncryptedKeys and ReferenceLists, and finally the Signature. A
//! processor reading top to bottom therefore meets every key before its
//! first use.

use std::sync::Arc;

use base64::Engine;
use tracing::debug;
use wssec_core::{algorithm, ns, Error, Result};
use wssec_crypto::{KeyFamily, SigningKey};
use wssec_dsig::{ReferenceSpec, SignatureSpec, TransformSpec};
use wssec_enc::{EncryptedKeySpec, KeyEncryptionKey};
use wssec_keys::Certificate;
use wssec_transforms::AttachmentStore;
use wssec_xml::{Document, NodeId, Placement};

use crate::config::WssConfig;
use crate::derived::{self, CreatedDerivedKey, DerivedKeySpec};
use crate::ids::IdGenerator;
use crate::keyinfo::{self, KeyReference};
use crate::requirements::{
    DecorationRequirements, EncryptionConfig, KeyInfoInclusionType, MustUnderstandMode, PreferredSigningTokenType,
    WsaSigningStrategy,
};
use crate::result::DecorationResult;
use crate::session::SecureConversationSession;
use crate::soap::Envelope;
use crate::timestamp;
use crate::token::SamlVersion;

/// Applies WS-Security to outbound messages.
///
/// Holds only configuration, so one decorator can serve many threads.
#[derive(Debug, Clone, Default)]
pub struct WssDecorator {
    config: WssConfig,
}

impl WssDecorator {
    pub fn new(config: WssConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WssConfig {
        &self.config
    }

    /// Add a Security header to `doc` as `req` describes.
    ///
    /// `attachments` must hold every part named in
    /// [`DecorationRequirements::parts_to_sign`].
    pub fn decorate(
        &self,
        doc: &mut Document,
        req: &DecorationRequirements,
        attachments: Option<&dyn AttachmentStore>,
    ) -> Result<DecorationResult> {
        let envelope = Envelope::of(doc)?;
        let mut decoration = Decoration::begin(doc, &self.config, req, envelope, attachments)?;
        decoration.run(doc)?;
        decoration.finish(doc)
    }
}

/// Where the signing key comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigningSource {
    Session,
    SuppliedEncryptedKey,
    SenderCertificate,
    Saml,
    GeneratedEncryptedKey,
}

fn choose_signing_source(req: &DecorationRequirements) -> Result<SigningSource> {
    let has_session = req.secure_conversation_session.is_some();
    let has_supplied_key = req.encrypted_key.is_some() && req.encrypted_key_sha1.is_some();
    let has_sender = req.sender_certificate.is_some() && req.sender_private_key.is_some();
    let has_saml_key = req
        .saml_assertion
        .as_ref()
        .is_some_and(|s| s.subject_private_key.is_some());
    let has_recipient = req.recipient_certificate.is_some();

    if let Some(preferred) = req.preferred_signing_token_type {
        let source = match preferred {
            PreferredSigningTokenType::X509 if has_sender => Some(SigningSource::SenderCertificate),
            PreferredSigningTokenType::SecureConversation if has_session => Some(SigningSource::Session),
            PreferredSigningTokenType::EncryptedKey if has_supplied_key => Some(SigningSource::SuppliedEncryptedKey),
            PreferredSigningTokenType::EncryptedKey if has_recipient => Some(SigningSource::GeneratedEncryptedKey),
            PreferredSigningTokenType::Saml if has_saml_key => Some(SigningSource::Saml),
            _ => None,
        };
        return source.ok_or_else(|| Error::Decorator(format!("no key available for preferred signing token {preferred:?}")));
    }

    // A key named by its EncryptedKeySHA1 must come from an EncryptedKey.
    if req.key_info_inclusion_type == KeyInfoInclusionType::EncryptedKeySha1 {
        return if has_supplied_key {
            Ok(SigningSource::SuppliedEncryptedKey)
        } else if has_recipient {
            Ok(SigningSource::GeneratedEncryptedKey)
        } else {
            Err(Error::Decorator(
                "EncryptedKeySHA1 KeyInfo requires an EncryptedKey or a recipient certificate".into(),
            ))
        };
    }

    if has_session {
        Ok(SigningSource::Session)
    } else if has_supplied_key {
        Ok(SigningSource::SuppliedEncryptedKey)
    } else if has_sender {
        Ok(SigningSource::SenderCertificate)
    } else if has_saml_key {
        Ok(SigningSource::Saml)
    } else if has_recipient {
        Ok(SigningSource::GeneratedEncryptedKey)
    } else {
        Err(Error::Decorator("Signing is requested, but there is no key available.".into()))
    }
}

/// The inclusion type actually used for an X.509 signer.
fn x509_inclusion(req: &DecorationRequirements, cert: &Certificate) -> Result<KeyInfoInclusionType> {
    match req.key_info_inclusion_type {
        KeyInfoInclusionType::Cert if req.suppress_bst => Ok(if cert.subject_key_identifier().is_some() {
            KeyInfoInclusionType::StrSki
        } else {
            KeyInfoInclusionType::IssuerSerial
        }),
        KeyInfoInclusionType::EncryptedKeySha1 => Err(Error::Decorator(
            "EncryptedKeySHA1 KeyInfo requires an EncryptedKey signing token".into(),
        )),
        other => Ok(other),
    }
}

fn content_key_length(uri: &str) -> Result<usize> {
    Ok(wssec_crypto::cipher::from_uri(uri)?.key_size())
}

/// AES-CBC variant matching a symmetric key's length.
fn algorithm_for_key(len: usize) -> &'static str {
    if len >= 32 {
        algorithm::AES256_CBC
    } else if len >= 24 {
        algorithm::AES192_CBC
    } else {
        algorithm::AES128_CBC
    }
}

/// Owned form of the KeyInfo the Signature will carry.
#[derive(Debug, Clone)]
enum SignerKeyInfo {
    BinarySecurityToken(String),
    X509(KeyInfoInclusionType, Arc<Certificate>),
    DerivedKey { id: String, sc_ns: String },
    EncryptedKeySha1(String),
    EncryptedKey(String),
    Saml { id: String, version: SamlVersion },
}

impl SignerKeyInfo {
    fn reference(&self) -> KeyReference<'_> {
        match self {
            Self::BinarySecurityToken(id) => KeyReference::BinarySecurityToken(id),
            Self::X509(KeyInfoInclusionType::IssuerSerial, cert) => KeyReference::IssuerSerial(cert),
            Self::X509(KeyInfoInclusionType::KeyName, cert) => KeyReference::KeyName(cert),
            Self::X509(KeyInfoInclusionType::Thumbprint, cert) => KeyReference::Thumbprint(cert),
            Self::X509(_, cert) => KeyReference::Ski(cert),
            Self::DerivedKey { id, sc_ns } => KeyReference::DerivedKey { id, sc_ns },
            Self::EncryptedKeySha1(sha1) => KeyReference::EncryptedKeySha1(sha1),
            Self::EncryptedKey(id) => KeyReference::EncryptedKey(id),
            Self::Saml { id, version } => KeyReference::SamlAssertion { id, version: *version },
        }
    }
}

struct PreparedKey {
    key: SigningKey,
    key_info: SignerKeyInfo,
    /// Tokens that `protect_tokens` adds to the signature.
    tokens: Vec<NodeId>,
}

/// An EncryptedKey made for the recipient so its secret can sign.
#[derive(Clone)]
struct GeneratedKey {
    recipient: Arc<Certificate>,
    id: String,
    secret: Vec<u8>,
}

struct EmbeddedSaml {
    element: NodeId,
    id: String,
    version: SamlVersion,
}

/// A symmetric key and how EncryptedData elements refer to it.
struct ContentKey<'k> {
    key: &'k [u8],
    default_algorithm: &'k str,
    reference: Option<KeyReference<'k>>,
}

/// State of one `decorate` call.
struct Decoration<'a> {
    config: &'a WssConfig,
    req: &'a DecorationRequirements,
    envelope: Envelope,
    attachments: Option<&'a dyn AttachmentStore>,
    actor: Option<String>,
    ids: IdGenerator,
    security: NodeId,
    /// First EncryptedKey, ReferenceList or Signature of a reused header.
    anchor: Option<NodeId>,
    timestamp: Option<NodeId>,
    username_token: Option<NodeId>,
    saml: Option<EmbeddedSaml>,
    security_context_token: Option<NodeId>,
    /// How session DerivedKeyTokens name the SecurityContextToken.
    security_context_uri: Option<String>,
    signing_key: Option<GeneratedKey>,
    signature: Option<NodeId>,
    signature_value: Option<String>,
    signature_encrypted: bool,
    result: DecorationResult,
}

impl<'a> Decoration<'a> {
    fn begin(
        doc: &mut Document,
        config: &'a WssConfig,
        req: &'a DecorationRequirements,
        envelope: Envelope,
        attachments: Option<&'a dyn AttachmentStore>,
    ) -> Result<Self> {
        let actor = req.security_header_actor.clone().filter(|a| !a.is_empty());
        let header = envelope.header_or_create(doc)?;
        let (security, anchor) = match envelope.security_header_for(doc, actor.as_deref()) {
            Some(existing) if req.security_header_reusable => {
                let anchor = doc
                    .child_elements(existing)
                    .into_iter()
                    .find(|&c| is_key_or_signature(doc, c));
                debug!(actor = actor.as_deref().unwrap_or(""), "reusing existing Security header");
                (existing, anchor)
            }
            Some(_) => {
                return Err(Error::Decorator(format!(
                    "message already has a Security header for actor {}",
                    actor.as_deref().unwrap_or("(default)")
                )))
            }
            None => {
                let security = doc.append_new_element(header, ns::WSSE, "wsse", ns::node::SECURITY);
                doc.declare_namespace(security, "wsu", ns::WSU);
                if let Some(actor) = &actor {
                    envelope.set_actor(doc, security, actor);
                }
                match req.must_understand {
                    MustUnderstandMode::Default | MustUnderstandMode::Yes => {
                        envelope.set_must_understand(doc, security, true, config.must_understand_format)
                    }
                    MustUnderstandMode::No => {
                        envelope.set_must_understand(doc, security, false, config.must_understand_format)
                    }
                    MustUnderstandMode::Skip => {}
                }
                (security, None)
            }
        };

        Ok(Self {
            config,
            req,
            envelope,
            attachments,
            actor,
            ids: IdGenerator::new(config.wsu_id_uses_element_name),
            security,
            anchor,
            timestamp: None,
            username_token: None,
            saml: None,
            security_context_token: None,
            security_context_uri: None,
            signing_key: None,
            signature: None,
            signature_value: None,
            signature_encrypted: false,
            result: DecorationResult::default(),
        })
    }

    /// Where new tokens go.
    fn token_placement(&self) -> Placement {
        self.anchor.map_or(Placement::Append(self.security), Placement::Before)
    }

    /// Where EncryptedKeys and ReferenceLists for encryption go.
    fn encryption_placement(&self) -> Placement {
        self.signature.map_or_else(|| self.token_placement(), Placement::Before)
    }

    fn run(&mut self, doc: &mut Document) -> Result<()> {
        let req = self.req;
        let message_signed = !req.elements_to_sign.is_empty() || !req.parts_to_sign.is_empty();
        let sign_username = req.sign_username_token && req.username_token.is_some();
        let sign_saml = req.include_saml_token_in_signature && req.saml_assertion.is_some();
        let only_tokens = req.protect_tokens && !message_signed && !sign_username && !sign_saml && !req.sign_timestamp;
        let signing = message_signed || sign_username || sign_saml || req.sign_timestamp || req.protect_tokens;

        if req.include_timestamp || req.sign_timestamp || only_tokens {
            self.add_timestamp(doc)?;
        }
        let confirmations = self.add_signature_confirmations(doc)?;
        self.add_saml(doc)?;

        let source = if signing {
            let source = choose_signing_source(req)?;
            debug!(?source, "selected signing key");
            Some(source)
        } else {
            None
        };

        let mut bst = None;
        if source == Some(SigningSource::SenderCertificate) {
            if let Some(cert) = &req.sender_certificate {
                if x509_inclusion(req, cert)? == KeyInfoInclusionType::Cert {
                    bst = Some(self.add_binary_security_token(doc, cert)?);
                }
            }
        }
        if let Some(session) = &req.secure_conversation_session {
            self.add_security_context_token(doc, session)?;
        }
        self.add_username_token(doc)?;

        if let Some(source) = source {
            let prepared = self.prepare_signing_key(doc, source, bst)?;
            let mut targets = Vec::new();
            targets.extend(self.timestamp);
            targets.extend(confirmations);
            if sign_saml {
                targets.extend(self.saml.as_ref().map(|s| s.element));
            }
            if sign_username {
                targets.extend(self.username_token);
            }
            if req.protect_tokens {
                targets.extend(prepared.tokens.iter().copied());
            }
            targets.extend(req.elements_to_sign.iter().copied());
            let addressing = match req.wsa_signing_strategy {
                WsaSigningStrategy::Never => false,
                WsaSigningStrategy::Always => true,
                WsaSigningStrategy::Default => message_signed,
            };
            if addressing {
                targets.extend(self.addressing_headers(doc));
            }
            self.sign(doc, targets, &prepared)?;
        }

        self.encrypt(doc)
    }

    fn add_timestamp(&mut self, doc: &mut Document) -> Result<()> {
        let existing = doc.child_elements(self.security).into_iter().find(|&c| {
            doc.local_name(c) == Some(ns::node::TIMESTAMP) && doc.namespace_uri(c).is_some_and(ns::is_wsu)
        });
        let ts = match existing {
            Some(ts) => ts,
            None => {
                let created = self.req.timestamp_created.unwrap_or_else(chrono::Utc::now);
                let timeout = self.req.timestamp_timeout.unwrap_or(self.config.timestamp_timeout);
                timestamp::create_timestamp(
                    doc,
                    self.token_placement(),
                    ns::WSU,
                    created,
                    timeout,
                    self.config.timestamp_resolution,
                )?
            }
        };
        self.timestamp = Some(ts);
        Ok(())
    }

    fn add_signature_confirmations(&mut self, doc: &mut Document) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        for value in &self.req.signature_confirmations {
            let sc = doc.new_element_at(self.token_placement(), ns::WSSE11, "wsse11", ns::node::SIGNATURE_CONFIRMATION)?;
            doc.set_attribute(sc, ns::attr::VALUE, value);
            self.ids.ensure_id(doc, sc);
            out.push(sc);
        }
        Ok(out)
    }

    fn add_saml(&mut self, doc: &mut Document) -> Result<()> {
        let Some(saml) = &self.req.saml_assertion else {
            return Ok(());
        };
        let source = &saml.document;
        let root = source
            .document_element()
            .ok_or_else(|| Error::Decorator("SAML assertion document is empty".into()))?;
        let version = match source.namespace_uri(root) {
            Some(ns::SAML11) => SamlVersion::V1_1,
            Some(ns::SAML20) => SamlVersion::V2_0,
            _ => return Err(Error::Decorator("SAML assertion has an unknown namespace".into())),
        };
        if source.local_name(root) != Some(ns::node::ASSERTION) {
            return Err(Error::Decorator("SAML document root is not an Assertion".into()));
        }
        let id_attr = match version {
            SamlVersion::V1_1 => ns::attr::ASSERTION_ID,
            SamlVersion::V2_0 => ns::attr::SAML_ID,
        };
        let id = source
            .attribute(root, id_attr)
            .ok_or_else(|| Error::Decorator(format!("SAML assertion has no {id_attr}")))?
            .to_owned();

        let element = doc.import_subtree(source, root)?;
        match self.token_placement() {
            Placement::Append(parent) => doc.append_child(parent, element),
            Placement::Before(reference) => doc.insert_before(reference, element)?,
        }
        self.saml = Some(EmbeddedSaml { element, id, version });
        Ok(())
    }

    fn add_binary_security_token(&mut self, doc: &mut Document, cert: &Certificate) -> Result<(NodeId, String)> {
        let bst = doc.new_element_at(self.token_placement(), ns::WSSE, "wsse", ns::node::BINARY_SECURITY_TOKEN)?;
        doc.set_attribute(bst, ns::attr::VALUE_TYPE, ns::VALUE_TYPE_X509V3);
        doc.set_attribute(bst, ns::attr::ENCODING_TYPE, ns::ENCODING_BASE64);
        let id = self.ids.ensure_id(doc, bst);
        doc.set_text(bst, &base64::engine::general_purpose::STANDARD.encode(cert.der()));
        Ok((bst, id))
    }

    fn add_security_context_token(&mut self, doc: &mut Document, session: &SecureConversationSession) -> Result<()> {
        self.result.security_context_id = Some(session.identifier.clone());
        if self.req.omit_security_context_token {
            self.security_context_uri = Some(session.identifier.clone());
            return Ok(());
        }
        let sc_ns = session.namespace.as_str();
        let sct = doc.new_element_at(self.token_placement(), sc_ns, "wssc", ns::node::SECURITY_CONTEXT_TOKEN)?;
        let id = self.ids.ensure_id(doc, sct);
        doc.append_text_element(sct, sc_ns, "wssc", ns::node::IDENTIFIER, &session.identifier);
        self.security_context_token = Some(sct);
        self.security_context_uri = Some(if session.references_identifier() {
            session.identifier.clone()
        } else {
            format!("#{id}")
        });
        Ok(())
    }

    fn add_username_token(&mut self, doc: &mut Document) -> Result<()> {
        let Some(creds) = &self.req.username_token else {
            return Ok(());
        };
        let ut = doc.new_element_at(self.token_placement(), ns::WSSE, "wsse", ns::node::USERNAME_TOKEN)?;
        self.ids.ensure_id(doc, ut);
        doc.append_text_element(ut, ns::WSSE, "wsse", ns::node::USERNAME, &creds.username);
        if let Some(password) = &creds.password {
            let pw = doc.append_text_element(ut, ns::WSSE, "wsse", ns::node::PASSWORD, password);
            doc.set_attribute(pw, ns::attr::TYPE, ns::PASSWORD_TEXT);
        }
        self.username_token = Some(ut);
        Ok(())
    }

    /// A DerivedKeyToken over the session secret.
    fn session_key(
        &mut self,
        doc: &mut Document,
        session: &SecureConversationSession,
        basename: &str,
        at: Placement,
    ) -> Result<CreatedDerivedKey> {
        let uri = self
            .security_context_uri
            .clone()
            .unwrap_or_else(|| session.identifier.clone());
        let id = self.ids.next(basename);
        let spec = DerivedKeySpec {
            sc_ns: &session.namespace,
            label: derived::SESSION_LABEL,
            length: session.derived_key_length(),
            id: &id,
        };
        let source = KeyReference::SecurityContext {
            uri: &uri,
            sc_ns: &session.namespace,
        };
        derived::create_derived_key_token(doc, at, &spec, &source, &session.shared_secret)
    }

    /// A DerivedKeyToken over an EncryptedKey secret.
    fn encrypted_key_derivation(
        &mut self,
        doc: &mut Document,
        source: &KeyReference<'_>,
        secret: &[u8],
        basename: &str,
        at: Placement,
    ) -> Result<CreatedDerivedKey> {
        let id = self.ids.next(basename);
        let spec = DerivedKeySpec {
            sc_ns: ns::WSSC_2005_02,
            label: derived::ENCRYPTED_KEY_LABEL,
            length: content_key_length(&self.req.encryption_algorithm)?,
            id: &id,
        };
        derived::create_derived_key_token(doc, at, &spec, source, secret)
    }

    /// An EncryptedKey carrying `secret` to `recipient`. Returns the element,
    /// its id and its EncryptedKeySHA1.
    fn create_recipient_key(
        &mut self,
        doc: &mut Document,
        recipient: &Certificate,
        at: Placement,
        secret: &[u8],
    ) -> Result<(NodeId, String, String)> {
        let public = recipient.public_key().rsa_public_key().ok_or_else(|| {
            Error::Decorator(format!("recipient {} does not have an RSA key", recipient.subject_name()))
        })?;
        let id = self.ids.next("EncryptedKey");
        let kt_algorithm = self.req.key_encryption_algorithm.as_str();
        let mut spec = EncryptedKeySpec::new(kt_algorithm).with_id(id.clone());
        if kt_algorithm == algorithm::RSA_OAEP {
            spec.oaep.digest_uri = Some(algorithm::SHA1.to_owned());
        }
        let ek = wssec_enc::create_encrypted_key(doc, at, &spec, KeyEncryptionKey::Rsa(public), secret)?;
        let reference = if recipient.subject_key_identifier().is_some() {
            KeyReference::Ski(recipient)
        } else {
            KeyReference::X509Certificate(recipient)
        };
        keyinfo::append_key_reference(doc, ek.key_info, &reference)?;
        let sha1 = ek.sha1();
        if self.result.encrypted_key_sha1.is_none() {
            self.result.encrypted_key_sha1 = Some(sha1.clone());
            self.result.encrypted_key = Some(secret.to_vec());
        }
        Ok((ek.element, id, sha1))
    }

    fn prepare_signing_key(
        &mut self,
        doc: &mut Document,
        source: SigningSource,
        bst: Option<(NodeId, String)>,
    ) -> Result<PreparedKey> {
        let req = self.req;
        let protect_derived = self.config.protect_tokens_signs_derived_keys;
        match source {
            SigningSource::Session => {
                let session = req
                    .secure_conversation_session
                    .as_ref()
                    .ok_or_else(|| Error::Decorator("no WS-SecureConversation session".into()))?;
                let dk = self.session_key(doc, session, "DerivedKey-Sig", self.token_placement())?;
                let mut tokens: Vec<NodeId> = self.security_context_token.into_iter().collect();
                if protect_derived {
                    tokens.push(dk.element);
                }
                Ok(PreparedKey {
                    key: SigningKey::Hmac(dk.key),
                    key_info: SignerKeyInfo::DerivedKey {
                        id: dk.id,
                        sc_ns: session.namespace.clone(),
                    },
                    tokens,
                })
            }
            SigningSource::SuppliedEncryptedKey => {
                let (Some(secret), Some(sha1)) = (&req.encrypted_key, &req.encrypted_key_sha1) else {
                    return Err(Error::Decorator("no shared EncryptedKey".into()));
                };
                self.result.encrypted_key_sha1 = Some(sha1.clone());
                self.result.encrypted_key = Some(secret.clone());
                if req.use_derived_keys {
                    let source = KeyReference::EncryptedKeySha1(sha1);
                    let dk = self.encrypted_key_derivation(doc, &source, secret, "DerivedKey-Sig", self.token_placement())?;
                    let tokens = if protect_derived { vec![dk.element] } else { Vec::new() };
                    Ok(PreparedKey {
                        key: SigningKey::Hmac(dk.key),
                        key_info: SignerKeyInfo::DerivedKey {
                            id: dk.id,
                            sc_ns: ns::WSSC_2005_02.to_owned(),
                        },
                        tokens,
                    })
                } else {
                    Ok(PreparedKey {
                        key: SigningKey::Hmac(secret.clone()),
                        key_info: SignerKeyInfo::EncryptedKeySha1(sha1.clone()),
                        tokens: Vec::new(),
                    })
                }
            }
            SigningSource::SenderCertificate => {
                let (Some(cert), Some(key)) = (&req.sender_certificate, &req.sender_private_key) else {
                    return Err(Error::Decorator("no sender certificate and key".into()));
                };
                if !key.has_private() {
                    return Err(Error::Decorator("sender key has no private half".into()));
                }
                let (key_info, tokens) = match bst {
                    Some((element, id)) => (SignerKeyInfo::BinarySecurityToken(id), vec![element]),
                    None => (SignerKeyInfo::X509(x509_inclusion(req, cert)?, Arc::clone(cert)), Vec::new()),
                };
                Ok(PreparedKey {
                    key: key.to_signing_key(),
                    key_info,
                    tokens,
                })
            }
            SigningSource::Saml => {
                let key = req
                    .saml_assertion
                    .as_ref()
                    .and_then(|s| s.subject_private_key.as_ref())
                    .ok_or_else(|| Error::Decorator("SAML assertion has no subject key".into()))?;
                let saml = self
                    .saml
                    .as_ref()
                    .ok_or_else(|| Error::Decorator("SAML assertion was not embedded".into()))?;
                Ok(PreparedKey {
                    key: key.to_signing_key(),
                    key_info: SignerKeyInfo::Saml {
                        id: saml.id.clone(),
                        version: saml.version,
                    },
                    tokens: vec![saml.element],
                })
            }
            SigningSource::GeneratedEncryptedKey => {
                let recipient = req
                    .recipient_certificate
                    .clone()
                    .ok_or_else(|| Error::Decorator("no recipient certificate".into()))?;
                let secret = wssec_crypto::random_bytes(32);
                let (element, id, sha1) = self.create_recipient_key(doc, &recipient, self.token_placement(), &secret)?;
                let by_sha1 = req.key_info_inclusion_type == KeyInfoInclusionType::EncryptedKeySha1;
                self.signing_key = Some(GeneratedKey {
                    recipient,
                    id: id.clone(),
                    secret: secret.clone(),
                });
                let mut tokens = vec![element];
                if req.use_derived_keys {
                    let source = if by_sha1 {
                        KeyReference::EncryptedKeySha1(&sha1)
                    } else {
                        KeyReference::EncryptedKey(&id)
                    };
                    let dk = self.encrypted_key_derivation(doc, &source, &secret, "DerivedKey-Sig", self.token_placement())?;
                    if protect_derived {
                        tokens.push(dk.element);
                    }
                    Ok(PreparedKey {
                        key: SigningKey::Hmac(dk.key),
                        key_info: SignerKeyInfo::DerivedKey {
                            id: dk.id,
                            sc_ns: ns::WSSC_2005_02.to_owned(),
                        },
                        tokens,
                    })
                } else {
                    Ok(PreparedKey {
                        key: SigningKey::Hmac(secret),
                        key_info: if by_sha1 {
                            SignerKeyInfo::EncryptedKeySha1(sha1)
                        } else {
                            SignerKeyInfo::EncryptedKey(id)
                        },
                        tokens,
                    })
                }
            }
        }
    }

    /// WS-Addressing MessageID, RelatesTo and Action headers.
    fn addressing_headers(&self, doc: &Document) -> Vec<NodeId> {
        let Some(header) = self.envelope.header(doc) else {
            return Vec::new();
        };
        doc.child_elements(header)
            .into_iter()
            .filter(|&c| {
                doc.namespace_uri(c).is_some_and(ns::is_wsa)
                    && matches!(
                        doc.local_name(c),
                        Some(ns::node::MESSAGE_ID | ns::node::RELATES_TO | ns::node::ACTION)
                    )
            })
            .collect()
    }

    fn sign(&mut self, doc: &mut Document, targets: Vec<NodeId>, prepared: &PreparedKey) -> Result<()> {
        let req = self.req;
        let family = prepared.key.family();
        let method = wssec_crypto::sign::signature_method_for(family, req.signature_digest.as_deref())?;
        let digest = match family {
            KeyFamily::Dsa => algorithm::SHA1,
            _ => req
                .signature_digest
                .as_deref()
                .or(algorithm::digest_of_signature_method(method))
                .unwrap_or(algorithm::SHA1),
        };

        let mut seen = Vec::new();
        let mut references = Vec::new();
        for target in targets {
            if seen.contains(&target) {
                continue;
            }
            seen.push(target);
            let id = self.ids.ensure_id(doc, target);
            let mut transforms = Vec::new();
            if doc.is_ancestor_or_self(target, self.security) {
                transforms.push(TransformSpec::enveloped());
            }
            transforms.push(TransformSpec::exc_c14n());
            references.push(ReferenceSpec {
                uri: format!("#{id}"),
                transforms,
                digest_method: digest.to_owned(),
            });
        }
        for cid in &req.parts_to_sign {
            let present = self.attachments.is_some_and(|store| store.attachment(cid).is_some());
            if !present {
                return Err(Error::Decorator(format!("no attachment with Content-ID {cid}")));
            }
            references.push(ReferenceSpec {
                uri: format!("cid:{cid}"),
                transforms: vec![TransformSpec::attachment(req.sign_part_headers)],
                digest_method: digest.to_owned(),
            });
        }

        let spec = SignatureSpec {
            signature_method: method.to_owned(),
            references,
            signed_info_prefixes: Vec::new(),
            id: Some(self.ids.next("Signature")),
        };
        let created = wssec_dsig::create_signature(doc, self.token_placement(), &spec, &prepared.key, self.attachments)?;
        keyinfo::append_key_reference(doc, created.key_info, &prepared.key_info.reference())?;
        debug!(method, references = spec.references.len(), "signed message");

        self.signature = Some(created.signature);
        self.signature_value = Some(base64::engine::general_purpose::STANDARD.encode(&created.signature_value));
        Ok(())
    }

    fn should_encrypt(&self, doc: &Document, element: NodeId, config: &EncryptionConfig) -> bool {
        if !doc.is_attached(element) {
            debug!("skipping encryption of a detached element");
            return false;
        }
        if config.content_only && doc.is_empty_element(element) && !self.config.encrypt_empty_elements {
            debug!(element = doc.local_name(element).unwrap_or(""), "skipping encryption of empty element");
            return false;
        }
        true
    }

    fn encrypt(&mut self, doc: &mut Document) -> Result<()> {
        let req = self.req;
        let mut items: Vec<(NodeId, EncryptionConfig)> = req.elements_to_encrypt.clone();
        if req.encrypt_username_token {
            items.extend(self.username_token.map(|ut| (ut, EncryptionConfig::element())));
        }
        if req.encrypt_signature {
            items.extend(self.signature.map(|sig| (sig, EncryptionConfig::element())));
        }
        items.retain(|(element, config)| self.should_encrypt(doc, *element, config));
        if items.is_empty() {
            return Ok(());
        }

        if let Some(session) = &req.secure_conversation_session {
            let at = self.encryption_placement();
            let dk = self.session_key(doc, session, "DerivedKey-Enc", at)?;
            let list = wssec_enc::create_reference_list(doc, at, &[])?;
            let content = ContentKey {
                key: &dk.key,
                default_algorithm: algorithm_for_key(dk.key.len()),
                reference: Some(KeyReference::DerivedKey {
                    id: &dk.id,
                    sc_ns: &session.namespace,
                }),
            };
            for item in &items {
                self.encrypt_one(doc, item, &content, list)?;
            }
            return Ok(());
        }

        if let (Some(secret), Some(sha1)) = (&req.encrypted_key, &req.encrypted_key_sha1) {
            self.result.encrypted_key_sha1 = Some(sha1.clone());
            self.result.encrypted_key = Some(secret.clone());
            let at = self.encryption_placement();
            if req.use_derived_keys {
                let source = KeyReference::EncryptedKeySha1(sha1);
                let dk = self.encrypted_key_derivation(doc, &source, secret, "DerivedKey-Enc", at)?;
                let list = wssec_enc::create_reference_list(doc, at, &[])?;
                let content = ContentKey {
                    key: &dk.key,
                    default_algorithm: algorithm_for_key(dk.key.len()),
                    reference: Some(KeyReference::DerivedKey {
                        id: &dk.id,
                        sc_ns: ns::WSSC_2005_02,
                    }),
                };
                for item in &items {
                    self.encrypt_one(doc, item, &content, list)?;
                }
            } else {
                let list = wssec_enc::create_reference_list(doc, at, &[])?;
                let content = ContentKey {
                    key: secret,
                    default_algorithm: algorithm_for_key(secret.len()),
                    reference: Some(KeyReference::EncryptedKeySha1(sha1)),
                };
                for item in &items {
                    self.encrypt_one(doc, item, &content, list)?;
                }
            }
            return Ok(());
        }

        self.encrypt_for_recipients(doc, &items)
    }

    /// One EncryptedKey per recipient, sized for the largest key any of
    /// its elements needs.
    fn encrypt_for_recipients(&mut self, doc: &mut Document, items: &[(NodeId, EncryptionConfig)]) -> Result<()> {
        let req = self.req;
        let mut groups: Vec<(Arc<Certificate>, Vec<&(NodeId, EncryptionConfig)>)> = Vec::new();
        for item in items {
            let recipient = item
                .1
                .recipient
                .clone()
                .or_else(|| req.recipient_certificate.clone())
                .ok_or_else(|| Error::Decorator("Encryption is requested, but there is no recipient certificate.".into()))?;
            match groups.iter_mut().find(|(cert, _)| cert.der() == recipient.der()) {
                Some((_, group)) => group.push(item),
                None => groups.push((recipient, vec![item])),
            }
        }

        for (recipient, group) in groups {
            let at = self.encryption_placement();
            if let Some(generated) = self.signing_key.clone().filter(|g| g.recipient.der() == recipient.der()) {
                // the signing EncryptedKey may already be covered by the
                // signature, so its ReferenceList stays outside it
                let list = wssec_enc::create_reference_list(doc, at, &[])?;
                let content = ContentKey {
                    key: &generated.secret,
                    default_algorithm: &req.encryption_algorithm,
                    reference: Some(KeyReference::EncryptedKey(&generated.id)),
                };
                for item in group {
                    self.encrypt_one(doc, item, &content, list)?;
                }
                continue;
            }

            let mut size = 0;
            for (_, config) in &group {
                let uri = config.algorithm.as_deref().unwrap_or(&req.encryption_algorithm);
                size = size.max(content_key_length(uri)?);
            }
            let secret = wssec_crypto::random_bytes(size);
            let (ek, _, _) = self.create_recipient_key(doc, &recipient, at, &secret)?;
            let list = wssec_enc::create_reference_list(doc, Placement::Append(ek), &[])?;
            let content = ContentKey {
                key: &secret,
                default_algorithm: &req.encryption_algorithm,
                reference: None,
            };
            for item in group {
                self.encrypt_one(doc, item, &content, list)?;
            }
        }
        Ok(())
    }

    fn encrypt_one(
        &mut self,
        doc: &mut Document,
        (element, config): &(NodeId, EncryptionConfig),
        content: &ContentKey<'_>,
        reference_list: NodeId,
    ) -> Result<()> {
        let cipher = config.algorithm.as_deref().unwrap_or(content.default_algorithm);
        let id = self.ids.next("EncryptedData");
        let created = wssec_enc::encrypt_element(doc, *element, cipher, config.content_only, content.key, &id)?;
        if let Some(reference) = &content.reference {
            let key_info = doc.insert_new_element_before(created.cipher_data, ns::DSIG, "ds", ns::node::KEY_INFO)?;
            keyinfo::append_key_reference(doc, key_info, reference)?;
        }
        wssec_enc::encrypt::add_data_reference(doc, reference_list, &id);
        if self.signature == Some(*element) {
            self.signature_encrypted = true;
        }
        debug!(id = %id, algorithm = cipher, content_only = config.content_only, "encrypted element");
        Ok(())
    }

    fn finish(mut self, doc: &mut Document) -> Result<DecorationResult> {
        if doc.child_elements(self.security).is_empty() && doc.is_empty_element(self.security) {
            doc.remove(self.security);
        }
        if let Some(header) = self.envelope.header(doc) {
            if doc.is_empty_element(header) {
                doc.remove(header);
            }
        }
        if let Some(value) = self.signature_value.take() {
            self.result.signatures.insert(value, self.signature_encrypted);
        }
        self.result.actor = self.actor;
        Ok(self.result)
    }
}

fn is_key_or_signature(doc: &Document, node: NodeId) -> bool {
    match (doc.namespace_uri(node), doc.local_name(node)) {
        (Some(ns::ENC), Some(ns::node::ENCRYPTED_KEY | ns::node::REFERENCE_LIST)) => true,
        (Some(ns::DSIG), Some(ns::node::SIGNATURE)) => true,
        _ => false,
    }
}
