#![forbid(unsafe_code)]

//! Inbound processing of one Security header.
//!
//! Children are handled in document order. Keys are resolved on demand, so
//! a reference to a token further down the header still works; chains of
//! EncryptedKeys and DerivedKeyTokens are followed with a bounded walk that
//! rejects loops. Elements decrypted inside the header are processed right
//! after the child that revealed them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use tracing::{debug, info, warn};
use wssec_core::{ns, Error, Result};
use wssec_crypto::SigningKey;
use wssec_dsig::ParsedSignature;
use wssec_enc::decrypt;
use wssec_enc::KeyDecryptionKey;
use wssec_keys::{x509, Certificate, SecurityTokenResolver};
use wssec_transforms::uri::{self, ReferenceUri};
use wssec_transforms::{AttachmentStore, ReferenceTarget};
use wssec_xml::{Document, NodeId};

use crate::config::WssConfig;
use crate::derived;
use crate::keyinfo::{self, TokenReference};
use crate::requirements::KeyInfoInclusionType;
use crate::result::{EncryptedElement, ProcessorResult, SignedElement, SignedPart};
use crate::session::SecurityContextFinder;
use crate::soap::Envelope;
use crate::timestamp;
use crate::token::{
    DerivedKeyToken, EncryptedKeyToken, SamlToken, SamlVersion, SecurityContextToken, SigningInfo, TokenIndex,
    UsernameToken, X509Token, XmlSecurityToken,
};
use crate::validators::{self, EncryptedKeyWalk};

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

fn decode_text(doc: &Document, node: NodeId, what: &str) -> Result<Vec<u8>> {
    let clean: String = doc.text(node).chars().filter(|c| !c.is_whitespace()).collect();
    b64().decode(clean).map_err(|e| Error::Base64(format!("{what}: {e}")))
}

/// Validates and unwraps inbound messages.
///
/// Holds only configuration; every call keeps its state on the stack.
#[derive(Debug, Clone, Default)]
pub struct WssProcessor {
    config: WssConfig,
}

impl WssProcessor {
    pub fn new(config: WssConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WssConfig {
        &self.config
    }

    /// Process the Security header addressed to this engine.
    ///
    /// The header for one of the configured actor names is preferred, then
    /// the one for the default actor. Headers for other actors are left
    /// alone. Decryption happens in place.
    pub fn process(
        &self,
        doc: &mut Document,
        finder: Option<&dyn SecurityContextFinder>,
        resolver: &dyn SecurityTokenResolver,
        attachments: Option<&dyn AttachmentStore>,
    ) -> Result<ProcessorResult> {
        self.run(doc, finder, resolver, attachments).map_err(|err| {
            warn!(error = %err, "rejecting message");
            validators::mask_if_oracle_safe(err, self.config.decryption_always_succeeds)
        })
    }

    fn run(
        &self,
        doc: &mut Document,
        finder: Option<&dyn SecurityContextFinder>,
        resolver: &dyn SecurityTokenResolver,
        attachments: Option<&dyn AttachmentStore>,
    ) -> Result<ProcessorResult> {
        let envelope = Envelope::of(doc)?;
        let security = self
            .config
            .actor_names
            .iter()
            .find_map(|actor| envelope.security_header_for(doc, Some(actor)))
            .or_else(|| envelope.security_header_for(doc, None));
        validators::check_must_understand(doc, &envelope, security, &self.config)?;

        let mut ctx = Context {
            config: &self.config,
            envelope,
            finder,
            resolver,
            attachments,
            result: ProcessorResult::default(),
            by_element: HashMap::new(),
            attempted: HashSet::new(),
            handled: HashSet::new(),
            decrypted: HashSet::new(),
            pending: Vec::new(),
        };
        if let Some(security) = security {
            ctx.result.security_header_found = true;
            ctx.result.security_namespace = doc.namespace_uri(security).map(str::to_owned);
            ctx.result.actor = envelope
                .actor_of(doc, security)
                .filter(|a| !envelope.is_default_actor(Some(a)))
                .map(str::to_owned);
            ctx.walk(doc, security)?;
        }
        ctx.finish(doc)
    }
}

/// What a Security child is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildKind {
    BinarySecurityToken,
    UsernameToken,
    Timestamp,
    SecurityContextToken,
    DerivedKeyToken,
    SamlAssertion,
    EncryptedKey,
    ReferenceList,
    EncryptedData,
    Signature,
    SecurityTokenReference,
    SignatureConfirmation,
    Other,
}

fn child_kind(doc: &Document, node: NodeId) -> ChildKind {
    let (Some(uri), Some(local)) = (doc.namespace_uri(node), doc.local_name(node)) else {
        return ChildKind::Other;
    };
    match local {
        ns::node::BINARY_SECURITY_TOKEN if ns::is_wsse(uri) => ChildKind::BinarySecurityToken,
        ns::node::USERNAME_TOKEN if ns::is_wsse(uri) => ChildKind::UsernameToken,
        ns::node::SECURITY_TOKEN_REFERENCE if ns::is_wsse(uri) => ChildKind::SecurityTokenReference,
        ns::node::TIMESTAMP if ns::is_wsu(uri) => ChildKind::Timestamp,
        ns::node::SECURITY_CONTEXT_TOKEN if ns::is_wssc(uri) => ChildKind::SecurityContextToken,
        ns::node::DERIVED_KEY_TOKEN if ns::is_wssc(uri) => ChildKind::DerivedKeyToken,
        ns::node::ASSERTION if uri == ns::SAML11 || uri == ns::SAML20 => ChildKind::SamlAssertion,
        ns::node::ENCRYPTED_KEY if uri == ns::ENC => ChildKind::EncryptedKey,
        ns::node::REFERENCE_LIST if uri == ns::ENC => ChildKind::ReferenceList,
        ns::node::ENCRYPTED_DATA if uri == ns::ENC => ChildKind::EncryptedData,
        ns::node::SIGNATURE if uri == ns::DSIG => ChildKind::Signature,
        ns::node::SIGNATURE_CONFIRMATION if uri == ns::WSSE11 => ChildKind::SignatureConfirmation,
        _ => ChildKind::Other,
    }
}

/// Reject disallowed reference URIs and transforms before anything is
/// resolved or canonicalized.
fn precheck_signature(doc: &Document, signature: NodeId) -> Result<()> {
    let Some(signed_info) = doc.find_child(signature, ns::DSIG, ns::node::SIGNED_INFO) else {
        return Ok(());
    };
    for reference in doc.find_children(signed_info, ns::DSIG, ns::node::REFERENCE) {
        validators::check_reference_uri(doc.attribute(reference, ns::attr::URI).unwrap_or(""))?;
        let Some(transforms) = doc.find_child(reference, ns::DSIG, ns::node::TRANSFORMS) else {
            continue;
        };
        for transform in doc.find_children(transforms, ns::DSIG, ns::node::TRANSFORM) {
            if let Some(algorithm) = doc.attribute(transform, ns::attr::ALGORITHM) {
                validators::check_transform_allowed(algorithm)?;
            }
        }
    }
    Ok(())
}

/// State of one `process` call.
struct Context<'a> {
    config: &'a WssConfig,
    envelope: Envelope,
    finder: Option<&'a dyn SecurityContextFinder>,
    resolver: &'a dyn SecurityTokenResolver,
    attachments: Option<&'a dyn AttachmentStore>,
    result: ProcessorResult,
    /// Token element (or top-level STR) → token.
    by_element: HashMap<NodeId, TokenIndex>,
    /// Elements token processing has already run on, successful or not.
    attempted: HashSet<NodeId>,
    /// Security children already dispatched.
    handled: HashSet<NodeId>,
    /// Ids of EncryptedData elements already decrypted.
    decrypted: HashSet<String>,
    /// Header elements revealed by decryption.
    pending: Vec<NodeId>,
}

impl Context<'_> {
    fn walk(&mut self, doc: &mut Document, security: NodeId) -> Result<()> {
        let mut previous: Option<NodeId> = None;
        let mut next = doc.child_elements(security).first().copied();
        while let Some(child) = next {
            if self.handled.insert(child) {
                self.dispatch(doc, child)?;
                while !self.pending.is_empty() {
                    for revealed in std::mem::take(&mut self.pending) {
                        if self.handled.insert(revealed) {
                            self.dispatch(doc, revealed)?;
                        }
                    }
                }
            }
            if doc.parent(child) == Some(security) {
                previous = Some(child);
                next = doc.next_element_sibling(child);
            } else {
                next = match previous.filter(|p| doc.parent(*p) == Some(security)) {
                    Some(p) => doc.next_element_sibling(p),
                    None => doc.child_elements(security).first().copied(),
                };
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, doc: &mut Document, child: NodeId) -> Result<()> {
        let kind = child_kind(doc, child);
        debug!(element = doc.local_name(child).unwrap_or(""), ?kind, "processing Security child");
        if doc.namespace_uri(child) == Some(ns::WSSE11) {
            self.result.wsse11_seen = true;
        }
        match kind {
            ChildKind::BinarySecurityToken
            | ChildKind::UsernameToken
            | ChildKind::SecurityContextToken
            | ChildKind::DerivedKeyToken
            | ChildKind::SamlAssertion
            | ChildKind::SecurityTokenReference => self.ensure_token(doc, child).map(drop),
            ChildKind::Timestamp => self.process_timestamp(doc, child),
            ChildKind::EncryptedKey => self.process_encrypted_key(doc, child),
            ChildKind::ReferenceList => self.process_reference_list(doc, child),
            ChildKind::EncryptedData => self.process_header_encrypted_data(doc, child),
            ChildKind::Signature => self.process_signature(doc, child),
            ChildKind::SignatureConfirmation => {
                self.result.wsse11_seen = true;
                let value = doc.attribute(child, ns::attr::VALUE).map(str::to_owned);
                self.result.signature_confirmations.push(value);
                Ok(())
            }
            ChildKind::Other => {
                let name = doc.element(child).map(|e| e.name.prefixed_name().into_owned()).unwrap_or_default();
                if self.config.reject_on_must_understand && self.envelope.must_understand(doc, child) {
                    warn!(element = %name, "unrecognized Security child marked mustUnderstand");
                    return Err(Error::Validation(format!("unrecognized Security child {name} is marked mustUnderstand")));
                }
                debug!(element = %name, "ignoring unrecognized Security child");
                Ok(())
            }
        }
    }

    fn push_token(&mut self, token: XmlSecurityToken) -> TokenIndex {
        let index = self.result.tokens.len();
        if let Some(element) = token.element() {
            self.by_element.insert(element, index);
        }
        self.result.tokens.push(token);
        index
    }

    // ── Token resolution ─────────────────────────────────────────────

    /// The token an element stands for, processing it first if needed.
    /// `None` when the token cannot be used, e.g. an EncryptedKey for
    /// someone else.
    fn ensure_token(&mut self, doc: &mut Document, element: NodeId) -> Result<Option<TokenIndex>> {
        if let Some(&index) = self.by_element.get(&element) {
            return Ok(Some(index));
        }
        if self.attempted.contains(&element) {
            return Ok(None);
        }
        match child_kind(doc, element) {
            ChildKind::EncryptedKey | ChildKind::DerivedKeyToken => self.resolve_key_chain(doc, element),
            kind => {
                self.attempted.insert(element);
                match kind {
                    ChildKind::BinarySecurityToken => self.process_binary_security_token(doc, element),
                    ChildKind::UsernameToken => self.process_username_token(doc, element).map(Some),
                    ChildKind::SecurityContextToken => self.process_security_context_token(doc, element).map(Some),
                    ChildKind::SamlAssertion => self.process_saml(doc, element).map(Some),
                    ChildKind::SecurityTokenReference => {
                        let reference = keyinfo::parse_security_token_reference(doc, element)?;
                        let found = self.resolve_reference(doc, &reference)?;
                        if let Some(index) = found {
                            self.by_element.insert(element, index);
                        }
                        Ok(found)
                    }
                    _ => {
                        let name = doc.local_name(element).unwrap_or("");
                        Err(Error::DocumentFormat(format!("reference to {name}, which is not a security token")))
                    }
                }
            }
        }
    }

    /// Resolve an EncryptedKey or DerivedKeyToken, resolving the keys it
    /// depends on first.
    fn resolve_key_chain(&mut self, doc: &mut Document, start: NodeId) -> Result<Option<TokenIndex>> {
        let mut walk = EncryptedKeyWalk::new(start);
        while let Some(current) = walk.current() {
            if self.by_element.contains_key(&current) || self.attempted.contains(&current) {
                walk.leave();
                continue;
            }
            match self.key_dependency(doc, current)? {
                Some(dependency) => walk.enter(dependency)?,
                None => {
                    self.attempted.insert(current);
                    match child_kind(doc, current) {
                        ChildKind::EncryptedKey => self.process_encrypted_key_token(doc, current)?,
                        _ => self.process_derived_key_token(doc, current)?,
                    }
                    walk.leave();
                }
            }
        }
        Ok(self.by_element.get(&start).copied())
    }

    /// The unresolved EncryptedKey or DerivedKeyToken `node` needs first.
    fn key_dependency(&self, doc: &Document, node: NodeId) -> Result<Option<NodeId>> {
        let reference = match child_kind(doc, node) {
            ChildKind::EncryptedKey => {
                let info = decrypt::parse_encrypted_key(doc, node)?;
                if info.is_key_transport() {
                    return Ok(None);
                }
                match info.key_info {
                    Some(ki) => keyinfo::parse_key_info(doc, ki)?,
                    None => None,
                }
            }
            ChildKind::DerivedKeyToken => {
                let parsed = derived::parse_derived_key_token(doc, node, self.config.max_derived_key_length)?;
                Some(keyinfo::parse_security_token_reference(doc, parsed.reference)?)
            }
            _ => None,
        };
        let Some(TokenReference::Local(id)) = reference else {
            return Ok(None);
        };
        let Some(target) = doc.find_by_id(&id) else {
            return Ok(None);
        };
        if self.by_element.contains_key(&target) || self.attempted.contains(&target) {
            return Ok(None);
        }
        Ok(match child_kind(doc, target) {
            ChildKind::EncryptedKey | ChildKind::DerivedKeyToken => Some(target),
            _ => None,
        })
    }

    fn resolve_reference(&mut self, doc: &mut Document, reference: &TokenReference) -> Result<Option<TokenIndex>> {
        match reference {
            TokenReference::Local(id) | TokenReference::SamlAssertionId(id) => {
                let element = doc
                    .find_by_id(id)
                    .ok_or_else(|| Error::DocumentFormat(format!("no security token with id {id}")))?;
                self.ensure_token(doc, element)
            }
            TokenReference::ContextIdentifier(identifier) => self.security_context_by_identifier(identifier).map(Some),
            TokenReference::EncryptedKeySha1(sha1) => Ok(self.encrypted_key_by_sha1(sha1)),
            TokenReference::Ski(_)
            | TokenReference::Thumbprint(_)
            | TokenReference::Certificate(_)
            | TokenReference::IssuerSerial { .. }
            | TokenReference::KeyName(_) => Ok(self.certificate_for(reference)?.map(|cert| self.x509_token_for(cert))),
        }
    }

    fn known_certificate(&self, matches: impl Fn(&Certificate) -> bool) -> Option<Arc<Certificate>> {
        self.result
            .tokens
            .iter()
            .filter_map(XmlSecurityToken::as_x509)
            .find(|t| matches(&t.certificate))
            .map(|t| Arc::clone(&t.certificate))
    }

    /// The certificate a key identifier names, from the message first and
    /// then the resolver.
    fn certificate_for(&self, reference: &TokenReference) -> Result<Option<Arc<Certificate>>> {
        Ok(match reference {
            TokenReference::Ski(ski) => self
                .known_certificate(|c| c.subject_key_identifier() == Some(ski.as_slice()))
                .or_else(|| self.resolver.lookup_by_ski(ski)),
            TokenReference::Thumbprint(sha1) => self
                .known_certificate(|c| c.thumbprint_sha1() == sha1.as_slice())
                .or_else(|| self.resolver.lookup_by_thumbprint(sha1)),
            TokenReference::IssuerSerial { issuer, serial } => self
                .known_certificate(|c| c.matches_issuer_serial(issuer, serial))
                .or_else(|| self.resolver.lookup_by_issuer_serial(issuer, serial)),
            TokenReference::KeyName(name) => self.resolver.lookup_by_key_name(name),
            TokenReference::Certificate(der) => Some(Arc::new(Certificate::from_der(der)?)),
            _ => None,
        })
    }

    /// The X.509 token for `cert`, adding one without an element if the
    /// message carried none.
    fn x509_token_for(&mut self, cert: Arc<Certificate>) -> TokenIndex {
        let existing = self
            .result
            .tokens
            .iter()
            .position(|t| t.as_x509().is_some_and(|x| x.certificate.der() == cert.der()));
        match existing {
            Some(index) => index,
            None => self.push_token(XmlSecurityToken::X509(X509Token {
                element: None,
                element_id: None,
                certificate: cert,
                chain: Vec::new(),
                value_type: ns::VALUE_TYPE_X509V3.to_owned(),
                reference_type: None,
                signing: SigningInfo::default(),
            })),
        }
    }

    fn security_context_by_identifier(&mut self, identifier: &str) -> Result<TokenIndex> {
        let existing = self
            .result
            .tokens
            .iter()
            .position(|t| t.as_security_context().is_some_and(|s| s.identifier == identifier));
        if let Some(index) = existing {
            return Ok(index);
        }
        let session = self.lookup_session(identifier)?;
        Ok(self.push_token(XmlSecurityToken::SecurityContext(SecurityContextToken {
            element: None,
            element_id: None,
            identifier: identifier.to_owned(),
            secret: session,
            is_virtual: true,
            signing: SigningInfo::default(),
        })))
    }

    fn lookup_session(&self, identifier: &str) -> Result<Vec<u8>> {
        let finder = self.finder.ok_or_else(|| {
            Error::Generic("message uses WS-SecureConversation but no security context finder is available".into())
        })?;
        finder
            .get_security_context(identifier)
            .map(|s| s.shared_secret)
            .ok_or_else(|| Error::BadSecurityContext(identifier.to_owned()))
    }

    fn encrypted_key_by_sha1(&mut self, sha1: &str) -> Option<TokenIndex> {
        let existing = self
            .result
            .tokens
            .iter()
            .position(|t| t.as_encrypted_key().is_some_and(|k| k.encrypted_key_sha1 == sha1));
        if existing.is_some() {
            return existing;
        }
        let secret = self.resolver.secret_by_encrypted_key_sha1(sha1)?;
        Some(self.push_token(XmlSecurityToken::EncryptedKey(EncryptedKeyToken {
            element: None,
            element_id: None,
            secret,
            encrypted_key_sha1: sha1.to_owned(),
            algorithm: None,
            reference_type: None,
            signing: SigningInfo::default(),
        })))
    }

    fn secret_of(&self, index: TokenIndex) -> Result<Vec<u8>> {
        self.result
            .tokens
            .get(index)
            .and_then(XmlSecurityToken::secret)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::DocumentFormat("referenced token carries no symmetric key".into()))
    }

    // ── Tokens ───────────────────────────────────────────────────────

    fn process_binary_security_token(&mut self, doc: &Document, node: NodeId) -> Result<Option<TokenIndex>> {
        let value_type = doc.attribute(node, ns::attr::VALUE_TYPE).unwrap_or("").trim().to_owned();
        let (certificate, chain) = if value_type.ends_with("X509v3") {
            (Certificate::from_der(&decode_text(doc, node, "BinarySecurityToken")?)?, Vec::new())
        } else if value_type.ends_with("X509PKIPathv1") {
            let chain = x509::parse_pki_path(&decode_text(doc, node, "BinarySecurityToken")?)?;
            let leaf = chain
                .first()
                .cloned()
                .ok_or_else(|| Error::DocumentFormat("empty PKIPath BinarySecurityToken".into()))?;
            (leaf, chain)
        } else {
            validators::check_unknown_binary_security_token(&value_type, self.config)?;
            debug!(value_type = %value_type, "skipping BinarySecurityToken of unknown type");
            return Ok(None);
        };
        debug!(subject = certificate.subject_name(), "X.509 BinarySecurityToken");
        Ok(Some(self.push_token(XmlSecurityToken::X509(X509Token {
            element: Some(node),
            element_id: doc.element_id(node).map(str::to_owned),
            certificate: Arc::new(certificate),
            chain,
            value_type,
            reference_type: None,
            signing: SigningInfo::default(),
        }))))
    }

    fn process_username_token(&mut self, doc: &Document, node: NodeId) -> Result<TokenIndex> {
        let wsse = doc.namespace_uri(node).unwrap_or(ns::WSSE).to_owned();
        let username = doc
            .find_child(node, &wsse, ns::node::USERNAME)
            .map(|n| doc.text(n).trim().to_owned())
            .ok_or_else(|| Error::MissingElement("Username in UsernameToken".into()))?;
        let password_node = doc.find_child(node, &wsse, ns::node::PASSWORD);
        let nonce = doc
            .find_child(node, &wsse, ns::node::NONCE)
            .map(|n| decode_text(doc, n, "UsernameToken Nonce"))
            .transpose()?;
        let created = doc
            .child_elements(node)
            .into_iter()
            .find(|&c| doc.local_name(c) == Some(ns::node::CREATED) && doc.namespace_uri(c).is_some_and(ns::is_wsu))
            .map(|c| doc.text(c).trim().to_owned());
        Ok(self.push_token(XmlSecurityToken::Username(UsernameToken {
            element: Some(node),
            element_id: doc.element_id(node).map(str::to_owned),
            username,
            password: password_node.map(|p| doc.text(p)),
            password_type: password_node.and_then(|p| doc.attribute(p, ns::attr::TYPE)).map(str::to_owned),
            nonce,
            created,
        })))
    }

    fn process_security_context_token(&mut self, doc: &Document, node: NodeId) -> Result<TokenIndex> {
        let sc_ns = doc.namespace_uri(node).unwrap_or(ns::WSSC_2005_02).to_owned();
        let identifier = doc
            .find_child(node, &sc_ns, ns::node::IDENTIFIER)
            .map(|n| doc.text(n).trim().to_owned())
            .ok_or_else(|| Error::MissingElement("Identifier in SecurityContextToken".into()))?;
        let secret = self.lookup_session(&identifier)?;
        Ok(self.push_token(XmlSecurityToken::SecurityContext(SecurityContextToken {
            element: Some(node),
            element_id: doc.element_id(node).map(str::to_owned),
            identifier,
            secret,
            is_virtual: false,
            signing: SigningInfo::default(),
        })))
    }

    fn process_derived_key_token(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        self.result.derived_key_seen = true;
        let parsed = derived::parse_derived_key_token(doc, node, self.config.max_derived_key_length)?;
        let reference = keyinfo::parse_security_token_reference(doc, parsed.reference)?;
        let Some(source) = self.resolve_reference(doc, &reference)? else {
            info!(id = parsed.id.as_deref().unwrap_or(""), "DerivedKeyToken source is not available");
            return Ok(());
        };
        let key = parsed.derive(&self.secret_of(source)?)?;
        self.push_token(XmlSecurityToken::DerivedKey(DerivedKeyToken {
            element: Some(node),
            element_id: parsed.id,
            key,
            source,
            generation: parsed.generation,
            offset: parsed.offset,
            length: parsed.length,
            label: parsed.label,
            nonce: parsed.nonce,
        }));
        Ok(())
    }

    /// Unwrap an EncryptedKey into a token. A key for a certificate we
    /// hold no private key for is skipped.
    fn process_encrypted_key_token(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        let info = decrypt::parse_encrypted_key(doc, node)?;
        let reference = match info.key_info {
            Some(ki) => keyinfo::parse_key_info(doc, ki)?,
            None => None,
        };
        let unwrapped = if info.is_key_transport() {
            let cert = match &reference {
                Some(TokenReference::Local(id)) => {
                    let element = doc
                        .find_by_id(id)
                        .ok_or_else(|| Error::DocumentFormat(format!("no security token with id {id}")))?;
                    self.ensure_token(doc, element)?
                        .and_then(|i| self.result.tokens.get(i))
                        .and_then(XmlSecurityToken::as_x509)
                        .map(|t| Arc::clone(&t.certificate))
                }
                Some(other) => self.certificate_for(other)?,
                None => None,
            };
            let Some(private) = cert.as_deref().and_then(|c| self.resolver.private_key_for(c)) else {
                info!(id = info.id.as_deref().unwrap_or(""), "EncryptedKey is not for a key we hold; skipping");
                return Ok(());
            };
            let rsa = private
                .rsa_private_key()
                .ok_or_else(|| Error::Key("EncryptedKey recipient key is not RSA".into()))?;
            decrypt::unwrap_key(&info, KeyDecryptionKey::Rsa(rsa))
        } else {
            let reference =
                reference.ok_or_else(|| Error::DocumentFormat("wrapped EncryptedKey has no usable KeyInfo".into()))?;
            let Some(kek) = self.resolve_reference(doc, &reference)? else {
                info!(id = info.id.as_deref().unwrap_or(""), "EncryptedKey wrapping key is not available");
                return Ok(());
            };
            let kek = self.secret_of(kek)?;
            decrypt::unwrap_key(&info, KeyDecryptionKey::Symmetric(&kek))
        };

        let secret = match unwrapped {
            Ok(secret) => {
                self.resolver.cache_encrypted_key(&info.sha1(), &secret);
                secret
            }
            Err(_) if self.config.decryption_always_succeeds => {
                debug!("EncryptedKey did not unwrap; continuing with a random key");
                wssec_crypto::random_bytes(32)
            }
            Err(err) => return Err(Error::Decryption(format!("EncryptedKey: {err}"))),
        };
        self.push_token(XmlSecurityToken::EncryptedKey(EncryptedKeyToken {
            element: Some(node),
            element_id: info.id.clone(),
            encrypted_key_sha1: info.sha1(),
            secret,
            algorithm: Some(info.algorithm.clone()),
            reference_type: None,
            signing: SigningInfo::default(),
        }));
        Ok(())
    }

    fn process_saml(&mut self, doc: &Document, node: NodeId) -> Result<TokenIndex> {
        let saml_ns = doc.namespace_uri(node).unwrap_or(ns::SAML20).to_owned();
        let (version, id_attribute) = if saml_ns == ns::SAML11 {
            (SamlVersion::V1_1, ns::attr::ASSERTION_ID)
        } else {
            (SamlVersion::V2_0, ns::attr::SAML_ID)
        };
        let assertion_id = doc
            .attribute(node, id_attribute)
            .ok_or_else(|| Error::MissingAttribute(format!("{id_attribute} on SAML assertion")))?
            .to_owned();

        let subject_certificate = doc
            .descendants(node)
            .into_iter()
            .filter(|&n| doc.is_named(n, &saml_ns, ns::node::SUBJECT_CONFIRMATION))
            .find_map(|sc| doc.find_descendant(sc, ns::DSIG, ns::node::X509_CERTIFICATE))
            .map(|c| decode_text(doc, c, "SubjectConfirmation certificate").and_then(|der| Certificate::from_der(&der)))
            .transpose()?
            .map(Arc::new);

        let issuer_certificate = match doc.find_child(node, ns::DSIG, ns::node::SIGNATURE) {
            Some(signature) => Some(self.verify_assertion_signature(doc, signature)?),
            None => None,
        };
        debug!(id = %assertion_id, ?version, "SAML assertion");
        Ok(self.push_token(XmlSecurityToken::Saml(SamlToken {
            element: Some(node),
            assertion_id,
            version,
            subject_certificate,
            issuer_certificate,
            signing: SigningInfo::default(),
        })))
    }

    /// Verify the issuer's enveloped signature over an assertion.
    fn verify_assertion_signature(&self, doc: &Document, signature: NodeId) -> Result<Arc<Certificate>> {
        precheck_signature(doc, signature)?;
        let parsed = wssec_dsig::parse_signature(doc, signature)?;
        let reference = match parsed.key_info {
            Some(ki) => keyinfo::parse_key_info(doc, ki)?,
            None => None,
        };
        let cert = match &reference {
            Some(r) => self.certificate_for(r)?,
            None => None,
        }
        .ok_or_else(|| Error::SignatureInvalid("SAML assertion signature has no usable key".into()))?;
        wssec_dsig::verify::verify_references(doc, &parsed, None)?;
        wssec_dsig::verify::verify_signature_value(doc, &parsed, &cert.public_key().to_signing_key())?;
        Ok(cert)
    }

    fn process_timestamp(&mut self, doc: &Document, node: NodeId) -> Result<()> {
        if self.result.timestamp.is_some() {
            if !self.config.permit_multiple_timestamps {
                return Err(Error::Validation("more than one Timestamp in the Security header".into()));
            }
            debug!("ignoring additional Timestamp");
            return Ok(());
        }
        let ts = timestamp::parse_timestamp(doc, node)?;
        self.result.wsu_namespace = doc.namespace_uri(node).map(str::to_owned);
        self.result.timestamp = Some(ts);
        Ok(())
    }

    // ── Decryption ───────────────────────────────────────────────────

    fn encrypted_data_by_id(&self, doc: &Document, id: &str) -> Result<NodeId> {
        let node = doc
            .find_by_id(id)
            .ok_or_else(|| Error::DocumentFormat(format!("EncryptedData {id} not found")))?;
        if child_kind(doc, node) != ChildKind::EncryptedData {
            return Err(Error::DocumentFormat(format!("reference {id} is not an EncryptedData")));
        }
        Ok(node)
    }

    /// The key an EncryptedData names in its own KeyInfo.
    fn own_key(&mut self, doc: &mut Document, node: NodeId) -> Result<Option<Vec<u8>>> {
        let info = decrypt::parse_encrypted_data(doc, node)?;
        let reference = match info.key_info {
            Some(ki) => keyinfo::parse_key_info(doc, ki)?,
            None => None,
        };
        let Some(reference) = reference else {
            return Ok(None);
        };
        match self.resolve_reference(doc, &reference)? {
            Some(index) => self.secret_of(index).map(Some),
            None => Ok(None),
        }
    }

    fn process_encrypted_key(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        let Some(index) = self.ensure_token(doc, node)? else {
            return Ok(());
        };
        let secret = self.secret_of(index)?;
        let info = decrypt::parse_encrypted_key(doc, node)?;
        for id in &info.data_references {
            if self.decrypted.contains(id) {
                continue;
            }
            let target = self.encrypted_data_by_id(doc, id)?;
            self.decrypt_data(doc, target, &secret)?;
        }
        Ok(())
    }

    fn process_reference_list(&mut self, doc: &mut Document, list: NodeId) -> Result<()> {
        for id in decrypt::data_references(doc, list)? {
            if self.decrypted.contains(&id) {
                continue;
            }
            let target = self.encrypted_data_by_id(doc, &id)?;
            match self.own_key(doc, target)? {
                Some(key) => self.decrypt_data(doc, target, &key)?,
                None => info!(id = %id, "no key for EncryptedData; leaving it encrypted"),
            }
        }
        doc.remove(list);
        Ok(())
    }

    fn process_header_encrypted_data(&mut self, doc: &mut Document, node: NodeId) -> Result<()> {
        match self.own_key(doc, node)? {
            Some(key) => self.decrypt_data(doc, node, &key),
            None => {
                debug!("EncryptedData without a usable KeyInfo; expecting a ReferenceList");
                Ok(())
            }
        }
    }

    /// Decrypt one EncryptedData in place and report what was encrypted.
    fn decrypt_data(&mut self, doc: &mut Document, node: NodeId, key: &[u8]) -> Result<()> {
        let info = decrypt::parse_encrypted_data(doc, node)?;
        let parent = doc
            .parent(node)
            .ok_or_else(|| Error::DocumentFormat("EncryptedData is detached".into()))?;
        let sole_content = doc
            .children(parent)
            .into_iter()
            .all(|c| c == node || (!doc.is_element(c) && doc.text(c).trim().is_empty()));
        if let Some(id) = &info.id {
            self.decrypted.insert(id.clone());
        }

        let outcome = decrypt::decrypt_data(&info, key).and_then(|plain| decrypt::replace_encrypted_data(doc, &info, &plain));
        let nodes = match outcome {
            Ok(nodes) => nodes,
            Err(err @ Error::UnsupportedAlgorithm(_)) => return Err(err),
            Err(_) if self.config.decryption_always_succeeds => {
                debug!("EncryptedData did not decrypt; replacing it with nothing");
                doc.remove(node);
                return Ok(());
            }
            Err(Error::Decryption(msg)) => return Err(Error::Decryption(msg)),
            Err(err) => return Err(Error::Decryption(err.to_string())),
        };

        if info.is_content() {
            let elements: Vec<NodeId> = if sole_content {
                vec![parent]
            } else {
                nodes.iter().copied().filter(|n| doc.is_element(*n)).collect()
            };
            for element in elements {
                self.result.encrypted_elements.push(EncryptedElement {
                    element,
                    algorithm: info.algorithm.clone(),
                });
            }
        } else if let Some(element) = nodes.iter().copied().find(|n| doc.is_element(*n)) {
            self.result.encrypted_elements.push(EncryptedElement {
                element,
                algorithm: info.algorithm.clone(),
            });
            if self.envelope.security_headers(doc).contains(&parent) {
                self.pending.push(element);
            }
        }
        Ok(())
    }

    // ── Signatures ───────────────────────────────────────────────────

    fn check_attachment_sizes(&self, parsed: &ParsedSignature) -> Result<()> {
        for reference in &parsed.references {
            let ReferenceUri::Attachment(cid) = uri::classify(&reference.uri)? else {
                continue;
            };
            let size = self
                .attachments
                .and_then(|store| store.attachment(&cid))
                .map_or(0, |part| part.body.len());
            if size > self.config.signed_attachment_size_limit {
                return Err(Error::Validation(format!(
                    "signed attachment {cid} is larger than {} bytes",
                    self.config.signed_attachment_size_limit
                )));
            }
        }
        Ok(())
    }

    /// Key that verifies signatures made with a token.
    fn verification_key(&self, index: TokenIndex) -> Option<SigningKey> {
        match self.result.tokens.get(index)? {
            XmlSecurityToken::X509(t) => Some(t.certificate.public_key().to_signing_key()),
            XmlSecurityToken::Saml(t) => t
                .subject_certificate
                .as_ref()
                .map(|c| c.public_key().to_signing_key()),
            other => other.secret().map(|s| SigningKey::Hmac(s.to_vec())),
        }
    }

    fn process_signature(&mut self, doc: &mut Document, signature: NodeId) -> Result<()> {
        precheck_signature(doc, signature)?;
        let parsed = wssec_dsig::parse_signature(doc, signature)?;
        self.check_attachment_sizes(&parsed)?;

        let reference = match parsed.key_info {
            Some(ki) => keyinfo::parse_key_info(doc, ki)?,
            None => None,
        };
        let Some(reference) = reference else {
            info!("Signature without a recognized KeyInfo; ignoring it");
            return Ok(());
        };
        let signer = self.resolve_reference(doc, &reference)?;
        let Some((signer, key)) = signer.and_then(|i| self.verification_key(i).map(|k| (i, k))) else {
            info!(?reference, "no key for Signature; ignoring it");
            return Ok(());
        };

        let verified = wssec_dsig::verify::verify_references(doc, &parsed, self.attachments)?;
        wssec_dsig::verify::verify_signature_value(doc, &parsed, &key)?;
        debug!(references = verified.len(), "Signature verified");

        match self.result.tokens.get_mut(signer) {
            Some(XmlSecurityToken::X509(token)) => {
                token.reference_type = match reference {
                    TokenReference::Local(_) if token.element.is_some() => Some(KeyInfoInclusionType::Cert),
                    other => other.inclusion_type(),
                };
            }
            Some(XmlSecurityToken::EncryptedKey(token)) => token.reference_type = reference.inclusion_type(),
            _ => {}
        }
        let credited = match self.result.tokens.get(signer) {
            Some(XmlSecurityToken::DerivedKey(dk)) => dk.source,
            _ => signer,
        };

        for verified_reference in verified {
            match verified_reference.target {
                ReferenceTarget::Element(node) => {
                    let element = if child_kind(doc, node) == ChildKind::SecurityTokenReference {
                        self.ensure_token(doc, node)?
                            .and_then(|i| self.result.tokens.get(i))
                            .and_then(XmlSecurityToken::element)
                            .unwrap_or(node)
                    } else {
                        node
                    };
                    self.result.signed_elements.push(SignedElement {
                        element,
                        signing_token: credited,
                        signature,
                    });
                    if let Some(signing) = self.result.tokens.get_mut(credited).and_then(XmlSecurityToken::signing_mut) {
                        signing.record(element);
                    }
                }
                ReferenceTarget::Attachment(content_id) => {
                    let headers_signed = parsed
                        .references
                        .iter()
                        .find(|r| r.uri == verified_reference.uri)
                        .is_some_and(|r| r.has_transform(ns::SWA_COMPLETE_TRANSFORM));
                    self.result.signed_parts.push(SignedPart {
                        content_id,
                        signing_token: credited,
                        headers_signed,
                    });
                    if let Some(signing) = self.result.tokens.get_mut(credited).and_then(XmlSecurityToken::signing_mut) {
                        signing.possession_proved = true;
                    }
                }
            }
        }
        self.result.validated_signature_values.push(b64().encode(&parsed.signature_value));
        Ok(())
    }

    fn finish(mut self, doc: &mut Document) -> Result<ProcessorResult> {
        if self.result.timestamp.is_none() {
            // a Timestamp may also travel as its own header block
            let outside = self.envelope.header(doc).and_then(|header| {
                doc.child_elements(header)
                    .into_iter()
                    .find(|&c| child_kind(doc, c) == ChildKind::Timestamp)
            });
            if let Some(node) = outside {
                self.result.wsu_namespace = doc.namespace_uri(node).map(str::to_owned);
                self.result.timestamp = Some(timestamp::parse_timestamp(doc, node)?);
            }
        }
        if let Some(element) = self.result.timestamp.as_ref().map(|t| t.element) {
            let signers = self.signers_of(element);
            if let Some(ts) = self.result.timestamp.as_mut() {
                ts.signed = !signers.is_empty();
                ts.signing_tokens = signers;
            }
        }
        validators::check_timestamp_signers(&self.result, self.config)?;

        if let Some(header) = self.envelope.header(doc) {
            if doc.is_empty_element(header) {
                doc.remove(header);
            }
        }
        Ok(self.result)
    }

    fn signers_of(&self, element: NodeId) -> Vec<TokenIndex> {
        let mut signers: Vec<TokenIndex> = self
            .result
            .signed_elements
            .iter()
            .filter(|s| s.element == element)
            .map(|s| s.signing_token)
            .collect();
        signers.sort_unstable();
        signers.dedup();
        signers
    }
}
