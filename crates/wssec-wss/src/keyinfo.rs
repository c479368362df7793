#![forbid(unsafe_code)]

//! SecurityTokenReference and KeyInfo, in both directions.
//!
//! The decorator describes a key with a [`KeyReference`] and writes it
//! under a KeyInfo; the processor reads any KeyInfo or STR back into a
//! [`TokenReference`] and leaves resolution to its token table.

use base64::Engine;
use wssec_core::{ns, Error, Result};
use wssec_keys::Certificate;
use wssec_xml::{xpath, Document, NodeId};

use crate::requirements::KeyInfoInclusionType;
use crate::token::SamlVersion;

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// How a newly written KeyInfo names its key.
#[derive(Debug, Clone, Copy)]
pub enum KeyReference<'a> {
    /// `wsse:Reference` to a BinarySecurityToken carrying an X.509v3 cert.
    BinarySecurityToken(&'a str),
    Ski(&'a Certificate),
    IssuerSerial(&'a Certificate),
    /// `ds:KeyName` with the subject DN, outside any STR.
    KeyName(&'a Certificate),
    Thumbprint(&'a Certificate),
    /// KeyIdentifier carrying the whole certificate.
    X509Certificate(&'a Certificate),
    EncryptedKeySha1(&'a str),
    /// `wsse:Reference` to an EncryptedKey by id.
    EncryptedKey(&'a str),
    /// `wsse:Reference` to a DerivedKeyToken by id, typed for the WS-SC
    /// namespace it was written in.
    DerivedKey { id: &'a str, sc_ns: &'a str },
    /// `wsse:Reference` to a SecurityContextToken, either `#wsu:Id` or the
    /// bare context identifier.
    SecurityContext { uri: &'a str, sc_ns: &'a str },
    SamlAssertion { id: &'a str, version: SamlVersion },
}

impl KeyReference<'_> {
    /// The inclusion type this reference corresponds to, for X.509 keys.
    pub fn inclusion_type(&self) -> Option<KeyInfoInclusionType> {
        match self {
            Self::BinarySecurityToken(_) => Some(KeyInfoInclusionType::Cert),
            Self::Ski(_) => Some(KeyInfoInclusionType::StrSki),
            Self::IssuerSerial(_) => Some(KeyInfoInclusionType::IssuerSerial),
            Self::KeyName(_) => Some(KeyInfoInclusionType::KeyName),
            Self::Thumbprint(_) => Some(KeyInfoInclusionType::Thumbprint),
            Self::EncryptedKeySha1(_) => Some(KeyInfoInclusionType::EncryptedKeySha1),
            _ => None,
        }
    }
}

/// Append a new `wsse:SecurityTokenReference` to `parent`.
pub fn append_security_token_reference(doc: &mut Document, parent: NodeId) -> NodeId {
    doc.append_new_element(parent, ns::WSSE, "wsse", ns::node::SECURITY_TOKEN_REFERENCE)
}

fn append_reference(doc: &mut Document, str_node: NodeId, uri: &str, value_type: Option<&str>) -> NodeId {
    let reference = doc.append_new_element(str_node, ns::WSSE, "wsse", "Reference");
    doc.set_attribute(reference, ns::attr::URI, uri);
    if let Some(vt) = value_type {
        doc.set_attribute(reference, ns::attr::VALUE_TYPE, vt);
    }
    reference
}

fn append_key_identifier(doc: &mut Document, str_node: NodeId, value_type: &str, value: &str, base64: bool) -> NodeId {
    let ki = doc.append_text_element(str_node, ns::WSSE, "wsse", ns::node::KEY_IDENTIFIER, value);
    doc.set_attribute(ki, ns::attr::VALUE_TYPE, value_type);
    if base64 {
        doc.set_attribute(ki, ns::attr::ENCODING_TYPE, ns::ENCODING_BASE64);
    }
    ki
}

/// Write `reference` into `parent` (normally a `ds:KeyInfo`). Returns the
/// STR, or the `ds:KeyName` for [`KeyReference::KeyName`].
pub fn append_key_reference(doc: &mut Document, parent: NodeId, reference: &KeyReference<'_>) -> Result<NodeId> {
    if let KeyReference::KeyName(cert) = reference {
        return Ok(doc.append_text_element(parent, ns::DSIG, "ds", ns::node::KEY_NAME, cert.subject_name()));
    }
    let str_node = append_security_token_reference(doc, parent);
    match *reference {
        KeyReference::BinarySecurityToken(id) => {
            append_reference(doc, str_node, &format!("#{id}"), Some(ns::VALUE_TYPE_X509V3));
        }
        KeyReference::Ski(cert) => {
            let ski = cert.subject_key_identifier().ok_or_else(|| {
                Error::Decorator(format!("certificate {} has no SubjectKeyIdentifier", cert.subject_name()))
            })?;
            append_key_identifier(doc, str_node, ns::VALUE_TYPE_SKI, &b64().encode(ski), true);
        }
        KeyReference::IssuerSerial(cert) => {
            let data = doc.append_new_element(str_node, ns::DSIG, "ds", ns::node::X509_DATA);
            let pair = doc.append_new_element(data, ns::DSIG, "ds", ns::node::X509_ISSUER_SERIAL);
            doc.append_text_element(pair, ns::DSIG, "ds", ns::node::X509_ISSUER_NAME, cert.issuer_name());
            doc.append_text_element(pair, ns::DSIG, "ds", ns::node::X509_SERIAL_NUMBER, cert.serial_number());
        }
        KeyReference::Thumbprint(cert) => {
            append_key_identifier(doc, str_node, ns::VALUE_TYPE_THUMBPRINT, &b64().encode(cert.thumbprint_sha1()), true);
        }
        KeyReference::X509Certificate(cert) => {
            append_key_identifier(doc, str_node, ns::VALUE_TYPE_X509V3, &b64().encode(cert.der()), true);
        }
        KeyReference::EncryptedKeySha1(sha1) => {
            doc.set_attribute_ns(str_node, ns::WSSE11, "wsse11", ns::attr::TOKEN_TYPE, ns::VALUE_TYPE_ENCRYPTED_KEY);
            append_key_identifier(doc, str_node, ns::VALUE_TYPE_ENCRYPTED_KEY_SHA1, sha1, true);
        }
        KeyReference::EncryptedKey(id) => {
            append_reference(doc, str_node, &format!("#{id}"), Some(ns::VALUE_TYPE_ENCRYPTED_KEY));
        }
        KeyReference::DerivedKey { id, sc_ns } => {
            append_reference(doc, str_node, &format!("#{id}"), Some(&ns::value_type_dkt(sc_ns)));
        }
        KeyReference::SecurityContext { uri, sc_ns } => {
            append_reference(doc, str_node, uri, Some(&ns::value_type_sct(sc_ns)));
        }
        KeyReference::SamlAssertion { id, version } => {
            let value_type = match version {
                SamlVersion::V1_1 => ns::VALUE_TYPE_SAML11_ID,
                SamlVersion::V2_0 => {
                    doc.set_attribute_ns(str_node, ns::WSSE11, "wsse11", ns::attr::TOKEN_TYPE, ns::TOKEN_TYPE_SAML20);
                    ns::VALUE_TYPE_SAML20_ID
                }
            };
            append_key_identifier(doc, str_node, value_type, id, false);
        }
        KeyReference::KeyName(_) => {}
    }
    Ok(str_node)
}

/// A key reference as read from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenReference {
    /// Same-document reference, fragment identifier only.
    Local(String),
    /// A reference URI without `#`: a SecurityContextToken identifier.
    ContextIdentifier(String),
    Ski(Vec<u8>),
    Thumbprint(Vec<u8>),
    /// Certificate carried inline, in a KeyIdentifier or `ds:X509Data`.
    Certificate(Vec<u8>),
    EncryptedKeySha1(String),
    SamlAssertionId(String),
    IssuerSerial { issuer: String, serial: String },
    KeyName(String),
}

impl TokenReference {
    /// The inclusion type a signer used when writing this reference.
    pub fn inclusion_type(&self) -> Option<KeyInfoInclusionType> {
        match self {
            Self::Ski(_) => Some(KeyInfoInclusionType::StrSki),
            Self::Thumbprint(_) => Some(KeyInfoInclusionType::Thumbprint),
            Self::IssuerSerial { .. } => Some(KeyInfoInclusionType::IssuerSerial),
            Self::KeyName(_) => Some(KeyInfoInclusionType::KeyName),
            Self::EncryptedKeySha1(_) => Some(KeyInfoInclusionType::EncryptedKeySha1),
            _ => None,
        }
    }
}

fn decode_b64(text: &str, what: &str) -> Result<Vec<u8>> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    b64().decode(clean).map_err(|e| Error::Base64(format!("{what}: {e}")))
}

fn is_wsse_named(doc: &Document, node: NodeId, local: &str) -> bool {
    doc.local_name(node) == Some(local) && doc.namespace_uri(node).is_some_and(ns::is_wsse)
}

fn parse_x509_data(doc: &Document, data: NodeId) -> Result<Option<TokenReference>> {
    if let Some(pair) = doc.find_child(data, ns::DSIG, ns::node::X509_ISSUER_SERIAL) {
        let issuer = doc
            .find_child(pair, ns::DSIG, ns::node::X509_ISSUER_NAME)
            .map(|n| doc.text(n).trim().to_owned())
            .ok_or_else(|| Error::MissingElement(ns::node::X509_ISSUER_NAME.into()))?;
        let serial = doc
            .find_child(pair, ns::DSIG, ns::node::X509_SERIAL_NUMBER)
            .map(|n| doc.text(n).trim().to_owned())
            .ok_or_else(|| Error::MissingElement(ns::node::X509_SERIAL_NUMBER.into()))?;
        return Ok(Some(TokenReference::IssuerSerial { issuer, serial }));
    }
    if let Some(cert) = doc.find_child(data, ns::DSIG, ns::node::X509_CERTIFICATE) {
        return Ok(Some(TokenReference::Certificate(decode_b64(&doc.text(cert), "X509Certificate")?)));
    }
    if let Some(ski) = doc.find_child(data, ns::DSIG, ns::node::X509_SKI) {
        return Ok(Some(TokenReference::Ski(decode_b64(&doc.text(ski), "X509SKI")?)));
    }
    Ok(None)
}

/// Read a `wsse:SecurityTokenReference`.
pub fn parse_security_token_reference(doc: &Document, str_node: NodeId) -> Result<TokenReference> {
    for child in doc.child_elements(str_node) {
        if is_wsse_named(doc, child, "Reference") {
            let uri = doc.attribute(child, ns::attr::URI).unwrap_or("").trim();
            if uri.starts_with('#') {
                return Ok(TokenReference::Local(xpath::parse_bare_name_ref(uri)?.to_owned()));
            }
            if uri.is_empty() {
                return Err(Error::DocumentFormat("empty SecurityTokenReference URI".into()));
            }
            return Ok(TokenReference::ContextIdentifier(uri.to_owned()));
        }
        if is_wsse_named(doc, child, ns::node::KEY_IDENTIFIER) {
            let value_type = doc.attribute(child, ns::attr::VALUE_TYPE).unwrap_or("");
            let text = doc.text(child);
            return match value_type {
                ns::VALUE_TYPE_SKI => Ok(TokenReference::Ski(decode_b64(&text, "SKI KeyIdentifier")?)),
                ns::VALUE_TYPE_THUMBPRINT => {
                    Ok(TokenReference::Thumbprint(decode_b64(&text, "thumbprint KeyIdentifier")?))
                }
                ns::VALUE_TYPE_X509V3 => {
                    Ok(TokenReference::Certificate(decode_b64(&text, "X509v3 KeyIdentifier")?))
                }
                ns::VALUE_TYPE_ENCRYPTED_KEY_SHA1 => Ok(TokenReference::EncryptedKeySha1(text.trim().to_owned())),
                ns::VALUE_TYPE_SAML11_ID | ns::VALUE_TYPE_SAML20_ID => {
                    Ok(TokenReference::SamlAssertionId(text.trim().to_owned()))
                }
                other => Err(Error::DocumentFormat(format!("unsupported KeyIdentifier ValueType: {other}"))),
            };
        }
        if doc.is_named(child, ns::DSIG, ns::node::X509_DATA) {
            if let Some(found) = parse_x509_data(doc, child)? {
                return Ok(found);
            }
        }
    }
    Err(Error::DocumentFormat("SecurityTokenReference names no token".into()))
}

/// Read the first usable key reference under a `ds:KeyInfo`, or `None`
/// when it carries nothing this engine understands.
pub fn parse_key_info(doc: &Document, key_info: NodeId) -> Result<Option<TokenReference>> {
    for child in doc.child_elements(key_info) {
        if is_wsse_named(doc, child, ns::node::SECURITY_TOKEN_REFERENCE) {
            return parse_security_token_reference(doc, child).map(Some);
        }
        if doc.is_named(child, ns::DSIG, ns::node::KEY_NAME) {
            return Ok(Some(TokenReference::KeyName(doc.text(child).trim().to_owned())));
        }
        if doc.is_named(child, ns::DSIG, ns::node::X509_DATA) {
            if let Some(found) = parse_x509_data(doc, child)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}
