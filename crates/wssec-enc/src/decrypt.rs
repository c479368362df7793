#![forbid(unsafe_code)]

//! XML-Enc decryption.
//!
//! Processing order:
//! 1. Parse `<EncryptedKey>` / `<EncryptedData>`: EncryptionMethod, KeyInfo,
//!    CipherValue, ReferenceList
//! 2. Unwrap the content key with the key the caller resolved from KeyInfo
//! 3. Decrypt the CipherValue
//! 4. Replace `<EncryptedData>` with the plaintext nodes according to Type

use base64::Engine;
use tracing::debug;
use wssec_core::{algorithm, ns, Error};
use wssec_crypto::keytransport::OaepParams;
use wssec_xml::{Document, NodeId};

/// The key an `<EncryptedKey>` is decrypted with.
#[derive(Clone, Copy)]
pub enum KeyDecryptionKey<'k> {
    Rsa(&'k rsa::RsaPrivateKey),
    Symmetric(&'k [u8]),
}

/// An `<EncryptedKey>` as read from the document.
#[derive(Debug, Clone)]
pub struct EncryptedKeyInfo {
    pub node: NodeId,
    pub id: Option<String>,
    pub algorithm: String,
    pub oaep: OaepParams,
    pub key_info: Option<NodeId>,
    pub cipher_value: Vec<u8>,
    /// Fragment identifiers of the DataReferences, without `#`.
    pub data_references: Vec<String>,
}

impl EncryptedKeyInfo {
    /// True when the key is RSA-transported rather than AES-wrapped.
    pub fn is_key_transport(&self) -> bool {
        matches!(self.algorithm.as_str(), algorithm::RSA_PKCS1 | algorithm::RSA_OAEP)
    }

    /// `EncryptedKeySHA1` identifier of this key.
    pub fn sha1(&self) -> String {
        crate::encrypted_key_sha1(&self.cipher_value)
    }
}

/// An `<EncryptedData>` as read from the document.
#[derive(Debug, Clone)]
pub struct EncryptedDataInfo {
    pub node: NodeId,
    pub id: Option<String>,
    pub type_uri: Option<String>,
    pub algorithm: String,
    pub key_info: Option<NodeId>,
    pub cipher_value: Vec<u8>,
}

impl EncryptedDataInfo {
    pub fn is_content(&self) -> bool {
        self.type_uri.as_deref() == Some(ns::ENC_TYPE_CONTENT)
    }
}

fn encryption_method(doc: &Document, node: NodeId) -> Result<(NodeId, String), Error> {
    let method = doc
        .find_child(node, ns::ENC, ns::node::ENCRYPTION_METHOD)
        .ok_or_else(|| Error::MissingElement("EncryptionMethod".into()))?;
    let uri = doc
        .attribute(method, ns::attr::ALGORITHM)
        .ok_or_else(|| Error::MissingAttribute("Algorithm on EncryptionMethod".into()))?;
    Ok((method, uri.to_owned()))
}

fn read_cipher_value(doc: &Document, node: NodeId) -> Result<Vec<u8>, Error> {
    let cipher_data = doc
        .find_child(node, ns::ENC, ns::node::CIPHER_DATA)
        .ok_or_else(|| Error::MissingElement("CipherData".into()))?;
    let cipher_value = doc
        .find_child(cipher_data, ns::ENC, ns::node::CIPHER_VALUE)
        .ok_or_else(|| Error::DocumentFormat("only inline CipherValue is supported".into()))?;
    let clean: String = doc.text(cipher_value).chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(format!("CipherValue: {e}")))
}

fn read_oaep_params(doc: &Document, method: NodeId) -> Result<OaepParams, Error> {
    let mut params = OaepParams::default();
    if let Some(dm) = doc.find_child(method, ns::DSIG, ns::node::DIGEST_METHOD) {
        params.digest_uri = doc.attribute(dm, ns::attr::ALGORITHM).map(str::to_owned);
    }
    if let Some(p) = doc.find_child(method, ns::ENC, ns::node::RSA_OAEP_PARAMS) {
        let clean: String = doc.text(p).chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(clean)
            .map_err(|e| Error::Base64(format!("OAEPparams: {e}")))?;
        params.oaep_params = Some(bytes);
    }
    Ok(params)
}

/// Read an `xenc:EncryptedKey` element.
pub fn parse_encrypted_key(doc: &Document, node: NodeId) -> Result<EncryptedKeyInfo, Error> {
    if !doc.is_named(node, ns::ENC, ns::node::ENCRYPTED_KEY) {
        return Err(Error::XmlStructure("expected xenc:EncryptedKey".into()));
    }
    let (method, algorithm) = encryption_method(doc, node)?;
    let oaep = read_oaep_params(doc, method)?;
    let data_references = doc
        .find_child(node, ns::ENC, ns::node::REFERENCE_LIST)
        .map(|list| data_references(doc, list))
        .transpose()?
        .unwrap_or_default();
    Ok(EncryptedKeyInfo {
        node,
        id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
        algorithm,
        oaep,
        key_info: doc.find_child(node, ns::DSIG, ns::node::KEY_INFO),
        cipher_value: read_cipher_value(doc, node)?,
        data_references,
    })
}

/// Fragment identifiers named by a `<ReferenceList>`'s DataReferences.
///
/// Only same-document `#id` references are accepted.
pub fn data_references(doc: &Document, reference_list: NodeId) -> Result<Vec<String>, Error> {
    doc.find_children(reference_list, ns::ENC, ns::node::DATA_REFERENCE)
        .into_iter()
        .map(|dr| {
            let uri = doc
                .attribute(dr, ns::attr::URI)
                .ok_or_else(|| Error::MissingAttribute("URI on DataReference".into()))?;
            wssec_xml::xpath::parse_bare_name_ref(uri).map(str::to_owned)
        })
        .collect()
}

/// Read an `xenc:EncryptedData` element.
pub fn parse_encrypted_data(doc: &Document, node: NodeId) -> Result<EncryptedDataInfo, Error> {
    if !doc.is_named(node, ns::ENC, ns::node::ENCRYPTED_DATA) {
        return Err(Error::XmlStructure("expected xenc:EncryptedData".into()));
    }
    let (_, algorithm) = encryption_method(doc, node)?;
    Ok(EncryptedDataInfo {
        node,
        id: doc.element_id(node).map(str::to_owned),
        type_uri: doc.attribute(node, ns::attr::TYPE).map(str::to_owned),
        algorithm,
        key_info: doc.find_child(node, ns::DSIG, ns::node::KEY_INFO),
        cipher_value: read_cipher_value(doc, node)?,
    })
}

/// Recover the key carried by an EncryptedKey.
pub fn unwrap_key(info: &EncryptedKeyInfo, kdk: KeyDecryptionKey<'_>) -> Result<Vec<u8>, Error> {
    match (info.algorithm.as_str(), kdk) {
        (algorithm::RSA_PKCS1 | algorithm::RSA_OAEP, KeyDecryptionKey::Rsa(private_key)) => {
            let transport = wssec_crypto::keytransport::from_uri_with_params(&info.algorithm, info.oaep.clone())?;
            transport.decrypt(private_key, &info.cipher_value)
        }
        (algorithm::KW_AES128 | algorithm::KW_AES192 | algorithm::KW_AES256, KeyDecryptionKey::Symmetric(kek)) => {
            let kw = wssec_crypto::keywrap::from_uri(&info.algorithm)?;
            kw.unwrap(kek, &info.cipher_value)
        }
        (algorithm::RSA_PKCS1 | algorithm::RSA_OAEP | algorithm::KW_AES128 | algorithm::KW_AES192 | algorithm::KW_AES256, _) => {
            Err(Error::Key(format!("wrong key type for {}", info.algorithm)))
        }
        (other, _) => Err(Error::UnsupportedAlgorithm(format!("EncryptedKey method: {other}"))),
    }
}

/// Decrypt the CipherValue of an EncryptedData.
pub fn decrypt_data(info: &EncryptedDataInfo, key: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = wssec_crypto::cipher::from_uri(&info.algorithm)?;
    cipher.decrypt(key, &info.cipher_value)
}

/// Put the plaintext nodes where the EncryptedData was.
///
/// Element-type data must decrypt to exactly one element. Plaintext that is
/// not well-formed is reported as a decryption failure.
pub fn replace_encrypted_data(doc: &mut Document, info: &EncryptedDataInfo, plaintext: &[u8]) -> Result<Vec<NodeId>, Error> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| Error::Decryption("plaintext is not UTF-8".into()))?;
    let context = doc
        .parent(info.node)
        .ok_or_else(|| Error::XmlStructure("EncryptedData has no parent".into()))?;
    let nodes = doc
        .parse_fragment(text, context)
        .map_err(|e| Error::Decryption(format!("plaintext is not well-formed: {e}")))?;
    if !info.is_content() && nodes.iter().filter(|n| doc.is_element(**n)).count() != 1 {
        return Err(Error::Decryption("element plaintext must hold exactly one element".into()));
    }
    doc.replace(info.node, &nodes)?;
    Ok(nodes)
}

/// Result of decrypting one EncryptedData in place.
#[derive(Debug, Clone)]
pub struct DecryptedData {
    pub info: EncryptedDataInfo,
    /// The nodes now standing where the EncryptedData was.
    pub nodes: Vec<NodeId>,
}

impl DecryptedData {
    /// The decrypted element for element-type data.
    pub fn element(&self, doc: &Document) -> Option<NodeId> {
        if self.info.is_content() {
            return None;
        }
        self.nodes.iter().copied().find(|n| doc.is_element(*n))
    }
}

/// Parse, decrypt and replace an EncryptedData with `key`.
pub fn decrypt_encrypted_data(doc: &mut Document, node: NodeId, key: &[u8]) -> Result<DecryptedData, Error> {
    let info = parse_encrypted_data(doc, node)?;
    let plaintext = decrypt_data(&info, key)?;
    let nodes = replace_encrypted_data(doc, &info, &plaintext)?;
    debug!(id = info.id.as_deref().unwrap_or(""), algorithm = %info.algorithm, "decrypted EncryptedData");
    Ok(DecryptedData { info, nodes })
}
