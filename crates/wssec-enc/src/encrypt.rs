#![forbid(unsafe_code)]

//! XML-Enc encryption of elements, element content and keys.
//!
//! Elements are encrypted in place: the target (or its content) is
//! serialized, encrypted under the content key and swapped for an
//! `<EncryptedData>` carrying the ciphertext. Content keys travel in an
//! `<EncryptedKey>` wrapped for the recipient's RSA key or under a
//! symmetric key-encryption key.

use base64::Engine;
use tracing::debug;
use wssec_core::{algorithm, ns, Error};
use wssec_crypto::keytransport::OaepParams;
use wssec_xml::{writer, Document, NodeId, Placement};

/// The key an `<EncryptedKey>` is encrypted for.
#[derive(Clone, Copy)]
pub enum KeyEncryptionKey<'k> {
    /// Recipient public key, for `rsa-1_5` and `rsa-oaep-mgf1p`.
    Rsa(&'k rsa::RsaPublicKey),
    /// Symmetric key-encryption key, for `kw-aes*`.
    Symmetric(&'k [u8]),
}

/// Parameters for a new `<EncryptedKey>`.
#[derive(Debug, Clone)]
pub struct EncryptedKeySpec {
    pub algorithm: String,
    pub oaep: OaepParams,
    pub id: Option<String>,
}

impl EncryptedKeySpec {
    pub fn new(algorithm: &str) -> Self {
        Self {
            algorithm: algorithm.to_owned(),
            oaep: OaepParams::default(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Handles into a created `<EncryptedKey>`.
#[derive(Debug, Clone)]
pub struct CreatedEncryptedKey {
    pub element: NodeId,
    /// Empty `ds:KeyInfo` for the caller to fill.
    pub key_info: NodeId,
    pub cipher_data: NodeId,
    /// The wrapped key exactly as base64-encoded in the CipherValue.
    pub cipher_value: Vec<u8>,
}

impl CreatedEncryptedKey {
    /// `EncryptedKeySHA1` identifier of this key.
    pub fn sha1(&self) -> String {
        crate::encrypted_key_sha1(&self.cipher_value)
    }
}

/// Handles into a created `<EncryptedData>`.
#[derive(Debug, Clone)]
pub struct CreatedEncryptedData {
    pub element: NodeId,
    /// KeyInfo, when needed, goes immediately before this node.
    pub cipher_data: NodeId,
}

/// Wrap `secret` under `kek` and emit an `<EncryptedKey>` at `at`.
pub fn create_encrypted_key(
    doc: &mut Document,
    at: Placement,
    spec: &EncryptedKeySpec,
    kek: KeyEncryptionKey<'_>,
    secret: &[u8],
) -> Result<CreatedEncryptedKey, Error> {
    let cipher_value = match (spec.algorithm.as_str(), kek) {
        (algorithm::RSA_PKCS1 | algorithm::RSA_OAEP, KeyEncryptionKey::Rsa(public_key)) => {
            let transport = wssec_crypto::keytransport::from_uri_with_params(&spec.algorithm, spec.oaep.clone())?;
            transport.encrypt(public_key, secret)?
        }
        (algorithm::KW_AES128 | algorithm::KW_AES192 | algorithm::KW_AES256, KeyEncryptionKey::Symmetric(kek)) => {
            let kw = wssec_crypto::keywrap::from_uri(&spec.algorithm)?;
            kw.wrap(kek, secret)?
        }
        (algorithm::RSA_PKCS1 | algorithm::RSA_OAEP, _) => {
            return Err(Error::Key(format!("{} needs an RSA public key", spec.algorithm)))
        }
        (algorithm::KW_AES128 | algorithm::KW_AES192 | algorithm::KW_AES256, _) => {
            return Err(Error::Key(format!("{} needs a symmetric key", spec.algorithm)))
        }
        (other, _) => return Err(Error::UnsupportedAlgorithm(format!("EncryptedKey method: {other}"))),
    };

    let element = doc.new_element_at(at, ns::ENC, "xenc", ns::node::ENCRYPTED_KEY)?;
    if let Some(id) = &spec.id {
        doc.set_attribute(element, ns::attr::ID, id);
    }
    let method = doc.append_new_element(element, ns::ENC, "xenc", ns::node::ENCRYPTION_METHOD);
    doc.set_attribute(method, ns::attr::ALGORITHM, &spec.algorithm);
    if spec.algorithm == algorithm::RSA_OAEP {
        if let Some(digest) = &spec.oaep.digest_uri {
            let dm = doc.append_new_element(method, ns::DSIG, "ds", ns::node::DIGEST_METHOD);
            doc.set_attribute(dm, ns::attr::ALGORITHM, digest);
        }
        if let Some(label) = spec.oaep.oaep_params.as_deref().filter(|l| !l.is_empty()) {
            let engine = base64::engine::general_purpose::STANDARD;
            doc.append_text_element(method, ns::ENC, "xenc", ns::node::RSA_OAEP_PARAMS, &engine.encode(label));
        }
    }
    let key_info = doc.append_new_element(element, ns::DSIG, "ds", ns::node::KEY_INFO);
    let cipher_data = append_cipher_data(doc, element, &cipher_value);

    debug!(algorithm = %spec.algorithm, "created EncryptedKey");
    Ok(CreatedEncryptedKey {
        element,
        key_info,
        cipher_data,
        cipher_value,
    })
}

/// Emit a `<ReferenceList>` at `at` with one DataReference per id.
pub fn create_reference_list(doc: &mut Document, at: Placement, ids: &[String]) -> Result<NodeId, Error> {
    let list = doc.new_element_at(at, ns::ENC, "xenc", ns::node::REFERENCE_LIST)?;
    for id in ids {
        add_data_reference(doc, list, id);
    }
    Ok(list)
}

/// Append `<DataReference URI="#id">` to a ReferenceList.
pub fn add_data_reference(doc: &mut Document, reference_list: NodeId, id: &str) -> NodeId {
    let dr = doc.append_new_element(reference_list, ns::ENC, "xenc", ns::node::DATA_REFERENCE);
    doc.set_attribute(dr, ns::attr::URI, &format!("#{id}"));
    dr
}

/// Encrypt `target` in place.
///
/// With `content_only` the element stays and its children are replaced by
/// an `<EncryptedData Type="...#Content">`; otherwise the whole element is
/// replaced by an `<EncryptedData Type="...#Element">`.
pub fn encrypt_element(
    doc: &mut Document,
    target: NodeId,
    cipher_uri: &str,
    content_only: bool,
    key: &[u8],
    id: &str,
) -> Result<CreatedEncryptedData, Error> {
    if !doc.is_element(target) {
        return Err(Error::Encryption("encryption target is not an element".into()));
    }
    let cipher = wssec_crypto::cipher::from_uri(cipher_uri)?;

    let plaintext = if content_only {
        doc.children(target)
            .into_iter()
            .map(|c| writer::serialize_standalone(doc, c))
            .collect::<String>()
    } else {
        writer::serialize_standalone(doc, target)
    };
    let ciphertext = cipher.encrypt(key, plaintext.as_bytes())?;

    let at = if content_only {
        doc.clear_children(target);
        Placement::Append(target)
    } else {
        Placement::Before(target)
    };
    let element = doc.new_element_at(at, ns::ENC, "xenc", ns::node::ENCRYPTED_DATA)?;
    if !content_only {
        doc.remove(target);
    }
    doc.set_attribute(element, ns::attr::ID, id);
    doc.set_attribute(
        element,
        ns::attr::TYPE,
        if content_only { ns::ENC_TYPE_CONTENT } else { ns::ENC_TYPE_ELEMENT },
    );
    let method = doc.append_new_element(element, ns::ENC, "xenc", ns::node::ENCRYPTION_METHOD);
    doc.set_attribute(method, ns::attr::ALGORITHM, cipher_uri);
    let cipher_data = append_cipher_data(doc, element, &ciphertext);

    debug!(id, content_only, algorithm = cipher_uri, "encrypted element");
    Ok(CreatedEncryptedData { element, cipher_data })
}

fn append_cipher_data(doc: &mut Document, parent: NodeId, value: &[u8]) -> NodeId {
    let engine = base64::engine::general_purpose::STANDARD;
    let cipher_data = doc.append_new_element(parent, ns::ENC, "xenc", ns::node::CIPHER_DATA);
    doc.append_text_element(cipher_data, ns::ENC, "xenc", ns::node::CIPHER_VALUE, &engine.encode(value));
    cipher_data
}
