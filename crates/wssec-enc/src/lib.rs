#![forbid(unsafe_code)]

//! XML Encryption (XML-Enc) for WS-Security messages.
//!
//! Encrypts elements or their content in place and carries content keys in
//! `<EncryptedKey>` elements; the reverse path parses, unwraps and
//! decrypts them.

pub mod decrypt;
pub mod encrypt;

pub use decrypt::{
    decrypt_encrypted_data, parse_encrypted_data, parse_encrypted_key, unwrap_key, DecryptedData,
    EncryptedDataInfo, EncryptedKeyInfo, KeyDecryptionKey,
};
pub use encrypt::{
    create_encrypted_key, create_reference_list, encrypt_element, CreatedEncryptedData, CreatedEncryptedKey,
    EncryptedKeySpec, KeyEncryptionKey,
};

use base64::Engine;

/// `EncryptedKeySHA1` identifier: base64 of the SHA-1 of the wrapped key octets.
pub fn encrypted_key_sha1(cipher_value: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(wssec_crypto::digest::sha1(cipher_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wssec_core::{algorithm, ns, Error, ErrorKind};
    use wssec_xml::{Document, Placement};

    const DOC: &str = r#"<e:Envelope xmlns:e="http://schemas.xmlsoap.org/soap/envelope/"><e:Header><s/></e:Header><e:Body><p:order xmlns:p="urn:p"><p:item n="1">widget</p:item></p:order></e:Body></e:Envelope>"#;

    fn parts(doc: &Document) -> (wssec_xml::NodeId, wssec_xml::NodeId) {
        let env = doc.document_element().unwrap();
        let kids = doc.child_elements(env);
        (doc.child_elements(kids[0])[0], kids[1])
    }

    fn bob() -> wssec_keys::Key {
        wssec_keys::loader::load_private_key_pem(include_bytes!("../../../test-data/keys/bob-rsa-key.pem")).unwrap()
    }

    #[test]
    fn test_element_round_trip_under_encrypted_key() {
        let mut doc = Document::parse(DOC).unwrap();
        let (sec, body) = parts(&doc);
        let order = doc.child_elements(body)[0];
        let key = bob();

        let content_key = wssec_crypto::cipher::generate_content_key(algorithm::AES128_CBC).unwrap();
        let ek = create_encrypted_key(
            &mut doc,
            Placement::Append(sec),
            &EncryptedKeySpec::new(algorithm::RSA_PKCS1).with_id("EK-1"),
            KeyEncryptionKey::Rsa(key.rsa_public_key().unwrap()),
            &content_key,
        )
        .unwrap();
        let ed = encrypt_element(&mut doc, order, algorithm::AES128_CBC, false, &content_key, "ED-1").unwrap();
        create_reference_list(&mut doc, Placement::Append(ek.element), &["ED-1".to_owned()]).unwrap();
        assert!(!doc.to_xml().contains("widget"));
        assert_eq!(doc.parent(ed.element), Some(body));

        let mut doc = Document::parse(&doc.to_xml()).unwrap();
        let ek_node = doc.find_descendant(doc.root(), ns::ENC, ns::node::ENCRYPTED_KEY).unwrap();
        let info = parse_encrypted_key(&doc, ek_node).unwrap();
        assert_eq!(info.data_references, vec!["ED-1".to_owned()]);
        assert_eq!(info.sha1(), ek.sha1());
        let secret = unwrap_key(&info, KeyDecryptionKey::Rsa(key.rsa_private_key().unwrap())).unwrap();
        assert_eq!(secret, content_key);

        let ed_node = doc.find_by_id("ED-1").unwrap();
        let decrypted = decrypt_encrypted_data(&mut doc, ed_node, &secret).unwrap();
        let order = decrypted.element(&doc).unwrap();
        assert!(doc.is_named(order, "urn:p", "order"));
        assert_eq!(doc.text(order), "widget");
    }

    #[test]
    fn test_content_round_trip_keeps_parent() {
        let mut doc = Document::parse(DOC).unwrap();
        let (_, body) = parts(&doc);
        let key = [9u8; 32];
        encrypt_element(&mut doc, body, algorithm::AES256_GCM, true, &key, "ED-2").unwrap();
        let ed = doc.child_elements(body)[0];
        assert!(doc.is_named(ed, ns::ENC, ns::node::ENCRYPTED_DATA));
        assert_eq!(doc.attribute(ed, ns::attr::TYPE), Some(ns::ENC_TYPE_CONTENT));

        let out = decrypt_encrypted_data(&mut doc, ed, &key).unwrap();
        assert!(out.element(&doc).is_none());
        let order = doc.child_elements(body)[0];
        assert_eq!(doc.attribute(doc.child_elements(order)[0], "n"), Some("1"));
    }

    #[test]
    fn test_wrong_content_key_fails() {
        let mut doc = Document::parse(DOC).unwrap();
        let (_, body) = parts(&doc);
        let ed = encrypt_element(&mut doc, body, algorithm::AES128_GCM, true, &[1u8; 16], "ED-3").unwrap();
        let err = decrypt_encrypted_data(&mut doc, ed.element, &[2u8; 16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[test]
    fn test_symmetric_wrap_and_key_type_mismatch() {
        let mut doc = Document::parse(DOC).unwrap();
        let (sec, _) = parts(&doc);
        let kek = [3u8; 16];
        let secret = [4u8; 16];
        let ek = create_encrypted_key(
            &mut doc,
            Placement::Append(sec),
            &EncryptedKeySpec::new(algorithm::KW_AES128),
            KeyEncryptionKey::Symmetric(&kek),
            &secret,
        )
        .unwrap();
        let info = parse_encrypted_key(&doc, ek.element).unwrap();
        assert!(!info.is_key_transport());
        assert_eq!(unwrap_key(&info, KeyDecryptionKey::Symmetric(&kek)).unwrap(), secret);

        let key = bob();
        let err = unwrap_key(&info, KeyDecryptionKey::Rsa(key.rsa_private_key().unwrap())).unwrap_err();
        assert!(matches!(err, Error::Key(_)));
    }

    #[test]
    fn test_oaep_parameters_round_trip() {
        let mut doc = Document::parse(DOC).unwrap();
        let (sec, _) = parts(&doc);
        let key = bob();
        let mut spec = EncryptedKeySpec::new(algorithm::RSA_OAEP);
        spec.oaep.digest_uri = Some(algorithm::SHA1.into());
        spec.oaep.oaep_params = Some(b"label".to_vec());
        let ek = create_encrypted_key(
            &mut doc,
            Placement::Append(sec),
            &spec,
            KeyEncryptionKey::Rsa(key.rsa_public_key().unwrap()),
            &[5u8; 32],
        )
        .unwrap();
        let info = parse_encrypted_key(&doc, ek.element).unwrap();
        assert_eq!(info.oaep.oaep_params.as_deref(), Some(&b"label"[..]));
        let secret = unwrap_key(&info, KeyDecryptionKey::Rsa(key.rsa_private_key().unwrap())).unwrap();
        assert_eq!(secret, vec![5u8; 32]);
    }

    #[test]
    fn test_xpointer_data_reference_rejected() {
        let doc = Document::parse(&format!(
            r##"<xenc:ReferenceList xmlns:xenc="{}"><xenc:DataReference URI="#xpointer(id('a'))"/></xenc:ReferenceList>"##,
            ns::ENC
        ))
        .unwrap();
        let list = doc.document_element().unwrap();
        let err = decrypt::data_references(&doc, list).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentFormat);
    }

    #[test]
    fn test_encrypted_key_sha1_is_base64_sha1() {
        assert_eq!(encrypted_key_sha1(b"abc"), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
    }
}
