//! Altered ciphertext in both decryption-failure modes.

mod common;

use base64::Engine;
use common::*;
use wssec::core::{algorithm, ns, ErrorKind};
use wssec::wss::{DecorationRequirements, EncryptionConfig, WssConfig, WssDecorator, WssProcessor};
use wssec::xml::Document;

fn gcm_message(sign: bool) -> Document {
    let mut doc = message();
    let mut req = DecorationRequirements::new()
        .with_sender(cert(ALICE_CERT), key(ALICE_KEY))
        .with_recipient(cert(BOB_CERT));
    if sign {
        req.sign(body(&doc));
    }
    req.encrypt(body(&doc), EncryptionConfig::content().with_algorithm(algorithm::AES128_GCM));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
    wire(&doc)
}

/// Flip one byte in the middle of the body's ciphertext.
fn flip_ciphertext_byte(doc: &mut Document) {
    let data = doc.find_child(body(doc), ns::ENC, ns::node::ENCRYPTED_DATA).unwrap();
    let value = doc.find_descendant(data, ns::ENC, ns::node::CIPHER_VALUE).unwrap();
    let b64 = base64::engine::general_purpose::STANDARD;
    let mut bytes = b64.decode(doc.text(value).trim()).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x01;
    doc.set_text(value, &b64.encode(bytes));
}

fn strict() -> WssProcessor {
    WssProcessor::new(WssConfig {
        decryption_always_succeeds: false,
        ..WssConfig::default()
    })
}

#[test]
fn gcm_tamper_is_a_decryption_error_when_not_masked() {
    let mut doc = gcm_message(false);
    flip_ciphertext_byte(&mut doc);
    let err = strict()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);
}

#[test]
fn gcm_tamper_is_not_distinguishable_when_masked() {
    // without a signature the damaged element just disappears
    let mut doc = gcm_message(false);
    flip_ciphertext_byte(&mut doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();
    assert!(result.encrypted_elements.is_empty());
    assert!(doc.find_child(body(&doc), ns::ENC, ns::node::ENCRYPTED_DATA).is_none());

    // with one, the failure surfaces only as the masked error
    let mut doc = gcm_message(true);
    flip_ciphertext_byte(&mut doc);
    let err = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap_err();
    assert!(err.is_masked());
    assert_ne!(err.kind(), ErrorKind::Decryption);
    assert_ne!(err.kind(), ErrorKind::DocumentFormat);
}

#[test]
fn wrong_recipient_key_is_masked() {
    let mut doc = gcm_message(true);
    // a resolver that maps bob's certificate to carol's key
    let confused = wssec::keys::SimpleSecurityTokenResolver::new()
        .with_certificate(cert(BOB_CERT), Some(key(CAROL_KEY)));
    let err = WssProcessor::default()
        .process(&mut doc, None, &confused, None)
        .unwrap_err();
    assert!(err.is_masked());

    let mut doc = gcm_message(true);
    let err = strict().process(&mut doc, None, &confused, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decryption);
}

#[test]
fn signature_method_swapped_to_hmac_is_masked() {
    let signed = || {
        let mut doc = message();
        let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
        req.sign(body(&doc));
        WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
        let mut doc = wire(&doc);
        let method = doc.find_descendant(doc.root(), ns::DSIG, ns::node::SIGNATURE_METHOD).unwrap();
        doc.set_attribute(method, "Algorithm", algorithm::HMAC_SHA1);
        doc
    };

    // the certificate's RSA key is the wrong type for HMAC
    let mut doc = signed();
    let err = strict()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap_err();
    assert!(!err.is_masked());
    assert_eq!(err.kind(), ErrorKind::Generic);

    let mut doc = signed();
    let err = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap_err();
    assert!(err.is_masked());
}
