//! Decorate a message, send it over the wire, process it, and compare what
//! the processor reports with what was requested.

mod common;

use common::*;
use wssec::core::{algorithm, ns};
use wssec::keys::{SecurityTokenResolver, SimpleSecurityTokenResolver};
use wssec::wss::{
    DecorationRequirements, EncryptionConfig, Envelope, KeyInfoInclusionType, UsernameTokenCredentials,
    WssDecorator, WssProcessor,
};
use wssec::xml::Document;

fn alice_to_bob() -> DecorationRequirements {
    DecorationRequirements::new()
        .with_sender(cert(ALICE_CERT), key(ALICE_KEY))
        .with_recipient(cert(BOB_CERT))
}

fn signature_method(doc: &Document) -> String {
    let method = doc
        .find_descendant(doc.root(), ns::DSIG, ns::node::SIGNATURE_METHOD)
        .unwrap();
    doc.attribute(method, ns::attr::ALGORITHM).unwrap().to_owned()
}

#[test]
fn signed_and_encrypted_sets_are_reported() {
    let mut doc = message();
    let mut req = alice_to_bob();
    req.sign(shop(&doc, "Item"));
    req.encrypt(shop(&doc, "Card"), EncryptionConfig::element());
    req.encrypt(shop(&doc, "Note"), EncryptionConfig::content());
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    assert!(!doc.to_xml().contains("4111"));
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();

    let item = shop(&doc, "Item");
    let card = shop(&doc, "Card");
    let note = shop(&doc, "Note");
    let order = shop(&doc, "Order");
    assert!(result.is_signed(item));
    assert!(!result.is_signed(card));
    assert!(!result.is_signed(order));
    assert!(result.is_encrypted(card));
    assert!(!result.is_encrypted(note));
    assert!(!result.is_signed(note));
    assert_eq!(doc.text(card), "4111");
    assert_eq!(result.encrypted_elements.len(), 1);

    let header = Envelope::of(&doc).unwrap().header(&doc).unwrap();
    let message_id = doc.find_child(header, ns::WSA_10, ns::node::MESSAGE_ID).unwrap();
    assert!(result.is_signed(message_id));
    assert!(result.timestamp.as_ref().unwrap().signed);
}

#[test]
fn empty_element_is_encrypted_as_a_whole() {
    let mut doc = message();
    let mut req = alice_to_bob();
    req.encrypt(shop(&doc, "Note"), EncryptionConfig::element());
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();
    assert!(result.is_encrypted(shop(&doc, "Note")));
    assert!(result.signed_elements.is_empty());
}

#[test]
fn encrypted_body_content_reports_body() {
    let mut doc = message();
    let mut req = alice_to_bob();
    req.encrypt(body(&doc), EncryptionConfig::content().with_algorithm(algorithm::AES256_GCM));
    req.key_encryption_algorithm = algorithm::RSA_OAEP.to_owned();
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();
    let b = body(&doc);
    assert!(result.is_encrypted(b));
    assert_eq!(result.encrypted_elements[0].algorithm, algorithm::AES256_GCM);
    assert_eq!(doc.text(shop(&doc, "Item")), "book");
}

#[test]
fn signature_method_follows_key_type_and_digest() {
    let digests = [None, Some(algorithm::SHA1), Some(algorithm::SHA256), Some(algorithm::SHA384), Some(algorithm::SHA512)];
    let table: [(&[u8], &[u8], [&str; 5]); 4] = [
        (
            ALICE_CERT,
            ALICE_KEY,
            [algorithm::RSA_SHA1, algorithm::RSA_SHA1, algorithm::RSA_SHA256, algorithm::RSA_SHA384, algorithm::RSA_SHA512],
        ),
        (
            EC_P256_CERT,
            EC_P256_KEY,
            [
                algorithm::ECDSA_SHA384,
                algorithm::ECDSA_SHA1,
                algorithm::ECDSA_SHA256,
                algorithm::ECDSA_SHA384,
                algorithm::ECDSA_SHA512,
            ],
        ),
        (
            EC_P384_CERT,
            EC_P384_KEY,
            [
                algorithm::ECDSA_SHA384,
                algorithm::ECDSA_SHA1,
                algorithm::ECDSA_SHA256,
                algorithm::ECDSA_SHA384,
                algorithm::ECDSA_SHA512,
            ],
        ),
        // DSA signs with SHA-1 whatever digest is asked for
        (DSA_CERT, DSA_KEY, [algorithm::DSA_SHA1; 5]),
    ];

    for (cert_pem, key_pem, expected) in table {
        for (digest, expected) in digests.iter().zip(expected) {
            let mut doc = message();
            let mut req = DecorationRequirements::new().with_sender(cert(cert_pem), key(key_pem));
            req.signature_digest = digest.map(str::to_owned);
            req.sign(body(&doc));
            WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

            let mut doc = wire(&doc);
            assert_eq!(signature_method(&doc), expected, "{digest:?}");
            let result = WssProcessor::default()
                .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
                .unwrap();
            assert!(result.is_signed(body(&doc)), "{expected}");
        }
    }
}

#[test]
fn key_info_inclusion_type_round_trips() {
    let types = [
        KeyInfoInclusionType::Cert,
        KeyInfoInclusionType::StrSki,
        KeyInfoInclusionType::IssuerSerial,
        KeyInfoInclusionType::KeyName,
        KeyInfoInclusionType::Thumbprint,
        KeyInfoInclusionType::EncryptedKeySha1,
    ];
    for inclusion in types {
        let by_sha1 = inclusion == KeyInfoInclusionType::EncryptedKeySha1;
        let mut doc = message();
        let mut req = if by_sha1 {
            alice_to_bob()
        } else {
            DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY))
        };
        req.key_info_inclusion_type = inclusion;
        req.sign(body(&doc));
        let sent = WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

        let mut doc = wire(&doc);
        let has_bst = doc
            .find_descendant(doc.root(), ns::WSSE, ns::node::BINARY_SECURITY_TOKEN)
            .is_some();
        assert_eq!(has_bst, inclusion.needs_binary_security_token());

        let known = if by_sha1 {
            holder(BOB_CERT, BOB_KEY)
        } else {
            SimpleSecurityTokenResolver::new().with_certificate(cert(ALICE_CERT), None)
        };
        let result = WssProcessor::default().process(&mut doc, None, &known, None).unwrap();
        let signer = result.signers_of(body(&doc));
        if by_sha1 {
            let ek = signer[0].as_encrypted_key().unwrap();
            assert_eq!(ek.reference_type, Some(inclusion));
            assert!(ek.element.is_some());
            assert_eq!(Some(&ek.encrypted_key_sha1), sent.encrypted_key_sha1.as_ref());
        } else {
            let x509 = signer[0].as_x509().unwrap();
            assert_eq!(x509.reference_type, Some(inclusion), "{inclusion:?}");
            assert_eq!(x509.certificate.der(), cert(ALICE_CERT).der());
        }
    }
}

#[test]
fn unknown_signer_is_ignored() {
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.key_info_inclusion_type = KeyInfoInclusionType::Thumbprint;
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert!(result.signed_elements.is_empty());
}

#[test]
fn username_token_password_is_kept_verbatim() {
    let mut doc = message();
    let req = DecorationRequirements {
        username_token: Some(UsernameTokenCredentials::new(" alice ", Some("s3cret  "))),
        ..DecorationRequirements::new()
    };
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    let ut = result.tokens.iter().find_map(|t| t.as_username()).unwrap();
    assert_eq!(ut.username, "alice");
    assert_eq!(ut.password.as_deref(), Some("s3cret  "));
    assert_eq!(ut.password_type.as_deref(), Some(ns::PASSWORD_TEXT));
}

#[test]
fn signed_and_encrypted_username_token() {
    let mut doc = message();
    let mut req = alice_to_bob();
    req.username_token = Some(UsernameTokenCredentials::new("alice", Some("pw")));
    req.sign_username_token = true;
    req.encrypt_username_token = true;
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
    assert!(!doc.to_xml().contains(">pw<"));

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();
    let ut = result.tokens.iter().find_map(|t| t.as_username()).unwrap();
    let element = ut.element.unwrap();
    assert!(result.is_encrypted(element));
    assert!(result.is_signed(element));
}

#[test]
fn signature_confirmations_are_signed_and_reported() {
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.signature_confirmations = vec!["AAAA".to_owned(), "BBBB".to_owned()];
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert!(result.wsse11_seen);
    assert!(result
        .validate_signature_confirmations(&["AAAA".to_owned(), "BBBB".to_owned()])
        .is_ok());
    let confirmations = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_named(n, ns::WSSE11, ns::node::SIGNATURE_CONFIRMATION))
        .collect::<Vec<_>>();
    assert_eq!(confirmations.len(), 2);
    assert!(confirmations.iter().all(|&c| result.is_signed(c)));
}

#[test]
fn encrypted_signature_is_processed() {
    let mut doc = message();
    let mut req = alice_to_bob();
    req.sign(body(&doc));
    req.encrypt(body(&doc), EncryptionConfig::content());
    req.encrypt_signature = true;
    let decorated = WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
    assert_eq!(decorated.encrypted_signature_values().len(), 1);

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &holder(BOB_CERT, BOB_KEY), None)
        .unwrap();
    assert!(result.is_signed(body(&doc)));
    assert!(result.is_encrypted(body(&doc)));
    assert_eq!(result.validated_signature_values, decorated.signature_values());
}

#[test]
fn encrypted_key_sha1_reused_in_reply() {
    // request: alice → bob under a fresh EncryptedKey
    let mut doc = message();
    let mut req = alice_to_bob();
    req.sign(body(&doc));
    req.encrypt(body(&doc), EncryptionConfig::content());
    let sent = WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let bob = holder(BOB_CERT, BOB_KEY);
    let mut doc = wire(&doc);
    WssProcessor::default().process(&mut doc, None, &bob, None).unwrap();

    // reply: bob → alice under the same key, named by its SHA-1
    let mut reply = message();
    let mut req = DecorationRequirements::new();
    req.encrypted_key = sent.encrypted_key.clone();
    req.encrypted_key_sha1 = sent.encrypted_key_sha1.clone();
    req.sign(body(&reply));
    req.encrypt(body(&reply), EncryptionConfig::content());
    WssDecorator::default().decorate(&mut reply, &req, None).unwrap();

    let mut reply = wire(&reply);
    let alice = SimpleSecurityTokenResolver::new();
    alice.cache_encrypted_key(sent.encrypted_key_sha1.as_deref().unwrap(), sent.encrypted_key.as_deref().unwrap());
    let result = WssProcessor::default().process(&mut reply, None, &alice, None).unwrap();
    assert!(result.is_signed(body(&reply)));
    assert!(result.is_encrypted(body(&reply)));
    let signer = result.signers_of(body(&reply));
    assert!(signer[0].as_encrypted_key().is_some());
}
