//! Canonical forms of XML and attachments, and signatures over attachments.

mod common;

use common::*;
use sha1::{Digest, Sha1};
use wssec::c14n::{canonicalize, canonicalize_attachment, ExcC14nOptions, MimePart};
use wssec::core::ErrorKind;
use wssec::keys::SimpleSecurityTokenResolver;
use wssec::transforms::Attachment;
use wssec::wss::{DecorationRequirements, WssConfig, WssDecorator, WssProcessor};

fn part(body: &str) -> Attachment {
    MimePart::new(
        vec![
            ("Content-ID".to_owned(), "<part1@example.com>".to_owned()),
            ("Content-Type".to_owned(), "text/plain; charset=UTF-8".to_owned()),
        ],
        body,
    )
}

#[test]
fn canonicalization_is_idempotent() {
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let opts = ExcC14nOptions::default();
    for node in [doc.document_element().unwrap(), body(&doc), security(&doc, None).unwrap()] {
        let first = canonicalize(&doc, node, &opts).unwrap();
        let second = canonicalize(&doc, node, &opts).unwrap();
        assert_eq!(first, second);
    }
    let reparsed = wire(&doc);
    assert_eq!(
        canonicalize(&doc, body(&doc), &opts).unwrap(),
        canonicalize(&reparsed, body(&reparsed), &opts).unwrap()
    );
}

#[test]
fn headerless_part_has_fixed_digest() {
    let part = MimePart::new(Vec::new(), "Hello, world\n");
    let canonical = canonicalize_attachment(&part, true).unwrap();
    assert_eq!(hex::encode(Sha1::digest(&canonical)), "602b614aef4622602a113e8f36106315ee97313e");
}

#[test]
fn signed_attachment_round_trip() {
    let store: Vec<Attachment> = vec![part("order attached\n")];
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.parts_to_sign = vec!["part1@example.com".to_owned()];
    req.sign_part_headers = true;
    WssDecorator::default().decorate(&mut doc, &req, Some(&store)).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), Some(&store))
        .unwrap();
    assert!(result.is_part_signed("part1@example.com"));
    assert!(result.signed_parts[0].headers_signed);
    assert!(result.tokens[result.signed_parts[0].signing_token].is_possession_proved());
}

#[test]
fn altered_attachment_fails() {
    let store: Vec<Attachment> = vec![part("order attached\n")];
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.parts_to_sign = vec!["part1@example.com".to_owned()];
    WssDecorator::default().decorate(&mut doc, &req, Some(&store)).unwrap();

    let altered: Vec<Attachment> = vec![part("order changed\n")];
    let strict = WssProcessor::new(WssConfig {
        decryption_always_succeeds: false,
        ..WssConfig::default()
    });
    let err = strict
        .process(&mut wire(&doc), None, &SimpleSecurityTokenResolver::new(), Some(&altered))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);

    let err = WssProcessor::default()
        .process(&mut wire(&doc), None, &SimpleSecurityTokenResolver::new(), Some(&altered))
        .unwrap_err();
    assert!(err.is_masked());
}

#[test]
fn oversized_attachment_is_refused() {
    let store: Vec<Attachment> = vec![part("order attached\n")];
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.parts_to_sign = vec!["part1@example.com".to_owned()];
    WssDecorator::default().decorate(&mut doc, &req, Some(&store)).unwrap();

    let small = WssProcessor::new(WssConfig {
        signed_attachment_size_limit: 4,
        ..WssConfig::default()
    });
    let err = small
        .process(&mut wire(&doc), None, &SimpleSecurityTokenResolver::new(), Some(&store))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
