//! Security headers for two actors on one message.

mod common;

use common::*;
use wssec::keys::SimpleSecurityTokenResolver;
use wssec::wss::{DecorationRequirements, WssConfig, WssDecorator, WssProcessor};
use wssec::xml::writer::serialize;
use wssec::xml::Document;

const DOWNSTREAM: &str = "urn:downstream";

fn layered() -> Document {
    let mut doc = message();
    let mut first = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    first.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &first, None).unwrap();

    let mut second = DecorationRequirements::new().with_sender(cert(CAROL_CERT), key(CAROL_KEY));
    second.security_header_actor = Some(DOWNSTREAM.to_owned());
    second.sign(body(&doc));
    let result = WssDecorator::default().decorate(&mut doc, &second, None).unwrap();
    assert_eq!(result.actor.as_deref(), Some(DOWNSTREAM));
    wire(&doc)
}

fn signer_der(doc: &Document, result: &wssec::ProcessorResult) -> Vec<u8> {
    let signers = result.signers_of(body(doc));
    assert_eq!(signers.len(), 1);
    signers[0].as_x509().unwrap().certificate.der().to_vec()
}

#[test]
fn processing_one_actor_leaves_the_other_untouched() {
    let mut doc = layered();
    let downstream = security(&doc, Some(DOWNSTREAM)).unwrap();
    let before = serialize(&doc, downstream);

    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert_eq!(result.actor, None);
    assert_eq!(signer_der(&doc, &result), cert(ALICE_CERT).der());

    let downstream = security(&doc, Some(DOWNSTREAM)).unwrap();
    let after = serialize(&doc, downstream);
    assert_eq!(before.as_bytes(), after.as_bytes());

    // the first node consumes its header and forwards the message
    let own = security(&doc, None).unwrap();
    doc.remove(own);
    let mut doc = wire(&doc);
    let next_hop = WssProcessor::new(WssConfig {
        actor_names: vec![DOWNSTREAM.to_owned()],
        ..WssConfig::default()
    });
    let result = next_hop
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert_eq!(result.actor.as_deref(), Some(DOWNSTREAM));
    assert_eq!(signer_der(&doc, &result), cert(CAROL_CERT).der());
}

#[test]
fn header_for_another_actor_is_not_processed() {
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(CAROL_CERT), key(CAROL_KEY));
    req.security_header_actor = Some(DOWNSTREAM.to_owned());
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert!(!result.security_header_found);
    assert!(result.signed_elements.is_empty());
}

#[test]
fn configured_actor_name_is_preferred() {
    let mut doc = message();
    let mut req = DecorationRequirements::new().with_sender(cert(ALICE_CERT), key(ALICE_KEY));
    req.security_header_actor = Some("secure_span".to_owned());
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    assert_eq!(result.actor.as_deref(), Some("secure_span"));
    assert!(result.is_signed(body(&doc)));
}
