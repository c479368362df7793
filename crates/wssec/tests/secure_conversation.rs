//! Messages protected with keys derived from a WS-SecureConversation session.

mod common;

use std::collections::HashMap;

use common::*;
use wssec::core::{ns, ErrorKind};
use wssec::keys::SimpleSecurityTokenResolver;
use wssec::wss::{
    DecorationRequirements, EncryptionConfig, SecureConversationSession, WssDecorator, WssProcessor,
};
use wssec::xml::Document;

const CONTEXT: &str = "urn:uuid:6f1c0a52-2f5e-4b59-9d37-0b7c2d1e8a41";

fn session(namespace: &str) -> SecureConversationSession {
    SecureConversationSession::new(CONTEXT, vec![0x5a; 32], namespace)
}

fn finder(namespace: &str) -> HashMap<String, SecureConversationSession> {
    HashMap::from([(CONTEXT.to_owned(), session(namespace))])
}

fn protected(namespace: &str, omit_token: bool) -> Document {
    let mut doc = message();
    let mut req = DecorationRequirements::new();
    req.secure_conversation_session = Some(session(namespace));
    req.omit_security_context_token = omit_token;
    req.sign(body(&doc));
    req.encrypt(body(&doc), EncryptionConfig::content());
    let result = WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
    assert_eq!(result.security_context_id.as_deref(), Some(CONTEXT));
    wire(&doc)
}

#[test]
fn session_protected_message_round_trip() {
    let mut doc = protected(ns::WSSC_2005_02, false);
    let finder = finder(ns::WSSC_2005_02);
    let result = WssProcessor::default()
        .process(&mut doc, Some(&finder), &SimpleSecurityTokenResolver::new(), None)
        .unwrap();

    let b = body(&doc);
    assert!(result.is_signed(b));
    assert!(result.is_encrypted(b));
    assert!(result.derived_key_seen);

    let signer = result.signers_of(b);
    let sct = signer[0].as_security_context().unwrap();
    assert_eq!(sct.identifier, CONTEXT);
    assert!(!sct.is_virtual);
    assert!(signer[0].is_possession_proved());

    let derived: Vec<_> = result.tokens.iter().filter_map(|t| t.as_derived_key()).collect();
    assert_eq!(derived.len(), 2);
    assert!(derived.iter().all(|dk| dk.key.len() == 32));
}

#[test]
fn draft_namespace_without_context_token() {
    let mut doc = protected(ns::WSSC_2004_04, true);
    assert!(doc
        .find_descendant(doc.root(), ns::WSSC_2004_04, ns::node::SECURITY_CONTEXT_TOKEN)
        .is_none());

    let finder = finder(ns::WSSC_2004_04);
    let result = WssProcessor::default()
        .process(&mut doc, Some(&finder), &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    let b = body(&doc);
    assert!(result.is_signed(b));
    assert!(result.is_encrypted(b));
    let sct = result.signers_of(b)[0].as_security_context().unwrap();
    assert!(sct.is_virtual);
    assert!(result
        .tokens
        .iter()
        .filter_map(|t| t.as_derived_key())
        .all(|dk| dk.key.len() == 16));
}

#[test]
fn unknown_session_is_a_bad_security_context() {
    let mut doc = protected(ns::WSSC_2005_02, false);
    let empty: HashMap<String, SecureConversationSession> = HashMap::new();
    let err = WssProcessor::default()
        .process(&mut doc, Some(&empty), &SimpleSecurityTokenResolver::new(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadSecurityContext);
}

#[test]
fn session_message_needs_a_finder() {
    let mut doc = protected(ns::WSSC_2005_02, false);
    let err = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generic);
    assert!(!err.is_masked());
}

#[test]
fn oversized_derived_key_offset_is_a_format_error() {
    let mut doc = message();
    let mut req = DecorationRequirements::new();
    req.secure_conversation_session = Some(session(ns::WSSC_2005_02));
    req.sign(body(&doc));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();
    let mut doc = wire(&doc);

    let generations: Vec<_> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.is_named(n, ns::WSSC_2005_02, ns::node::GENERATION))
        .collect();
    assert!(!generations.is_empty());
    for g in generations {
        doc.element_mut(g).unwrap().name.local_name = ns::node::OFFSET.into();
        doc.set_text(g, "18446744073709551615");
    }

    let err = WssProcessor::default()
        .process(&mut doc, Some(&finder(ns::WSSC_2005_02)), &SimpleSecurityTokenResolver::new(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentFormat);
}
