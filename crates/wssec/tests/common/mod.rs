//! Fixtures shared by the decorate → process tests.

#![allow(dead_code)]

use std::sync::Arc;

use wssec::core::ns;
use wssec::keys::{loader, Certificate, Key, SimpleSecurityTokenResolver};
use wssec::wss::Envelope;
use wssec::xml::{Document, NodeId};

pub const ALICE_CERT: &[u8] = include_bytes!("../../../../test-data/keys/alice-rsa-cert.pem");
pub const ALICE_KEY: &[u8] = include_bytes!("../../../../test-data/keys/alice-rsa-key.pem");
pub const BOB_CERT: &[u8] = include_bytes!("../../../../test-data/keys/bob-rsa-cert.pem");
pub const BOB_KEY: &[u8] = include_bytes!("../../../../test-data/keys/bob-rsa-key.pem");
pub const CAROL_CERT: &[u8] = include_bytes!("../../../../test-data/keys/carol-rsa-cert.pem");
pub const CAROL_KEY: &[u8] = include_bytes!("../../../../test-data/keys/carol-rsa-key.pem");
pub const DSA_CERT: &[u8] = include_bytes!("../../../../test-data/keys/dsa-cert.pem");
pub const DSA_KEY: &[u8] = include_bytes!("../../../../test-data/keys/dsa-key.pem");
pub const EC_P256_CERT: &[u8] = include_bytes!("../../../../test-data/keys/ec-p256-cert.pem");
pub const EC_P256_KEY: &[u8] = include_bytes!("../../../../test-data/keys/ec-p256-key.pem");
pub const EC_P384_CERT: &[u8] = include_bytes!("../../../../test-data/keys/ec-p384-cert.pem");
pub const EC_P384_KEY: &[u8] = include_bytes!("../../../../test-data/keys/ec-p384-key.pem");

pub fn cert(pem: &[u8]) -> Certificate {
    Certificate::from_pem(pem).unwrap()
}

pub fn key(pem: &[u8]) -> Key {
    loader::load_private_key_pem(pem).unwrap()
}

/// A SOAP 1.1 request with a WS-Addressing header and a two-part body.
pub fn message() -> Document {
    Document::parse(&format!(
        r#"<S:Envelope xmlns:S="{soap}" xmlns:wsa="{wsa}"><S:Header><wsa:MessageID>urn:uuid:1</wsa:MessageID></S:Header><S:Body><m:Order xmlns:m="urn:shop"><m:Item>book</m:Item><m:Card>4111</m:Card><m:Note/></m:Order></S:Body></S:Envelope>"#,
        soap = ns::SOAP11_ENV,
        wsa = ns::WSA_10
    ))
    .unwrap()
}

pub fn body(doc: &Document) -> NodeId {
    Envelope::of(doc).unwrap().body(doc).unwrap()
}

pub fn shop(doc: &Document, local: &str) -> NodeId {
    doc.find_descendant(doc.root(), "urn:shop", local).unwrap()
}

pub fn security(doc: &Document, actor: Option<&str>) -> Option<NodeId> {
    Envelope::of(doc).unwrap().security_header_for(doc, actor)
}

/// Serialize and parse again, as the message would cross the wire.
pub fn wire(doc: &Document) -> Document {
    Document::parse(&doc.to_xml()).unwrap()
}

/// Resolver for a recipient holding `cert` and its key.
pub fn holder(cert_pem: &[u8], key_pem: &[u8]) -> SimpleSecurityTokenResolver {
    SimpleSecurityTokenResolver::new().with_certificate(cert(cert_pem), Some(key(key_pem)))
}

pub fn arc(pem: &[u8]) -> Arc<Certificate> {
    Arc::new(cert(pem))
}
