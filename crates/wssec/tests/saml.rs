//! Holder-of-key SAML assertions as signing tokens.

mod common;

use std::sync::Arc;

use base64::Engine;
use common::*;
use wssec::core::{algorithm, ns, ErrorKind};
use wssec::dsig::{create_signature, ReferenceSpec, SignatureSpec, TransformSpec};
use wssec::keys::SimpleSecurityTokenResolver;
use wssec::wss::{DecorationRequirements, SamlAssertion, SamlVersion, WssConfig, WssDecorator, WssProcessor};
use wssec::xml::{Document, Placement};

const ASSERTION_ID: &str = "SamlAssertion-4d2f0c7e";

/// A SAML 1.1 assertion confirming alice's certificate, signed by carol.
fn assertion(signed: bool) -> Document {
    let alice = base64::engine::general_purpose::STANDARD.encode(cert(ALICE_CERT).der());
    let mut doc = Document::parse(&format!(
        r#"<saml:Assertion xmlns:saml="{saml}" MajorVersion="1" MinorVersion="1" AssertionID="{ASSERTION_ID}" Issuer="carol" IssueInstant="2026-10-19T08:00:00Z"><saml:AuthenticationStatement AuthenticationMethod="urn:oasis:names:tc:SAML:1.0:am:X509-PKI" AuthenticationInstant="2026-10-19T08:00:00Z"><saml:Subject><saml:NameIdentifier>alice</saml:NameIdentifier><saml:SubjectConfirmation><saml:ConfirmationMethod>urn:oasis:names:tc:SAML:1.0:cm:holder-of-key</saml:ConfirmationMethod><ds:KeyInfo xmlns:ds="{dsig}"><ds:X509Data><ds:X509Certificate>{alice}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></saml:SubjectConfirmation></saml:Subject></saml:AuthenticationStatement></saml:Assertion>"#,
        saml = ns::SAML11,
        dsig = ns::DSIG,
    ))
    .unwrap();
    if signed {
        let root = doc.document_element().unwrap();
        let spec = SignatureSpec {
            signature_method: algorithm::RSA_SHA256.to_owned(),
            references: vec![ReferenceSpec {
                uri: format!("#{ASSERTION_ID}"),
                transforms: vec![TransformSpec::enveloped(), TransformSpec::exc_c14n()],
                digest_method: algorithm::SHA256.to_owned(),
            }],
            signed_info_prefixes: Vec::new(),
            id: None,
        };
        let issuer = key(CAROL_KEY).to_signing_key();
        let created = create_signature(&mut doc, Placement::Append(root), &spec, &issuer, None).unwrap();
        let data = doc.append_new_element(created.key_info, ns::DSIG, "ds", ns::node::X509_DATA);
        let carol = base64::engine::general_purpose::STANDARD.encode(cert(CAROL_CERT).der());
        doc.append_text_element(data, ns::DSIG, "ds", ns::node::X509_CERTIFICATE, &carol);
    }
    Document::parse(&doc.to_xml()).unwrap()
}

fn requirements(doc: &Document, saml: Document) -> DecorationRequirements {
    let mut req = DecorationRequirements::new();
    req.saml_assertion = Some(SamlAssertion {
        document: Arc::new(saml),
        subject_private_key: Some(Arc::new(key(ALICE_KEY))),
    });
    req.include_saml_token_in_signature = true;
    req.sign(body(doc));
    req
}

#[test]
fn signed_assertion_signs_the_body() {
    let mut doc = message();
    let req = requirements(&doc, assertion(true));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    let b = body(&doc);
    assert!(result.is_signed(b));

    let token = result.signers_of(b)[0].as_saml().unwrap();
    assert_eq!(token.assertion_id, ASSERTION_ID);
    assert_eq!(token.version, SamlVersion::V1_1);
    assert_eq!(token.subject_certificate.as_ref().unwrap().der(), cert(ALICE_CERT).der());
    assert_eq!(token.issuer_certificate.as_ref().unwrap().der(), cert(CAROL_CERT).der());
    assert!(result.is_signed(token.element.unwrap()));
}

#[test]
fn unsigned_assertion_has_no_issuer() {
    let mut doc = message();
    let req = requirements(&doc, assertion(false));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let result = WssProcessor::default()
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap();
    let token = result.tokens.iter().find_map(|t| t.as_saml()).unwrap();
    assert!(token.issuer_certificate.is_none());
    assert!(result.is_signed(body(&doc)));
}

#[test]
fn altered_assertion_fails() {
    let mut doc = message();
    let req = requirements(&doc, assertion(true));
    WssDecorator::default().decorate(&mut doc, &req, None).unwrap();

    let mut doc = wire(&doc);
    let name = doc
        .find_descendant(doc.root(), ns::SAML11, "NameIdentifier")
        .unwrap();
    doc.set_text(name, "mallory");
    let strict = WssProcessor::new(WssConfig {
        decryption_always_succeeds: false,
        ..WssConfig::default()
    });
    let err = strict
        .process(&mut doc, None, &SimpleSecurityTokenResolver::new(), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}
