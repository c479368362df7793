#![forbid(unsafe_code)]

//! XML namespace constants used across the engine.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

// ── SOAP ─────────────────────────────────────────────────────────────

pub const SOAP11_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP 1.1 actor that addresses the next intermediary.
pub const SOAP11_ACTOR_NEXT: &str = "http://schemas.xmlsoap.org/soap/actor/next";
/// SOAP 1.2 role that addresses the next intermediary.
pub const SOAP12_ROLE_NEXT: &str = "http://www.w3.org/2003/05/soap-envelope/role/next";

// ── WS-Security ──────────────────────────────────────────────────────

/// OASIS WSS 1.0 secext namespace (the one this engine emits).
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
/// OASIS WSS 1.0 utility namespace.
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
/// OASIS WSS 1.1 secext namespace.
pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

/// Pre-OASIS secext namespaces still accepted by the processor.
pub const WSSE_LEGACY: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2002/07/secext",
    "http://schemas.xmlsoap.org/ws/2002/12/secext",
    "http://schemas.xmlsoap.org/ws/2003/06/secext",
];
/// Pre-OASIS utility namespaces still accepted by the processor.
pub const WSU_LEGACY: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2002/07/utility",
    "http://schemas.xmlsoap.org/ws/2003/06/utility",
];

/// True for any secext namespace the processor understands.
pub fn is_wsse(uri: &str) -> bool {
    uri == WSSE || WSSE_LEGACY.contains(&uri)
}

/// True for any utility namespace the processor understands.
pub fn is_wsu(uri: &str) -> bool {
    uri == WSU || WSU_LEGACY.contains(&uri)
}

// ── WS-SecureConversation ────────────────────────────────────────────

pub const WSSC_2004_04: &str = "http://schemas.xmlsoap.org/ws/2004/04/sc";
pub const WSSC_2005_02: &str = "http://schemas.xmlsoap.org/ws/2005/02/sc";
pub const WSSC_1_3: &str = "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512";

pub fn is_wssc(uri: &str) -> bool {
    uri == WSSC_2004_04 || uri == WSSC_2005_02 || uri == WSSC_1_3
}

// ── SAML ─────────────────────────────────────────────────────────────

pub const SAML11: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const SAML20: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

// ── WS-Addressing ────────────────────────────────────────────────────

pub const WSA_2004_08: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
pub const WSA_10: &str = "http://www.w3.org/2005/08/addressing";

pub fn is_wsa(uri: &str) -> bool {
    uri == WSA_2004_08 || uri == WSA_10
}

// ── Token value and encoding types ───────────────────────────────────

pub const VALUE_TYPE_X509V3: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
pub const VALUE_TYPE_X509_PKIPATH: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509PKIPathv1";
pub const VALUE_TYPE_SKI: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509SubjectKeyIdentifier";
pub const VALUE_TYPE_THUMBPRINT: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#ThumbprintSHA1";
pub const VALUE_TYPE_ENCRYPTED_KEY_SHA1: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKeySHA1";
pub const VALUE_TYPE_ENCRYPTED_KEY: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKey";
pub const VALUE_TYPE_SAML11_ID: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
pub const VALUE_TYPE_SAML20_ID: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";
pub const TOKEN_TYPE_SAML11: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
pub const TOKEN_TYPE_SAML20: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";

pub const ENCODING_BASE64: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

pub const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
pub const PASSWORD_DIGEST: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";

/// Value type for a DerivedKeyToken reference under a given SC namespace.
pub fn value_type_dkt(sc_ns: &str) -> String {
    format!("{sc_ns}/dk")
}

/// Value type for a SecurityContextToken reference under a given SC namespace.
pub fn value_type_sct(sc_ns: &str) -> String {
    format!("{sc_ns}/sct")
}

// ── SwA ──────────────────────────────────────────────────────────────

pub const SWA_CONTENT_TRANSFORM: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-SwAProfile-1.1#Attachment-Content-Signature-Transform";
pub const SWA_COMPLETE_TRANSFORM: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-SwAProfile-1.1#Attachment-Complete-Signature-Transform";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // SOAP
    pub const ENVELOPE: &str = "Envelope";
    pub const HEADER: &str = "Header";
    pub const BODY: &str = "Body";

    // DSig
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const X509_SKI: &str = "X509SKI";

    // Encryption
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const REFERENCE_LIST: &str = "ReferenceList";
    pub const DATA_REFERENCE: &str = "DataReference";
    pub const RSA_OAEP_PARAMS: &str = "OAEPparams";

    // WS-Security
    pub const SECURITY: &str = "Security";
    pub const BINARY_SECURITY_TOKEN: &str = "BinarySecurityToken";
    pub const SECURITY_TOKEN_REFERENCE: &str = "SecurityTokenReference";
    pub const KEY_IDENTIFIER: &str = "KeyIdentifier";
    pub const USERNAME_TOKEN: &str = "UsernameToken";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const NONCE: &str = "Nonce";
    pub const CREATED: &str = "Created";
    pub const EXPIRES: &str = "Expires";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const SIGNATURE_CONFIRMATION: &str = "SignatureConfirmation";

    // WS-SecureConversation
    pub const SECURITY_CONTEXT_TOKEN: &str = "SecurityContextToken";
    pub const IDENTIFIER: &str = "Identifier";
    pub const DERIVED_KEY_TOKEN: &str = "DerivedKeyToken";
    pub const GENERATION: &str = "Generation";
    pub const OFFSET: &str = "Offset";
    pub const LENGTH: &str = "Length";
    pub const LABEL: &str = "Label";

    // SAML
    pub const ASSERTION: &str = "Assertion";
    pub const SUBJECT_CONFIRMATION: &str = "SubjectConfirmation";
    pub const SUBJECT_CONFIRMATION_DATA: &str = "SubjectConfirmationData";

    // WS-Addressing
    pub const MESSAGE_ID: &str = "MessageID";
    pub const RELATES_TO: &str = "RelatesTo";
    pub const ACTION: &str = "Action";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const VALUE_TYPE: &str = "ValueType";
    pub const ENCODING_TYPE: &str = "EncodingType";
    pub const TOKEN_TYPE: &str = "TokenType";
    pub const VALUE: &str = "Value";
    pub const ACTOR: &str = "actor";
    pub const ROLE: &str = "role";
    pub const MUST_UNDERSTAND: &str = "mustUnderstand";
    pub const ASSERTION_ID: &str = "AssertionID";
    /// SAML 2.0 assertion identifier.
    pub const SAML_ID: &str = "ID";
}

// ── Encryption type URIs ─────────────────────────────────────────────

pub const ENC_TYPE_CONTENT: &str = "http://www.w3.org/2001/04/xmlenc#Content";
pub const ENC_TYPE_ELEMENT: &str = "http://www.w3.org/2001/04/xmlenc#Element";
