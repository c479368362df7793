#![forbid(unsafe_code)]

//! X.509 certificate facts used to reference and locate certificates.
//!
//! A [`Certificate`] keeps the DER encoding alongside the values WS-Security
//! references are built from: the SubjectKeyIdentifier, the SHA-1
//! thumbprint, the issuer DN and decimal serial number, and the public key.

use der::{Decode, Encode};
use sha1::{Digest, Sha1};
use wssec_core::Error;

use crate::key::Key;
use crate::loader;

/// A parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial: String,
    ski: Option<Vec<u8>>,
    thumbprint: [u8; 20],
    public_key: Key,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = x509_cert::Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        let tbs = &cert.tbs_certificate;
        let spki_der = tbs
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;
        let public_key = loader::load_spki_der(&spki_der)?;
        Ok(Self {
            der: der.to_vec(),
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial: serial_decimal(tbs.serial_number.as_bytes()),
            ski: subject_key_identifier(&cert),
            thumbprint: Sha1::digest(der).into(),
            public_key,
        })
    }

    /// Parse the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let (label, der) = pem_rfc7468::decode_vec(trim_ascii(pem))
            .map_err(|e| Error::Certificate(format!("failed to decode certificate PEM: {e}")))?;
        if label != "CERTIFICATE" {
            return Err(Error::Certificate(format!(
                "expected CERTIFICATE PEM label, got: {label}"
            )));
        }
        Self::from_der(&der)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject DN in RFC 4514 form.
    pub fn subject_name(&self) -> &str {
        &self.subject
    }

    /// Issuer DN in RFC 4514 form.
    pub fn issuer_name(&self) -> &str {
        &self.issuer
    }

    /// Serial number as an unsigned decimal string, as XML-DSig carries it.
    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        self.ski.as_deref()
    }

    /// SHA-1 over the DER encoding.
    pub fn thumbprint_sha1(&self) -> &[u8] {
        &self.thumbprint
    }

    pub fn public_key(&self) -> &Key {
        &self.public_key
    }

    /// Common name of the subject, if any.
    pub fn subject_common_name(&self) -> Option<&str> {
        self.subject
            .split(',')
            .find_map(|rdn| rdn.trim().strip_prefix("CN="))
    }

    /// Whether this certificate matches an `X509IssuerSerial` pair.
    pub fn matches_issuer_serial(&self, issuer: &str, serial: &str) -> bool {
        normalize_serial(serial).as_deref() == Some(self.serial.as_str())
            && normalize_dn(issuer) == normalize_dn(&self.issuer)
    }
}

fn trim_ascii(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(data.len());
    let end = data.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &data[start..end]
}

fn subject_key_identifier(cert: &x509_cert::Certificate) -> Option<Vec<u8>> {
    use x509_cert::ext::pkix::SubjectKeyIdentifier;
    let ski_oid = der::oid::ObjectIdentifier::new_unwrap("2.5.29.14");
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ski_oid)
        .and_then(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
        .map(|ski| ski.0.as_bytes().to_vec())
}

/// Unsigned big-endian bytes to a decimal string.
fn serial_decimal(bytes: &[u8]) -> String {
    rsa::BigUint::from_bytes_be(bytes).to_str_radix(10)
}

/// Canonical decimal form of a serial number as written in XML.
fn normalize_serial(serial: &str) -> Option<String> {
    let serial = serial.trim();
    if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rsa::BigUint::parse_bytes(serial.as_bytes(), 10).map(|n| n.to_str_radix(10))
}

/// Loose DN comparison key: RDNs trimmed around `=` and `,`, attribute
/// types upper-cased, and the common OID spellings mapped to their names.
pub fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .filter_map(|rdn| {
            let (attr, value) = rdn.split_once('=')?;
            let attr = match attr.trim().to_ascii_uppercase().as_str() {
                "2.5.4.3" | "OID.2.5.4.3" => "CN".to_owned(),
                "2.5.4.10" | "OID.2.5.4.10" => "O".to_owned(),
                "2.5.4.11" | "OID.2.5.4.11" => "OU".to_owned(),
                "2.5.4.6" | "OID.2.5.4.6" => "C".to_owned(),
                "S" | "2.5.4.8" => "ST".to_owned(),
                "EMAILADDRESS" | "E" | "1.2.840.113549.1.9.1" => "EMAILADDRESS".to_owned(),
                other => other.to_owned(),
            };
            Some(format!("{attr}={}", value.trim()))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a `PKIPath` token value (a DER SEQUENCE OF Certificate, issuer
/// first). The returned list is leaf first.
pub fn parse_pki_path(der: &[u8]) -> Result<Vec<Certificate>, Error> {
    let certs = Vec::<x509_cert::Certificate>::from_der(der)
        .map_err(|e| Error::Certificate(format!("invalid PKIPath: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Certificate("empty PKIPath".into()));
    }
    let mut out = Vec::with_capacity(certs.len());
    for cert in certs.iter().rev() {
        let der = cert
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode certificate: {e}")))?;
        out.push(Certificate::from_der(&der)?);
    }
    Ok(out)
}

/// Encode a leaf-first chain as a `PKIPath` value.
pub fn encode_pki_path(chain: &[Certificate]) -> Result<Vec<u8>, Error> {
    let mut certs = Vec::with_capacity(chain.len());
    for cert in chain.iter().rev() {
        certs.push(
            x509_cert::Certificate::from_der(cert.der())
                .map_err(|e| Error::Certificate(format!("failed to parse certificate: {e}")))?,
        );
    }
    certs
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode PKIPath: {e}")))
}
