#![forbid(unsafe_code)]

//! Key and certificate loading from PEM, DER and PKCS#8.

use std::path::Path;

use crate::key::{Key, KeyData};
use crate::x509::Certificate;
use wssec_core::Error;

/// Load a private key from PKCS#8 DER bytes.
///
/// Tries RSA, then EC P-256, P-384 and DSA in order.
pub fn load_private_key_pkcs8_der(der: &[u8]) -> Result<Key, Error> {
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        let public = pk.to_public_key();
        return Ok(Key::new(KeyData::Rsa {
            private: Some(pk),
            public,
        }));
    }

    if let Ok(sk) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(KeyData::EcP256 {
            private: Some(sk),
            public,
        }));
    }

    if let Ok(sk) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
        let public = *sk.verifying_key();
        return Ok(Key::new(KeyData::EcP384 {
            private: Some(sk),
            public,
        }));
    }

    {
        use pkcs8::der::Decode;
        if let Ok(pki) = pkcs8::PrivateKeyInfo::from_der(der) {
            if let Ok(sk) = dsa::SigningKey::try_from(pki) {
                let public = sk.verifying_key().clone();
                return Ok(Key::new(KeyData::Dsa {
                    private: Some(sk),
                    public,
                }));
            }
        }
    }

    Err(Error::Key(
        "unable to parse PKCS#8 DER private key (tried RSA, P-256, P-384, DSA)".into(),
    ))
}

/// Load a public key from SubjectPublicKeyInfo DER bytes.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(public) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::Rsa {
            private: None,
            public,
        }));
    }

    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP256 {
            private: None,
            public,
        }));
    }

    if let Ok(public) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP384 {
            private: None,
            public,
        }));
    }

    {
        use pkcs8::der::Decode;
        if let Ok(spki_ref) = spki::SubjectPublicKeyInfoRef::from_der(spki_der) {
            if let Ok(public) = dsa::VerifyingKey::try_from(spki_ref) {
                return Ok(Key::new(KeyData::Dsa {
                    private: None,
                    public,
                }));
            }
        }
    }

    Err(Error::Key("unsupported public key algorithm in SPKI DER".into()))
}

/// Load a private key from PEM, accepting PKCS#8 (`PRIVATE KEY`) and
/// PKCS#1 (`RSA PRIVATE KEY`) blocks.
pub fn load_private_key_pem(pem_data: &[u8]) -> Result<Key, Error> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;
    let (label, der) = pem_rfc7468::decode_vec(pem_str.trim().as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    match label {
        "PRIVATE KEY" => load_private_key_pkcs8_der(&der),
        "RSA PRIVATE KEY" => {
            use pkcs1::DecodeRsaPrivateKey;
            let pk = rsa::RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
            let public = pk.to_public_key();
            Ok(Key::new(KeyData::Rsa {
                private: Some(pk),
                public,
            }))
        }
        _ => Err(Error::Key(format!("unsupported PEM label: {label}"))),
    }
}

/// Load every `CERTIFICATE` block from a PEM bundle, in file order.
pub fn load_certificates_pem(pem_data: &[u8]) -> Result<Vec<Certificate>, Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;
    const END: &str = "-----END CERTIFICATE-----";
    let mut certs = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN CERTIFICATE-----") {
        let block = &rest[start..];
        let Some(end) = block.find(END) else {
            return Err(Error::Certificate("unterminated CERTIFICATE PEM block".into()));
        };
        certs.push(Certificate::from_pem(block[..end + END.len()].as_bytes())?);
        rest = &block[end + END.len()..];
    }
    if certs.is_empty() {
        return Err(Error::Certificate("no CERTIFICATE block found".into()));
    }
    Ok(certs)
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| Error::Key(format!("{}: {e}", path.display())))
}

/// Load a private key from a PEM or PKCS#8 DER file.
pub fn load_key_file(path: &Path) -> Result<Key, Error> {
    let data = read_file(path)?;
    if data.starts_with(b"-----") || data.iter().take(64).all(|b| b.is_ascii()) {
        if let Ok(key) = load_private_key_pem(&data) {
            return Ok(key);
        }
    }
    load_private_key_pkcs8_der(&data).map_err(|_| {
        Error::Key(format!(
            "unable to auto-detect key format from file: {}",
            path.display()
        ))
    })
}

/// Load a certificate from a PEM or DER file.
pub fn load_certificate_file(path: &Path) -> Result<Certificate, Error> {
    let data = read_file(path)?;
    if data.windows(11).any(|w| w == b"-----BEGIN ") {
        Certificate::from_pem(&data)
    } else {
        Certificate::from_der(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyData;
    use wssec_crypto::KeyFamily;

    fn key_path(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../test-data/keys")
            .join(name)
    }

    #[test]
    fn test_load_each_family() {
        for (file, family) in [
            ("alice-rsa-key.pem", KeyFamily::Rsa),
            ("ec-p256-key.pem", KeyFamily::Ec),
            ("ec-p384-key.pem", KeyFamily::Ec),
            ("dsa-key.pem", KeyFamily::Dsa),
        ] {
            let key = load_key_file(&key_path(file)).unwrap();
            assert_eq!(key.family(), family, "{file}");
            assert!(key.has_private(), "{file}");
        }
    }

    #[test]
    fn test_cert_matches_key() {
        let key = load_key_file(&key_path("ec-p384-key.pem")).unwrap();
        let cert = load_certificate_file(&key_path("ec-p384-cert.pem")).unwrap();
        let (KeyData::EcP384 { public: a, .. }, KeyData::EcP384 { public: b, .. }) =
            (&key.data, &cert.public_key().data)
        else {
            panic!("expected P-384 keys");
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_certificate_bundle() {
        let mut bundle = std::fs::read(key_path("alice-rsa-cert.pem")).unwrap();
        bundle.extend(std::fs::read(key_path("bob-rsa-cert.pem")).unwrap());
        let certs = load_certificates_pem(&bundle).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[1].subject_common_name(), Some("bob"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_key_file(Path::new("/nonexistent/key.pem")),
            Err(Error::Key(_))
        ));
    }
}
