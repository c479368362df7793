#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA, DSA, ECDSA, HMAC).
//!
//! ECDSA and DSA values are carried in the XML-DSig form: the fixed-width
//! concatenation `r ‖ s`, never DER.

use digest::Digest;
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::{DigestSigner, DigestVerifier, SignatureEncoding};
use wssec_core::{algorithm, Error};

/// Key material for signature operations.
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Dsa(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

/// Broad key type, which decides the signature method family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Dsa,
    Ec,
    Secret,
}

impl SigningKey {
    pub fn family(&self) -> KeyFamily {
        match self {
            SigningKey::Rsa(_) | SigningKey::RsaPublic(_) => KeyFamily::Rsa,
            SigningKey::Dsa(_) | SigningKey::DsaPublic(_) => KeyFamily::Dsa,
            SigningKey::EcP256(_)
            | SigningKey::EcP256Public(_)
            | SigningKey::EcP384(_)
            | SigningKey::EcP384Public(_) => KeyFamily::Ec,
            SigningKey::Hmac(_) => KeyFamily::Secret,
        }
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

/// Pick the signature method for a key family and requested digest.
///
/// RSA and EC follow the digest (EC defaults to SHA-384 when none was
/// requested, RSA to SHA-1). DSA always signs with SHA-1 whatever was asked
/// for, and secret keys always use HMAC-SHA1.
pub fn signature_method_for(family: KeyFamily, digest_uri: Option<&str>) -> Result<&'static str, Error> {
    let unsupported = |d: &str| Error::UnsupportedAlgorithm(format!("signature digest: {d}"));
    match family {
        KeyFamily::Dsa => Ok(algorithm::DSA_SHA1),
        KeyFamily::Secret => Ok(algorithm::HMAC_SHA1),
        KeyFamily::Rsa => match digest_uri.unwrap_or(algorithm::SHA1) {
            algorithm::SHA1 => Ok(algorithm::RSA_SHA1),
            algorithm::SHA256 => Ok(algorithm::RSA_SHA256),
            algorithm::SHA384 => Ok(algorithm::RSA_SHA384),
            algorithm::SHA512 => Ok(algorithm::RSA_SHA512),
            other => Err(unsupported(other)),
        },
        KeyFamily::Ec => match digest_uri.unwrap_or(algorithm::SHA384) {
            algorithm::SHA1 => Ok(algorithm::ECDSA_SHA1),
            algorithm::SHA256 => Ok(algorithm::ECDSA_SHA256),
            algorithm::SHA384 => Ok(algorithm::ECDSA_SHA384),
            algorithm::SHA512 => Ok(algorithm::ECDSA_SHA512),
            other => Err(unsupported(other)),
        },
    }
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    let hash = match algorithm::digest_of_signature_method(uri) {
        Some(algorithm::SHA1) => HashType::Sha1,
        Some(algorithm::SHA256) => HashType::Sha256,
        Some(algorithm::SHA384) => HashType::Sha384,
        Some(algorithm::SHA512) => HashType::Sha512,
        _ => return Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    };
    match uri {
        algorithm::RSA_SHA1 | algorithm::RSA_SHA256 | algorithm::RSA_SHA384 | algorithm::RSA_SHA512 => {
            Ok(Box::new(RsaPkcs1v15 { uri: static_uri(uri)?, hash }))
        }
        algorithm::ECDSA_SHA1
        | algorithm::ECDSA_SHA256
        | algorithm::ECDSA_SHA384
        | algorithm::ECDSA_SHA512 => Ok(Box::new(Ecdsa { uri: static_uri(uri)?, hash })),
        algorithm::DSA_SHA1 => Ok(Box::new(DsaSha1)),
        algorithm::HMAC_SHA1 => Ok(Box::new(HmacSha1)),
        _ => Err(Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}"))),
    }
}

fn static_uri(uri: &str) -> Result<&'static str, Error> {
    [
        algorithm::RSA_SHA1,
        algorithm::RSA_SHA256,
        algorithm::RSA_SHA384,
        algorithm::RSA_SHA512,
        algorithm::ECDSA_SHA1,
        algorithm::ECDSA_SHA256,
        algorithm::ECDSA_SHA384,
        algorithm::ECDSA_SHA512,
    ]
    .into_iter()
    .find(|u| *u == uri)
    .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}")))
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashType::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashType::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashType::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashType::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::Rsa(private_key) = key else {
            return Err(Error::Key("RSA private key required".into()));
        };
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                sk.try_sign(data)
                    .map(|s| s.to_vec())
                    .map_err(|e| Error::Crypto(format!("RSA sign: {e}")))
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        use signature::Verifier;
        let public_key = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(Error::Key("RSA key required".into())),
        };
        let Ok(sig) = rsa::pkcs1v15::Signature::try_from(sig_bytes) else {
            return Ok(false);
        };
        macro_rules! do_verify {
            ($hasher:ty) => {{
                let vk = rsa::pkcs1v15::VerifyingKey::<$hasher>::new(public_key);
                Ok(vk.verify(data, &sig).is_ok())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_verify!(sha1::Sha1),
            HashType::Sha256 => do_verify!(sha2::Sha256),
            HashType::Sha384 => do_verify!(sha2::Sha384),
            HashType::Sha512 => do_verify!(sha2::Sha512),
        }
    }
}

// ── ECDSA (P-256, P-384) ─────────────────────────────────────────────

/// ECDSA over whichever curve the key is on, hashing with the digest named
/// by the URI rather than the curve's default.
struct Ecdsa {
    uri: &'static str,
    hash: HashType,
}

/// Left-pad a short digest to the field size; the prehash API rejects
/// digests shorter than half the field (SHA-1 on P-384).
fn fit_prehash(hash: Vec<u8>, field_len: usize) -> Vec<u8> {
    if hash.len() >= field_len {
        return hash;
    }
    let mut padded = vec![0u8; field_len - hash.len()];
    padded.extend_from_slice(&hash);
    padded
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let hash = self.hash.hash(data);
        match key {
            SigningKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk
                    .sign_prehash(&fit_prehash(hash, 32))
                    .map_err(|e| Error::Crypto(format!("ECDSA P-256 sign: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            SigningKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk
                    .sign_prehash(&fit_prehash(hash, 48))
                    .map_err(|e| Error::Crypto(format!("ECDSA P-384 sign: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            _ => Err(Error::Key("EC private key required".into())),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let hash = self.hash.hash(data);
        match key {
            SigningKey::EcP256(_) | SigningKey::EcP256Public(_) => {
                let vk = match key {
                    SigningKey::EcP256(sk) => *sk.verifying_key(),
                    SigningKey::EcP256Public(vk) => *vk,
                    _ => return Err(Error::Key("P-256 key required".into())),
                };
                let Ok(sig) = p256::ecdsa::Signature::from_slice(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(&fit_prehash(hash, 32), &sig).is_ok())
            }
            SigningKey::EcP384(_) | SigningKey::EcP384Public(_) => {
                let vk = match key {
                    SigningKey::EcP384(sk) => *sk.verifying_key(),
                    SigningKey::EcP384Public(vk) => *vk,
                    _ => return Err(Error::Key("P-384 key required".into())),
                };
                let Ok(sig) = p384::ecdsa::Signature::from_slice(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(&fit_prehash(hash, 48), &sig).is_ok())
            }
            _ => Err(Error::Key("EC key required".into())),
        }
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

struct DsaSha1;

fn dsa_component_len(vk: &dsa::VerifyingKey) -> usize {
    (vk.components().q().bits() + 7) / 8
}

fn left_pad(bytes: Vec<u8>, len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes;
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

impl SignatureAlgorithm for DsaSha1 {
    fn uri(&self) -> &'static str {
        algorithm::DSA_SHA1
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Dsa(sk) = key else {
            return Err(Error::Key("DSA private key required".into()));
        };
        let sig: dsa::Signature = sk
            .try_sign_digest(sha1::Sha1::new_with_prefix(data))
            .map_err(|e| Error::Crypto(format!("DSA sign: {e}")))?;
        let n = dsa_component_len(sk.verifying_key());
        let mut out = left_pad(sig.r().to_bytes_be(), n);
        out.extend_from_slice(&left_pad(sig.s().to_bytes_be(), n));
        Ok(out)
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let vk = match key {
            SigningKey::Dsa(sk) => sk.verifying_key(),
            SigningKey::DsaPublic(vk) => vk,
            _ => return Err(Error::Key("DSA key required".into())),
        };
        if sig_bytes.is_empty() || sig_bytes.len() % 2 != 0 {
            return Ok(false);
        }
        let (r, s) = sig_bytes.split_at(sig_bytes.len() / 2);
        let Ok(sig) = dsa::Signature::from_components(
            dsa::BigUint::from_bytes_be(r),
            dsa::BigUint::from_bytes_be(s),
        ) else {
            return Ok(false);
        };
        Ok(vk.verify_digest(sha1::Sha1::new_with_prefix(data), &sig).is_ok())
    }
}

// ── HMAC-SHA1 ────────────────────────────────────────────────────────

struct HmacSha1;

fn compute_hmac_sha1(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use hmac::{Hmac, Mac};
    let mut mac = <Hmac<sha1::Sha1>>::new_from_slice(key)
        .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

impl SignatureAlgorithm for HmacSha1 {
    fn uri(&self) -> &'static str {
        algorithm::HMAC_SHA1
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Hmac(key_bytes) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        compute_hmac_sha1(key_bytes, data)
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let SigningKey::Hmac(key_bytes) = key else {
            return Err(Error::Key("HMAC key required".into()));
        };
        let expected = compute_hmac_sha1(key_bytes, data)?;
        Ok(constant_time_eq(&expected, sig_bytes))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_table() {
        use KeyFamily::*;
        assert_eq!(signature_method_for(Rsa, None).unwrap(), algorithm::RSA_SHA1);
        assert_eq!(signature_method_for(Rsa, Some(algorithm::SHA512)).unwrap(), algorithm::RSA_SHA512);
        assert_eq!(signature_method_for(Ec, None).unwrap(), algorithm::ECDSA_SHA384);
        assert_eq!(signature_method_for(Ec, Some(algorithm::SHA1)).unwrap(), algorithm::ECDSA_SHA1);
        for d in [algorithm::SHA1, algorithm::SHA256, algorithm::SHA384, algorithm::SHA512] {
            assert_eq!(signature_method_for(Dsa, Some(d)).unwrap(), algorithm::DSA_SHA1);
            assert_eq!(signature_method_for(Secret, Some(d)).unwrap(), algorithm::HMAC_SHA1);
        }
        assert!(signature_method_for(Rsa, Some("urn:nope")).is_err());
    }

    #[test]
    fn test_hmac_round_trip() {
        let key = SigningKey::Hmac(b"0123456789abcdef".to_vec());
        let alg = from_uri(algorithm::HMAC_SHA1).unwrap();
        let sig = alg.sign(&key, b"data").unwrap();
        assert_eq!(sig.len(), 20);
        assert!(alg.verify(&key, b"data", &sig).unwrap());
        assert!(!alg.verify(&key, b"datA", &sig).unwrap());
        assert!(!alg.verify(&key, b"data", &sig[..10]).unwrap());
    }

    #[test]
    fn test_ecdsa_digest_follows_uri() {
        let sk = p384::ecdsa::SigningKey::from_slice(&[7u8; 48]).unwrap();
        let key = SigningKey::EcP384(sk);
        for uri in [
            algorithm::ECDSA_SHA1,
            algorithm::ECDSA_SHA256,
            algorithm::ECDSA_SHA384,
            algorithm::ECDSA_SHA512,
        ] {
            let alg = from_uri(uri).unwrap();
            let sig = alg.sign(&key, b"payload").unwrap();
            assert_eq!(sig.len(), 96, "{uri}");
            assert!(alg.verify(&key, b"payload", &sig).unwrap(), "{uri}");
        }
        let sig = from_uri(algorithm::ECDSA_SHA1).unwrap().sign(&key, b"payload").unwrap();
        assert!(!from_uri(algorithm::ECDSA_SHA256)
            .unwrap()
            .verify(&key, b"payload", &sig)
            .unwrap());
    }

    #[test]
    fn test_unknown_uri() {
        assert!(from_uri("http://www.w3.org/2001/04/xmldsig-more#rsa-md5").is_err());
    }
}
