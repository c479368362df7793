#![forbid(unsafe_code)]

//! Key transport algorithms (RSA PKCS#1 v1.5, RSA-OAEP-MGF1P).

use wssec_core::{algorithm, Error};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error>;
}

/// RSA-OAEP configuration parameters.
#[derive(Debug, Clone, Default)]
pub struct OaepParams {
    /// Digest algorithm URI (default: SHA-1)
    pub digest_uri: Option<String>,
    /// OAEPparams (optional label, base64-decoded)
    pub oaep_params: Option<Vec<u8>>,
}

/// Create a key transport algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    from_uri_with_params(uri, OaepParams::default())
}

/// Create a key transport algorithm from its URI with RSA-OAEP parameters.
pub fn from_uri_with_params(uri: &str, params: OaepParams) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP => {
            let digest = OaepDigest::from_uri(params.digest_uri.as_deref())?;
            Ok(Box::new(RsaOaepTransport {
                digest,
                label: params.oaep_params,
            }))
        }
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        use rsa::Pkcs1v15Encrypt;
        private_key
            .decrypt(Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Decryption(format!("RSA PKCS#1 decrypt: {e}")))
    }
}

/// OAEP label digest. MGF1 always runs over SHA-1 for `rsa-oaep-mgf1p`.
#[derive(Debug, Clone, Copy)]
enum OaepDigest {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl OaepDigest {
    fn from_uri(uri: Option<&str>) -> Result<Self, Error> {
        match uri {
            None | Some(algorithm::SHA1) => Ok(Self::Sha1),
            Some(algorithm::SHA256) => Ok(Self::Sha256),
            Some(algorithm::SHA384) => Ok(Self::Sha384),
            Some(algorithm::SHA512) => Ok(Self::Sha512),
            Some(other) => Err(Error::UnsupportedAlgorithm(format!("OAEP digest: {other}"))),
        }
    }
}

struct RsaOaepTransport {
    digest: OaepDigest,
    label: Option<Vec<u8>>,
}

impl RsaOaepTransport {
    fn padding(&self) -> rsa::Oaep {
        let mut padding = match self.digest {
            OaepDigest::Sha1 => rsa::Oaep::new_with_mgf_hash::<sha1::Sha1, sha1::Sha1>(),
            OaepDigest::Sha256 => rsa::Oaep::new_with_mgf_hash::<sha2::Sha256, sha1::Sha1>(),
            OaepDigest::Sha384 => rsa::Oaep::new_with_mgf_hash::<sha2::Sha384, sha1::Sha1>(),
            OaepDigest::Sha512 => rsa::Oaep::new_with_mgf_hash::<sha2::Sha512, sha1::Sha1>(),
        };
        if let Some(label) = self.label.as_deref().filter(|l| !l.is_empty()) {
            padding.label = Some(String::from_utf8_lossy(label).into_owned());
        }
        padding
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_OAEP
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut rng = rand::thread_rng();
        public_key
            .encrypt(&mut rng, self.padding(), key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(self.padding(), encrypted)
            .map_err(|e| Error::Decryption(format!("RSA-OAEP decrypt: {e}")))
    }
}
