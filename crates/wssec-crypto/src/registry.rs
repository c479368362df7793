#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs to factory functions.

use crate::cipher::CipherAlgorithm;
use crate::digest::DigestAlgorithm;
use crate::keytransport::{KeyTransportAlgorithm, OaepParams};
use crate::keywrap::KeyWrapAlgorithm;
use crate::sign::SignatureAlgorithm;
use wssec_core::{algorithm, Error};

/// Central registry for all cryptographic algorithms.
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    /// Look up a digest algorithm by URI.
    pub fn digest(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
        crate::digest::from_uri(uri)
    }

    /// Look up a signature algorithm by URI.
    pub fn signature(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
        crate::sign::from_uri(uri)
    }

    /// Look up a cipher algorithm by URI.
    pub fn cipher(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
        crate::cipher::from_uri(uri)
    }

    /// Look up a key wrap algorithm by URI.
    pub fn key_wrap(uri: &str) -> Result<Box<dyn KeyWrapAlgorithm>, Error> {
        crate::keywrap::from_uri(uri)
    }

    /// Look up a key transport algorithm by URI.
    pub fn key_transport(uri: &str, params: OaepParams) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
        crate::keytransport::from_uri_with_params(uri, params)
    }

    /// Whether `uri` names a key-encryption algorithm this build supports.
    pub fn is_key_encryption(uri: &str) -> bool {
        matches!(
            uri,
            algorithm::RSA_PKCS1
                | algorithm::RSA_OAEP
                | algorithm::KW_AES128
                | algorithm::KW_AES192
                | algorithm::KW_AES256
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups() {
        assert!(AlgorithmRegistry::digest(algorithm::SHA256).is_ok());
        assert!(AlgorithmRegistry::signature(algorithm::RSA_SHA256).is_ok());
        assert!(AlgorithmRegistry::cipher(algorithm::AES128_GCM).is_ok());
        assert!(AlgorithmRegistry::key_wrap(algorithm::KW_AES256).is_ok());
        assert!(AlgorithmRegistry::key_transport(algorithm::RSA_OAEP, OaepParams::default()).is_ok());
        assert!(AlgorithmRegistry::is_key_encryption(algorithm::RSA_PKCS1));
        assert!(!AlgorithmRegistry::is_key_encryption(algorithm::AES128_CBC));
    }
}
