#![forbid(unsafe_code)]

//! Key types and data structures.

use wssec_crypto::sign::{KeyFamily, SigningKey};

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Dsa {
        private: Option<dsa::SigningKey>,
        public: dsa::VerifyingKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
    /// Shared secret: HMAC keys, session secrets, unwrapped EncryptedKeys.
    Secret(Vec<u8>),
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = |private: bool, name: &str| {
            if private {
                format!("{name} private+public key")
            } else {
                format!("{name} public key")
            }
        };
        match self {
            Self::Rsa { private, .. } => f.write_str(&kind(private.is_some(), "RSA")),
            Self::Dsa { private, .. } => f.write_str(&kind(private.is_some(), "DSA")),
            Self::EcP256 { private, .. } => f.write_str(&kind(private.is_some(), "EC P-256")),
            Self::EcP384 { private, .. } => f.write_str(&kind(private.is_some(), "EC P-384")),
            Self::Secret(k) => write!(f, "secret key ({} bytes)", k.len()),
        }
    }
}

/// A key with an optional name.
#[derive(Debug, Clone)]
pub struct Key {
    /// Optional name for `ds:KeyName` lookup.
    pub name: Option<String>,
    /// The key data.
    pub data: KeyData,
}

impl Key {
    /// Create a new key.
    pub fn new(data: KeyData) -> Self {
        Self { name: None, data }
    }

    /// A shared secret key.
    pub fn secret(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyData::Secret(bytes.into()))
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn family(&self) -> KeyFamily {
        match &self.data {
            KeyData::Rsa { .. } => KeyFamily::Rsa,
            KeyData::Dsa { .. } => KeyFamily::Dsa,
            KeyData::EcP256 { .. } | KeyData::EcP384 { .. } => KeyFamily::Ec,
            KeyData::Secret(_) => KeyFamily::Secret,
        }
    }

    /// Whether private (or secret) material is present.
    pub fn has_private(&self) -> bool {
        match &self.data {
            KeyData::Rsa { private, .. } => private.is_some(),
            KeyData::Dsa { private, .. } => private.is_some(),
            KeyData::EcP256 { private, .. } => private.is_some(),
            KeyData::EcP384 { private, .. } => private.is_some(),
            KeyData::Secret(_) => true,
        }
    }

    /// Convert to a `SigningKey` for use with crypto algorithms.
    ///
    /// Private halves are preferred; a public-only key yields a verifying key.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::Dsa { private: Some(sk), .. } => SigningKey::Dsa(sk.clone()),
            KeyData::Dsa { public, .. } => SigningKey::DsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
            KeyData::Secret(k) => SigningKey::Hmac(k.clone()),
        }
    }

    /// Get the raw secret bytes.
    pub fn secret_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            KeyData::Secret(k) => Some(k),
            _ => None,
        }
    }

    /// Get the RSA public key if available.
    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            KeyData::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }

    /// Get the RSA private key if available.
    pub fn rsa_private_key(&self) -> Option<&rsa::RsaPrivateKey> {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => Some(pk),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key() {
        let key = Key::secret(vec![1u8; 16]).with_name("session");
        assert_eq!(key.family(), KeyFamily::Secret);
        assert!(key.has_private());
        assert_eq!(key.secret_bytes(), Some(&[1u8; 16][..]));
        assert!(matches!(key.to_signing_key(), SigningKey::Hmac(_)));
        assert_eq!(format!("{:?}", key.data), "secret key (16 bytes)");
    }
}
