#![forbid(unsafe_code)]

//! Security token resolution: locating certificates, private keys and
//! cached EncryptedKey secrets from the references found in messages.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::key::Key;
use crate::x509::Certificate;

/// Looks up key material named by a message.
///
/// Every lookup returns `None` when the resolver has nothing for the
/// reference. Implementations must be shareable across threads.
pub trait SecurityTokenResolver: Send + Sync {
    fn lookup_by_ski(&self, ski: &[u8]) -> Option<Arc<Certificate>>;
    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<Arc<Certificate>>;
    fn lookup_by_thumbprint(&self, sha1: &[u8]) -> Option<Arc<Certificate>>;
    fn lookup_by_key_name(&self, name: &str) -> Option<Arc<Certificate>>;
    /// Private key belonging to `cert`, if this resolver holds it.
    fn private_key_for(&self, cert: &Certificate) -> Option<Arc<Key>>;
    /// Secret previously cached under its EncryptedKeySHA1 identifier.
    fn secret_by_encrypted_key_sha1(&self, sha1: &str) -> Option<Vec<u8>>;
    fn cache_encrypted_key(&self, sha1: &str, secret: &[u8]);
}

struct Entry {
    cert: Arc<Certificate>,
    key: Option<Arc<Key>>,
}

/// In-memory resolver over a fixed set of certificates, their private keys
/// and a cache of EncryptedKey secrets.
#[derive(Default)]
pub struct SimpleSecurityTokenResolver {
    entries: RwLock<Vec<Entry>>,
    encrypted_keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl SimpleSecurityTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_certificate`](Self::add_certificate).
    pub fn with_certificate(self, cert: Certificate, key: Option<Key>) -> Self {
        self.add_certificate(cert, key);
        self
    }

    /// Register a certificate and, optionally, its private key.
    pub fn add_certificate(&self, cert: Certificate, key: Option<Key>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(Entry {
            cert: Arc::new(cert),
            key: key.map(Arc::new),
        });
    }

    fn find(&self, pred: impl Fn(&Certificate) -> bool) -> Option<Arc<Certificate>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().find(|e| pred(&e.cert)).map(|e| e.cert.clone())
    }
}

impl SecurityTokenResolver for SimpleSecurityTokenResolver {
    fn lookup_by_ski(&self, ski: &[u8]) -> Option<Arc<Certificate>> {
        self.find(|c| c.subject_key_identifier() == Some(ski))
    }

    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<Arc<Certificate>> {
        self.find(|c| c.matches_issuer_serial(issuer, serial))
    }

    fn lookup_by_thumbprint(&self, sha1: &[u8]) -> Option<Arc<Certificate>> {
        self.find(|c| c.thumbprint_sha1() == sha1)
    }

    fn lookup_by_key_name(&self, name: &str) -> Option<Arc<Certificate>> {
        let wanted = crate::x509::normalize_dn(name);
        self.find(|c| {
            crate::x509::normalize_dn(c.subject_name()) == wanted
                || c.subject_common_name() == Some(name.trim())
                || c.public_key().name.as_deref() == Some(name)
        })
    }

    fn private_key_for(&self, cert: &Certificate) -> Option<Arc<Key>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|e| *e.cert == *cert)
            .and_then(|e| e.key.clone())
    }

    fn secret_by_encrypted_key_sha1(&self, sha1: &str) -> Option<Vec<u8>> {
        let cache = self.encrypted_keys.read().unwrap_or_else(|e| e.into_inner());
        cache.get(sha1).cloned()
    }

    fn cache_encrypted_key(&self, sha1: &str, secret: &[u8]) {
        debug!(encrypted_key_sha1 = sha1, "caching EncryptedKey secret");
        let mut cache = self.encrypted_keys.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(sha1.to_owned(), secret.to_vec());
    }
}

/// Consults an ordered list of resolvers; the first hit wins. Cache writes
/// go to every delegate.
#[derive(Default, Clone)]
pub struct DelegatingSecurityTokenResolver {
    delegates: Vec<Arc<dyn SecurityTokenResolver>>,
}

impl DelegatingSecurityTokenResolver {
    pub fn new(delegates: Vec<Arc<dyn SecurityTokenResolver>>) -> Self {
        Self { delegates }
    }

    pub fn push(&mut self, delegate: Arc<dyn SecurityTokenResolver>) {
        self.delegates.push(delegate);
    }

    fn first<T>(&self, f: impl Fn(&dyn SecurityTokenResolver) -> Option<T>) -> Option<T> {
        self.delegates.iter().find_map(|d| f(d.as_ref()))
    }
}

impl SecurityTokenResolver for DelegatingSecurityTokenResolver {
    fn lookup_by_ski(&self, ski: &[u8]) -> Option<Arc<Certificate>> {
        self.first(|d| d.lookup_by_ski(ski))
    }

    fn lookup_by_issuer_serial(&self, issuer: &str, serial: &str) -> Option<Arc<Certificate>> {
        self.first(|d| d.lookup_by_issuer_serial(issuer, serial))
    }

    fn lookup_by_thumbprint(&self, sha1: &[u8]) -> Option<Arc<Certificate>> {
        self.first(|d| d.lookup_by_thumbprint(sha1))
    }

    fn lookup_by_key_name(&self, name: &str) -> Option<Arc<Certificate>> {
        self.first(|d| d.lookup_by_key_name(name))
    }

    fn private_key_for(&self, cert: &Certificate) -> Option<Arc<Key>> {
        self.first(|d| d.private_key_for(cert))
    }

    fn secret_by_encrypted_key_sha1(&self, sha1: &str) -> Option<Vec<u8>> {
        self.first(|d| d.secret_by_encrypted_key_sha1(sha1))
    }

    fn cache_encrypted_key(&self, sha1: &str, secret: &[u8]) {
        for d in &self.delegates {
            d.cache_encrypted_key(sha1, secret);
        }
    }
}
