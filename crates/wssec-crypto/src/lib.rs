#![forbid(unsafe_code)]

//! Cryptographic primitives for the wssec WS-Security engine.
//!
//! Provides traits and implementations for everything the decorator and
//! processor need: digests, signatures (RSA, DSA, ECDSA, HMAC), block
//! ciphers, AES key wrap, RSA key transport and the WS-SecureConversation
//! P_SHA1 key derivation.

pub mod cipher;
pub mod digest;
pub mod kdf;
pub mod keytransport;
pub mod keywrap;
pub mod registry;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use registry::AlgorithmRegistry;
pub use sign::{KeyFamily, SigningKey};

/// Fill a fresh buffer from the thread-local CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
