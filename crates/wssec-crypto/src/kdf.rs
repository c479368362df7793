#![forbid(unsafe_code)]

//! P_SHA1 key derivation (the TLS 1.0 `P_hash` construction over
//! HMAC-SHA1), as used by WS-SecureConversation DerivedKeyTokens.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use wssec_core::Error;

type HmacSha1 = Hmac<Sha1>;

fn hmac_sha1(secret: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>, Error> {
    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| Error::Crypto(format!("HMAC-SHA1 key: {e}")))?;
    for p in parts {
        mac.update(p);
    }
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `P_SHA1(secret, seed)` truncated to `length` bytes.
///
/// A(0) = seed, A(i) = HMAC(secret, A(i-1));
/// output = HMAC(secret, A(1) ‖ seed) ‖ HMAC(secret, A(2) ‖ seed) ‖ …
pub fn p_sha1(secret: &[u8], seed: &[u8], length: usize) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(length);
    let mut a = seed.to_vec();
    while out.len() < length {
        a = hmac_sha1(secret, &[&a])?;
        out.extend_from_slice(&hmac_sha1(secret, &[&a, seed])?);
    }
    out.truncate(length);
    Ok(out)
}

/// Derive a WS-SC key: `P_SHA1(secret, label ‖ nonce)` bytes
/// `offset..offset + length`.
pub fn derive_key(
    secret: &[u8],
    label: &[u8],
    nonce: &[u8],
    offset: usize,
    length: usize,
) -> Result<Vec<u8>, Error> {
    if length == 0 {
        return Err(Error::Key("derived key length must be positive".into()));
    }
    let mut seed = Vec::with_capacity(label.len() + nonce.len());
    seed.extend_from_slice(label);
    seed.extend_from_slice(nonce);
    let end = offset
        .checked_add(length)
        .ok_or_else(|| Error::Key("derived key offset + length overflows".into()))?;
    let stream = p_sha1(secret, &seed, end)?;
    Ok(stream[offset..].to_vec())
}
