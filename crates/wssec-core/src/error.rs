#![forbid(unsafe_code)]

/// Message used for every failure that is masked in oracle-safe mode.
///
/// Decryption, signature verification and unknown-token failures all collapse
/// onto this one value so a caller cannot tell them apart.
pub const MASKED_FAILURE: &str = "Error processing security header";

/// Errors produced by the wssec WS-Security engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("invalid XML structure: {0}")]
    XmlStructure(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("transform error: {0}")]
    Transform(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("missing required attribute: {0}")]
    MissingAttribute(String),

    #[error("invalid URI reference: {0}")]
    InvalidUri(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    // ── WS-Security taxonomy ─────────────────────────────────────────
    #[error("message is not SOAP: {0}")]
    NotSoap(String),

    #[error("unable to decorate message: {0}")]
    Decorator(String),

    #[error("invalid document format: {0}")]
    DocumentFormat(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown security context: {0}")]
    BadSecurityContext(String),

    #[error("{0}")]
    Generic(String),
}

/// Coarse category of an [`Error`], as seen by WS-Security callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotSoap,
    Decorator,
    Generic,
    Validation,
    DocumentFormat,
    SignatureInvalid,
    Decryption,
    BadSecurityContext,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotSoap(_) => ErrorKind::NotSoap,
            Error::Decorator(_) => ErrorKind::Decorator,
            Error::Validation(_) => ErrorKind::Validation,
            Error::BadSecurityContext(_) => ErrorKind::BadSecurityContext,
            Error::SignatureInvalid(_) | Error::DigestMismatch(_) => ErrorKind::SignatureInvalid,
            Error::Decryption(_) => ErrorKind::Decryption,
            Error::XmlParse(_)
            | Error::XmlStructure(_)
            | Error::MissingElement(_)
            | Error::MissingAttribute(_)
            | Error::InvalidUri(_)
            | Error::Base64(_)
            | Error::Transform(_)
            | Error::DocumentFormat(_) => ErrorKind::DocumentFormat,
            Error::UnsupportedAlgorithm(_)
            | Error::Crypto(_)
            | Error::Key(_)
            | Error::Canonicalization(_)
            | Error::Encryption(_)
            | Error::KeyNotFound(_)
            | Error::Certificate(_)
            | Error::Generic(_) => ErrorKind::Generic,
        }
    }

    /// True for the single value produced by oracle-safe masking.
    pub fn is_masked(&self) -> bool {
        matches!(self, Error::Generic(msg) if msg == MASKED_FAILURE)
    }

    /// The masked replacement error.
    pub fn masked() -> Self {
        Error::Generic(MASKED_FAILURE.to_owned())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::NotSoap("x".into()).kind(), ErrorKind::NotSoap);
        assert_eq!(Error::DigestMismatch("r".into()).kind(), ErrorKind::SignatureInvalid);
        assert_eq!(Error::InvalidUri("#xpointer(/)".into()).kind(), ErrorKind::DocumentFormat);
        assert_eq!(Error::Crypto("bad".into()).kind(), ErrorKind::Generic);
    }

    #[test]
    fn test_masked_is_generic() {
        let e = Error::masked();
        assert!(e.is_masked());
        assert_eq!(e.kind(), ErrorKind::Generic);
        assert_eq!(e.to_string(), MASKED_FAILURE);
        assert!(!Error::Generic("other".into()).is_masked());
    }
}
