#![forbid(unsafe_code)]

//! WS-SecureConversation sessions and their lookup.

use std::collections::HashMap;

use wssec_core::ns;

/// A shared secret established out of band, named by its context
/// identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct SecureConversationSession {
    pub identifier: String,
    pub shared_secret: Vec<u8>,
    /// WS-SC namespace the session was negotiated under.
    pub namespace: String,
}

impl SecureConversationSession {
    pub fn new(identifier: impl Into<String>, shared_secret: impl Into<Vec<u8>>, namespace: &str) -> Self {
        Self {
            identifier: identifier.into(),
            shared_secret: shared_secret.into(),
            namespace: namespace.to_owned(),
        }
    }

    /// Derived key length for this session's namespace: 16 bytes under the
    /// 2004/04 draft, 32 otherwise.
    pub fn derived_key_length(&self) -> usize {
        if self.namespace == ns::WSSC_2004_04 {
            16
        } else {
            32
        }
    }

    /// Under the 2004/04 draft DerivedKeyTokens name the session identifier
    /// directly instead of pointing at the SecurityContextToken.
    pub fn references_identifier(&self) -> bool {
        self.namespace == ns::WSSC_2004_04
    }
}

impl std::fmt::Debug for SecureConversationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureConversationSession")
            .field("identifier", &self.identifier)
            .field("namespace", &self.namespace)
            .field("shared_secret", &format_args!("{} bytes", self.shared_secret.len()))
            .finish()
    }
}

/// Finds the session a SecurityContextToken identifier names.
pub trait SecurityContextFinder: Send + Sync {
    fn get_security_context(&self, identifier: &str) -> Option<SecureConversationSession>;
}

impl SecurityContextFinder for HashMap<String, SecureConversationSession> {
    fn get_security_context(&self, identifier: &str) -> Option<SecureConversationSession> {
        self.get(identifier).cloned()
    }
}
