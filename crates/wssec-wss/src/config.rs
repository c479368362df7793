#![forbid(unsafe_code)]

//! Engine configuration.
//!
//! Everything that would otherwise be a process-wide switch lives here and
//! is handed to [`WssDecorator::new`](crate::WssDecorator::new) or
//! [`WssProcessor::new`](crate::WssProcessor::new).

use chrono::{DateTime, SecondsFormat, Utc};

/// Spelling of `mustUnderstand` values on SOAP 1.1 envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MustUnderstandFormat {
    /// `"1"` / `"0"`.
    #[default]
    Numeric,
    /// `"true"` / `"false"`.
    Boolean,
}

impl MustUnderstandFormat {
    pub fn value(self, flag: bool) -> &'static str {
        match (self, flag) {
            (Self::Numeric, true) => "1",
            (Self::Numeric, false) => "0",
            (Self::Boolean, true) => "true",
            (Self::Boolean, false) => "false",
        }
    }
}

/// Fractional-second precision of generated `Created`/`Expires` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampResolution {
    Seconds,
    #[default]
    Milliseconds,
    Nanoseconds,
}

impl TimestampResolution {
    /// Format an instant as an `xsd:dateTime` in UTC.
    pub fn format(self, instant: DateTime<Utc>) -> String {
        let precision = match self {
            Self::Seconds => SecondsFormat::Secs,
            Self::Milliseconds => SecondsFormat::Millis,
            Self::Nanoseconds => SecondsFormat::Nanos,
        };
        instant.to_rfc3339_opts(precision, true)
    }
}

/// Decorator and processor settings.
#[derive(Debug, Clone)]
pub struct WssConfig {
    /// Padding-oracle countermeasure: decryption failures are absorbed and
    /// every remaining crypto failure surfaces as one masked error.
    pub decryption_always_succeeds: bool,
    /// Encrypt elements that have no content.
    pub encrypt_empty_elements: bool,
    pub must_understand_format: MustUnderstandFormat,
    /// Generated `wsu:Id` values start with the element's local name rather
    /// than an opaque `id`.
    pub wsu_id_uses_element_name: bool,
    pub timestamp_resolution: TimestampResolution,
    /// `Expires` minus `Created`.
    pub timestamp_timeout: chrono::Duration,
    pub reject_on_must_understand: bool,
    pub permit_multiple_timestamps: bool,
    pub permit_multiple_timestamp_signatures: bool,
    pub permit_unknown_binary_security_tokens: bool,
    /// Actor (SOAP 1.1) or role (SOAP 1.2) names this engine answers to.
    pub actor_names: Vec<String>,
    /// Whether `protect_tokens` also signs DerivedKeyTokens.
    pub protect_tokens_signs_derived_keys: bool,
    /// Largest attachment, in bytes, a signature reference may cover.
    pub signed_attachment_size_limit: usize,
    /// Upper bound on a received DerivedKeyToken's `Offset + Length`.
    pub max_derived_key_length: usize,
}

impl Default for WssConfig {
    fn default() -> Self {
        Self {
            decryption_always_succeeds: true,
            encrypt_empty_elements: false,
            must_understand_format: MustUnderstandFormat::Numeric,
            wsu_id_uses_element_name: true,
            timestamp_resolution: TimestampResolution::Milliseconds,
            timestamp_timeout: chrono::Duration::minutes(5),
            reject_on_must_understand: true,
            permit_multiple_timestamps: false,
            permit_multiple_timestamp_signatures: false,
            permit_unknown_binary_security_tokens: false,
            actor_names: vec![
                "secure_span".to_owned(),
                "http://www.layer7tech.com/ws/policy".to_owned(),
            ],
            protect_tokens_signs_derived_keys: false,
            signed_attachment_size_limit: 10 * 1024 * 1024,
            max_derived_key_length: 1024,
        }
    }
}

impl WssConfig {
    /// Whether `actor` names this engine.
    pub fn is_own_actor(&self, actor: &str) -> bool {
        self.actor_names.iter().any(|a| a == actor)
    }
}
