#![forbid(unsafe_code)]

//! SOAP-with-Attachments support: the attachment store seam and the
//! `Attachment-Content-Signature-Transform` / `Attachment-Complete-Signature-Transform`.

use wssec_core::{ns, Error};

use crate::pipeline::{Transform, TransformData};

/// A MIME part carried alongside the SOAP envelope.
pub type Attachment = wssec_c14n::MimePart;

/// Source of the MIME parts referenced by `cid:` URIs.
pub trait AttachmentStore: Send + Sync {
    /// The part whose Content-ID (without angle brackets) is `content_id`.
    fn attachment(&self, content_id: &str) -> Option<&Attachment>;

    /// Content-IDs of every part, in message order.
    fn content_ids(&self) -> Vec<String>;
}

impl AttachmentStore for Vec<Attachment> {
    fn attachment(&self, content_id: &str) -> Option<&Attachment> {
        self.iter()
            .find(|part| part.content_id().as_deref() == Some(content_id))
    }

    fn content_ids(&self) -> Vec<String> {
        self.iter().filter_map(|part| part.content_id()).collect()
    }
}

/// Canonicalizes an attachment, with or without its MIME headers.
pub struct AttachmentTransform {
    complete: bool,
}

impl AttachmentTransform {
    pub fn content() -> Self {
        Self { complete: false }
    }

    pub fn complete() -> Self {
        Self { complete: true }
    }
}

impl Transform for AttachmentTransform {
    fn uri(&self) -> &str {
        if self.complete {
            ns::SWA_COMPLETE_TRANSFORM
        } else {
            ns::SWA_CONTENT_TRANSFORM
        }
    }

    fn execute<'a>(&self, input: TransformData<'a>) -> Result<TransformData<'a>, Error> {
        match input {
            TransformData::Attachment(part) => Ok(TransformData::Binary(
                wssec_c14n::canonicalize_attachment(part, self.complete)?,
            )),
            _ => Err(Error::Transform(
                "attachment transforms apply only to cid: references".into(),
            )),
        }
    }
}
