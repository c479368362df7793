#![forbid(unsafe_code)]

//! Reference transforms for WS-Security signatures.
//!
//! Each `ds:Reference` names a target (an element by `#id` or an attachment
//! by `cid:`) and a chain of transforms applied in order before digesting.

pub mod attachment;
pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use attachment::{Attachment, AttachmentStore};
pub use pipeline::{transform_from_uri, Transform, TransformData, TransformPipeline};
pub use uri::{ReferenceTarget, ReferenceUri};
