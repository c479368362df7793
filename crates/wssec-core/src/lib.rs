#![forbid(unsafe_code)]

//! Core types shared by every wssec crate: the error taxonomy plus the
//! namespace and algorithm URI tables.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, ErrorKind, Result, MASKED_FAILURE};
