//! Gateway-side metadata model.
//!
//! The backend only knows immutable blobs under `(container, object)`
//! addresses.  Everything S3 clients expect on top of that (buckets, keys,
//! ETags, versioning, CORS, lock configuration) is described here.

mod info;

pub use info::*;

/// Errors produced while decoding metadata from its stored or wire form.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A container or object identifier was not 32 bytes of hex.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A settings object could not be decoded.
    #[error("invalid settings document: {0}")]
    Json(#[from] serde_json::Error),

    /// An XML configuration document could not be decoded.
    #[error("malformed configuration document: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// A configuration document decoded but violates S3 rules.
    #[error("{0}")]
    Invalid(String),
}
