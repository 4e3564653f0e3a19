//! S3 API handlers.
//!
//! Handlers are plain async functions called by the dispatchers in
//! [`crate::server`] once the S3 operation has been identified from the
//! method, path and query.

pub mod bucket;
pub mod conditional;
pub mod get;
pub mod object;
pub mod range;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::errors::{current_request_id, S3Error};
use crate::layer::LayerError;

/// Map a layer error to its S3 error, logging failures the client will only
/// see as `InternalError`.
pub(crate) fn layer_error(err: LayerError, bucket: &str, object: &str) -> S3Error {
    if matches!(err, LayerError::Backend(_) | LayerError::Data(_)) {
        tracing::error!(
            request_id = %current_request_id(),
            bucket,
            object,
            error = %err,
            "object layer request failed"
        );
    }
    S3Error::from(err)
}

/// Insert a header, skipping values that are not valid header text.
pub(crate) fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}
