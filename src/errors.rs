//! S3-compatible error types.
//!
//! Every variant maps to a well-known S3 error code.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(S3Error::NoSuchBucket { .. })`.
//!
//! The request id and resource path of the request being served live in a
//! task-local [`RequestContext`] installed by the server middleware, so the
//! `<RequestId>` of an error body always matches the `x-amz-request-id`
//! header and the request's log span.

use std::future::Future;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::layer::LayerError;
use crate::xml::render_error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Per-request identity shared by logging and error rendering.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub resource: String,
}

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Run `fut` with `ctx` as the current request context.
pub async fn scope_request<F: Future>(ctx: RequestContext, fut: F) -> F::Output {
    REQUEST_CONTEXT.scope(ctx, fut).await
}

/// Request id of the request being served, or a fresh one outside a request.
pub fn current_request_id() -> String {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|_| generate_request_id())
}

fn current_resource() -> String {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.resource.clone())
        .unwrap_or_default()
}

/// S3 error codes expressed as a Rust enum.
#[derive(Debug, Error)]
pub enum S3Error {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist")]
    NoSuchBucket { bucket: String },

    /// The specified key does not exist.
    #[error("The resource you requested does not exist")]
    NoSuchKey { key: String },

    /// The specified version does not exist.
    #[error("The specified version does not exist.")]
    NoSuchVersion { version_id: String },

    /// A bucket with the requested name already exists.
    #[error("The requested bucket name is not available. The bucket namespace is shared by all users of the system. Please select a different name and try again.")]
    BucketAlreadyExists { bucket: String },

    /// The bucket has no CORS configuration.
    #[error("The CORS configuration does not exist")]
    NoSuchCORSConfiguration { bucket: String },

    /// The bucket has no object lock configuration.
    #[error("Object Lock configuration does not exist for this bucket")]
    ObjectLockConfigurationNotFoundError { bucket: String },

    /// The request is not valid for the current state of the bucket.
    #[error("{message}")]
    InvalidBucketState { message: String },

    /// A request argument is invalid.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// An invalid bucket name was provided.
    #[error("The specified bucket is not valid.")]
    InvalidBucketName { name: String },

    /// A conditional request header did not hold.
    #[error("At least one of the pre-conditions you specified did not hold")]
    PreconditionFailed,

    /// The entity is too large.
    #[error("Your proposed upload exceeds the maximum allowed object size.")]
    EntityTooLarge,

    /// The object key is too long (> 1024 bytes).
    #[error("Your key is too long")]
    KeyTooLongError,

    /// The Content-MD5 header is not a valid base64 MD5 digest.
    #[error("The Content-MD5 you specified is not valid.")]
    InvalidDigest,

    /// The Content-MD5 header does not match the body.
    #[error("The Content-MD5 you specified did not match what we received.")]
    BadDigest,

    /// Malformed XML in request body.
    #[error("The XML you provided was not well-formed or did not validate against our published schema.")]
    MalformedXML,

    /// Feature not implemented.
    #[error("A header you provided implies functionality that is not implemented")]
    NotImplemented,

    /// HTTP method not allowed for this resource.
    #[error("The specified method is not allowed against this resource.")]
    MethodNotAllowed,

    /// Invalid range request.
    #[error("The requested range is not satisfiable")]
    InvalidRange { size: u64 },

    /// Not modified (304 response for conditional requests).
    #[error("Not Modified")]
    NotModified,

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    InternalError(#[from] anyhow::Error),
}

impl S3Error {
    /// Return the S3 XML error code string.
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::NoSuchBucket { .. } => "NoSuchBucket",
            S3Error::NoSuchKey { .. } => "NoSuchKey",
            S3Error::NoSuchVersion { .. } => "NoSuchVersion",
            S3Error::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            S3Error::NoSuchCORSConfiguration { .. } => "NoSuchCORSConfiguration",
            S3Error::ObjectLockConfigurationNotFoundError { .. } => {
                "ObjectLockConfigurationNotFoundError"
            }
            S3Error::InvalidBucketState { .. } => "InvalidBucketState",
            S3Error::InvalidArgument { .. } => "InvalidArgument",
            S3Error::InvalidBucketName { .. } => "InvalidBucketName",
            S3Error::PreconditionFailed => "PreconditionFailed",
            S3Error::EntityTooLarge => "EntityTooLarge",
            S3Error::KeyTooLongError => "KeyTooLongError",
            S3Error::InvalidDigest => "InvalidDigest",
            S3Error::BadDigest => "BadDigest",
            S3Error::MalformedXML => "MalformedXML",
            S3Error::NotImplemented => "NotImplemented",
            S3Error::MethodNotAllowed => "MethodNotAllowed",
            S3Error::InvalidRange { .. } => "InvalidRange",
            S3Error::NotModified => "NotModified",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::NoSuchBucket { .. } => StatusCode::NOT_FOUND,
            S3Error::NoSuchKey { .. } => StatusCode::NOT_FOUND,
            S3Error::NoSuchVersion { .. } => StatusCode::NOT_FOUND,
            S3Error::BucketAlreadyExists { .. } => StatusCode::CONFLICT,
            S3Error::NoSuchCORSConfiguration { .. } => StatusCode::NOT_FOUND,
            S3Error::ObjectLockConfigurationNotFoundError { .. } => StatusCode::NOT_FOUND,
            S3Error::InvalidBucketState { .. } => StatusCode::CONFLICT,
            S3Error::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            S3Error::InvalidBucketName { .. } => StatusCode::BAD_REQUEST,
            S3Error::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            S3Error::EntityTooLarge => StatusCode::BAD_REQUEST,
            S3Error::KeyTooLongError => StatusCode::BAD_REQUEST,
            S3Error::InvalidDigest => StatusCode::BAD_REQUEST,
            S3Error::BadDigest => StatusCode::BAD_REQUEST,
            S3Error::MalformedXML => StatusCode::BAD_REQUEST,
            S3Error::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            S3Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            S3Error::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            S3Error::NotModified => StatusCode::NOT_MODIFIED,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response for this error carries no body.
    pub fn is_bodyless(&self) -> bool {
        matches!(self, S3Error::NotModified | S3Error::PreconditionFailed)
    }

    /// Status-only response, used for HEAD requests.
    pub fn into_head_response(self) -> Response {
        let mut response = self.status_code().into_response();
        if let Ok(value) = HeaderValue::from_str(&current_request_id()) {
            response.headers_mut().insert("x-amz-request-id", value);
        }
        response
    }
}

impl From<LayerError> for S3Error {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::NoSuchBucket(bucket) => S3Error::NoSuchBucket { bucket },
            LayerError::NoSuchKey { key, .. } => S3Error::NoSuchKey { key },
            LayerError::NoSuchVersion(version_id) => S3Error::NoSuchVersion { version_id },
            LayerError::BucketAlreadyExists(bucket) => S3Error::BucketAlreadyExists { bucket },
            LayerError::Data(e) => S3Error::InternalError(e.into()),
            LayerError::Backend(e) => S3Error::InternalError(e),
        }
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let request_id = current_request_id();
        let status = self.status_code();

        // 304 and 412 responses to conditional requests carry no body.
        if self.is_bodyless() {
            return (status, [("x-amz-request-id", request_id)]).into_response();
        }

        let body = render_error(self.code(), &self.to_string(), &current_resource(), &request_id);
        let mut response = (
            status,
            [
                ("content-type", "application/xml".to_string()),
                ("x-amz-request-id", request_id),
            ],
            body,
        )
            .into_response();

        if let S3Error::InvalidRange { size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert("content-range", value);
            }
        }

        response
    }
}
