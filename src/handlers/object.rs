//! PutObject and DeleteObject.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use super::{insert_header, layer_error};
use crate::data::is_reserved_key;
use crate::errors::S3Error;
use crate::layer::PutObjectParams;
use crate::metrics::BYTES_RECEIVED_TOTAL;
use crate::AppState;

/// Longest object key S3 accepts, in bytes.
const MAX_KEY_LENGTH: usize = 1024;

// -- Helper functions ---------------------------------------------------------

/// Extract user metadata from request headers.
/// User metadata headers start with `x-amz-meta-` (case-insensitive).
/// Returns a map of lowercased full header names to their values.
fn extract_user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    for (name, value) in headers.iter() {
        let name_str = name.as_str().to_lowercase();
        if name_str.starts_with("x-amz-meta-") {
            if let Ok(val) = value.to_str() {
                meta.insert(name_str, val.to_string());
            }
        }
    }
    meta
}

/// Extract Content-Type from headers, defaulting to application/octet-stream.
fn extract_content_type(headers: &HeaderMap) -> String {
    headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Validate the Content-MD5 header against the request body if present.
///
/// - Base64-decode the header value; return `InvalidDigest` if decode fails or result is not 16 bytes.
/// - Compute MD5 of the body and compare; return `BadDigest` on mismatch.
/// - If the header is absent, this is a no-op (returns Ok).
pub(crate) fn validate_content_md5(headers: &HeaderMap, body: &[u8]) -> Result<(), S3Error> {
    let md5_header = match headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        Some(v) => v,
        None => return Ok(()),
    };

    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, md5_header)
        .map_err(|_| S3Error::InvalidDigest)?;
    if decoded.len() != 16 {
        return Err(S3Error::InvalidDigest);
    }

    use md5::{Digest, Md5};
    let computed = Md5::digest(body);
    if computed.as_slice() != decoded.as_slice() {
        return Err(S3Error::BadDigest);
    }

    Ok(())
}

/// Reject keys the S3 API must not write to.
fn validate_object_key(key: &str) -> Result<(), S3Error> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(S3Error::KeyTooLongError);
    }
    if is_reserved_key(key) {
        return Err(S3Error::InvalidArgument {
            message: format!("Object key '{key}' is reserved for bucket configuration"),
        });
    }
    Ok(())
}

// -- Handlers -----------------------------------------------------------------

/// `PUT /{bucket}/{key}` -- Upload an object.
#[utoipa::path(
    put,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "PutObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Object stored"),
        (status = 400, description = "Invalid key, digest or size"),
        (status = 404, description = "Bucket not found"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn put_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    validate_object_key(key)?;

    if body.len() as u64 > state.config.server.max_object_size {
        return Err(S3Error::EntityTooLarge);
    }
    validate_content_md5(headers, &body)?;

    let bkt = state
        .buckets
        .resolve_bucket(bucket)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;
    let settings = state
        .layer
        .get_bucket_settings(&bkt)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    let size = body.len() as u64;
    let content_type = extract_content_type(headers);
    let info = state
        .layer
        .put_object(PutObjectParams {
            bucket: &bkt,
            key,
            content_type: &content_type,
            headers: extract_user_metadata(headers),
            payload: body,
            versioned: settings.versioning_enabled,
        })
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    metrics::counter!(BYTES_RECEIVED_TOTAL).increment(size);
    tracing::debug!(bucket, key, size, address = %info.address(), "object stored");

    let mut response = StatusCode::OK.into_response();
    let hdrs = response.headers_mut();
    insert_header(hdrs, "etag", &info.etag());
    if settings.versioning_enabled {
        insert_header(hdrs, "x-amz-version-id", &info.version());
    }
    Ok(response)
}

/// `DELETE /{bucket}/{key}` -- Delete an object.
///
/// In a versioned bucket a delete marker becomes the latest version;
/// otherwise every version of the key is removed.
#[utoipa::path(
    delete,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "DeleteObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
    ),
    responses(
        (status = 204, description = "Object deleted"),
        (status = 404, description = "Bucket not found"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn delete_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, S3Error> {
    validate_object_key(key)?;

    let bkt = state
        .buckets
        .resolve_bucket(bucket)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;
    let settings = state
        .layer
        .get_bucket_settings(&bkt)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    let marker = state
        .layer
        .delete_object(&bkt, key, settings.versioning_enabled)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    // S3 DeleteObject always returns 204, even if the object didn't exist.
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(marker) = marker {
        let hdrs = response.headers_mut();
        insert_header(hdrs, "x-amz-delete-marker", "true");
        insert_header(hdrs, "x-amz-version-id", &marker.version());
    }
    Ok(response)
}

// -- Tests --------------------------------------------------------------------
