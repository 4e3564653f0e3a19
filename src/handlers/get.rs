//! GetObject and HeadObject.
//!
//! A read is resolved in full before any byte is sent: bucket, object
//! version, conditional headers and range.  Only then are the response
//! headers committed and the payload streamed from the object layer.
//!
//! The layer writes into one half of an in-memory pipe from a spawned task;
//! the other half becomes the response body.  A layer failure after that
//! point can no longer change the status code, so it is logged and the body
//! ends with an error, which makes the server abort the connection.  If the
//! client goes away first, dropping the body aborts the read task.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::io::ReaderStream;
use tracing::Instrument;

use super::conditional::{check_preconditions, http_date, ConditionalArgs};
use super::range::fetch_range_header;
use super::{insert_header, layer_error};
use crate::data::{is_reserved_key, BucketInfo, ObjectId, ObjectInfo};
use crate::errors::{current_request_id, S3Error};
use crate::layer::{GetObjectParams, LayerError, ObjectLayer, RangeParams};
use crate::metrics::BYTES_SENT_TOTAL;
use crate::AppState;

/// Capacity of the pipe between the read task and the response body.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// A read that passed every check and is ready to be served.
struct ReadPlan {
    bucket: BucketInfo,
    info: ObjectInfo,
    range: Option<RangeParams>,
    versioning_enabled: bool,
}

enum Resolved {
    Object(ReadPlan),
    /// The latest version of the key is a delete marker.
    DeleteMarker(ObjectInfo),
}

/// Extract and validate the `versionId` query parameter.
fn requested_version(query: &HashMap<String, String>) -> Result<Option<&str>, S3Error> {
    match query.get("versionId").map(String::as_str) {
        None | Some("") => Ok(None),
        Some(version) => {
            version
                .parse::<ObjectId>()
                .map_err(|_| S3Error::InvalidArgument {
                    message: "Invalid version id specified".to_string(),
                })?;
            Ok(Some(version))
        }
    }
}

/// Resolve everything a GET or HEAD needs before headers are written.
async fn resolve_read(
    state: &AppState,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Resolved, S3Error> {
    let version = requested_version(query)?;

    let bkt = state
        .buckets
        .resolve_bucket(bucket)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    // Bucket configuration objects are not part of the S3 namespace.
    if is_reserved_key(key) {
        return Err(S3Error::NoSuchKey {
            key: key.to_string(),
        });
    }

    let info = state
        .layer
        .get_object_info(&bkt, key, version)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    if info.is_delete_marker {
        if version.is_some() {
            return Err(S3Error::MethodNotAllowed);
        }
        return Ok(Resolved::DeleteMarker(info));
    }

    let args = ConditionalArgs::from_headers(headers);
    check_preconditions(&info.etag(), info.created, &args)?;

    let range_header = match headers.get("range") {
        Some(value) => value
            .to_str()
            .map_err(|_| S3Error::InvalidRange { size: info.size })?,
        None => "",
    };
    let range = fetch_range_header(range_header, info.size)?;

    let settings = state
        .layer
        .get_bucket_settings(&bkt)
        .await
        .map_err(|e| layer_error(e, bucket, key))?;

    Ok(Resolved::Object(ReadPlan {
        bucket: bkt,
        info,
        range,
        versioning_enabled: settings.versioning_enabled,
    }))
}

/// Status and headers shared by GET and HEAD.
fn object_headers(plan: &ReadPlan) -> (StatusCode, HeaderMap) {
    let info = &plan.info;
    let mut headers = HeaderMap::new();

    let content_type = if info.content_type.is_empty() {
        "application/octet-stream"
    } else {
        info.content_type.as_str()
    };
    insert_header(&mut headers, "content-type", content_type);
    insert_header(&mut headers, "last-modified", &http_date(info.created));
    insert_header(&mut headers, "etag", &info.etag());
    insert_header(&mut headers, "accept-ranges", "bytes");

    let status = match plan.range {
        Some(range) => {
            insert_header(&mut headers, "content-length", &range.len().to_string());
            insert_header(
                &mut headers,
                "content-range",
                &format!("bytes {}-{}/{}", range.start, range.end, info.size),
            );
            StatusCode::PARTIAL_CONTENT
        }
        None => {
            insert_header(&mut headers, "content-length", &info.size.to_string());
            StatusCode::OK
        }
    };

    if plan.versioning_enabled {
        insert_header(&mut headers, "x-amz-version-id", &info.version());
    }

    for (name, value) in &info.headers {
        if let (Ok(name), Ok(value)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            axum::http::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    (status, headers)
}

fn delete_marker_headers(marker: &ObjectInfo) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "x-amz-delete-marker", "true");
    insert_header(&mut headers, "x-amz-version-id", &marker.version());
    headers
}

/// `GET /{bucket}/{key}` -- Retrieve an object or a byte range of it.
#[utoipa::path(
    get,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "GetObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("versionId" = Option<String>, Query, description = "Version to read"),
    ),
    responses(
        (status = 200, description = "Object data"),
        (status = 206, description = "Partial content (range request)"),
        (status = 304, description = "Not modified"),
        (status = 400, description = "Malformed version id"),
        (status = 404, description = "Bucket, object or version not found"),
        (status = 405, description = "Version is a delete marker"),
        (status = 412, description = "Precondition failed"),
        (status = 416, description = "Range not satisfiable"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn get_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let plan = match resolve_read(&state, bucket, key, query, headers).await? {
        Resolved::Object(plan) => plan,
        Resolved::DeleteMarker(marker) => {
            let mut response = S3Error::NoSuchKey {
                key: key.to_string(),
            }
            .into_response();
            response.headers_mut().extend(delete_marker_headers(&marker));
            return Ok(response);
        }
    };

    let (status, response_headers) = object_headers(&plan);
    tracing::debug!(
        object = %plan.info.nice_name(),
        address = %plan.info.address(),
        range = ?plan.range,
        "serving object"
    );

    let body = stream_object(state.layer.clone(), plan);
    Ok((status, response_headers, body).into_response())
}

/// `HEAD /{bucket}/{key}` -- Object metadata without the body.
///
/// Errors are reported by status code only.
#[utoipa::path(
    head,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "HeadObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("versionId" = Option<String>, Query, description = "Version to inspect"),
    ),
    responses(
        (status = 200, description = "Object metadata"),
        (status = 206, description = "Range metadata"),
        (status = 304, description = "Not modified"),
        (status = 404, description = "Object not found"),
        (status = 412, description = "Precondition failed"),
        (status = 416, description = "Range not satisfiable"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn head_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Response {
    match resolve_read(&state, bucket, key, query, headers).await {
        Ok(Resolved::Object(plan)) => {
            let (status, response_headers) = object_headers(&plan);
            (status, response_headers).into_response()
        }
        Ok(Resolved::DeleteMarker(marker)) => {
            let mut response = S3Error::NoSuchKey {
                key: key.to_string(),
            }
            .into_head_response();
            response.headers_mut().extend(delete_marker_headers(&marker));
            response
        }
        Err(err) => {
            let range_size = match &err {
                S3Error::InvalidRange { size } => Some(*size),
                _ => None,
            };
            let mut response = err.into_head_response();
            if let Some(size) = range_size {
                insert_header(
                    response.headers_mut(),
                    "content-range",
                    &format!("bytes */{size}"),
                );
            }
            response
        }
    }
}

// -- Payload streaming --------------------------------------------------------

/// Aborts the read task when the response body is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn the layer read and return the body streaming its output.
fn stream_object(layer: Arc<dyn ObjectLayer>, plan: ReadPlan) -> Body {
    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    let (done_tx, done_rx) = oneshot::channel::<io::Result<()>>();
    let request_id = current_request_id();

    let task = tokio::spawn(
        async move {
            let ReadPlan {
                bucket,
                info,
                range,
                ..
            } = plan;
            let result = layer
                .get_object(GetObjectParams {
                    bucket: &bucket,
                    info: &info,
                    range,
                    writer: &mut writer,
                })
                .await;
            drop(writer);

            let outcome = result.map_err(|err| {
                log_stream_failure(&request_id, &bucket.name, &info.name, &err);
                io::Error::other(format!("object read failed: {err}"))
            });
            let _ = done_tx.send(outcome);
        }
        .in_current_span(),
    );
    let guard = AbortOnDrop(task.abort_handle());

    // Yields an error after the payload if the read failed.
    let tail = futures::stream::once(async move {
        let _guard = guard;
        match done_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Err(err)),
            Err(_) => Some(Err(io::Error::other("object read task ended unexpectedly"))),
        }
    })
    .filter_map(futures::future::ready);

    let stream = ReaderStream::with_capacity(reader, STREAM_BUFFER_SIZE)
        .chain(tail)
        .inspect_ok(|chunk| {
            metrics::counter!(BYTES_SENT_TOTAL).increment(chunk.len() as u64);
        });

    Body::from_stream(stream)
}

fn log_stream_failure(request_id: &str, bucket: &str, object: &str, err: &LayerError) {
    let client_gone = matches!(
        err,
        LayerError::Backend(e)
            if e.downcast_ref::<io::Error>().map(io::Error::kind) == Some(io::ErrorKind::BrokenPipe)
    );
    if client_gone {
        tracing::debug!(request_id, bucket, object, "client closed connection during read");
    } else {
        tracing::error!(
            request_id,
            bucket,
            object,
            error = %err,
            "could not stream object payload"
        );
    }
}

// -- Tests --------------------------------------------------------------------
