//! Bucket-level S3 API handlers.
//!
//! Bucket configuration (versioning, CORS, object lock) is persisted by the
//! object layer as system objects inside the bucket's container.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use garde::Validate;

use super::object::validate_content_md5;
use super::{insert_header, layer_error};
use crate::data::{BucketInfo, BucketSettings, CorsConfiguration, ObjectLockConfiguration};
use crate::errors::S3Error;
use crate::layer::CreateBucketParams;
use crate::xml;
use crate::AppState;

const VERSIONING_ENABLED: &str = "Enabled";
const VERSIONING_SUSPENDED: &str = "Suspended";

// -- Bucket name validation ---------------------------------------------------

/// Character-level bucket name rules.
#[derive(Debug, Validate)]
pub struct BucketNameInput {
    /// Bucket name: 3-63 lowercase alphanumeric characters, dots, and hyphens.
    #[garde(length(min = 3, max = 63), pattern(r"^[a-z0-9][a-z0-9.\-]*[a-z0-9]$"))]
    pub bucket_name: String,
}

/// Validate that a bucket name conforms to S3 naming rules.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and periods
/// - Must begin and end with a letter or number
/// - Cannot be formatted as an IP address (e.g., 192.168.5.4)
/// - Must not start with `xn--` or end with `-s3alias` or `--ol-s3`
pub fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    let invalid = || S3Error::InvalidBucketName {
        name: name.to_string(),
    };

    let input = BucketNameInput {
        bucket_name: name.to_string(),
    };
    if let Err(report) = input.validate() {
        tracing::debug!(bucket = name, %report, "invalid bucket name");
        return Err(invalid());
    }

    if looks_like_ip(name)
        || name.starts_with("xn--")
        || name.ends_with("-s3alias")
        || name.ends_with("--ol-s3")
    {
        return Err(invalid());
    }

    Ok(())
}

/// Check whether a string looks like an IPv4 address (e.g., "192.168.5.4").
fn looks_like_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

async fn resolve(state: &AppState, bucket: &str) -> Result<BucketInfo, S3Error> {
    state
        .buckets
        .resolve_bucket(bucket)
        .await
        .map_err(|e| layer_error(e, bucket, ""))
}

async fn settings_of(state: &AppState, bkt: &BucketInfo) -> Result<BucketSettings, S3Error> {
    state
        .layer
        .get_bucket_settings(bkt)
        .await
        .map_err(|e| layer_error(e, &bkt.name, bkt.settings_object_name()))
}

async fn store_settings(
    state: &AppState,
    bkt: &BucketInfo,
    settings: &BucketSettings,
) -> Result<(), S3Error> {
    state
        .layer
        .put_bucket_settings(bkt, settings)
        .await
        .map_err(|e| layer_error(e, &bkt.name, bkt.settings_object_name()))
}

fn xml_response(body: String) -> Response {
    (StatusCode::OK, [("content-type", "application/xml")], body).into_response()
}

// -- Handlers -----------------------------------------------------------------

/// `PUT /{bucket}` -- Create a new bucket.
#[utoipa::path(
    put,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "CreateBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Bucket created"),
        (status = 400, description = "Invalid bucket name"),
        (status = 409, description = "Bucket already exists")
    )
)]
pub async fn create_bucket(
    state: Arc<AppState>,
    bucket: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, S3Error> {
    validate_bucket_name(bucket)?;

    let location_constraint = if body.is_empty() {
        String::new()
    } else {
        xml::parse_location_constraint(body).unwrap_or_default()
    };

    let object_lock_enabled = headers
        .get("x-amz-bucket-object-lock-enabled")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let bkt = state
        .buckets
        .create_bucket(CreateBucketParams {
            name: bucket.to_string(),
            owner: state.config.gateway.owner.clone(),
            location_constraint,
            object_lock_enabled,
        })
        .await
        .map_err(|e| layer_error(e, bucket, ""))?;

    // Object lock requires versioning.
    if object_lock_enabled {
        let settings = BucketSettings {
            versioning_enabled: true,
            lock_configuration: Some(ObjectLockConfiguration {
                object_lock_enabled: Some(VERSIONING_ENABLED.to_string()),
                rule: None,
            }),
            ..BucketSettings::default()
        };
        store_settings(&state, &bkt, &settings).await?;
    }

    tracing::info!(bucket, container = %bkt.container_id, object_lock_enabled, "bucket created");

    let mut response = StatusCode::OK.into_response();
    insert_header(response.headers_mut(), "location", &format!("/{bucket}"));
    Ok(response)
}

/// `HEAD /{bucket}` -- Check whether a bucket exists.
#[utoipa::path(
    head,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "HeadBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Bucket exists"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn head_bucket(state: Arc<AppState>, bucket: &str) -> Response {
    match resolve(&state, bucket).await {
        Ok(bkt) => {
            let region = if bkt.location_constraint.is_empty() {
                state.config.server.region.as_str()
            } else {
                bkt.location_constraint.as_str()
            };
            let mut response = StatusCode::OK.into_response();
            insert_header(response.headers_mut(), "x-amz-bucket-region", region);
            response
        }
        // HEAD responses have no body.
        Err(err) => err.into_head_response(),
    }
}

/// `GET /{bucket}?versioning` -- Return the versioning state.
#[utoipa::path(
    get,
    path = "/{bucket}?versioning",
    tag = "Bucket",
    operation_id = "GetBucketVersioning",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Versioning configuration"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn get_bucket_versioning(
    state: Arc<AppState>,
    bucket: &str,
) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    let settings = settings_of(&state, &bkt).await?;

    let status = if settings.is_none_status {
        None
    } else if settings.versioning_enabled {
        Some(VERSIONING_ENABLED)
    } else {
        Some(VERSIONING_SUSPENDED)
    };
    Ok(xml_response(xml::render_versioning_configuration(status)))
}

/// `PUT /{bucket}?versioning` -- Enable or suspend versioning.
#[utoipa::path(
    put,
    path = "/{bucket}?versioning",
    tag = "Bucket",
    operation_id = "PutBucketVersioning",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Versioning updated"),
        (status = 400, description = "Malformed XML"),
        (status = 404, description = "Bucket not found"),
        (status = 409, description = "Versioning cannot be suspended on an object lock bucket")
    )
)]
pub async fn put_bucket_versioning(
    state: Arc<AppState>,
    bucket: &str,
    body: &[u8],
) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;

    let enabled = match xml::parse_versioning_status(body).as_deref() {
        Some(VERSIONING_ENABLED) => true,
        Some(VERSIONING_SUSPENDED) => false,
        _ => return Err(S3Error::MalformedXML),
    };
    if !enabled && bkt.object_lock_enabled {
        return Err(S3Error::InvalidBucketState {
            message: "An Object Lock configuration is present on this bucket, so the versioning state cannot be changed.".to_string(),
        });
    }

    let mut settings = settings_of(&state, &bkt).await?;
    settings.is_none_status = false;
    settings.versioning_enabled = enabled;
    store_settings(&state, &bkt, &settings).await?;

    tracing::info!(bucket, versioning_enabled = enabled, "bucket versioning updated");
    Ok(StatusCode::OK.into_response())
}

/// `GET /{bucket}?cors` -- Return the CORS configuration.
#[utoipa::path(
    get,
    path = "/{bucket}?cors",
    tag = "Bucket",
    operation_id = "GetBucketCors",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "CORS configuration"),
        (status = 404, description = "Bucket or configuration not found")
    )
)]
pub async fn get_bucket_cors(state: Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    let cors = state
        .layer
        .get_bucket_cors(&bkt)
        .await
        .map_err(|e| layer_error(e, bucket, bkt.cors_object_name()))?
        .ok_or_else(|| S3Error::NoSuchCORSConfiguration {
            bucket: bucket.to_string(),
        })?;
    Ok(xml_response(cors.to_xml()))
}

/// `PUT /{bucket}?cors` -- Replace the CORS configuration.
#[utoipa::path(
    put,
    path = "/{bucket}?cors",
    tag = "Bucket",
    operation_id = "PutBucketCors",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "CORS configuration stored"),
        (status = 400, description = "Malformed XML"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn put_bucket_cors(
    state: Arc<AppState>,
    bucket: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    validate_content_md5(headers, body)?;

    let cors = CorsConfiguration::from_xml(body).map_err(|e| {
        tracing::debug!(bucket, error = %e, "rejected CORS configuration");
        S3Error::MalformedXML
    })?;
    state
        .layer
        .put_bucket_cors(&bkt, &cors)
        .await
        .map_err(|e| layer_error(e, bucket, bkt.cors_object_name()))?;

    Ok(StatusCode::OK.into_response())
}

/// `DELETE /{bucket}?cors` -- Remove the CORS configuration.
#[utoipa::path(
    delete,
    path = "/{bucket}?cors",
    tag = "Bucket",
    operation_id = "DeleteBucketCors",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 204, description = "CORS configuration removed"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn delete_bucket_cors(state: Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    state
        .layer
        .delete_bucket_cors(&bkt)
        .await
        .map_err(|e| layer_error(e, bucket, bkt.cors_object_name()))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn require_object_lock(bkt: &BucketInfo) -> Result<(), S3Error> {
    if bkt.object_lock_enabled {
        Ok(())
    } else {
        Err(S3Error::InvalidBucketState {
            message: "Object Lock is not enabled for this bucket".to_string(),
        })
    }
}

/// `GET /{bucket}?object-lock` -- Return the object lock configuration.
#[utoipa::path(
    get,
    path = "/{bucket}?object-lock",
    tag = "Bucket",
    operation_id = "GetObjectLockConfiguration",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Object lock configuration"),
        (status = 404, description = "Bucket or configuration not found"),
        (status = 409, description = "Bucket was created without object lock")
    )
)]
pub async fn get_object_lock_configuration(
    state: Arc<AppState>,
    bucket: &str,
) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    require_object_lock(&bkt)?;

    let config = settings_of(&state, &bkt)
        .await?
        .lock_configuration
        .ok_or_else(|| S3Error::ObjectLockConfigurationNotFoundError {
            bucket: bucket.to_string(),
        })?;
    Ok(xml_response(xml::render_object_lock_configuration(&config)))
}

/// `PUT /{bucket}?object-lock` -- Replace the object lock configuration.
#[utoipa::path(
    put,
    path = "/{bucket}?object-lock",
    tag = "Bucket",
    operation_id = "PutObjectLockConfiguration",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Object lock configuration stored"),
        (status = 400, description = "Malformed XML"),
        (status = 404, description = "Bucket not found"),
        (status = 409, description = "Bucket was created without object lock")
    )
)]
pub async fn put_object_lock_configuration(
    state: Arc<AppState>,
    bucket: &str,
    body: &[u8],
) -> Result<Response, S3Error> {
    let bkt = resolve(&state, bucket).await?;
    require_object_lock(&bkt)?;

    let mut config = ObjectLockConfiguration::from_xml(body).map_err(|e| {
        tracing::debug!(bucket, error = %e, "rejected object lock configuration");
        S3Error::MalformedXML
    })?;
    config
        .object_lock_enabled
        .get_or_insert_with(|| VERSIONING_ENABLED.to_string());

    let mut settings = settings_of(&state, &bkt).await?;
    settings.is_none_status = false;
    settings.versioning_enabled = true;
    settings.lock_configuration = Some(config);
    store_settings(&state, &bkt, &settings).await?;

    Ok(StatusCode::OK.into_response())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    use crate::config::Config;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Config::default()))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn lock_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-amz-bucket-object-lock-enabled",
            HeaderValue::from_static("True"),
        );
        headers
    }

    const VERSIONING_ON: &[u8] =
        b"<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>";
    const VERSIONING_OFF: &[u8] =
        b"<VersioningConfiguration><Status>Suspended</Status></VersioningConfiguration>";

    #[test]
    fn test_validate_bucket_name_valid() {
        assert!(validate_bucket_name("valid-bucket").is_ok());
        assert!(validate_bucket_name("my.bucket.name").is_ok());
        assert!(validate_bucket_name("abc").is_ok());
        assert!(validate_bucket_name("a-b-c").is_ok());
        assert!(validate_bucket_name("123").is_ok());
    }

    #[test]
    fn test_validate_bucket_name_length() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_validate_bucket_name_bad_chars() {
        assert!(validate_bucket_name("InvalidBucket").is_err());
        assert!(validate_bucket_name("bucket_name").is_err());
        assert!(validate_bucket_name("bucket name").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket.").is_err());
    }

    #[test]
    fn test_validate_bucket_name_reserved_forms() {
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name("xn--example").is_err());
        assert!(validate_bucket_name("example-s3alias").is_err());
        assert!(validate_bucket_name("example--ol-s3").is_err());
    }

    #[test]
    fn test_looks_like_ip() {
        assert!(looks_like_ip("10.0.0.1"));
        assert!(!looks_like_ip("192.168.1"));
        assert!(!looks_like_ip("999.999.999.999"));
    }

    #[tokio::test]
    async fn test_create_and_head_bucket() {
        let state = test_state();
        let response = create_bucket(state.clone(), "photos", &HeaderMap::new(), b"")
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("location").unwrap(), "/photos");

        let response = head_bucket(state.clone(), "photos").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-amz-bucket-region").unwrap(),
            "us-east-1"
        );

        let response = head_bucket(state, "missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_bucket_with_location() {
        let state = test_state();
        let body = b"<CreateBucketConfiguration><LocationConstraint>eu-west-1</LocationConstraint></CreateBucketConfiguration>";
        create_bucket(state.clone(), "photos", &HeaderMap::new(), body)
            .await
            .unwrap();
        let response = head_bucket(state, "photos").await;
        assert_eq!(
            response.headers().get("x-amz-bucket-region").unwrap(),
            "eu-west-1"
        );
    }

    #[tokio::test]
    async fn test_create_bucket_conflict() {
        let state = test_state();
        create_bucket(state.clone(), "photos", &HeaderMap::new(), b"")
            .await
            .unwrap();
        let err = create_bucket(state, "photos", &HeaderMap::new(), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::BucketAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_versioning_lifecycle() {
        let state = test_state();
        create_bucket(state.clone(), "photos", &HeaderMap::new(), b"")
            .await
            .unwrap();

        let xml = body_string(get_bucket_versioning(state.clone(), "photos").await.unwrap()).await;
        assert!(!xml.contains("<Status>"));

        put_bucket_versioning(state.clone(), "photos", VERSIONING_ON)
            .await
            .unwrap();
        let xml = body_string(get_bucket_versioning(state.clone(), "photos").await.unwrap()).await;
        assert!(xml.contains("<Status>Enabled</Status>"));

        put_bucket_versioning(state.clone(), "photos", VERSIONING_OFF)
            .await
            .unwrap();
        let xml = body_string(get_bucket_versioning(state.clone(), "photos").await.unwrap()).await;
        assert!(xml.contains("<Status>Suspended</Status>"));

        let err = put_bucket_versioning(state, "photos", b"<VersioningConfiguration/>")
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::MalformedXML));
    }

    #[tokio::test]
    async fn test_object_lock_bucket() {
        let state = test_state();
        create_bucket(state.clone(), "locked", &lock_headers(), b"")
            .await
            .unwrap();

        let xml = body_string(get_bucket_versioning(state.clone(), "locked").await.unwrap()).await;
        assert!(xml.contains("<Status>Enabled</Status>"));

        let err = put_bucket_versioning(state.clone(), "locked", VERSIONING_OFF)
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidBucketState { .. }));

        let xml = body_string(
            get_object_lock_configuration(state.clone(), "locked")
                .await
                .unwrap(),
        )
        .await;
        assert!(xml.contains("<ObjectLockEnabled>Enabled</ObjectLockEnabled>"));

        let body = b"<ObjectLockConfiguration><Rule><DefaultRetention><Mode>GOVERNANCE</Mode>\
                     <Days>7</Days></DefaultRetention></Rule></ObjectLockConfiguration>";
        put_object_lock_configuration(state.clone(), "locked", body)
            .await
            .unwrap();
        let xml = body_string(
            get_object_lock_configuration(state, "locked")
                .await
                .unwrap(),
        )
        .await;
        assert!(xml.contains("<Mode>GOVERNANCE</Mode><Days>7</Days>"));
        assert!(xml.contains("<ObjectLockEnabled>Enabled</ObjectLockEnabled>"));
    }

    #[tokio::test]
    async fn test_object_lock_requires_lock_bucket() {
        let state = test_state();
        create_bucket(state.clone(), "plain", &HeaderMap::new(), b"")
            .await
            .unwrap();

        let err = get_object_lock_configuration(state.clone(), "plain")
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidBucketState { .. }));

        let body = b"<ObjectLockConfiguration><ObjectLockEnabled>Enabled</ObjectLockEnabled></ObjectLockConfiguration>";
        let err = put_object_lock_configuration(state, "plain", body)
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidBucketState { .. }));
    }

    #[tokio::test]
    async fn test_cors_lifecycle() {
        let state = test_state();
        create_bucket(state.clone(), "photos", &HeaderMap::new(), b"")
            .await
            .unwrap();

        let err = get_bucket_cors(state.clone(), "photos").await.unwrap_err();
        assert!(matches!(err, S3Error::NoSuchCORSConfiguration { .. }));

        let body = b"<CORSConfiguration><CORSRule><AllowedOrigin>*</AllowedOrigin>\
                     <AllowedMethod>GET</AllowedMethod></CORSRule></CORSConfiguration>";
        put_bucket_cors(state.clone(), "photos", &HeaderMap::new(), body)
            .await
            .unwrap();
        let xml = body_string(get_bucket_cors(state.clone(), "photos").await.unwrap()).await;
        assert!(xml.contains("<AllowedMethod>GET</AllowedMethod>"));

        let bad = b"<CORSConfiguration>";
        let err = put_bucket_cors(state.clone(), "photos", &HeaderMap::new(), bad)
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::MalformedXML));

        let response = delete_bucket_cors(state.clone(), "photos").await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(get_bucket_cors(state, "photos").await.is_err());
    }
}
