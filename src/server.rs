//! Axum router construction and S3 route mapping.
//!
//! The [`app`] function wires every S3-compatible endpoint to its handler
//! and returns a ready-to-serve [`axum::Router`].
//!
//! S3 distinguishes operations by query parameters, not just path+method.
//! For example, `GET /:bucket` is GetBucketVersioning with `?versioning`
//! and GetBucketCors with `?cors`.  We use a single handler per method+path
//! that dispatches internally based on query params; anything not listed is
//! answered with `NotImplemented`.

use axum::{
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, scope_request, RequestContext, S3Error};
use crate::handlers::{bucket, get as read, object};
use crate::metrics::{metrics_handler, metrics_middleware, record_operation};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the casgate S3-compatible API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "casgate S3-Compatible API",
        version = "0.1.0",
        description = "S3-compatible gateway for content-addressed container storage"
    ),
    paths(
        health_check,
        crate::handlers::bucket::create_bucket,
        crate::handlers::bucket::head_bucket,
        crate::handlers::bucket::get_bucket_versioning,
        crate::handlers::bucket::put_bucket_versioning,
        crate::handlers::bucket::get_bucket_cors,
        crate::handlers::bucket::put_bucket_cors,
        crate::handlers::bucket::delete_bucket_cors,
        crate::handlers::bucket::get_object_lock_configuration,
        crate::handlers::bucket::put_object_lock_configuration,
        crate::handlers::get::get_object,
        crate::handlers::get::head_object,
        crate::handlers::object::put_object,
        crate::handlers::object::delete_object,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Bucket", description = "S3 bucket operations"),
        (name = "Object", description = "S3 object operations"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all S3-compatible routes.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint (not part of S3 API).
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        // Bucket-level routes
        .route(
            "/:bucket",
            get(handle_get_bucket)
                .put(handle_put_bucket)
                .delete(handle_delete_bucket)
                .head(handle_head_bucket)
                .post(not_implemented),
        )
        // Object-level routes (wildcard key captures slashes)
        .route(
            "/:bucket/*key",
            get(handle_get_object)
                .put(handle_put_object)
                .delete(handle_delete_object)
                .head(handle_head_object)
                .post(not_implemented),
        )
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(request_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        // Disable the default 2MB body size limit; handlers enforce
        // server.max_object_size.
        .layer(DefaultBodyLimit::disable())
}

// -- Request context middleware ----------------------------------------------

/// Assigns the request id and runs the request inside its log span and
/// [`RequestContext`], then adds the common S3 response headers:
/// - `x-amz-request-id`: the same id used in error bodies and logs
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `casgate`
async fn request_context_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let request_id = generate_request_id();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let ctx = RequestContext {
        request_id: request_id.clone(),
        resource: req.uri().path().to_string(),
    };

    let mut response = scope_request(ctx, next.run(req)).instrument(span).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-amz-request-id", value);
    }
    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("casgate"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_implemented() -> S3Error {
    S3Error::NotImplemented
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse raw query string into a HashMap.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let decoded_k = percent_encoding::percent_decode_str(k)
                    .decode_utf8_lossy()
                    .into_owned();
                let decoded_v = percent_encoding::percent_decode_str(v)
                    .decode_utf8_lossy()
                    .into_owned();
                map.insert(decoded_k, decoded_v);
            } else if !part.is_empty() {
                // Query params without value (e.g., `?cors`, `?versioning`)
                let decoded = percent_encoding::percent_decode_str(part)
                    .decode_utf8_lossy()
                    .into_owned();
                map.insert(decoded, String::new());
            }
        }
    }
    map
}

/// Bucket sub-resource selected by the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubResource {
    None,
    Versioning,
    Cors,
    ObjectLock,
    Unsupported,
}

fn bucket_sub_resource(query: &HashMap<String, String>) -> SubResource {
    if query.is_empty() {
        return SubResource::None;
    }
    if query.len() > 1 {
        return SubResource::Unsupported;
    }
    if query.contains_key("versioning") {
        SubResource::Versioning
    } else if query.contains_key("cors") {
        SubResource::Cors
    } else if query.contains_key("object-lock") {
        SubResource::ObjectLock
    } else {
        SubResource::Unsupported
    }
}

/// Whether an object request carries only the query parameters we serve.
fn only_version_query(query: &HashMap<String, String>) -> bool {
    query.keys().all(|k| k == "versionId")
}

/// Count the operation and turn the handler result into a response.
fn finish(operation: &'static str, result: Result<Response, S3Error>) -> Response {
    let response = result.into_response();
    record_operation(operation, response.status());
    response
}

// -- Bucket-level dispatch ---------------------------------------------------

/// `GET /:bucket` -- `?versioning`, `?cors` or `?object-lock`.
async fn handle_get_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = parse_query(raw_query);

    match bucket_sub_resource(&query) {
        SubResource::Versioning => finish(
            "GetBucketVersioning",
            bucket::get_bucket_versioning(state, &bucket).await,
        ),
        SubResource::Cors => finish(
            "GetBucketCors",
            bucket::get_bucket_cors(state, &bucket).await,
        ),
        SubResource::ObjectLock => finish(
            "GetObjectLockConfiguration",
            bucket::get_object_lock_configuration(state, &bucket).await,
        ),
        SubResource::None | SubResource::Unsupported => S3Error::NotImplemented.into_response(),
    }
}

/// `PUT /:bucket` -- CreateBucket, or `?versioning`, `?cors`, `?object-lock`.
async fn handle_put_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let query = parse_query(raw_query);

    match bucket_sub_resource(&query) {
        SubResource::None => finish(
            "CreateBucket",
            bucket::create_bucket(state, &bucket, &headers, &body).await,
        ),
        SubResource::Versioning => finish(
            "PutBucketVersioning",
            bucket::put_bucket_versioning(state, &bucket, &body).await,
        ),
        SubResource::Cors => finish(
            "PutBucketCors",
            bucket::put_bucket_cors(state, &bucket, &headers, &body).await,
        ),
        SubResource::ObjectLock => finish(
            "PutObjectLockConfiguration",
            bucket::put_object_lock_configuration(state, &bucket, &body).await,
        ),
        SubResource::Unsupported => S3Error::NotImplemented.into_response(),
    }
}

/// `DELETE /:bucket` -- `?cors` only.
async fn handle_delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = parse_query(raw_query);

    match bucket_sub_resource(&query) {
        SubResource::Cors => finish(
            "DeleteBucketCors",
            bucket::delete_bucket_cors(state, &bucket).await,
        ),
        _ => S3Error::NotImplemented.into_response(),
    }
}

/// `HEAD /:bucket` -- HeadBucket
async fn handle_head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Response {
    finish("HeadBucket", Ok(bucket::head_bucket(state, &bucket).await))
}

// -- Object-level dispatch ---------------------------------------------------

/// `GET /:bucket/*key` -- GetObject
async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = parse_query(raw_query);
    if !only_version_query(&query) {
        return S3Error::NotImplemented.into_response();
    }
    finish(
        "GetObject",
        read::get_object(state, &bucket, &key, &query, &headers).await,
    )
}

/// `HEAD /:bucket/*key` -- HeadObject
async fn handle_head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = parse_query(raw_query);
    if !only_version_query(&query) {
        return S3Error::NotImplemented.into_head_response();
    }
    finish(
        "HeadObject",
        Ok(read::head_object(state, &bucket, &key, &query, &headers).await),
    )
}

/// `PUT /:bucket/*key` -- PutObject
async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let query = parse_query(raw_query);
    if !query.is_empty() || headers.contains_key("x-amz-copy-source") {
        return S3Error::NotImplemented.into_response();
    }
    finish(
        "PutObject",
        object::put_object(state, &bucket, &key, &headers, body).await,
    )
}

/// `DELETE /:bucket/*key` -- DeleteObject
async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = parse_query(raw_query);
    if !query.is_empty() {
        return S3Error::NotImplemented.into_response();
    }
    finish(
        "DeleteObject",
        object::delete_object(state, &bucket, &key).await,
    )
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> HashMap<String, String> {
        parse_query(Some(raw.to_string()))
    }

    #[test]
    fn test_parse_query() {
        let q = query("versioning&x=1&name=a%20b");
        assert_eq!(q.get("versioning").unwrap(), "");
        assert_eq!(q.get("x").unwrap(), "1");
        assert_eq!(q.get("name").unwrap(), "a b");
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_bucket_sub_resource() {
        assert_eq!(bucket_sub_resource(&HashMap::new()), SubResource::None);
        assert_eq!(bucket_sub_resource(&query("versioning")), SubResource::Versioning);
        assert_eq!(bucket_sub_resource(&query("cors")), SubResource::Cors);
        assert_eq!(bucket_sub_resource(&query("object-lock")), SubResource::ObjectLock);
        assert_eq!(bucket_sub_resource(&query("acl")), SubResource::Unsupported);
        assert_eq!(
            bucket_sub_resource(&query("cors&acl")),
            SubResource::Unsupported
        );
    }

    #[test]
    fn test_only_version_query() {
        assert!(only_version_query(&HashMap::new()));
        assert!(only_version_query(&query("versionId=abc")));
        assert!(!only_version_query(&query("acl")));
    }

    #[test]
    fn test_openapi_lists_object_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/{bucket}/{key}"));
        assert!(doc.paths.paths.contains_key("/health"));
    }

    // -- Router tests ---------------------------------------------------------

    use axum::body::Body;
    use axum::http::Method;
    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::data::{BucketInfo, ObjectInfo, SystemObject};
    use crate::layer::memory::MemoryLayer;
    use crate::layer::{
        BoxFuture, GetObjectParams, LayerError, ObjectLayer, PutObjectParams,
    };

    const PAYLOAD: &str = "123456789abcdef";

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: &'static str,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        router
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn header<'a>(response: &'a Response, name: &str) -> &'a str {
        response.headers().get(name).unwrap().to_str().unwrap()
    }

    /// Router with bucket `photos` holding `PAYLOAD` under `digits.txt`.
    async fn seeded(state: Arc<AppState>) -> (Router, String) {
        let router = app(state);
        let response = send(&router, Method::PUT, "/photos", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&router, Method::PUT, "/photos/digits.txt", &[], PAYLOAD).await;
        assert_eq!(response.status(), StatusCode::OK);
        let etag = header(&response, "etag").to_string();
        (router, etag)
    }

    fn memory_state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Config::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let router = app(memory_state());
        let response = send(&router, Method::GET, "/health", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "server"), "casgate");
        assert!(response.headers().contains_key("x-amz-request-id"));
        assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_get_object_ranges() {
        let (router, _) = seeded(memory_state()).await;

        let cases = [
            ("bytes=0-14", PAYLOAD, "bytes 0-14/15"),
            ("bytes=0-3", "1234", "bytes 0-3/15"),
            ("bytes=5-10", "6789ab", "bytes 5-10/15"),
            ("bytes=10-15", "bcdef", "bytes 10-14/15"),
            ("bytes=10-", "bcdef", "bytes 10-14/15"),
            ("bytes=-3", "def", "bytes 12-14/15"),
        ];
        for (range, expected, content_range) in cases {
            let response = send(
                &router,
                Method::GET,
                "/photos/digits.txt",
                &[("range", range)],
                "",
            )
            .await;
            assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT, "{range}");
            assert_eq!(header(&response, "content-range"), content_range);
            assert_eq!(
                header(&response, "content-length"),
                expected.len().to_string()
            );
            assert_eq!(body_string(response).await, expected);
        }

        let response = send(&router, Method::GET, "/photos/digits.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "accept-ranges"), "bytes");
        assert_eq!(body_string(response).await, PAYLOAD);
    }

    #[tokio::test]
    async fn test_get_object_unsatisfiable_range() {
        let (router, _) = seeded(memory_state()).await;
        let response = send(
            &router,
            Method::GET,
            "/photos/digits.txt",
            &[("range", "bytes=20-30")],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(body_string(response).await.contains("InvalidRange"));

        let response = send(
            &router,
            Method::HEAD,
            "/photos/digits.txt",
            &[("range", "bytes=20-30")],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header(&response, "content-range"), "bytes */15");
    }

    #[tokio::test]
    async fn test_get_object_preconditions() {
        let (router, etag) = seeded(memory_state()).await;

        let response = send(
            &router,
            Method::GET,
            "/photos/digits.txt",
            &[("if-match", etag.as_str())],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, PAYLOAD);

        let response = send(
            &router,
            Method::GET,
            "/photos/digits.txt",
            &[("if-match", etag.as_str()), ("range", "bytes=0-3")],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_string(response).await, "1234");

        let response = send(
            &router,
            Method::GET,
            "/photos/digits.txt",
            &[("if-match", "\"0000\"")],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let response = send(
            &router,
            Method::GET,
            "/photos/digits.txt",
            &[("if-none-match", etag.as_str())],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_object_not_found_carries_request_id() {
        let (router, _) = seeded(memory_state()).await;
        let response = send(&router, Method::GET, "/photos/missing.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let request_id = header(&response, "x-amz-request-id").to_string();
        let body = body_string(response).await;
        assert!(body.contains("<Code>NoSuchKey</Code>"));
        assert!(body.contains(&format!("<RequestId>{request_id}</RequestId>")));

        let response = send(&router, Method::GET, "/absent/digits.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains("NoSuchBucket"));
    }

    #[tokio::test]
    async fn test_unknown_sub_resources_not_implemented() {
        let (router, _) = seeded(memory_state()).await;
        let response = send(&router, Method::GET, "/photos/digits.txt?acl", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let response = send(&router, Method::GET, "/photos?policy", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let response = send(&router, Method::POST, "/photos/digits.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_versioned_delete_marker() {
        let (router, _) = seeded(memory_state()).await;
        let response = send(
            &router,
            Method::PUT,
            "/photos?versioning",
            &[],
            "<VersioningConfiguration><Status>Enabled</Status></VersioningConfiguration>",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&router, Method::PUT, "/photos/notes.txt", &[], "first").await;
        assert_eq!(response.status(), StatusCode::OK);
        let first_version = header(&response, "x-amz-version-id").to_string();

        let response = send(&router, Method::DELETE, "/photos/notes.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(header(&response, "x-amz-delete-marker"), "true");
        let marker_version = header(&response, "x-amz-version-id").to_string();

        let response = send(&router, Method::GET, "/photos/notes.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(header(&response, "x-amz-delete-marker"), "true");
        assert_eq!(header(&response, "x-amz-version-id"), marker_version);

        let uri = format!("/photos/notes.txt?versionId={first_version}");
        let response = send(&router, Method::GET, &uri, &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-amz-version-id"), first_version);
        assert_eq!(body_string(response).await, "first");

        let uri = format!("/photos/notes.txt?versionId={marker_version}");
        let response = send(&router, Method::GET, &uri, &[], "").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = send(
            &router,
            Method::GET,
            "/photos/notes.txt?versionId=not-an-id",
            &[],
            "",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_lifecycle() {
        let router = app(memory_state());
        send(&router, Method::PUT, "/photos", &[], "").await;

        let response = send(&router, Method::GET, "/photos?cors", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &router,
            Method::PUT,
            "/photos?cors",
            &[],
            "<CORSConfiguration><CORSRule><AllowedOrigin>*</AllowedOrigin>\
             <AllowedMethod>GET</AllowedMethod></CORSRule></CORSConfiguration>",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&router, Method::GET, "/photos?cors", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("<AllowedOrigin>*</AllowedOrigin>"));

        let response = send(&router, Method::DELETE, "/photos?cors", &[], "").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = send(&router, Method::GET, "/photos?cors", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_head_bucket_and_object() {
        let (router, etag) = seeded(memory_state()).await;
        let response = send(&router, Method::HEAD, "/photos", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&router, Method::HEAD, "/photos/digits.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "etag"), etag);
        assert_eq!(header(&response, "content-length"), "15");
        let response = send(&router, Method::HEAD, "/photos/missing.txt", &[], "").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.is_empty());
    }

    /// Serves objects from a memory network but fails every payload read
    /// after the first few bytes.
    struct FailingReads(Arc<MemoryLayer>);

    impl ObjectLayer for FailingReads {
        fn get_object_info<'a>(
            &'a self,
            bucket: &'a BucketInfo,
            object: &'a str,
            version: Option<&'a str>,
        ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>> {
            self.0.get_object_info(bucket, object, version)
        }

        fn get_object<'a>(
            &'a self,
            params: GetObjectParams<'a>,
        ) -> BoxFuture<'a, Result<(), LayerError>> {
            Box::pin(async move {
                params
                    .writer
                    .write_all(b"1234")
                    .await
                    .map_err(|e| LayerError::Backend(e.into()))?;
                Err(LayerError::Backend(anyhow::anyhow!("storage node unavailable")))
            })
        }

        fn put_object<'a>(
            &'a self,
            params: PutObjectParams<'a>,
        ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>> {
            self.0.put_object(params)
        }

        fn delete_object<'a>(
            &'a self,
            bucket: &'a BucketInfo,
            object: &'a str,
            versioned: bool,
        ) -> BoxFuture<'a, Result<Option<ObjectInfo>, LayerError>> {
            self.0.delete_object(bucket, object, versioned)
        }

        fn get_system_object<'a>(
            &'a self,
            bucket: &'a BucketInfo,
            object: SystemObject,
        ) -> BoxFuture<'a, Result<Option<Bytes>, LayerError>> {
            self.0.get_system_object(bucket, object)
        }

        fn put_system_object<'a>(
            &'a self,
            bucket: &'a BucketInfo,
            object: SystemObject,
            payload: Bytes,
        ) -> BoxFuture<'a, Result<(), LayerError>> {
            self.0.put_system_object(bucket, object, payload)
        }

        fn delete_system_object<'a>(
            &'a self,
            bucket: &'a BucketInfo,
            object: SystemObject,
        ) -> BoxFuture<'a, Result<(), LayerError>> {
            self.0.delete_system_object(bucket, object)
        }
    }

    #[tokio::test]
    async fn test_read_failure_after_headers_aborts_body() {
        let network = Arc::new(MemoryLayer::default());
        let state = Arc::new(AppState {
            config: Config::default(),
            buckets: network.clone(),
            layer: Arc::new(FailingReads(network)),
        });
        let (router, _) = seeded(state).await;

        let response = send(&router, Method::GET, "/photos/digits.txt", &[], "").await;
        // Status and length were committed before the read started.
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "content-length"), "15");
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .is_err());
    }
}
