//! Storage abstraction between the S3 handlers and the container network.
//!
//! [`BucketResolver`] maps bucket names to containers and [`ObjectLayer`]
//! reads and writes objects inside them.  Both use manually desugared async
//! methods (pinned boxed futures) so they can be used as trait objects.
//!
//! Bucket configuration is not a backend concept: the provided methods on
//! [`ObjectLayer`] persist it as ordinary objects under the reserved
//! [`SystemObject`] keys.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::data::{
    BucketInfo, BucketSettings, CorsConfiguration, DataError, ObjectInfo, SystemObject,
};

pub mod memory;

/// Boxed future returned by the layer traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by the storage abstraction.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    #[error("bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("object not found: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    #[error("version not found: {0}")]
    NoSuchVersion(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    /// A stored system object could not be decoded.
    #[error("corrupt system object: {0}")]
    Data(#[from] DataError),

    /// Transport or availability failure of the backend.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Inclusive byte range of an object, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeParams {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl RangeParams {
    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parameters of a payload read.
pub struct GetObjectParams<'a> {
    pub bucket: &'a BucketInfo,
    /// Already resolved object to read.
    pub info: &'a ObjectInfo,
    /// `None` reads the whole payload.
    pub range: Option<RangeParams>,
    /// Sink receiving the payload bytes.
    pub writer: &'a mut (dyn AsyncWrite + Send + Unpin),
}

/// Parameters of an object upload.
pub struct PutObjectParams<'a> {
    pub bucket: &'a BucketInfo,
    pub key: &'a str,
    pub content_type: &'a str,
    pub headers: HashMap<String, String>,
    pub payload: Bytes,
    /// Keep earlier versions of the key; otherwise they are replaced.
    pub versioned: bool,
}

/// Parameters of a bucket creation.
#[derive(Debug, Clone)]
pub struct CreateBucketParams {
    pub name: String,
    pub owner: String,
    pub location_constraint: String,
    pub object_lock_enabled: bool,
}

/// Maps client-visible bucket names to their backing containers.
pub trait BucketResolver: Send + Sync + 'static {
    /// Look up a bucket by name.
    fn resolve_bucket<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<BucketInfo, LayerError>>;

    /// Create a container for a new bucket and register its name.
    fn create_bucket(
        &self,
        params: CreateBucketParams,
    ) -> BoxFuture<'_, Result<BucketInfo, LayerError>>;
}

/// Object operations against the container network.
pub trait ObjectLayer: Send + Sync + 'static {
    /// Resolve the metadata of the latest version of `object`, or of the
    /// given `version`.  A latest version that is a delete marker is
    /// returned as such; callers decide how to present it.
    fn get_object_info<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: &'a str,
        version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>>;

    /// Stream an object's payload, or a byte range of it, into
    /// `params.writer`.
    fn get_object<'a>(
        &'a self,
        params: GetObjectParams<'a>,
    ) -> BoxFuture<'a, Result<(), LayerError>>;

    /// Store a new object version.
    fn put_object<'a>(
        &'a self,
        params: PutObjectParams<'a>,
    ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>>;

    /// Delete `object`.  With `versioned` set, a delete marker is written and
    /// returned; otherwise every version is removed and `None` returned.
    fn delete_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: &'a str,
        versioned: bool,
    ) -> BoxFuture<'a, Result<Option<ObjectInfo>, LayerError>>;

    /// Read the payload of a system object, `None` if it was never written.
    fn get_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
    ) -> BoxFuture<'a, Result<Option<Bytes>, LayerError>>;

    /// Replace a system object.
    fn put_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<(), LayerError>>;

    fn delete_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
    ) -> BoxFuture<'a, Result<(), LayerError>>;

    /// Bucket settings; [`BucketSettings::none`] when no settings object exists.
    fn get_bucket_settings<'a>(
        &'a self,
        bucket: &'a BucketInfo,
    ) -> BoxFuture<'a, Result<BucketSettings, LayerError>> {
        Box::pin(async move {
            match self.get_system_object(bucket, SystemObject::Settings).await? {
                Some(data) => Ok(BucketSettings::from_json(&data)?),
                None => Ok(BucketSettings::none()),
            }
        })
    }

    fn put_bucket_settings<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        settings: &'a BucketSettings,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        Box::pin(async move {
            let data = settings.to_json()?;
            self.put_system_object(bucket, SystemObject::Settings, Bytes::from(data))
                .await
        })
    }

    /// Bucket CORS rules, `None` when never configured.
    fn get_bucket_cors<'a>(
        &'a self,
        bucket: &'a BucketInfo,
    ) -> BoxFuture<'a, Result<Option<CorsConfiguration>, LayerError>> {
        Box::pin(async move {
            match self.get_system_object(bucket, SystemObject::Cors).await? {
                Some(data) => Ok(Some(CorsConfiguration::from_xml(&data)?)),
                None => Ok(None),
            }
        })
    }

    fn put_bucket_cors<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        cors: &'a CorsConfiguration,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        Box::pin(async move {
            let data = Bytes::from(cors.to_xml());
            self.put_system_object(bucket, SystemObject::Cors, data).await
        })
    }

    fn delete_bucket_cors<'a>(
        &'a self,
        bucket: &'a BucketInfo,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        self.delete_system_object(bucket, SystemObject::Cors)
    }
}
