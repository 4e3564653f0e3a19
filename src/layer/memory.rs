//! In-memory container network.
//!
//! Models the backend the gateway talks to: containers addressed by
//! [`ContainerId`], each holding immutable objects addressed by
//! [`ObjectId`].  Identifiers are content hashes, so a new upload of the same
//! key always produces a new object rather than mutating an old one.
//!
//! All state sits behind one `tokio::sync::RwLock`.  Reads clone the payload
//! `Bytes` under the lock and stream them after releasing it, so a slow
//! client never blocks other requests.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::{
    BoxFuture, BucketResolver, CreateBucketParams, GetObjectParams, LayerError, ObjectLayer,
    PutObjectParams,
};
use crate::data::{BucketInfo, ContainerId, ObjectId, ObjectInfo, SystemObject};

/// Default size of the chunks written to the response sink.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

const SYSTEM_OWNER: &str = "gateway";

struct StoredObject {
    info: ObjectInfo,
    payload: Bytes,
}

#[derive(Default)]
struct Container {
    objects: HashMap<ObjectId, StoredObject>,
    /// Object ids per key, oldest first.
    versions: HashMap<String, Vec<ObjectId>>,
}

impl Container {
    fn latest(&self, key: &str) -> Option<&StoredObject> {
        self.versions
            .get(key)
            .and_then(|ids| ids.last())
            .and_then(|id| self.objects.get(id))
    }

    /// Remove every version of `key`, returning the number of payload bytes freed.
    fn remove_all(&mut self, key: &str) -> u64 {
        let mut freed = 0;
        for id in self.versions.remove(key).unwrap_or_default() {
            if let Some(obj) = self.objects.remove(&id) {
                freed += obj.payload.len() as u64;
            }
        }
        freed
    }
}

#[derive(Default)]
struct Network {
    buckets: HashMap<String, BucketInfo>,
    containers: HashMap<ContainerId, Container>,
    stored_bytes: u64,
}

/// In-memory implementation of both [`BucketResolver`] and [`ObjectLayer`].
pub struct MemoryLayer {
    state: RwLock<Network>,
    /// Maximum payload bytes stored.  0 means unlimited.
    max_size_bytes: u64,
    read_chunk_size: usize,
}

impl Default for MemoryLayer {
    fn default() -> Self {
        Self::new(0, DEFAULT_READ_CHUNK_SIZE)
    }
}

struct NewObject<'a> {
    key: &'a str,
    content_type: &'a str,
    owner: &'a str,
    headers: HashMap<String, String>,
    payload: Bytes,
    is_delete_marker: bool,
    /// Keep earlier versions of the key instead of replacing them.
    keep_versions: bool,
}

impl MemoryLayer {
    pub fn new(max_size_bytes: u64, read_chunk_size: usize) -> Self {
        Self {
            state: RwLock::new(Network::default()),
            max_size_bytes,
            read_chunk_size: read_chunk_size.max(1),
        }
    }

    /// Hex SHA-256 of a payload; the value served as the ETag.
    fn payload_hash(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn timestamp_bytes(ts: &DateTime<Utc>) -> [u8; 8] {
        ts.timestamp_nanos_opt().unwrap_or_default().to_be_bytes()
    }

    /// Store a new object in `bucket`'s container.
    async fn store(
        &self,
        bucket: &BucketInfo,
        obj: NewObject<'_>,
    ) -> Result<ObjectInfo, LayerError> {
        let created = Utc::now();
        let hash_sum = Self::payload_hash(&obj.payload);
        let id = ObjectId::digest(&[
            bucket.container_id.as_bytes(),
            obj.key.as_bytes(),
            &Self::timestamp_bytes(&created),
            hash_sum.as_bytes(),
            &[u8::from(obj.is_delete_marker)],
        ]);

        let info = ObjectInfo {
            id,
            container_id: bucket.container_id,
            is_dir: false,
            is_delete_marker: obj.is_delete_marker,
            bucket: bucket.name.clone(),
            name: obj.key.to_string(),
            size: obj.payload.len() as u64,
            content_type: obj.content_type.to_string(),
            created,
            hash_sum,
            owner: obj.owner.to_string(),
            headers: obj.headers,
        };

        let mut state = self.state.write().await;
        let Network {
            containers,
            stored_bytes,
            ..
        } = &mut *state;
        let container = containers
            .get_mut(&bucket.container_id)
            .ok_or_else(|| LayerError::NoSuchBucket(bucket.name.clone()))?;

        let replaced: u64 = if obj.keep_versions {
            0
        } else {
            container
                .versions
                .get(obj.key)
                .into_iter()
                .flatten()
                .filter_map(|id| container.objects.get(id))
                .map(|o| o.payload.len() as u64)
                .sum()
        };
        let new_len = obj.payload.len() as u64;
        let projected = stored_bytes.saturating_sub(replaced).saturating_add(new_len);
        if self.max_size_bytes > 0 && projected > self.max_size_bytes {
            return Err(LayerError::Backend(anyhow::anyhow!(
                "container network capacity exceeded: stored={}, incoming={new_len}, max={}",
                *stored_bytes,
                self.max_size_bytes
            )));
        }

        if !obj.keep_versions {
            container.remove_all(obj.key);
        }
        container.objects.insert(
            id,
            StoredObject {
                info: info.clone(),
                payload: obj.payload,
            },
        );
        container
            .versions
            .entry(obj.key.to_string())
            .or_default()
            .push(id);
        *stored_bytes = projected;

        tracing::debug!(address = %info.address(), key = obj.key, size = info.size, "object stored");
        Ok(info)
    }
}

// ── BucketResolver implementation ─────────────────────────────────────

impl BucketResolver for MemoryLayer {
    fn resolve_bucket<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<BucketInfo, LayerError>> {
        Box::pin(async move {
            let state = self.state.read().await;
            state
                .buckets
                .get(name)
                .cloned()
                .ok_or_else(|| LayerError::NoSuchBucket(name.to_string()))
        })
    }

    fn create_bucket(
        &self,
        params: CreateBucketParams,
    ) -> BoxFuture<'_, Result<BucketInfo, LayerError>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.buckets.contains_key(&params.name) {
                return Err(LayerError::BucketAlreadyExists(params.name));
            }

            let created = Utc::now();
            let container_id = ContainerId::digest(&[
                params.owner.as_bytes(),
                params.name.as_bytes(),
                &Self::timestamp_bytes(&created),
            ]);
            let info = BucketInfo {
                name: params.name.clone(),
                container_id,
                owner: params.owner,
                created,
                location_constraint: params.location_constraint,
                object_lock_enabled: params.object_lock_enabled,
            };

            state.containers.insert(container_id, Container::default());
            state.buckets.insert(params.name, info.clone());
            tracing::info!(bucket = %info.name, container = %container_id, "container created");
            Ok(info)
        })
    }
}

// ── ObjectLayer implementation ────────────────────────────────────────

impl ObjectLayer for MemoryLayer {
    fn get_object_info<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: &'a str,
        version: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let container = state
                .containers
                .get(&bucket.container_id)
                .ok_or_else(|| LayerError::NoSuchBucket(bucket.name.clone()))?;

            match version {
                Some(version) => {
                    let id: ObjectId = version
                        .parse()
                        .map_err(|_| LayerError::NoSuchVersion(version.to_string()))?;
                    container
                        .objects
                        .get(&id)
                        .filter(|obj| obj.info.name == object)
                        .map(|obj| obj.info.clone())
                        .ok_or_else(|| LayerError::NoSuchVersion(version.to_string()))
                }
                None => container
                    .latest(object)
                    .map(|obj| obj.info.clone())
                    .ok_or_else(|| LayerError::NoSuchKey {
                        bucket: bucket.name.clone(),
                        key: object.to_string(),
                    }),
            }
        })
    }

    fn get_object<'a>(
        &'a self,
        params: GetObjectParams<'a>,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        Box::pin(async move {
            let address = params.info.address();
            let payload = {
                let state = self.state.read().await;
                state
                    .containers
                    .get(&address.container)
                    .and_then(|c| c.objects.get(&address.object))
                    .map(|obj| obj.payload.clone())
                    .ok_or_else(|| LayerError::NoSuchKey {
                        bucket: params.bucket.name.clone(),
                        key: params.info.name.clone(),
                    })?
            };

            let payload = match params.range {
                Some(range) => {
                    if range.end >= payload.len() as u64 {
                        return Err(LayerError::Backend(anyhow::anyhow!(
                            "range {}-{} out of bounds for object {address} of {} bytes",
                            range.start,
                            range.end,
                            payload.len()
                        )));
                    }
                    payload.slice(range.start as usize..=range.end as usize)
                }
                None => payload,
            };

            for chunk in payload.chunks(self.read_chunk_size) {
                params
                    .writer
                    .write_all(chunk)
                    .await
                    .map_err(|e| LayerError::Backend(e.into()))?;
            }
            params
                .writer
                .flush()
                .await
                .map_err(|e| LayerError::Backend(e.into()))?;
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        params: PutObjectParams<'a>,
    ) -> BoxFuture<'a, Result<ObjectInfo, LayerError>> {
        Box::pin(async move {
            self.store(
                params.bucket,
                NewObject {
                    key: params.key,
                    content_type: params.content_type,
                    owner: &params.bucket.owner,
                    headers: params.headers,
                    payload: params.payload,
                    is_delete_marker: false,
                    keep_versions: params.versioned,
                },
            )
            .await
        })
    }

    fn delete_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: &'a str,
        versioned: bool,
    ) -> BoxFuture<'a, Result<Option<ObjectInfo>, LayerError>> {
        Box::pin(async move {
            if versioned {
                let marker = self
                    .store(
                        bucket,
                        NewObject {
                            key: object,
                            content_type: "",
                            owner: &bucket.owner,
                            headers: HashMap::new(),
                            payload: Bytes::new(),
                            is_delete_marker: true,
                            keep_versions: true,
                        },
                    )
                    .await?;
                return Ok(Some(marker));
            }

            let mut state = self.state.write().await;
            let Network {
                containers,
                stored_bytes,
                ..
            } = &mut *state;
            let container = containers
                .get_mut(&bucket.container_id)
                .ok_or_else(|| LayerError::NoSuchBucket(bucket.name.clone()))?;
            let freed = container.remove_all(object);
            *stored_bytes = stored_bytes.saturating_sub(freed);
            Ok(None)
        })
    }

    fn get_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
    ) -> BoxFuture<'a, Result<Option<bytes::Bytes>, LayerError>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let container = state
                .containers
                .get(&bucket.container_id)
                .ok_or_else(|| LayerError::NoSuchBucket(bucket.name.clone()))?;
            Ok(container.latest(object.key()).map(|obj| obj.payload.clone()))
        })
    }

    fn put_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
        payload: Bytes,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        Box::pin(async move {
            let content_type = match object {
                SystemObject::Settings => "application/json",
                SystemObject::Cors | SystemObject::NotificationConfiguration => "application/xml",
            };
            self.store(
                bucket,
                NewObject {
                    key: object.key(),
                    content_type,
                    owner: SYSTEM_OWNER,
                    headers: HashMap::new(),
                    payload,
                    is_delete_marker: false,
                    keep_versions: false,
                },
            )
            .await?;
            Ok(())
        })
    }

    fn delete_system_object<'a>(
        &'a self,
        bucket: &'a BucketInfo,
        object: SystemObject,
    ) -> BoxFuture<'a, Result<(), LayerError>> {
        Box::pin(async move {
            self.delete_object(bucket, object.key(), false).await?;
            Ok(())
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BucketSettings, CorsConfiguration, CorsRule};
    use crate::layer::RangeParams;

    async fn test_bucket(layer: &MemoryLayer, name: &str) -> BucketInfo {
        layer
            .create_bucket(CreateBucketParams {
                name: name.to_string(),
                owner: "owner".to_string(),
                location_constraint: String::new(),
                object_lock_enabled: false,
            })
            .await
            .unwrap()
    }

    async fn put(
        layer: &MemoryLayer,
        bkt: &BucketInfo,
        key: &str,
        data: &str,
        versioned: bool,
    ) -> ObjectInfo {
        layer
            .put_object(PutObjectParams {
                bucket: bkt,
                key,
                content_type: "text/plain",
                headers: HashMap::new(),
                payload: Bytes::from(data.to_string()),
                versioned,
            })
            .await
            .unwrap()
    }

    async fn read(
        layer: &MemoryLayer,
        bkt: &BucketInfo,
        info: &ObjectInfo,
        range: Option<RangeParams>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        layer
            .get_object(GetObjectParams {
                bucket: bkt,
                info,
                range,
                writer: &mut out,
            })
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_create_and_resolve_bucket() {
        let layer = MemoryLayer::default();
        let created = test_bucket(&layer, "photos").await;
        let resolved = layer.resolve_bucket("photos").await.unwrap();
        assert_eq!(created, resolved);
        assert!(matches!(
            layer.resolve_bucket("missing").await,
            Err(LayerError::NoSuchBucket(_))
        ));
    }

    #[tokio::test]
    async fn test_create_bucket_twice_fails() {
        let layer = MemoryLayer::default();
        test_bucket(&layer, "photos").await;
        let err = layer
            .create_bucket(CreateBucketParams {
                name: "photos".to_string(),
                owner: "other".to_string(),
                location_constraint: String::new(),
                object_lock_enabled: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::BucketAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_put_and_read_roundtrip() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let info = put(&layer, &bkt, "a.txt", "hello world", false).await;

        assert_eq!(info.size, 11);
        assert_eq!(info.container_id, bkt.container_id);
        assert_eq!(
            info.hash_sum,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let resolved = layer.get_object_info(&bkt, "a.txt", None).await.unwrap();
        assert_eq!(resolved, info);
        assert_eq!(read(&layer, &bkt, &info, None).await, b"hello world");
    }

    #[tokio::test]
    async fn test_ranged_read() {
        let layer = MemoryLayer::new(0, 4);
        let bkt = test_bucket(&layer, "photos").await;
        let info = put(&layer, &bkt, "a.txt", "123456789abcdef", false).await;

        let range = RangeParams { start: 5, end: 10 };
        assert_eq!(read(&layer, &bkt, &info, Some(range)).await, b"6789ab");
    }

    #[tokio::test]
    async fn test_range_past_end_is_backend_error() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let info = put(&layer, &bkt, "a.txt", "abc", false).await;

        let mut out = Vec::new();
        let err = layer
            .get_object(GetObjectParams {
                bucket: &bkt,
                info: &info,
                range: Some(RangeParams { start: 0, end: 3 }),
                writer: &mut out,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::Backend(_)));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        assert!(matches!(
            layer.get_object_info(&bkt, "nope", None).await,
            Err(LayerError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_unversioned_put_replaces() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let first = put(&layer, &bkt, "a.txt", "one", false).await;
        let second = put(&layer, &bkt, "a.txt", "two", false).await;

        assert_ne!(first.id, second.id);
        let latest = layer.get_object_info(&bkt, "a.txt", None).await.unwrap();
        assert_eq!(latest.id, second.id);
        assert!(matches!(
            layer
                .get_object_info(&bkt, "a.txt", Some(&first.version()))
                .await,
            Err(LayerError::NoSuchVersion(_))
        ));
    }

    #[tokio::test]
    async fn test_versioned_put_keeps_history() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let first = put(&layer, &bkt, "a.txt", "one", true).await;
        let second = put(&layer, &bkt, "a.txt", "two", true).await;

        let old = layer
            .get_object_info(&bkt, "a.txt", Some(&first.version()))
            .await
            .unwrap();
        assert_eq!(old, first);
        let latest = layer.get_object_info(&bkt, "a.txt", None).await.unwrap();
        assert_eq!(latest, second);
    }

    #[tokio::test]
    async fn test_version_of_other_key_is_not_found() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let a = put(&layer, &bkt, "a.txt", "one", true).await;
        assert!(matches!(
            layer.get_object_info(&bkt, "b.txt", Some(&a.version())).await,
            Err(LayerError::NoSuchVersion(_))
        ));
        assert!(matches!(
            layer.get_object_info(&bkt, "a.txt", Some("not-hex")).await,
            Err(LayerError::NoSuchVersion(_))
        ));
    }

    #[tokio::test]
    async fn test_versioned_delete_writes_marker() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let original = put(&layer, &bkt, "a.txt", "one", true).await;

        let marker = layer
            .delete_object(&bkt, "a.txt", true)
            .await
            .unwrap()
            .expect("delete marker");
        assert!(marker.is_delete_marker);
        assert_eq!(marker.size, 0);

        let latest = layer.get_object_info(&bkt, "a.txt", None).await.unwrap();
        assert!(latest.is_delete_marker);
        let old = layer
            .get_object_info(&bkt, "a.txt", Some(&original.version()))
            .await
            .unwrap();
        assert!(!old.is_delete_marker);
    }

    #[tokio::test]
    async fn test_unversioned_delete_removes() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        put(&layer, &bkt, "a.txt", "one", false).await;

        assert!(layer.delete_object(&bkt, "a.txt", false).await.unwrap().is_none());
        assert!(matches!(
            layer.get_object_info(&bkt, "a.txt", None).await,
            Err(LayerError::NoSuchKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let layer = MemoryLayer::new(10, DEFAULT_READ_CHUNK_SIZE);
        let bkt = test_bucket(&layer, "photos").await;
        put(&layer, &bkt, "a", "12345678", false).await;

        // Replacing the same key only counts the difference.
        put(&layer, &bkt, "a", "1234567890", false).await;

        let err = layer
            .put_object(PutObjectParams {
                bucket: &bkt,
                key: "b",
                content_type: "text/plain",
                headers: HashMap::new(),
                payload: Bytes::from_static(b"x"),
                versioned: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LayerError::Backend(_)));

        layer.delete_object(&bkt, "a", false).await.unwrap();
        put(&layer, &bkt, "b", "x", false).await;
    }

    #[tokio::test]
    async fn test_settings_default_to_none_status() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let settings = layer.get_bucket_settings(&bkt).await.unwrap();
        assert!(settings.is_none_status);
        assert!(!settings.versioning_enabled);
    }

    #[tokio::test]
    async fn test_settings_persist_as_system_object() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        let settings = BucketSettings {
            versioning_enabled: true,
            ..BucketSettings::default()
        };
        layer.put_bucket_settings(&bkt, &settings).await.unwrap();

        let stored = layer.get_bucket_settings(&bkt).await.unwrap();
        assert!(!stored.is_none_status);
        assert!(stored.versioning_enabled);

        // The settings live in an ordinary object under the reserved key.
        let raw = layer
            .get_object_info(&bkt, bkt.settings_object_name(), None)
            .await
            .unwrap();
        assert_eq!(raw.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_cors_put_get_delete() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        assert!(layer.get_bucket_cors(&bkt).await.unwrap().is_none());

        let cors = CorsConfiguration {
            cors_rules: vec![CorsRule {
                allowed_methods: vec!["GET".to_string()],
                allowed_origins: vec!["*".to_string()],
                ..CorsRule::default()
            }],
        };
        layer.put_bucket_cors(&bkt, &cors).await.unwrap();
        assert_eq!(layer.get_bucket_cors(&bkt).await.unwrap(), Some(cors));

        layer.delete_bucket_cors(&bkt).await.unwrap();
        assert!(layer.get_bucket_cors(&bkt).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_settings_object() {
        let layer = MemoryLayer::default();
        let bkt = test_bucket(&layer, "photos").await;
        layer
            .put_system_object(&bkt, SystemObject::Settings, Bytes::from_static(b"{not json"))
            .await
            .unwrap();
        assert!(matches!(
            layer.get_bucket_settings(&bkt).await,
            Err(LayerError::Data(_))
        ));
    }
}
