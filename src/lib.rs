//! casgate library: S3-compatible gateway over a content-addressed
//! container network.
//!
//! This crate provides the request handlers, the object-layer and bucket
//! resolver seams, the container data model, and the in-memory network
//! backend used to serve them.

use std::sync::Arc;

pub mod config;
pub mod data;
pub mod errors;
pub mod handlers;
pub mod layer;
pub mod metrics;
pub mod server;
pub mod xml;

use crate::config::Config;
use crate::layer::memory::MemoryLayer;
use crate::layer::{BucketResolver, ObjectLayer};

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Maps bucket names to containers.
    pub buckets: Arc<dyn BucketResolver>,
    /// Object reads and writes against the container network.
    pub layer: Arc<dyn ObjectLayer>,
}

impl AppState {
    /// State backed by a single in-memory network serving both seams.
    pub fn in_memory(config: Config) -> Self {
        let network = Arc::new(MemoryLayer::new(
            config.storage.memory.max_size_bytes,
            config.storage.memory.read_chunk_size,
        ));
        Self {
            config,
            buckets: network.clone(),
            layer: network,
        }
    }
}
