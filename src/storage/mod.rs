mod gcs;

use std::sync::Arc;
use async_trait::async_trait;
use crate::error::Result;
use crate::warehouse::ByteStream;

pub use gcs::{GcsFile, GcsStore};

/// Opaque reference to an object in storage. Exports write to it, imports read
/// from its URI, and pipelines read its content back as a byte stream.
#[async_trait]
pub trait StorageFile: Send + Sync {
    /// Object name within its bucket.
    fn name(&self) -> &str;

    /// Location handed to load/extract jobs, e.g. `gs://bucket/name`.
    fn uri(&self) -> String;

    async fn open_read(&self) -> Result<ByteStream>;
}

/// Hands out file handles by object name.
pub trait ObjectStore: Send + Sync {
    fn file(&self, name: &str) -> Arc<dyn StorageFile>;
}
