// src/object_store.rs
//
// The remote artifact store contract consumed by the sync engine. The REST
// implementation lives in `pollination_client.rs`; tests provide in-memory
// fakes.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::error::SyncResult;
use crate::types::{ArtifactCategory, ArtifactEntry, ArtifactKey, Namespace, UploadTicket};

/// A boxed, pinned, sendable stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = SyncResult<Bytes>> + Send + 'static>>;

/// Keyed blob storage scoped to an owner/project namespace.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Ask the store for a presigned upload target for `key`.
    async fn create_upload_ticket(&self, ns: &Namespace, key: &ArtifactKey) -> SyncResult<UploadTicket>;

    /// List one level of entries under `path` (namespace root when `None`).
    async fn list_entries(&self, ns: &Namespace, path: Option<&str>) -> SyncResult<Vec<ArtifactEntry>>;

    /// Resolve a direct download URL for a file key.
    async fn get_download_url(&self, ns: &Namespace, key: &ArtifactKey) -> SyncResult<String>;

    /// Delete everything under `path` (the whole namespace when `None`).
    async fn delete(&self, ns: &Namespace, path: Option<&str>) -> SyncResult<()>;

    /// Open the server-generated tar.gz for one artifact category of a
    /// simulation.
    async fn get_bulk_archive_stream(
        &self,
        ns: &Namespace,
        simulation_id: &str,
        category: ArtifactCategory,
    ) -> SyncResult<ByteStream>;
}
