use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>)
        -> Result<()>;

    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download object from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .context("S3 bucket is not reachable")?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Process-local blob store for tests and credential-less runs. Keys are
/// write-once: putting an existing key fails.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut objects = self.objects.lock().await;
        ensure!(!objects.contains_key(key), "object {key} already exists");
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        objects.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Logical blob collections. Keys are prefixed with the collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Uploads,
    Processed,
}

impl Collection {
    pub fn prefix(self) -> &'static str {
        match self {
            Collection::Uploads => "uploads",
            Collection::Processed => "processed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(collection: Collection, document_id: Uuid, name: &str) -> Self {
        Self(format!("{}/{document_id}/{name}", collection.prefix()))
    }

    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    pub fn collection(&self) -> Option<Collection> {
        match self.0.split('/').next()? {
            "uploads" => Some(Collection::Uploads),
            "processed" => Some(Collection::Processed),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Artifact access on top of an [`ObjectStorage`] backend.
///
/// Every key is scoped by document id and written once: raw uploads under a
/// fresh id, results only by the task that won the processing claim.
/// [`MemoryStorage`] rejects a second write to the same key; S3 does not check.
#[derive(Clone)]
pub struct ArtifactStore {
    storage: Arc<dyn ObjectStorage>,
}

impl ArtifactStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub async fn store(
        &self,
        collection: Collection,
        document_id: Uuid,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ArtifactRef> {
        let artifact = ArtifactRef::new(collection, document_id, name);
        self.storage
            .put_object(artifact.key(), bytes, Some(content_type.to_string()))
            .await
            .with_context(|| format!("failed to store artifact {artifact}"))?;
        Ok(artifact)
    }

    pub async fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.storage
            .get_object(artifact.key())
            .await
            .with_context(|| format!("failed to fetch artifact {artifact}"))
    }

    pub async fn remove(&self, artifact: &ArtifactRef) -> Result<()> {
        self.storage
            .delete_object(artifact.key())
            .await
            .with_context(|| format!("failed to delete artifact {artifact}"))
    }

    pub async fn ping(&self) -> Result<()> {
        self.storage.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_refs_are_scoped_by_collection_and_document() {
        let id = Uuid::new_v4();
        let raw = ArtifactRef::new(Collection::Uploads, id, "report.pdf");
        assert_eq!(raw.key(), format!("uploads/{id}/report.pdf"));
        assert_eq!(raw.collection(), Some(Collection::Uploads));

        let result = ArtifactRef::new(Collection::Processed, id, "report.md");
        assert_eq!(result.collection(), Some(Collection::Processed));
        assert_eq!(ArtifactRef::from_key("elsewhere/x").collection(), None);
    }

    #[tokio::test]
    async fn artifact_store_round_trips_and_refuses_rewrites() {
        let memory = Arc::new(MemoryStorage::new());
        let store = ArtifactStore::new(memory.clone());
        let id = Uuid::new_v4();

        let artifact = store
            .store(Collection::Processed, id, "notes.md", b"# notes".to_vec(), "text/markdown")
            .await
            .unwrap();
        assert_eq!(store.fetch(&artifact).await.unwrap(), b"# notes");

        let stored = memory.get(artifact.key()).await.unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("text/markdown"));

        let rewrite = store
            .store(Collection::Processed, id, "notes.md", b"# other".to_vec(), "text/markdown")
            .await;
        assert!(rewrite.is_err());
        assert_eq!(store.fetch(&artifact).await.unwrap(), b"# notes");

        store.remove(&artifact).await.unwrap();
        assert_eq!(memory.object_count().await, 0);
        assert!(store.fetch(&artifact).await.is_err());
    }
}
