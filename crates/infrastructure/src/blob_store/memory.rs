use std::collections::HashMap;

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::BlobRef;
use nodepool_core::traits::BlobStore;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 内存Blob存储
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn put(&self, key: String, bytes: Vec<u8>) -> BlobRef {
        self.objects.write().await.insert(key.clone(), bytes);
        BlobRef(key)
    }

    async fn get(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(blob_ref.as_str())
            .cloned()
            .ok_or_else(|| SchedulerError::storage(format!("对象不存在: {blob_ref}")))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_archive(&self, bytes: Vec<u8>) -> SchedulerResult<BlobRef> {
        Ok(self.put(format!("archives/{}.zip", Uuid::new_v4()), bytes).await)
    }

    async fn get_archive(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        self.get(blob_ref).await
    }

    async fn put_result(&self, task_id: &str, bytes: Vec<u8>) -> SchedulerResult<BlobRef> {
        Ok(self
            .put(format!("results/{task_id}/{}.zip", Uuid::new_v4()), bytes)
            .await)
    }

    async fn get_result(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        self.get(blob_ref).await
    }

    async fn delete(&self, blob_ref: &BlobRef) -> SchedulerResult<()> {
        self.objects.write().await.remove(blob_ref.as_str());
        Ok(())
    }
}
