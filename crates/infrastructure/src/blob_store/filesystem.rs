use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use nodepool_core::errors::{SchedulerError, SchedulerResult};
use nodepool_core::models::BlobRef;
use nodepool_core::traits::BlobStore;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// 文件系统Blob存储
///
/// 压缩包保存在 `<root>/archives/`，结果保存在 `<root>/results/<task_id>/`。
/// 句柄是相对于根目录的路径。
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> SchedulerResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("archives")).await?;
        fs::create_dir_all(root.join("results")).await?;
        info!("文件存储已初始化: {}", root.display());
        Ok(Self { root })
    }

    fn resolve(&self, blob_ref: &BlobRef) -> SchedulerResult<PathBuf> {
        let relative = Path::new(blob_ref.as_str());
        let safe = !blob_ref.as_str().is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !safe {
            return Err(SchedulerError::storage(format!("非法的存储句柄: {blob_ref}")));
        }
        Ok(self.root.join(relative))
    }

    async fn write(&self, relative: String, bytes: Vec<u8>) -> SchedulerResult<BlobRef> {
        let blob_ref = BlobRef(relative);
        let path = self.resolve(&blob_ref)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!("对象已写入: {}", path.display());
        Ok(blob_ref)
    }

    async fn read(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        let path = self.resolve(blob_ref)?;
        fs::read(&path)
            .await
            .map_err(|e| SchedulerError::storage(format!("读取 {blob_ref} 失败: {e}")))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_archive(&self, bytes: Vec<u8>) -> SchedulerResult<BlobRef> {
        self.write(format!("archives/{}.zip", Uuid::new_v4()), bytes)
            .await
    }

    async fn get_archive(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        self.read(blob_ref).await
    }

    async fn put_result(&self, task_id: &str, bytes: Vec<u8>) -> SchedulerResult<BlobRef> {
        self.write(format!("results/{task_id}/{}.zip", Uuid::new_v4()), bytes)
            .await
    }

    async fn get_result(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>> {
        self.read(blob_ref).await
    }

    async fn delete(&self, blob_ref: &BlobRef) -> SchedulerResult<()> {
        let path = self.resolve(blob_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
