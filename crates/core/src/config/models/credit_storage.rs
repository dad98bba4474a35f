use std::path::PathBuf;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// 积分账本配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    /// 关闭时所有提交均被授权，完成后不扣费
    pub enabled: bool,
    /// 新用户首次出现时的初始余额
    pub initial_balance: u64,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_balance: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
}

/// Blob存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("storage"),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Filesystem {
            ensure!(
                !self.path.as_os_str().is_empty(),
                "文件存储必须指定存储目录"
            );
        }
        Ok(())
    }
}
