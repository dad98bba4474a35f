//! 外部协作方接口：积分网关、Blob存储、节点通知器

use async_trait::async_trait;

use crate::errors::SchedulerResult;
use crate::models::{BlobRef, NodeCommand};

/// 积分网关
///
/// 提交任务前同步授权，授权成功即为该任务预留预估费用。任务完成后按实际消耗结算，
/// 未完成即结束的任务释放预留。扣费不得超过余额。
#[async_trait]
pub trait CreditGate: Send + Sync {
    async fn authorize(&self, owner_id: &str, estimated_cost: u64) -> SchedulerResult<bool>;

    async fn debit(&self, owner_id: &str, actual_cost: u64) -> SchedulerResult<()>;

    /// 释放 `reserved` 并扣除实际费用；不支持预留的实现直接扣费
    async fn settle(
        &self,
        owner_id: &str,
        _reserved: u64,
        actual_cost: u64,
    ) -> SchedulerResult<()> {
        self.debit(owner_id, actual_cost).await
    }

    /// 任务失败或停止时释放预留
    async fn release(&self, _owner_id: &str, _reserved: u64) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 任务压缩包和结果的Blob存储
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_archive(&self, bytes: Vec<u8>) -> SchedulerResult<BlobRef>;

    async fn get_archive(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>>;

    async fn put_result(&self, task_id: &str, bytes: Vec<u8>) -> SchedulerResult<BlobRef>;

    async fn get_result(&self, blob_ref: &BlobRef) -> SchedulerResult<Vec<u8>>;

    /// 删除不存在的对象不视为错误
    async fn delete(&self, blob_ref: &BlobRef) -> SchedulerResult<()>;
}

/// 节点通知器，向节点投递执行/停止指令
#[async_trait]
pub trait NodeNotifier: Send + Sync {
    async fn dispatch(&self, node_id: &str, command: NodeCommand) -> SchedulerResult<()>;

    /// 节点被移除后清理投递通道
    async fn forget(&self, _node_id: &str) {}
}
