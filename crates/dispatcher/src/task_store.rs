use std::sync::Arc;
use std::time::Duration;

use nodepool_core::models::{
    validate_identifier, BlobRef, CompletionOutcome, StopDisposition, Task, TaskFilter, TaskId,
    TaskResult, TaskStatus, TaskSubmission,
};
use nodepool_core::{SchedulerError, SchedulerResult};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::PoolContext;

/// 任务存储
///
/// 任务记录的唯一所有者。所有状态迁移都在单条任务的锁内完成，
/// 需要同时修改节点时先持有任务锁再获取节点锁。
pub struct TaskStore {
    ctx: Arc<PoolContext>,
}

impl TaskStore {
    pub fn new(ctx: Arc<PoolContext>) -> Self {
        Self { ctx }
    }

    /// 提交任务
    ///
    /// 校验输入和资源需求，经积分网关授权后保存压缩包并创建PENDING任务。
    pub async fn submit(&self, submission: TaskSubmission) -> SchedulerResult<Task> {
        validate_identifier("用户ID", &submission.owner_id)?;
        if let Some(task_id) = &submission.task_id {
            validate_identifier("任务ID", task_id)?;
        }
        if submission.archive.is_empty() {
            return Err(SchedulerError::invalid_input("任务压缩包不能为空"));
        }
        submission.requirements.validate()?;
        let requirements = submission.requirements.normalized();

        let task_id = submission
            .task_id
            .unwrap_or_else(|| format!("task-{}", Uuid::new_v4()));
        if self.ctx.tasks.entry(&task_id).await.is_ok() {
            return Err(SchedulerError::DuplicateTask { id: task_id });
        }

        let estimated_cost = self.ctx.cost_model.estimate(&requirements);
        if !self
            .ctx
            .credit
            .authorize(&submission.owner_id, estimated_cost)
            .await?
        {
            warn!(
                "用户 {} 积分不足, 拒绝提交 (预估消耗: {})",
                submission.owner_id, estimated_cost
            );
            return Err(SchedulerError::Unauthorized {
                owner_id: submission.owner_id,
                estimated_cost,
            });
        }

        let payload_ref = match self.ctx.blobs.put_archive(submission.archive).await {
            Ok(payload_ref) => payload_ref,
            Err(e) => {
                self.ctx
                    .release_credit(&submission.owner_id, estimated_cost)
                    .await;
                return Err(e);
            }
        };
        let task = Task::new(
            task_id,
            submission.owner_id,
            payload_ref.clone(),
            requirements,
            estimated_cost,
            self.ctx.tasks.next_sequence(),
        );
        if let Err(e) = self.ctx.tasks.insert(task.clone()).await {
            self.discard_blob(&payload_ref).await;
            self.ctx.release_credit(&task.owner_id, estimated_cost).await;
            return Err(e);
        }

        info!(
            "任务提交成功: {} (用户: {}, 预估消耗: {})",
            task.id, task.owner_id, task.estimated_cost
        );
        self.ctx.metrics.record_task_submitted();
        self.ctx.trigger.nudge();
        Ok(task)
    }

    pub async fn get_status(&self, task_id: &str) -> SchedulerResult<Task> {
        self.ctx.tasks.get(task_id).await
    }

    pub async fn list_all(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.ctx.tasks.list(filter).await
    }

    pub async fn append_output(
        &self,
        task_id: &str,
        node_id: &str,
        chunk: &str,
    ) -> SchedulerResult<()> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        task.append_output(node_id, chunk)
    }

    pub async fn append_logs(&self, task_id: &str, node_id: &str, chunk: &str) -> SchedulerResult<()> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        task.append_logs(node_id, chunk)
    }

    pub async fn get_output(&self, task_id: &str) -> SchedulerResult<String> {
        Ok(self.ctx.tasks.get(task_id).await?.output)
    }

    pub async fn get_logs(&self, task_id: &str) -> SchedulerResult<String> {
        Ok(self.ctx.tasks.get(task_id).await?.logs)
    }

    /// 完成任务：RUNNING → COMPLETED，保存结果，释放节点并扣费
    ///
    /// 相同结果的重复上报为空操作；结果不一致或状态不允许时返回 `InvalidState`。
    pub async fn complete(
        &self,
        task_id: &str,
        node_id: &str,
        result_bytes: Vec<u8>,
    ) -> SchedulerResult<Task> {
        let snapshot = self.ctx.tasks.get(task_id).await?;
        if !matches!(snapshot.status, TaskStatus::Running | TaskStatus::Completed) {
            return Err(SchedulerError::invalid_state(
                task_id,
                snapshot.status,
                "只有RUNNING任务可以完成",
            ));
        }

        let result = TaskResult {
            size_bytes: result_bytes.len() as u64,
            checksum: TaskResult::checksum_of(&result_bytes),
            blob_ref: self.ctx.blobs.put_result(task_id, result_bytes).await?,
        };

        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        match task.complete(node_id, result.clone(), Instant::now()) {
            Ok(CompletionOutcome::Completed) => {
                self.ctx.release_node(node_id, task_id).await;
                let completed = task.clone();
                drop(task);

                info!("任务 {} 在节点 {} 上完成", task_id, node_id);
                self.ctx.metrics.record_task_finished(
                    TaskStatus::Completed,
                    execution_seconds(&completed),
                );
                self.charge(&completed).await;
                Ok(completed)
            }
            Ok(CompletionOutcome::Duplicate) => {
                let existing = task.clone();
                drop(task);
                debug!("任务 {} 重复上报完成, 忽略", task_id);
                self.discard_blob(&result.blob_ref).await;
                Ok(existing)
            }
            Err(e) => {
                drop(task);
                self.discard_blob(&result.blob_ref).await;
                Err(e)
            }
        }
    }

    async fn charge(&self, task: &Task) {
        let actual_cost = self.ctx.cost_model.actual(task);
        if let Err(e) = self
            .ctx
            .credit
            .settle(&task.owner_id, task.estimated_cost, actual_cost)
            .await
        {
            error!(
                "任务 {} 完成后扣费失败 (用户: {}, 金额: {}): {}",
                task.id, task.owner_id, actual_cost, e
            );
        }
    }

    async fn discard_blob(&self, blob_ref: &BlobRef) {
        if let Err(e) = self.ctx.blobs.delete(blob_ref).await {
            warn!("删除存储对象 {} 失败: {}", blob_ref, e);
        }
    }

    /// 任务失败：SCHEDULED/RUNNING → FAILED，释放节点
    pub async fn fail(&self, task_id: &str, node_id: &str, reason: &str) -> SchedulerResult<Task> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        if task.fail(node_id, reason, Instant::now())? {
            self.ctx.release_node(node_id, task_id).await;
            warn!("任务 {} 在节点 {} 上失败: {}", task_id, node_id, reason);
            self.ctx
                .metrics
                .record_task_finished(TaskStatus::Failed, execution_seconds(&task));
            self.ctx
                .release_credit(&task.owner_id, task.estimated_cost)
                .await;
        }
        Ok(task.clone())
    }

    /// 请求停止任务
    ///
    /// PENDING任务立即STOPPED；SCHEDULED/RUNNING任务记录停止请求，
    /// 由调用方通知节点，在节点确认或超时兜底后终结。
    pub async fn request_stop(&self, task_id: &str) -> SchedulerResult<(StopDisposition, Task)> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        let disposition = task.request_stop(Instant::now())?;
        match &disposition {
            StopDisposition::Stopped => {
                info!("PENDING任务 {} 已停止", task_id);
                self.ctx
                    .metrics
                    .record_task_finished(TaskStatus::Stopped, None);
                self.ctx
                    .release_credit(&task.owner_id, task.estimated_cost)
                    .await;
            }
            StopDisposition::Signalled { node_id, repeated } => {
                if !repeated {
                    info!("任务 {} 请求停止, 等待节点 {} 确认", task_id, node_id);
                }
            }
            StopDisposition::AlreadyStopped => {
                debug!("任务 {} 已经停止", task_id);
            }
        }
        Ok((disposition, task.clone()))
    }

    /// 终结停止请求并释放节点
    ///
    /// `node_id` 为节点确认时的上报者；为 `None` 时表示超时兜底。
    pub async fn finalize_stop(&self, task_id: &str, node_id: Option<&str>) -> SchedulerResult<Task> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let mut task = entry.lock().await;
        if let Some(reporter) = node_id {
            if task.status != TaskStatus::Stopped {
                task.ensure_reporter(reporter)?;
            }
        }
        if let Some(assigned) = task.finalize_stop(Instant::now())? {
            self.ctx.release_node(&assigned, task_id).await;
            match node_id {
                Some(_) => info!("节点 {} 确认停止任务 {}", assigned, task_id),
                None => warn!("任务 {} 等待节点 {} 停止确认超时, 强制终止", task_id, assigned),
            }
            self.ctx
                .metrics
                .record_task_finished(TaskStatus::Stopped, execution_seconds(&task));
            self.ctx
                .release_credit(&task.owner_id, task.estimated_cost)
                .await;
        }
        Ok(task.clone())
    }

    /// 读取任务结果内容，仅COMPLETED任务可用
    pub async fn get_result(&self, task_id: &str) -> SchedulerResult<Vec<u8>> {
        let task = self.ctx.tasks.get(task_id).await?;
        let result = match (&task.status, &task.result) {
            (TaskStatus::Completed, Some(result)) => result,
            _ => {
                return Err(SchedulerError::invalid_state(
                    task_id,
                    task.status,
                    "任务尚未完成, 没有结果",
                ))
            }
        };
        self.ctx.blobs.get_result(&result.blob_ref).await
    }

    /// 删除已结束的任务及其存储对象
    pub async fn cleanup(&self, task_id: &str) -> SchedulerResult<()> {
        let entry = self.ctx.tasks.entry(task_id).await?;
        let blobs = {
            let task = entry.lock().await;
            if !task.status.is_terminal() {
                return Err(SchedulerError::invalid_state(
                    task_id,
                    task.status,
                    "只能清理已结束的任务",
                ));
            }
            let mut blobs = vec![task.payload_ref.clone()];
            if let Some(result) = &task.result {
                blobs.push(result.blob_ref.clone());
            }
            blobs
        };
        self.ctx.tasks.remove(task_id).await?;
        for blob_ref in &blobs {
            self.discard_blob(blob_ref).await;
        }
        info!("任务 {} 已清理", task_id);
        Ok(())
    }

    /// 清理结束时间超过保留期的任务
    pub async fn purge_expired(&self, retention: Duration) -> SchedulerResult<Vec<TaskId>> {
        let now = Instant::now();
        let expired: Vec<TaskId> = self
            .ctx
            .tasks
            .list(&TaskFilter::default())
            .await?
            .into_iter()
            .filter(|task| {
                task.status.is_terminal()
                    && task
                        .finished_instant
                        .is_some_and(|at| now.saturating_duration_since(at) >= retention)
            })
            .map(|task| task.id)
            .collect();

        let mut purged = Vec::new();
        for task_id in expired {
            match self.cleanup(&task_id).await {
                Ok(()) => purged.push(task_id),
                Err(SchedulerError::UnknownTask { .. }) => {}
                Err(e) => warn!("清理过期任务 {} 失败: {}", task_id, e),
            }
        }
        if !purged.is_empty() {
            info!("清理了 {} 个过期任务", purged.len());
        }
        Ok(purged)
    }
}

fn execution_seconds(task: &Task) -> Option<f64> {
    let started = task.started_at?;
    let finished = task.finished_at?;
    Some((finished - started).num_milliseconds() as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestPool;
    use nodepool_core::traits::BlobStore;
    use nodepool_testing_utils::TaskSubmissionBuilder;

    #[tokio::test]
    async fn test_submit_creates_pending_task() {
        let pool = TestPool::new();
        let task = pool
            .task_store
            .submit(
                TaskSubmissionBuilder::new()
                    .with_id("t1")
                    .with_owner("alice")
                    .with_gpu_score(50.0)
                    .with_memory_gb(8.0)
                    .with_gpu_name("  ")
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.requirements.gpu_name, None);
        // 8 + 0.5
        assert_eq!(task.estimated_cost, 8);
        assert_eq!(
            pool.blobs.get_archive(&task.payload_ref).await.unwrap(),
            b"PK\x03\x04test-archive"
        );
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let pool = TestPool::new();
        let negative = TaskSubmissionBuilder::new().with_memory_gb(-2.0).build();
        assert!(matches!(
            pool.task_store.submit(negative).await,
            Err(SchedulerError::InvalidRequirements(_))
        ));
        let nan = TaskSubmissionBuilder::new().with_gpu_score(f64::NAN).build();
        assert!(matches!(
            pool.task_store.submit(nan).await,
            Err(SchedulerError::InvalidRequirements(_))
        ));
        let no_owner = TaskSubmissionBuilder::new().with_owner("").build();
        assert!(matches!(
            pool.task_store.submit(no_owner).await,
            Err(SchedulerError::InvalidInput(_))
        ));
        let empty_archive = TaskSubmissionBuilder::new().with_archive(b"").build();
        assert!(matches!(
            pool.task_store.submit(empty_archive).await,
            Err(SchedulerError::InvalidInput(_))
        ));
        assert!(pool.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_submit_rejected_by_credit_gate() {
        let pool = TestPool::new();
        pool.credit.set_allow(false);
        let result = pool
            .task_store
            .submit(TaskSubmissionBuilder::new().build())
            .await;
        assert!(matches!(result, Err(SchedulerError::Unauthorized { .. })));
        assert_eq!(pool.ctx.tasks.count().await.unwrap(), 0);
        assert!(pool.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_submit_duplicate_id() {
        let pool = TestPool::new();
        let submission = TaskSubmissionBuilder::new().with_id("t1").build();
        pool.task_store.submit(submission.clone()).await.unwrap();
        assert!(matches!(
            pool.task_store.submit(submission).await,
            Err(SchedulerError::DuplicateTask { .. })
        ));
        assert_eq!(pool.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let pool = TestPool::new();
        assert!(matches!(
            pool.task_store.get_status("missing").await,
            Err(SchedulerError::UnknownTask { .. })
        ));
    }

    #[tokio::test]
    async fn test_append_requires_active_state() {
        let pool = TestPool::new();
        let task_id = pool.submit_default().await;
        assert!(matches!(
            pool.task_store.append_output(&task_id, "n1", "x").await,
            Err(SchedulerError::InvalidState { .. })
        ));

        pool.register("n1").await;
        pool.bind(&task_id, "n1").await;
        pool.task_store
            .append_logs(&task_id, "n1", "line 1\n")
            .await
            .unwrap();
        pool.task_store
            .append_logs(&task_id, "n1", "line 2\n")
            .await
            .unwrap();
        assert_eq!(
            pool.task_store.get_logs(&task_id).await.unwrap(),
            "line 1\nline 2\n"
        );
    }

    #[tokio::test]
    async fn test_complete_stores_result_once_and_debits() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.start(&task_id, "n1").await;

        let done = pool
            .task_store
            .complete(&task_id, "n1", b"result".to_vec())
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        let again = pool
            .task_store
            .complete(&task_id, "n1", b"result".to_vec())
            .await
            .unwrap();
        assert_eq!(again.result, done.result);
        assert!(matches!(
            pool.task_store
                .complete(&task_id, "n1", b"different".to_vec())
                .await,
            Err(SchedulerError::InvalidState { .. })
        ));

        assert_eq!(pool.task_store.get_result(&task_id).await.unwrap(), b"result");
        assert_eq!(pool.credit.debits(), vec![("test-user".to_string(), 1)]);
        assert!(pool.credit.releases().is_empty());
        // 压缩包 + 一份结果
        assert_eq!(pool.blobs.len().await, 2);
        assert!(pool.ctx.nodes.get("n1").await.unwrap().is_available());
    }

    #[tokio::test]
    async fn test_complete_requires_running() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;
        assert!(matches!(
            pool.task_store.complete(&task_id, "n1", b"r".to_vec()).await,
            Err(SchedulerError::InvalidState { .. })
        ));
        assert!(matches!(
            pool.task_store.get_result(&task_id).await,
            Err(SchedulerError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_debit_failure_keeps_completed() {
        let pool = TestPool::new();
        pool.credit.set_fail_debit(true);
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.start(&task_id, "n1").await;

        let done = pool
            .task_store
            .complete(&task_id, "n1", b"r".to_vec())
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_fail_from_scheduled_releases_node() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.bind(&task_id, "n1").await;

        let failed = pool
            .task_store
            .fail(&task_id, "n1", "镜像拉取失败")
            .await
            .unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("镜像拉取失败"));
        assert!(pool.ctx.nodes.get("n1").await.unwrap().is_available());
        assert_eq!(
            pool.credit.releases(),
            vec![(failed.owner_id.clone(), failed.estimated_cost)]
        );
        assert!(pool.credit.debits().is_empty());
    }

    #[tokio::test]
    async fn test_stop_pending_is_immediate() {
        let pool = TestPool::new();
        let task_id = pool.submit_default().await;
        let (disposition, task) = pool.task_store.request_stop(&task_id).await.unwrap();
        assert_eq!(disposition, StopDisposition::Stopped);
        assert_eq!(task.status, TaskStatus::Stopped);

        let (disposition, _) = pool.task_store.request_stop(&task_id).await.unwrap();
        assert_eq!(disposition, StopDisposition::AlreadyStopped);
        // 重复停止不会再次释放预留
        assert_eq!(
            pool.credit.releases(),
            vec![(task.owner_id.clone(), task.estimated_cost)]
        );
    }

    #[tokio::test]
    async fn test_stop_ack_from_stale_node_rejected() {
        let pool = TestPool::new();
        pool.register("n1").await;
        let task_id = pool.submit_default().await;
        pool.start(&task_id, "n1").await;
        pool.task_store.request_stop(&task_id).await.unwrap();

        assert!(pool
            .task_store
            .finalize_stop(&task_id, Some("n2"))
            .await
            .is_err());
        let stopped = pool
            .task_store
            .finalize_stop(&task_id, Some("n1"))
            .await
            .unwrap();
        assert_eq!(stopped.status, TaskStatus::Stopped);
        assert!(pool.ctx.nodes.get("n1").await.unwrap().is_available());
        // 重复确认为空操作
        pool.task_store
            .finalize_stop(&task_id, Some("n1"))
            .await
            .unwrap();
        assert_eq!(pool.credit.releases().len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_only_terminal() {
        let pool = TestPool::new();
        let task_id = pool.submit_default().await;
        assert!(matches!(
            pool.task_store.cleanup(&task_id).await,
            Err(SchedulerError::InvalidState { .. })
        ));
        pool.task_store.request_stop(&task_id).await.unwrap();
        pool.task_store.cleanup(&task_id).await.unwrap();
        assert!(pool.blobs.is_empty().await);
        assert!(matches!(
            pool.task_store.get_status(&task_id).await,
            Err(SchedulerError::UnknownTask { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let pool = TestPool::new();
        let stopped = pool.submit_default().await;
        let pending = pool.submit_default().await;
        pool.task_store.request_stop(&stopped).await.unwrap();

        let retention = Duration::from_secs(3600);
        assert!(pool.task_store.purge_expired(retention).await.unwrap().is_empty());
        tokio::time::advance(retention).await;
        let purged = pool.task_store.purge_expired(retention).await.unwrap();
        assert_eq!(purged, vec![stopped]);
        assert!(pool.task_store.get_status(&pending).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_all_by_owner() {
        let pool = TestPool::new();
        for owner in ["alice", "bob", "alice"] {
            pool.task_store
                .submit(TaskSubmissionBuilder::new().with_owner(owner).build())
                .await
                .unwrap();
        }
        let alice = pool
            .task_store
            .list_all(&TaskFilter {
                status: None,
                owner_id: Some("alice".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice[0].sequence < alice[1].sequence);
    }
}
