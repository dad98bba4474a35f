use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::ResourceSpec;
use crate::errors::{SchedulerError, SchedulerResult};

pub type TaskId = String;
pub type NodeId = String;

/// Blob存储中的对象句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 任务状态
///
/// ```text
/// PENDING ──匹配──> SCHEDULED ──确认──> RUNNING ──完成──> COMPLETED
///    │                 │                   ├──失败──> FAILED
///    │                 │                   └──停止确认──> STOPPED
///    │                 └──派发失败/节点失联──> PENDING
///    └──停止──> STOPPED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Scheduled,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Stopped,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    /// 已绑定节点且尚未结束
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Scheduled | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Stopped => "STOPPED",
        }
    }
}

/// 任务结果元数据，结果内容保存在Blob存储中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub blob_ref: BlobRef,
    pub size_bytes: u64,
    pub checksum: String,
}

impl TaskResult {
    /// SHA-256十六进制摘要，跨进程和版本稳定
    pub fn checksum_of(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// 内容一致性只比较大小和校验和，Blob句柄可以不同
    pub fn same_content(&self, other: &TaskResult) -> bool {
        self.size_bytes == other.size_bytes && self.checksum == other.checksum
    }
}

/// 节点失联或派发确认超时后的任务处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueOutcome {
    /// 重新进入PENDING等待调度
    Requeued,
    /// 重试次数耗尽，任务FAILED
    Exhausted,
    /// 已请求停止，直接终结为STOPPED
    Stopped,
    /// 任务不再绑定该节点，无需处理
    Unaffected,
}

/// 停止请求的处置结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopDisposition {
    /// PENDING任务被立即停止
    Stopped,
    /// 已向执行节点发出停止信号，等待确认
    Signalled { node_id: NodeId, repeated: bool },
    /// 任务已经是STOPPED
    AlreadyStopped,
}

/// 完成上报的处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    Duplicate,
}

/// 任务记录
///
/// 由任务存储独占持有，每条记录都有自己的锁。
///
/// # 字段说明
///
/// - `id`: 任务唯一标识
/// - `owner_id`: 提交任务的用户
/// - `payload_ref`: 任务压缩包在Blob存储中的句柄
/// - `requirements`: 资源需求
/// - `assigned_node`: 当前绑定的节点，重新排队时清空
/// - `output` / `logs`: 仅追加的文本
/// - `result`: 仅在进入COMPLETED时设置一次
/// - `sequence`: 提交序号，与 `created_at` 一起决定FIFO顺序
/// - `retry_count`: 因节点失联而重新排队的次数
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub owner_id: String,
    pub payload_ref: BlobRef,
    pub requirements: ResourceSpec,
    pub status: TaskStatus,
    pub assigned_node: Option<NodeId>,
    pub output: String,
    pub logs: String,
    pub result: Option<TaskResult>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub estimated_cost: u64,
    pub sequence: u64,
    pub stop_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub scheduled_instant: Option<Instant>,
    #[serde(skip)]
    pub stop_requested_instant: Option<Instant>,
    #[serde(skip)]
    pub finished_instant: Option<Instant>,
}

impl Task {
    pub fn new(
        id: TaskId,
        owner_id: String,
        payload_ref: BlobRef,
        requirements: ResourceSpec,
        estimated_cost: u64,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            payload_ref,
            requirements,
            status: TaskStatus::Pending,
            assigned_node: None,
            output: String::new(),
            logs: String::new(),
            result: None,
            failure_reason: None,
            retry_count: 0,
            estimated_cost,
            sequence,
            stop_requested: false,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            started_at: None,
            finished_at: None,
            scheduled_instant: None,
            stop_requested_instant: None,
            finished_instant: None,
        }
    }

    /// FIFO排序键
    pub fn queue_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }

    pub fn is_assigned_to(&self, node_id: &str) -> bool {
        self.assigned_node.as_deref() == Some(node_id)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn finish(&mut self, status: TaskStatus, now: Instant) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.finished_instant = Some(now);
        self.touch();
    }

    fn reject<R: Into<String>>(&self, reason: R) -> SchedulerError {
        SchedulerError::invalid_state(self.id.clone(), self.status, reason)
    }

    /// PENDING → SCHEDULED
    pub fn bind(&mut self, node_id: &str, now: Instant) -> SchedulerResult<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.reject("只有PENDING任务可以绑定节点"));
        }
        self.status = TaskStatus::Scheduled;
        self.assigned_node = Some(node_id.to_string());
        self.scheduled_at = Some(Utc::now());
        self.scheduled_instant = Some(now);
        self.touch();
        Ok(())
    }

    fn return_to_queue(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_node = None;
        self.scheduled_at = None;
        self.scheduled_instant = None;
        self.started_at = None;
        self.touch();
    }

    /// 派发失败时撤销绑定，不消耗重试次数
    pub fn revert_dispatch(&mut self, node_id: &str) -> bool {
        if self.status != TaskStatus::Scheduled || !self.is_assigned_to(node_id) {
            return false;
        }
        self.return_to_queue();
        true
    }

    /// 节点失联或确认超时，按重试预算决定重新排队或失败
    pub fn requeue_after_loss(
        &mut self,
        node_id: &str,
        max_retries: u32,
        cause: &str,
        now: Instant,
    ) -> RequeueOutcome {
        if !self.status.is_active() || !self.is_assigned_to(node_id) {
            return RequeueOutcome::Unaffected;
        }
        if self.stop_requested {
            self.finish(TaskStatus::Stopped, now);
            return RequeueOutcome::Stopped;
        }
        self.retry_count += 1;
        if self.retry_count > max_retries {
            self.failure_reason = Some(format!(
                "{cause}, 已重试 {} 次, 超过上限 {max_retries}",
                self.retry_count - 1
            ));
            self.finish(TaskStatus::Failed, now);
            return RequeueOutcome::Exhausted;
        }
        self.return_to_queue();
        RequeueOutcome::Requeued
    }

    /// SCHEDULED → RUNNING，同一节点重复确认返回 `Ok(false)`
    pub fn acknowledge(&mut self, node_id: &str) -> SchedulerResult<bool> {
        if !self.is_assigned_to(node_id) {
            return Err(self.reject(format!("任务未分配给节点 {node_id}")));
        }
        match self.status {
            TaskStatus::Scheduled => {
                self.status = TaskStatus::Running;
                self.started_at = Some(Utc::now());
                self.touch();
                Ok(true)
            }
            TaskStatus::Running => Ok(false),
            _ => Err(self.reject("只有SCHEDULED任务可以确认执行")),
        }
    }

    /// 上报者必须是当前分配的节点，且任务处于SCHEDULED/RUNNING
    pub fn ensure_reporter(&self, node_id: &str) -> SchedulerResult<()> {
        if !self.status.is_active() {
            return Err(self.reject("任务不在执行中"));
        }
        if !self.is_assigned_to(node_id) {
            return Err(self.reject(format!("任务未分配给节点 {node_id}")));
        }
        Ok(())
    }

    pub fn append_output(&mut self, node_id: &str, chunk: &str) -> SchedulerResult<()> {
        self.ensure_reporter(node_id)?;
        self.output.push_str(chunk);
        self.touch();
        Ok(())
    }

    pub fn append_logs(&mut self, node_id: &str, chunk: &str) -> SchedulerResult<()> {
        self.ensure_reporter(node_id)?;
        self.logs.push_str(chunk);
        self.touch();
        Ok(())
    }

    /// RUNNING → COMPLETED，相同结果的重复上报为空操作
    pub fn complete(
        &mut self,
        node_id: &str,
        result: TaskResult,
        now: Instant,
    ) -> SchedulerResult<CompletionOutcome> {
        if self.status == TaskStatus::Completed {
            return match &self.result {
                Some(existing) if existing.same_content(&result) => {
                    Ok(CompletionOutcome::Duplicate)
                }
                _ => Err(self.reject("任务已以不同的结果完成")),
            };
        }
        if self.status != TaskStatus::Running {
            return Err(self.reject("只有RUNNING任务可以完成"));
        }
        if !self.is_assigned_to(node_id) {
            return Err(self.reject(format!("任务未分配给节点 {node_id}")));
        }
        self.result = Some(result);
        self.finish(TaskStatus::Completed, now);
        Ok(CompletionOutcome::Completed)
    }

    /// SCHEDULED/RUNNING → FAILED，相同原因的重复上报返回 `Ok(false)`
    pub fn fail(&mut self, node_id: &str, reason: &str, now: Instant) -> SchedulerResult<bool> {
        if self.status == TaskStatus::Failed {
            if self.failure_reason.as_deref() == Some(reason) {
                return Ok(false);
            }
            return Err(self.reject("任务已以不同的原因失败"));
        }
        self.ensure_reporter(node_id)?;
        self.failure_reason = Some(reason.to_string());
        self.finish(TaskStatus::Failed, now);
        Ok(true)
    }

    pub fn request_stop(&mut self, now: Instant) -> SchedulerResult<StopDisposition> {
        match self.status {
            TaskStatus::Pending => {
                self.stop_requested = true;
                self.stop_requested_instant = Some(now);
                self.finish(TaskStatus::Stopped, now);
                Ok(StopDisposition::Stopped)
            }
            TaskStatus::Scheduled | TaskStatus::Running => {
                let node_id = self
                    .assigned_node
                    .clone()
                    .ok_or_else(|| self.reject("执行中的任务缺少分配节点"))?;
                let repeated = self.stop_requested;
                if !repeated {
                    self.stop_requested = true;
                    self.stop_requested_instant = Some(now);
                    self.touch();
                }
                Ok(StopDisposition::Signalled { node_id, repeated })
            }
            TaskStatus::Stopped => Ok(StopDisposition::AlreadyStopped),
            TaskStatus::Completed | TaskStatus::Failed => {
                Err(self.reject("任务已结束, 无法停止"))
            }
        }
    }

    /// 停止确认或超时兜底，返回需要释放的节点
    pub fn finalize_stop(&mut self, now: Instant) -> SchedulerResult<Option<NodeId>> {
        match self.status {
            TaskStatus::Stopped => Ok(None),
            TaskStatus::Scheduled | TaskStatus::Running if self.stop_requested => {
                self.finish(TaskStatus::Stopped, now);
                Ok(self.assigned_node.clone())
            }
            _ => Err(self.reject("任务没有待确认的停止请求")),
        }
    }
}

/// 任务提交请求
///
/// `task_id` 为空时由主控生成。`archive` 是任务压缩包内容。
#[derive(Debug, Clone, Default)]
pub struct TaskSubmission {
    pub task_id: Option<TaskId>,
    pub owner_id: String,
    pub requirements: ResourceSpec,
    pub archive: Vec<u8>,
}

/// 校验外部传入的标识符：非空，仅包含字母数字和 `-_.`，不能是 `.` 或 `..`
pub fn validate_identifier(kind: &str, value: &str) -> SchedulerResult<()> {
    if value.is_empty() {
        return Err(SchedulerError::invalid_input(format!("{kind}不能为空")));
    }
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !allowed || value == "." || value == ".." {
        return Err(SchedulerError::invalid_input(format!(
            "{kind}包含非法字符: {value}"
        )));
    }
    Ok(())
}

/// 任务查询过滤条件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub owner_id: Option<String>,
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            owner_id: None,
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |status| task.status == status)
            && self
                .owner_id
                .as_deref()
                .map_or(true, |owner| task.owner_id == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_task(id: &str) -> Task {
        Task::new(
            id.to_string(),
            "alice".to_string(),
            BlobRef(format!("archives/{id}")),
            ResourceSpec::default(),
            1,
            1,
        )
    }

    fn result_of(bytes: &[u8]) -> TaskResult {
        TaskResult {
            blob_ref: BlobRef("results/t1".to_string()),
            size_bytes: bytes.len() as u64,
            checksum: TaskResult::checksum_of(bytes),
        }
    }

    fn running_task() -> Task {
        let mut task = pending_task("t1");
        task.bind("n1", Instant::now()).unwrap();
        task.acknowledge("n1").unwrap();
        task
    }

    #[test]
    fn test_bind_requires_pending() {
        let mut task = pending_task("t1");
        task.bind("n1", Instant::now()).unwrap();
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert_eq!(task.assigned_node.as_deref(), Some("n1"));
        assert!(matches!(
            task.bind("n2", Instant::now()),
            Err(SchedulerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_acknowledge_is_idempotent_for_same_node() {
        let mut task = pending_task("t1");
        task.bind("n1", Instant::now()).unwrap();
        assert!(task.acknowledge("n2").is_err());
        assert!(task.acknowledge("n1").unwrap());
        assert!(!task.acknowledge("n1").unwrap());
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn test_duplicate_completion() {
        let mut task = running_task();
        let first = result_of(b"result-bytes");
        assert_eq!(
            task.complete("n1", first.clone(), Instant::now()).unwrap(),
            CompletionOutcome::Completed
        );
        let mut again = result_of(b"result-bytes");
        again.blob_ref = BlobRef("results/other".to_string());
        assert_eq!(
            task.complete("n1", again, Instant::now()).unwrap(),
            CompletionOutcome::Duplicate
        );
        assert!(task.complete("n1", result_of(b"other"), Instant::now()).is_err());
        assert_eq!(task.result, Some(first));
    }

    #[test]
    fn test_result_checksum_is_sha256() {
        assert_eq!(
            TaskResult::checksum_of(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        // 大小相同、内容不同
        assert!(!result_of(b"result-a").same_content(&result_of(b"result-b")));
    }

    #[test]
    fn test_complete_requires_running() {
        let mut task = pending_task("t1");
        task.bind("n1", Instant::now()).unwrap();
        assert!(task
            .complete("n1", result_of(b"x"), Instant::now())
            .is_err());
    }

    #[test]
    fn test_requeue_preserves_created_at_and_counts_retries() {
        let mut task = running_task();
        let created_at = task.created_at;
        let outcome = task.requeue_after_loss("n1", 3, "节点失联", Instant::now());
        assert_eq!(outcome, RequeueOutcome::Requeued);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.assigned_node, None);
        assert_eq!(task.retry_count, 1);
        assert_eq!(task.created_at, created_at);
    }

    #[test]
    fn test_requeue_exhausts_budget() {
        let mut task = pending_task("t1");
        for _ in 0..2 {
            task.bind("n1", Instant::now()).unwrap();
            task.requeue_after_loss("n1", 1, "节点失联", Instant::now());
        }
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.failure_reason.is_some());
    }

    #[test]
    fn test_requeue_ignores_other_nodes() {
        let mut task = running_task();
        assert_eq!(
            task.requeue_after_loss("n2", 3, "节点失联", Instant::now()),
            RequeueOutcome::Unaffected
        );
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[test]
    fn test_stop_semantics() {
        let mut pending = pending_task("t1");
        assert_eq!(
            pending.request_stop(Instant::now()).unwrap(),
            StopDisposition::Stopped
        );
        assert_eq!(
            pending.request_stop(Instant::now()).unwrap(),
            StopDisposition::AlreadyStopped
        );

        let mut running = running_task();
        assert_eq!(
            running.request_stop(Instant::now()).unwrap(),
            StopDisposition::Signalled {
                node_id: "n1".to_string(),
                repeated: false
            }
        );
        assert_eq!(running.finalize_stop(Instant::now()).unwrap().as_deref(), Some("n1"));
        assert_eq!(running.status, TaskStatus::Stopped);
        assert_eq!(running.finalize_stop(Instant::now()).unwrap(), None);
    }

    #[test]
    fn test_stop_on_completed_is_rejected() {
        let mut task = running_task();
        task.complete("n1", result_of(b"x"), Instant::now()).unwrap();
        assert!(matches!(
            task.request_stop(Instant::now()),
            Err(SchedulerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_node_loss_after_stop_request_finalizes_stopped() {
        let mut task = running_task();
        task.request_stop(Instant::now()).unwrap();
        assert_eq!(
            task.requeue_after_loss("n1", 3, "节点失联", Instant::now()),
            RequeueOutcome::Stopped
        );
        assert_eq!(task.status, TaskStatus::Stopped);
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn test_appends_require_assigned_node() {
        let mut task = running_task();
        task.append_output("n1", "hello ").unwrap();
        task.append_output("n1", "world").unwrap();
        assert!(task.append_logs("n2", "stale").is_err());
        assert_eq!(task.output, "hello world");

        let mut pending = pending_task("t2");
        assert!(pending.append_output("n1", "x").is_err());
    }

    #[test]
    fn test_fail_duplicate_with_same_reason() {
        let mut task = running_task();
        assert!(task.fail("n1", "oom", Instant::now()).unwrap());
        assert!(!task.fail("n1", "oom", Instant::now()).unwrap());
        assert!(task.fail("n1", "segfault", Instant::now()).is_err());
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("任务ID", "task-1_a.b").is_ok());
        assert!(validate_identifier("任务ID", "").is_err());
        assert!(validate_identifier("任务ID", "..").is_err());
        assert!(validate_identifier("任务ID", "a/b").is_err());
        assert!(validate_identifier("节点ID", "node 1").is_err());
    }

    #[test]
    fn test_filter_matches() {
        let task = pending_task("t1");
        assert!(TaskFilter::default().matches(&task));
        assert!(TaskFilter::with_status(TaskStatus::Pending).matches(&task));
        let other_owner = TaskFilter {
            status: None,
            owner_id: Some("bob".to_string()),
        };
        assert!(!other_owner.matches(&task));
    }
}
