use thiserror::Error;

use crate::models::TaskStatus;

/// 节点池错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务未找到: {id}")]
    UnknownTask { id: String },

    #[error("节点未找到: {id}")]
    UnknownNode { id: String },

    #[error("任务 {task_id} 当前状态 {status:?} 不允许该操作: {reason}")]
    InvalidState {
        task_id: String,
        status: TaskStatus,
        reason: String,
    },

    #[error("无效的资源需求: {0}")]
    InvalidRequirements(String),

    #[error("用户 {owner_id} 积分不足, 预估消耗 {estimated_cost}")]
    Unauthorized {
        owner_id: String,
        estimated_cost: u64,
    },

    #[error("用户 {owner_id} 可用积分 {available} 不足以转出 {requested}")]
    InsufficientBalance {
        owner_id: String,
        available: u64,
        requested: u64,
    },

    #[error("节点 {id} 已以不同的资源容量注册")]
    DuplicateNode { id: String },

    #[error("任务已存在: {id}")]
    DuplicateTask { id: String },

    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("积分账本错误: {0}")]
    CreditGate(String),

    #[error("节点通知失败: {node_id} - {message}")]
    Notification { node_id: String, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn unknown_task<S: Into<String>>(id: S) -> Self {
        Self::UnknownTask { id: id.into() }
    }

    pub fn unknown_node<S: Into<String>>(id: S) -> Self {
        Self::UnknownNode { id: id.into() }
    }

    pub fn invalid_state<S: Into<String>, R: Into<String>>(
        task_id: S,
        status: TaskStatus,
        reason: R,
    ) -> Self {
        Self::InvalidState {
            task_id: task_id.into(),
            status,
            reason: reason.into(),
        }
    }

    pub fn invalid_requirements<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequirements(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn notification<S: Into<String>, M: Into<String>>(node_id: S, message: M) -> Self {
        Self::Notification {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Storage(_)
                | SchedulerError::CreditGate(_)
                | SchedulerError::Notification { .. }
                | SchedulerError::Timeout(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::UnknownTask { .. } => "请求的任务不存在",
            SchedulerError::UnknownNode { .. } => "请求的节点不存在或已被移除",
            SchedulerError::InvalidState { .. } => "任务当前状态不允许该操作",
            SchedulerError::InvalidRequirements(_) => "任务资源需求配置有误",
            SchedulerError::Unauthorized { .. } => "积分余额不足, 无法提交任务",
            SchedulerError::InsufficientBalance { .. } => "可用积分不足",
            SchedulerError::DuplicateNode { .. } => "节点已以不同配置注册",
            SchedulerError::DuplicateTask { .. } => "任务ID已存在",
            SchedulerError::InvalidInput(_) => "输入数据验证失败",
            SchedulerError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Storage(err.to_string())
    }
}
