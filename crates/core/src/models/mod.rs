//! # 数据模型
//!
//! 节点池主控的核心数据结构：任务、工作节点、资源规格和节点指令。
//!
//! ## 核心模型
//!
//! ### Task - 任务
//! 由任务存储独占持有。状态迁移全部通过 `Task` 上的方法完成，
//! 非法迁移返回 [`crate::SchedulerError::InvalidState`]。
//!
//! ### WorkerNode - 工作节点
//! 由节点注册表独占持有，记录声明的资源容量和心跳驱动的健康状态。
//!
//! ### ResourceSpec - 资源规格
//! 任务需求和节点容量共用同一结构，`gpu_name`/`location` 在任务指定时为硬性过滤条件。
//!
//! ### NodeCommand - 节点指令
//! 主控通过节点通知器下发的 `EXECUTE` / `STOP` 指令。
//!
//! ## 状态流转
//!
//! ```text
//! 任务:  PENDING → SCHEDULED → RUNNING → COMPLETED | FAILED | STOPPED
//! 节点:  HEALTHY → SUSPECT → DEAD → 移除
//! ```
//!
//! 时间字段分两类：`DateTime<Utc>` 用于对外展示，`tokio::time::Instant`
//! 用于超时判断且不参与序列化。

pub mod command;
pub mod node;
pub mod resources;
pub mod task;

pub use command::*;
pub use node::*;
pub use resources::*;
pub use task::*;
