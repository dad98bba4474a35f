use serde::{Deserialize, Serialize};

use super::{BlobRef, ResourceSpec, TaskId};

/// 派发给节点的执行指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOrder {
    pub task_id: TaskId,
    pub owner_id: String,
    pub payload_ref: BlobRef,
    pub requirements: ResourceSpec,
}

/// 主控发往节点的指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeCommand {
    Execute(DispatchOrder),
    Stop { task_id: TaskId },
}

impl NodeCommand {
    pub fn task_id(&self) -> &str {
        match self {
            NodeCommand::Execute(order) => &order.task_id,
            NodeCommand::Stop { task_id } => task_id,
        }
    }
}
