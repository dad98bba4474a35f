use crate::models::{ResourceSpec, Task};

/// 任务费用模型
pub trait CostModel: Send + Sync {
    /// 提交时的预估费用
    fn estimate(&self, requirements: &ResourceSpec) -> u64;

    /// 完成时的实际费用，默认等于预估费用
    fn actual(&self, task: &Task) -> u64 {
        task.estimated_cost
    }
}

/// 按资源加权的固定单价：`memory_gb + cpu_score/100 + gpu_score/100 + gpu_memory_gb`，最低为1
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceWeightedCost;

impl CostModel for ResourceWeightedCost {
    fn estimate(&self, requirements: &ResourceSpec) -> u64 {
        let weighted = requirements.memory_gb
            + requirements.cpu_score / 100.0
            + requirements.gpu_score / 100.0
            + requirements.gpu_memory_gb;
        if weighted.is_finite() && weighted > 1.0 {
            weighted.floor() as u64
        } else {
            1
        }
    }
}
