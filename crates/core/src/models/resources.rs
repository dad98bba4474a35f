use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 资源规格
///
/// 同一结构既描述任务的资源需求，也描述节点声明的资源容量。
///
/// # 字段说明
///
/// - `memory_gb`: 内存大小（GB）
/// - `cpu_score`: CPU性能评分
/// - `gpu_score`: GPU性能评分
/// - `gpu_memory_gb`: 显存大小（GB）
/// - `gpu_name`: GPU型号，任务指定时作为硬性过滤条件
/// - `location`: 地理位置，任务指定时作为硬性过滤条件
///
/// # 使用示例
///
/// ```rust
/// use nodepool_core::models::ResourceSpec;
///
/// let capacity = ResourceSpec {
///     memory_gb: 16.0,
///     gpu_score: 80.0,
///     ..Default::default()
/// };
/// let requirement = ResourceSpec {
///     memory_gb: 8.0,
///     gpu_score: 50.0,
///     ..Default::default()
/// };
/// assert!(capacity.satisfies(&requirement));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub memory_gb: f64,
    #[serde(default)]
    pub cpu_score: f64,
    #[serde(default)]
    pub gpu_score: f64,
    #[serde(default)]
    pub gpu_memory_gb: f64,
    #[serde(default)]
    pub gpu_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// 节点容量相对任务需求的富余量，用于紧凑匹配排序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSurplus {
    pub gpu_score: f64,
    pub cpu_score: f64,
}

impl ResourceSpec {
    fn numeric_fields(&self) -> [(&'static str, f64); 4] {
        [
            ("memory_gb", self.memory_gb),
            ("cpu_score", self.cpu_score),
            ("gpu_score", self.gpu_score),
            ("gpu_memory_gb", self.gpu_memory_gb),
        ]
    }

    /// 校验所有数值字段为非负有限值
    pub fn validate(&self) -> SchedulerResult<()> {
        for (name, value) in self.numeric_fields() {
            if !value.is_finite() || value < 0.0 {
                return Err(SchedulerError::invalid_requirements(format!(
                    "{name} 必须是非负有限数值, 实际为 {value}"
                )));
            }
        }
        Ok(())
    }

    /// 去除标签两端空白，空标签视为未指定
    pub fn normalized(mut self) -> Self {
        self.gpu_name = normalize_label(self.gpu_name.take());
        self.location = normalize_label(self.location.take());
        self
    }

    /// 判断当前容量是否满足给定需求
    pub fn satisfies(&self, required: &ResourceSpec) -> bool {
        self.memory_gb >= required.memory_gb
            && self.cpu_score >= required.cpu_score
            && self.gpu_score >= required.gpu_score
            && self.gpu_memory_gb >= required.gpu_memory_gb
            && label_matches(required.gpu_name.as_deref(), self.gpu_name.as_deref())
            && label_matches(required.location.as_deref(), self.location.as_deref())
    }

    pub fn surplus_over(&self, required: &ResourceSpec) -> ResourceSurplus {
        ResourceSurplus {
            gpu_score: self.gpu_score - required.gpu_score,
            cpu_score: self.cpu_score - required.cpu_score,
        }
    }
}

fn normalize_label(label: Option<String>) -> Option<String> {
    label
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn label_matches(required: Option<&str>, offered: Option<&str>) -> bool {
    match required {
        Some(required) => offered == Some(required),
        None => true,
    }
}

/// 节点上报的资源使用情况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_used_gb: f64,
    #[serde(default)]
    pub gpu_percent: f64,
    #[serde(default)]
    pub gpu_memory_used_gb: f64,
}

impl ResourceUsage {
    /// 百分比截断到 [0, 100]，用量截断到非负
    pub fn clamped(self) -> Self {
        Self {
            cpu_percent: clamp_percent(self.cpu_percent),
            memory_used_gb: clamp_amount(self.memory_used_gb),
            gpu_percent: clamp_percent(self.gpu_percent),
            gpu_memory_used_gb: clamp_amount(self.gpu_memory_used_gb),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn clamp_amount(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}
