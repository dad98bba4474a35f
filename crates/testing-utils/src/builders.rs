//! 测试数据构建器

use nodepool_core::models::{NodeRegistration, ResourceSpec, TaskSubmission};

/// 任务提交请求构建器
pub struct TaskSubmissionBuilder {
    submission: TaskSubmission,
}

impl TaskSubmissionBuilder {
    pub fn new() -> Self {
        Self {
            submission: TaskSubmission {
                task_id: None,
                owner_id: "test-user".to_string(),
                requirements: ResourceSpec::default(),
                archive: b"PK\x03\x04test-archive".to_vec(),
            },
        }
    }

    pub fn with_id(mut self, task_id: &str) -> Self {
        self.submission.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.submission.owner_id = owner_id.to_string();
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: f64) -> Self {
        self.submission.requirements.memory_gb = memory_gb;
        self
    }

    pub fn with_cpu_score(mut self, cpu_score: f64) -> Self {
        self.submission.requirements.cpu_score = cpu_score;
        self
    }

    pub fn with_gpu_score(mut self, gpu_score: f64) -> Self {
        self.submission.requirements.gpu_score = gpu_score;
        self
    }

    pub fn with_gpu_memory_gb(mut self, gpu_memory_gb: f64) -> Self {
        self.submission.requirements.gpu_memory_gb = gpu_memory_gb;
        self
    }

    pub fn with_gpu_name(mut self, gpu_name: &str) -> Self {
        self.submission.requirements.gpu_name = Some(gpu_name.to_string());
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.submission.requirements.location = Some(location.to_string());
        self
    }

    pub fn with_archive(mut self, archive: &[u8]) -> Self {
        self.submission.archive = archive.to_vec();
        self
    }

    pub fn build(self) -> TaskSubmission {
        self.submission
    }
}

impl Default for TaskSubmissionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 节点注册请求构建器
pub struct NodeRegistrationBuilder {
    registration: NodeRegistration,
}

impl NodeRegistrationBuilder {
    pub fn new(node_id: &str) -> Self {
        Self {
            registration: NodeRegistration {
                node_id: node_id.to_string(),
                hostname: Some(format!("{node_id}.local")),
                capacity: ResourceSpec {
                    memory_gb: 16.0,
                    cpu_score: 100.0,
                    gpu_score: 80.0,
                    gpu_memory_gb: 8.0,
                    gpu_name: None,
                    location: None,
                },
                container_isolation: true,
            },
        }
    }

    pub fn with_capacity(mut self, capacity: ResourceSpec) -> Self {
        self.registration.capacity = capacity;
        self
    }

    pub fn with_memory_gb(mut self, memory_gb: f64) -> Self {
        self.registration.capacity.memory_gb = memory_gb;
        self
    }

    pub fn with_cpu_score(mut self, cpu_score: f64) -> Self {
        self.registration.capacity.cpu_score = cpu_score;
        self
    }

    pub fn with_gpu_score(mut self, gpu_score: f64) -> Self {
        self.registration.capacity.gpu_score = gpu_score;
        self
    }

    pub fn with_gpu_memory_gb(mut self, gpu_memory_gb: f64) -> Self {
        self.registration.capacity.gpu_memory_gb = gpu_memory_gb;
        self
    }

    pub fn with_gpu_name(mut self, gpu_name: &str) -> Self {
        self.registration.capacity.gpu_name = Some(gpu_name.to_string());
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.registration.capacity.location = Some(location.to_string());
        self
    }

    pub fn without_isolation(mut self) -> Self {
        self.registration.container_isolation = false;
        self
    }

    pub fn build(self) -> NodeRegistration {
        self.registration
    }
}
