pub mod api_observability;
pub mod app_config;
pub mod credit_storage;
pub mod scheduler;

pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use credit_storage::{CreditConfig, StorageBackend, StorageConfig};
pub use scheduler::{HeartbeatConfig, LifecycleConfig, SchedulerConfig};
