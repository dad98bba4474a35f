//! 内存仓储实现

pub mod node_repository;
pub mod task_repository;

pub use node_repository::InMemoryNodeRepository;
pub use task_repository::InMemoryTaskRepository;
