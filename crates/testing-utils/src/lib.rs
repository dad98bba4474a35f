//! # NodePool Testing Utils
//!
//! 工作区共享的测试工具：
//!
//! - **Builders**: 任务提交请求和节点注册请求的构建器
//! - **Mocks**: 可控的积分网关和记录指令的节点通知器
//! - **Helpers**: 异步条件等待等通用测试辅助
//!
//! ```toml
//! [dev-dependencies]
//! nodepool-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
