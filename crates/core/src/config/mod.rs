//! 配置管理
//!
//! `AppConfig` 由 `config` crate 加载：TOML文件 + `NODEPOOL_` 环境变量覆盖，
//! 各配置段缺省时使用默认值，加载后逐段 `validate()`。

pub mod models;

pub use models::*;
