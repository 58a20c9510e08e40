//! Nano Composer - 本地语言模型写作助手的后台编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 可用性跟踪、写作引擎（会话与 prompt）、请求协调（预热 / 分派 / 信封）
//! - **host**: 宿主协作方（设置提供方、预热标记）
//! - **observability**: 日志初始化
//! - **provider**: 模型提供方抽象与实现（本地运行时 / Stub / Unavailable）

pub mod config;
pub mod core;
pub mod host;
pub mod observability;
pub mod provider;

pub use crate::core::{Request, RequestCoordinator, Response};
