//! 模型提供方抽象
//!
//! 所有后端（本地运行时 / Stub / Unavailable）实现 ModelProvider：availability（原始状态字符串）、
//! default_params（设备默认采样参数，可选）、create_session（创建会话）。
//! 会话本身实现 ModelSession：prompt（单次调用，采样参数随调用显式传入）、destroy（释放）。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 提供方层面的错误；在 CompositionEngine 边界统一映射为 ComposeError
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 提供方不存在（运行时未安装 / 未启用）
    #[error("Language model provider is not installed")]
    NotInstalled,

    #[error("Language model provider is unreachable: {0}")]
    Unreachable(String),

    /// 调用被中止（取消信号）
    #[error("Prompt aborted")]
    Aborted,

    #[error("Provider timeout")]
    TimedOut,

    /// 模型在会话期间被卸载或找不到
    #[error("Model not found: {0}")]
    ModelMissing(String),

    #[error("Provider HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("{0}")]
    Failed(String),
}

/// 采样参数（topK / temperature），每次调用显式传入，不修改共享会话
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub top_k: u32,
    pub temperature: f32,
}

impl SamplingParams {
    pub const DEFAULT_TOP_K: u32 = 3;
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;

    pub fn new(top_k: u32, temperature: f32) -> Self {
        Self { top_k, temperature }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOP_K, Self::DEFAULT_TEMPERATURE)
    }
}

/// 创建会话的参数：系统指令、基础采样参数、语言标签
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub sampling: SamplingParams,
    pub language: String,
}

/// 单次 prompt 调用参数
#[derive(Debug, Clone, PartialEq)]
pub struct PromptOptions {
    pub language: String,
    pub sampling: SamplingParams,
}

/// 模型会话：持有系统指令，跨调用复用直到 destroy
#[async_trait]
pub trait ModelSession: Send + Sync {
    async fn prompt(&self, input: &str, options: &PromptOptions) -> Result<String, ProviderError>;

    /// 释放会话；默认无操作
    async fn destroy(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// 模型提供方
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// 提供方名称（用于日志与安装提示）
    fn name(&self) -> &str;

    /// 查询原始可用性状态（如 "available" / "downloadable" / "blocked"），由 AvailabilityTracker 归一化
    async fn availability(&self) -> Result<String, ProviderError>;

    /// 设备默认采样参数；提供方不暴露时返回 None
    async fn default_params(&self) -> Option<SamplingParams> {
        None
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, ProviderError>;
}
