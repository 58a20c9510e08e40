//! 模型提供方层：抽象与实现（本地运行时 / Stub / Unavailable）

pub mod local;
pub mod stub;
pub mod traits;
pub mod unavailable;

use std::sync::Arc;

pub use local::LocalModelProvider;
pub use stub::{StubProvider, StubReply};
pub use traits::{
    ModelProvider, ModelSession, PromptOptions, ProviderError, SamplingParams, SessionOptions,
};
pub use unavailable::UnavailableProvider;

use crate::config::AppConfig;

/// 根据配置选择提供方（local / stub / unavailable）；本地客户端构建失败时退回 Unavailable
pub fn create_provider_from_config(cfg: &AppConfig) -> Arc<dyn ModelProvider> {
    match cfg.provider.kind.to_lowercase().as_str() {
        "local" => match LocalModelProvider::from_config(&cfg.provider) {
            Ok(p) => {
                tracing::info!("Using local model runtime ({})", p.model());
                Arc::new(p)
            }
            Err(e) => {
                tracing::warn!("Local runtime client failed ({}), provider unavailable", e);
                Arc::new(UnavailableProvider)
            }
        },
        "stub" => {
            tracing::warn!("Using Stub provider (echo)");
            Arc::new(StubProvider::new())
        }
        other => {
            tracing::warn!("Unknown or disabled provider '{}', provider unavailable", other);
            Arc::new(UnavailableProvider)
        }
    }
}
