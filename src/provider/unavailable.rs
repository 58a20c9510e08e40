//! 不可用提供方：运行时缺失时的占位实现，所有查询都返回 NotInstalled

use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::{ModelProvider, ModelSession, ProviderError, SessionOptions};

#[derive(Debug, Default)]
pub struct UnavailableProvider;

#[async_trait]
impl ModelProvider for UnavailableProvider {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn availability(&self) -> Result<String, ProviderError> {
        Err(ProviderError::NotInstalled)
    }

    async fn create_session(
        &self,
        _options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, ProviderError> {
        Err(ProviderError::NotInstalled)
    }
}
