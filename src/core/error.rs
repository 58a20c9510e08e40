//! 写作请求的错误类型与分类
//!
//! 错误在出错处一次性分类（kind / 是否瞬时 / 是否致命），上层据此决定重置预热计数或使会话失效，
//! 而不是再去解析错误文本。Display 文案是对外契约：Downloading 含 "downloadable"，Timeout 含 "timeout"。

use thiserror::Error;

use crate::provider::ProviderError;

/// 编排层错误（AvailabilityTracker / CompositionEngine / RequestCoordinator）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Language model is unavailable: {0}")]
    Unavailable(String),

    #[error("Local model is downloadable but not ready yet. Please try again shortly.")]
    Downloading,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Empty response from the language model.")]
    EmptyResponse,

    #[error("Request timeout: the language model did not respond in time. Please try again.")]
    Timeout,

    #[error("Model is busy with another request. Please retry shortly.")]
    Busy,

    #[error("Model session is not initialized; warm up first.")]
    SessionNotReady,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("{0}")]
    Provider(String),
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelUnavailable,
    ModelDownloading,
    InputInvalid,
    EmptyResponse,
    Timeout,
    Busy,
    Provider,
}

impl ComposeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::SessionNotReady => ErrorKind::ModelUnavailable,
            Self::Downloading => ErrorKind::ModelDownloading,
            Self::InvalidInput(_) | Self::InvalidRequest(_) | Self::UnknownAction(_) => {
                ErrorKind::InputInvalid
            }
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::Timeout => ErrorKind::Timeout,
            Self::Busy => ErrorKind::Busy,
            Self::Provider(_) => ErrorKind::Provider,
        }
    }

    /// 瞬时失败：预热时遇到不消耗重试预算（模型仍在下载 / 超时）
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::ModelDownloading | ErrorKind::Timeout)
    }

    /// 调用方稍后重试可能成功
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self.kind(), ErrorKind::Busy | ErrorKind::EmptyResponse)
    }

    /// 致命失败：共享会话应被销毁，下次请求重新预热
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ProviderError> for ComposeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Aborted | ProviderError::TimedOut => Self::Timeout,
            ProviderError::NotInstalled
            | ProviderError::Unreachable(_)
            | ProviderError::ModelMissing(_) => Self::Unavailable(err.to_string()),
            ProviderError::Http { .. } => Self::Provider(err.to_string()),
            ProviderError::Failed(msg) if msg.trim().is_empty() => {
                Self::Provider("Prompt failed.".to_string())
            }
            ProviderError::Failed(msg) => Self::Provider(msg),
        }
    }
}
