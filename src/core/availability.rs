//! 模型可用性跟踪
//!
//! refresh 查询提供方并把原始状态归一化为四种状态之一，覆盖进程内唯一的快照；current 只读快照。
//! 这里不做重试，重试策略在 RequestCoordinator。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::provider::ModelProvider;

/// 模型可用性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityState {
    #[default]
    Unknown,
    Available,
    /// 模型存在但需要下载，不能强制启动
    Downloadable,
    Unavailable,
}

impl AvailabilityState {
    /// 归一化提供方的原始状态字符串（大小写不敏感）
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "available" => Self::Available,
            "after-download" | "downloadable" => Self::Downloadable,
            "unavailable" | "blocked" => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Available => "available",
            Self::Downloadable => "downloadable",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 最近一次检查结果；raw 为提供方原始状态或查询错误文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySnapshot {
    pub status: AvailabilityState,
    pub raw: String,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for AvailabilitySnapshot {
    fn default() -> Self {
        Self {
            status: AvailabilityState::Unknown,
            raw: String::new(),
            checked_at: None,
        }
    }
}

pub struct AvailabilityTracker {
    provider: Arc<dyn ModelProvider>,
    snapshot: RwLock<AvailabilitySnapshot>,
}

impl AvailabilityTracker {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            snapshot: RwLock::new(AvailabilitySnapshot::default()),
        }
    }

    /// 查询提供方并覆盖快照；提供方缺失或查询失败视为 Unavailable
    pub async fn refresh(&self) -> AvailabilityState {
        let (status, raw) = match self.provider.availability().await {
            Ok(raw) => (AvailabilityState::normalize(&raw), raw),
            Err(e) => {
                tracing::debug!("Availability query failed: {}", e);
                (AvailabilityState::Unavailable, e.to_string())
            }
        };
        *self.snapshot.write().await = AvailabilitySnapshot {
            status,
            raw,
            checked_at: Some(Utc::now()),
        };
        status
    }

    pub async fn current(&self) -> AvailabilityState {
        self.snapshot.read().await.status
    }

    pub async fn snapshot(&self) -> AvailabilitySnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}
