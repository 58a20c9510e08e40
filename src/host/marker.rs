//! 「最近一次预热」标记：只为可观测性写出，核心本身不读取

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupMarker {
    pub warmup_complete: bool,
    pub warmup_time: DateTime<Utc>,
}

impl WarmupMarker {
    pub fn completed_now() -> Self {
        Self {
            warmup_complete: true,
            warmup_time: Utc::now(),
        }
    }
}

#[async_trait]
pub trait WarmupRecorder: Send + Sync {
    async fn record(&self, marker: &WarmupMarker) -> anyhow::Result<()>;
}

/// 保存在内存中，便于测试与查询
#[derive(Debug, Default)]
pub struct InMemoryWarmupRecorder {
    last: RwLock<Option<WarmupMarker>>,
}

impl InMemoryWarmupRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last(&self) -> Option<WarmupMarker> {
        self.last.read().await.clone()
    }
}

#[async_trait]
impl WarmupRecorder for InMemoryWarmupRecorder {
    async fn record(&self, marker: &WarmupMarker) -> anyhow::Result<()> {
        *self.last.write().await = Some(marker.clone());
        Ok(())
    }
}

/// 写入 JSON 文件（覆盖）
#[derive(Debug, Clone)]
pub struct JsonFileWarmupRecorder {
    path: PathBuf,
}

impl JsonFileWarmupRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl WarmupRecorder for JsonFileWarmupRecorder {
    async fn record(&self, marker: &WarmupMarker) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(marker)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("write warmup marker {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_file_recorder_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("warmup.json");
        let recorder = JsonFileWarmupRecorder::new(&path);
        let marker = WarmupMarker::completed_now();
        recorder.record(&marker).await.unwrap();

        let read: WarmupMarker =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, marker);
    }

    #[tokio::test]
    async fn test_in_memory_recorder_keeps_last() {
        let recorder = InMemoryWarmupRecorder::new();
        assert!(recorder.last().await.is_none());
        recorder.record(&WarmupMarker::completed_now()).await.unwrap();
        assert!(recorder.last().await.unwrap().warmup_complete);
    }
}
