//! 设置提供方：核心只读取首选语言与调试开关；安装时写入默认设置

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::SettingsSection;

/// 安装时写入的默认设置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultSettings {
    pub enabled: bool,
    pub show_icon: bool,
    pub default_tone: String,
    pub preferred_language: String,
    pub debug_mode: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_icon: true,
            default_tone: "formal".to_string(),
            preferred_language: "en".to_string(),
            debug_mode: false,
        }
    }
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// 默认 "en"
    async fn preferred_language(&self) -> String;

    /// 默认 false
    async fn debug_mode(&self) -> bool;

    /// 写入默认设置（onInstall）
    async fn seed_defaults(&self, defaults: &DefaultSettings);
}

#[derive(Debug)]
struct SettingsValues {
    preferred_language: String,
    debug_mode: bool,
    seeded: Option<DefaultSettings>,
}

/// 进程内设置，初始值来自配置 [settings] 段
#[derive(Debug)]
pub struct InMemorySettings {
    values: RwLock<SettingsValues>,
}

impl InMemorySettings {
    pub fn new(preferred_language: &str, debug_mode: bool) -> Self {
        Self {
            values: RwLock::new(SettingsValues {
                preferred_language: preferred_language.to_string(),
                debug_mode,
                seeded: None,
            }),
        }
    }

    pub fn from_config(cfg: &SettingsSection) -> Self {
        Self::new(&cfg.preferred_language, cfg.debug_mode)
    }

    pub async fn set_preferred_language(&self, lang: &str) {
        self.values.write().await.preferred_language = lang.to_string();
    }

    pub async fn set_debug_mode(&self, on: bool) {
        self.values.write().await.debug_mode = on;
    }

    pub async fn seeded(&self) -> Option<DefaultSettings> {
        self.values.read().await.seeded.clone()
    }
}

impl Default for InMemorySettings {
    fn default() -> Self {
        Self::new("en", false)
    }
}

#[async_trait]
impl SettingsProvider for InMemorySettings {
    async fn preferred_language(&self) -> String {
        let lang = self.values.read().await.preferred_language.clone();
        if lang.trim().is_empty() {
            "en".to_string()
        } else {
            lang
        }
    }

    async fn debug_mode(&self) -> bool {
        self.values.read().await.debug_mode
    }

    async fn seed_defaults(&self, defaults: &DefaultSettings) {
        let mut values = self.values.write().await;
        values.preferred_language = defaults.preferred_language.clone();
        values.debug_mode = defaults.debug_mode;
        values.seeded = Some(defaults.clone());
    }
}
