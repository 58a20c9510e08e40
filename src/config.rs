//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NANO_COMPOSER__*` 覆盖（双下划线表示嵌套，如 `NANO_COMPOSER__PROVIDER__KIND=stub`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderSection,
    pub session: SessionSection,
    pub compose: ComposeSection,
    pub settings: SettingsSection,
}

/// [provider] 段：后端选择与本地运行时地址
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    /// 后端：local / stub / unavailable
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    /// 未设置时用 http://127.0.0.1:11434
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: None,
            model: default_model(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_provider_kind() -> String {
    "local".to_string()
}

fn default_model() -> String {
    "gemma3:1b".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

/// [session] 段：系统指令与基础采样参数
///
/// top_k / temperature 未设置时先取设备默认值，再退回 3 / 1.0
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    pub top_k: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            top_k: None,
            temperature: None,
        }
    }
}

fn default_system_prompt() -> String {
    "You are Nano Composer. Keep outputs concise, faithful to the user text, \
     and free of extra commentary. Return only the final text."
        .to_string()
}

/// [compose] 段：默认语气、超时（秒）、预热重试上限
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeSection {
    #[serde(default = "default_tone")]
    pub default_tone: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_smoke_test_timeout_secs")]
    pub smoke_test_timeout_secs: u64,
    #[serde(default = "default_max_warmup_attempts")]
    pub max_warmup_attempts: u32,
}

impl ComposeSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn smoke_test_timeout(&self) -> Duration {
        Duration::from_secs(self.smoke_test_timeout_secs)
    }
}

impl Default for ComposeSection {
    fn default() -> Self {
        Self {
            default_tone: default_tone(),
            request_timeout_secs: default_request_timeout_secs(),
            smoke_test_timeout_secs: default_smoke_test_timeout_secs(),
            max_warmup_attempts: default_max_warmup_attempts(),
        }
    }
}

fn default_tone() -> String {
    "formal".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_smoke_test_timeout_secs() -> u64 {
    20
}

fn default_max_warmup_attempts() -> u32 {
    3
}

/// [settings] 段：用户设置的初始值；marker_path 设置时预热标记写入该 JSON 文件
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsSection {
    #[serde(default = "default_language")]
    pub preferred_language: String,
    #[serde(default)]
    pub debug_mode: bool,
    pub marker_path: Option<PathBuf>,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            preferred_language: default_language(),
            debug_mode: false,
            marker_path: None,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// 从 config 目录加载配置，环境变量 NANO_COMPOSER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NANO_COMPOSER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NANO_COMPOSER")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.provider.kind, "local");
        assert_eq!(cfg.compose.request_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.compose.smoke_test_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.compose.max_warmup_attempts, 3);
        assert_eq!(cfg.settings.preferred_language, "en");
        assert!(!cfg.settings.debug_mode);
        assert!(cfg.session.top_k.is_none());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[provider]\nkind = \"stub\"\n\n[session]\ntop_k = 8\n\n[compose]\nrequest_timeout_secs = 5\n\n[settings]\npreferred_language = \"fr\""
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.provider.kind, "stub");
        assert_eq!(cfg.session.top_k, Some(8));
        assert_eq!(cfg.compose.request_timeout_secs, 5);
        assert_eq!(cfg.compose.smoke_test_timeout_secs, 20);
        assert_eq!(cfg.settings.preferred_language, "fr");
    }
}
