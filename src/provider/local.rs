//! 本地模型运行时客户端（Ollama 兼容 HTTP 接口）
//!
//! - availability: GET /api/tags，模型已拉取 → "available"，未拉取 → "downloadable"，403 → "blocked"
//! - default_params: POST /api/show，解析 parameters 中的 top_k / temperature
//! - prompt: POST /api/chat（非流式），采样参数放入 options，每次调用显式传入
//!
//! 只访问本机运行时，不会触发模型下载。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSection;
use crate::provider::{
    ModelProvider, ModelSession, PromptOptions, ProviderError, SamplingParams, SessionOptions,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    parameters: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    top_k: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// 本地运行时提供方：持有 HTTP Client、base_url 与模型名
#[derive(Debug, Clone)]
pub struct LocalModelProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LocalModelProvider {
    pub fn new(base_url: &str, model: &str, connect_timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(cfg: &ProviderSection) -> Result<Self, ProviderError> {
        let base = cfg.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::new(base, &cfg.model, Duration::from_secs(cfg.connect_timeout_secs))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `llama3.2` 与 `llama3.2:latest` 视为同一模型
    fn matches_model(&self, name: &str) -> bool {
        let wanted = self.model.as_str();
        name == wanted
            || (!wanted.contains(':') && name.strip_suffix(":latest") == Some(wanted))
    }
}

fn map_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::TimedOut
    } else if err.is_connect() {
        ProviderError::Unreachable(err.to_string())
    } else {
        ProviderError::Failed(err.to_string())
    }
}

async fn error_for_status(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ProviderError::Http { status, body }
}

/// 解析 /api/show 返回的 parameters 文本（每行 `key value`）
fn parse_parameters(text: &str) -> Option<SamplingParams> {
    let mut top_k = None;
    let mut temperature = None;
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("top_k"), Some(v)) => top_k = v.parse::<u32>().ok(),
            (Some("temperature"), Some(v)) => temperature = v.parse::<f32>().ok(),
            _ => {}
        }
    }
    if top_k.is_none() && temperature.is_none() {
        return None;
    }
    Some(SamplingParams::new(
        top_k.unwrap_or(SamplingParams::DEFAULT_TOP_K),
        temperature.unwrap_or(SamplingParams::DEFAULT_TEMPERATURE),
    ))
}

#[async_trait]
impl ModelProvider for LocalModelProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn availability(&self) -> Result<String, ProviderError> {
        let resp = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(map_send_error)?;

        match resp.status().as_u16() {
            403 => return Ok("blocked".to_string()),
            s if !(200..300).contains(&s) => return Err(error_for_status(resp).await),
            _ => {}
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        if tags.models.iter().any(|m| self.matches_model(&m.name)) {
            Ok("available".to_string())
        } else {
            Ok("downloadable".to_string())
        }
    }

    async fn default_params(&self) -> Option<SamplingParams> {
        let resp = self
            .client
            .post(self.url("/api/show"))
            .json(&serde_json::json!({ "model": self.model }))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let show: ShowResponse = resp.json().await.ok()?;
        show.parameters.as_deref().and_then(parse_parameters)
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, ProviderError> {
        Ok(Arc::new(LocalSession {
            provider: self.clone(),
            system_prompt: options.system_prompt,
        }))
    }
}

/// 本地会话：运行时无服务端会话，这里保存系统指令，每次调用单独发送
struct LocalSession {
    provider: LocalModelProvider,
    system_prompt: String,
}

#[async_trait]
impl ModelSession for LocalSession {
    async fn prompt(&self, input: &str, options: &PromptOptions) -> Result<String, ProviderError> {
        let system = format!(
            "{}\nWrite the output in the language tagged '{}'.",
            self.system_prompt, options.language
        );
        let request = ChatRequest {
            model: &self.provider.model,
            messages: vec![
                ChatMessage { role: "system", content: &system },
                ChatMessage { role: "user", content: input },
            ],
            stream: false,
            options: ChatOptions {
                top_k: options.sampling.top_k,
                temperature: options.sampling.temperature,
            },
        };

        let resp = self
            .provider
            .client
            .post(self.provider.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if resp.status().as_u16() == 404 {
            return Err(ProviderError::ModelMissing(self.provider.model.clone()));
        }
        if !resp.status().is_success() {
            return Err(error_for_status(resp).await);
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        Ok(chat
            .message
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}
