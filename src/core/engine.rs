//! 写作引擎：持有唯一的模型会话，把 Task 转成模型输出
//!
//! - ensure_ready：刷新可用性，仅在 available 时惰性创建会话
//! - run：校验输入 → 占用唯一执行槽（并发请求返回 Busy）→ 构建 prompt → 带取消信号调用
//! - destroy：尽力释放会话，无论成败都清空引用
//!
//! 采样参数随每次调用显式传入，从不修改共享会话。

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::SessionSection;
use crate::core::availability::{AvailabilityState, AvailabilityTracker};
use crate::core::prompts::build_prompt;
use crate::core::task::Task;
use crate::core::ComposeError;
use crate::provider::{
    ModelProvider, ModelSession, PromptOptions, ProviderError, SamplingParams, SessionOptions,
};

/// 会话创建参数：系统指令与可选的显式采样参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub system_prompt: String,
    pub top_k: Option<u32>,
    pub temperature: Option<f32>,
}

impl From<&SessionSection> for EngineConfig {
    fn from(s: &SessionSection) -> Self {
        Self {
            system_prompt: s.system_prompt.clone(),
            top_k: s.top_k,
            temperature: s.temperature,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&SessionSection::default())
    }
}

/// 活跃会话及其基础采样参数
#[derive(Clone)]
struct ActiveSession {
    session: Arc<dyn ModelSession>,
    sampling: SamplingParams,
}

pub struct CompositionEngine {
    tracker: Arc<AvailabilityTracker>,
    provider: Arc<dyn ModelProvider>,
    config: EngineConfig,
    language: RwLock<String>,
    session: Mutex<Option<ActiveSession>>,
    /// 同一时刻只有一个任务访问会话
    run_slot: Semaphore,
}

impl CompositionEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tracker: Arc<AvailabilityTracker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tracker,
            provider,
            config,
            language: RwLock::new("en".to_string()),
            session: Mutex::new(None),
            run_slot: Semaphore::new(1),
        }
    }

    pub fn tracker(&self) -> &Arc<AvailabilityTracker> {
        &self.tracker
    }

    /// 设置输出语言（由预热读取设置后调用）；空值忽略
    pub async fn set_language(&self, lang: &str) {
        let lang = lang.trim();
        if !lang.is_empty() {
            *self.language.write().await = lang.to_string();
        }
    }

    pub async fn language(&self) -> String {
        self.language.read().await.clone()
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// 刷新可用性并在 available 时准备会话
    ///
    /// unavailable → Err(Unavailable)；downloadable / unknown → Ok(false)，不创建会话、不触发下载
    pub async fn ensure_ready(&self) -> Result<bool, ComposeError> {
        match self.tracker.refresh().await {
            AvailabilityState::Available => {}
            AvailabilityState::Unavailable => {
                let raw = self.tracker.snapshot().await.raw;
                return Err(ComposeError::Unavailable(format!(
                    "provider '{}' reported '{}'",
                    self.tracker.provider_name(),
                    raw
                )));
            }
            state => {
                tracing::info!("Model not ready ({}), not starting a session", state);
                return Ok(false);
            }
        }

        let mut slot = self.session.lock().await;
        if slot.is_none() {
            *slot = Some(self.create_session().await?);
        }
        Ok(true)
    }

    async fn create_session(&self) -> Result<ActiveSession, ComposeError> {
        let device = if self.config.top_k.is_none() || self.config.temperature.is_none() {
            self.provider.default_params().await
        } else {
            None
        };
        let sampling = SamplingParams::new(
            self.config
                .top_k
                .or(device.map(|d| d.top_k))
                .unwrap_or(SamplingParams::DEFAULT_TOP_K),
            self.config
                .temperature
                .or(device.map(|d| d.temperature))
                .unwrap_or(SamplingParams::DEFAULT_TEMPERATURE),
        );

        let session = self
            .provider
            .create_session(SessionOptions {
                system_prompt: self.config.system_prompt.clone(),
                sampling,
                language: self.language().await,
            })
            .await?;
        tracing::info!(
            top_k = sampling.top_k,
            temperature = sampling.temperature,
            "Model session created"
        );
        Ok(ActiveSession { session, sampling })
    }

    /// 执行任务；要求之前 ensure_ready 返回 true
    pub async fn run(&self, task: &Task, cancel: CancellationToken) -> Result<String, ComposeError> {
        task.validate()?;

        let _permit = self.run_slot.try_acquire().map_err(|_| ComposeError::Busy)?;

        match self.tracker.current().await {
            AvailabilityState::Available => {}
            AvailabilityState::Unavailable => {
                return Err(ComposeError::Unavailable("model is not available".to_string()))
            }
            _ => return Err(ComposeError::Downloading),
        }

        let active = self
            .session
            .lock()
            .await
            .clone()
            .ok_or(ComposeError::SessionNotReady)?;

        let prompt = build_prompt(task);
        let options = PromptOptions {
            language: self.language().await,
            sampling: task.sampling_override().unwrap_or(active.sampling),
        };
        tracing::debug!(task = %task.kind(), chars = prompt.len(), "Dispatching prompt");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Aborted),
            out = active.session.prompt(&prompt, &options) => out,
        };
        let output = result?;

        let output = output.trim();
        if output.is_empty() {
            return Err(ComposeError::EmptyResponse);
        }
        Ok(output.to_string())
    }

    /// 尽力释放会话；失败只记日志，引用总会被清空
    pub async fn destroy(&self) {
        let taken = self.session.lock().await.take();
        if let Some(active) = taken {
            if let Err(e) = active.session.destroy().await {
                tracing::warn!("Session release failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{Tone, PROOFREAD_SAMPLING};
    use crate::provider::{StubProvider, StubReply};
    use std::time::Duration;

    fn engine_with(stub: &StubProvider, config: EngineConfig) -> CompositionEngine {
        let provider: Arc<dyn ModelProvider> = Arc::new(stub.clone());
        let tracker = Arc::new(AvailabilityTracker::new(provider.clone()));
        CompositionEngine::new(provider, tracker, config)
    }

    fn engine(stub: &StubProvider) -> CompositionEngine {
        engine_with(stub, EngineConfig::default())
    }

    fn shorten(text: &str) -> Task {
        Task::Shorten { text: text.into() }
    }

    #[tokio::test]
    async fn test_ensure_ready_unavailable_errors_without_session() {
        let stub = StubProvider::with_status("blocked");
        let engine = engine(&stub);
        let err = engine.ensure_ready().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(stub.create_calls(), 0);
        assert!(!engine.has_session().await);
    }

    #[tokio::test]
    async fn test_ensure_ready_downloadable_returns_false_without_session() {
        for raw in ["downloadable", "after-download", "something-new"] {
            let stub = StubProvider::with_status(raw);
            let engine = engine(&stub);
            assert!(!engine.ensure_ready().await.unwrap());
            assert_eq!(stub.create_calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_ensure_ready_creates_session_once() {
        let stub = StubProvider::new();
        let engine = engine(&stub);
        assert!(engine.ensure_ready().await.unwrap());
        assert!(engine.ensure_ready().await.unwrap());
        assert_eq!(stub.create_calls(), 1);
        let opts = stub.last_session_options().unwrap();
        assert_eq!(opts.sampling, SamplingParams::new(3, 1.0));
        assert!(opts.system_prompt.contains("Nano Composer"));
    }

    #[tokio::test]
    async fn test_session_sampling_prefers_config_then_device_defaults() {
        let stub = StubProvider::new().with_device_defaults(SamplingParams::new(40, 0.8));
        let engine = engine_with(
            &stub,
            EngineConfig {
                top_k: Some(5),
                ..EngineConfig::default()
            },
        );
        engine.ensure_ready().await.unwrap();
        assert_eq!(
            stub.last_session_options().unwrap().sampling,
            SamplingParams::new(5, 0.8)
        );
    }

    #[tokio::test]
    async fn test_run_blank_input_makes_no_provider_call() {
        let stub = StubProvider::new();
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        let tasks = [
            shorten("   "),
            Task::Rewrite { text: "\n".into(), tone: Tone::Formal },
            Task::Expand { text: String::new() },
            Task::Proofread { text: "\t".into() },
            Task::Write { instruction: " ".into(), context: "ctx".into() },
        ];
        for task in &tasks {
            let err = engine.run(task, CancellationToken::new()).await.unwrap_err();
            assert!(matches!(err, ComposeError::InvalidInput(_)), "{err:?}");
        }
        assert_eq!(stub.prompt_calls(), 0);
    }

    #[tokio::test]
    async fn test_run_requires_session() {
        let stub = StubProvider::new();
        let engine = engine(&stub);
        engine.tracker().refresh().await;
        let err = engine.run(&shorten("text"), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, ComposeError::SessionNotReady);
        assert_eq!(stub.prompt_calls(), 0);
    }

    #[tokio::test]
    async fn test_run_refuses_when_availability_changed() {
        let stub = StubProvider::new();
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        stub.set_status("downloadable");
        engine.tracker().refresh().await;
        let err = engine.run(&shorten("text"), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, ComposeError::Downloading);
        assert_eq!(stub.prompt_calls(), 0);
    }

    #[tokio::test]
    async fn test_run_trims_output_and_passes_explicit_params() {
        let stub = StubProvider::new().with_reply(StubReply::Text("  short  \n".into()));
        let engine = engine(&stub);
        engine.set_language("de").await;
        engine.ensure_ready().await.unwrap();

        let out = engine.run(&shorten("long text"), CancellationToken::new()).await.unwrap();
        assert_eq!(out, "short");
        let (prompt, opts) = stub.last_prompt().unwrap();
        assert!(prompt.contains("<<<TEXT\nlong text\n>>>"));
        assert_eq!(opts.language, "de");
        assert_eq!(opts.sampling, SamplingParams::new(3, 1.0));

        engine
            .run(&Task::Proofread { text: "i has".into() }, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stub.last_prompt().unwrap().1.sampling, PROOFREAD_SAMPLING);

        // 校对的覆盖参数不影响后续调用
        engine.run(&shorten("again"), CancellationToken::new()).await.unwrap();
        assert_eq!(stub.last_prompt().unwrap().1.sampling, SamplingParams::new(3, 1.0));
    }

    #[tokio::test]
    async fn test_run_blank_output_is_empty_response() {
        let stub = StubProvider::new().with_reply(StubReply::Text(" \n ".into()));
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        let err = engine.run(&shorten("text"), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, ComposeError::EmptyResponse);
        assert!(engine.has_session().await);
    }

    #[tokio::test]
    async fn test_run_cancellation_is_timeout() {
        let stub = StubProvider::new().with_reply(StubReply::Hang);
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });
        let err = engine.run(&shorten("text"), token).await.unwrap_err();
        assert_eq!(err, ComposeError::Timeout);
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_provider_abort_is_timeout() {
        let stub = StubProvider::new().with_reply(StubReply::Fail(ProviderError::Aborted));
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        let err = engine.run(&shorten("text"), CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, ComposeError::Timeout);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_busy() {
        let stub = StubProvider::new().with_reply(StubReply::Text("ok".into()));
        stub.hold_prompts();
        let engine = Arc::new(engine(&stub));
        engine.ensure_ready().await.unwrap();

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(&shorten("one"), CancellationToken::new()).await })
        };
        while stub.prompt_calls() == 0 {
            tokio::task::yield_now().await;
        }
        let second = engine.run(&shorten("two"), CancellationToken::new()).await;
        assert_eq!(second.unwrap_err(), ComposeError::Busy);

        stub.release_prompts(1);
        assert_eq!(first.await.unwrap().unwrap(), "ok");
        assert_eq!(stub.max_in_flight(), 1);
        assert_eq!(stub.prompt_calls(), 1);
    }

    #[tokio::test]
    async fn test_destroy_clears_even_when_release_fails() {
        let stub = StubProvider::new();
        stub.fail_destroy(Some(ProviderError::Failed("release failed".into())));
        let engine = engine(&stub);
        engine.ensure_ready().await.unwrap();
        engine.destroy().await;
        assert!(!engine.has_session().await);
        assert_eq!(stub.destroy_calls(), 1);

        engine.ensure_ready().await.unwrap();
        assert_eq!(stub.create_calls(), 2);
    }
}
