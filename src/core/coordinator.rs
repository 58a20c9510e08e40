//! 请求协调器：对外入口
//!
//! 负责：校验动作、必要时内联预热（同一时刻至多一个预热周期）、每次请求刷新可用性、
//! 按动作分派到 CompositionEngine（每个调用独立截止时间）、把所有错误转为统一信封。
//! 致命错误（模型被卸载 / 阻止）会销毁会话并标记未预热，下次请求重新预热。

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{AppConfig, ComposeSection};
use crate::core::availability::AvailabilityTracker;
use crate::core::deadline::Deadline;
use crate::core::engine::{CompositionEngine, EngineConfig};
use crate::core::envelope::{Action, Request, RequestData, Response};
use crate::core::task::{Task, Tone};
use crate::core::warmup::{WarmupPhase, WarmupState};
use crate::core::ComposeError;
use crate::host::{
    DefaultSettings, InMemorySettings, InMemoryWarmupRecorder, JsonFileWarmupRecorder,
    SettingsProvider, WarmupMarker, WarmupRecorder,
};
use crate::provider::ModelProvider;

/// 协调器参数：截止时间、预热预算、默认语气
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub request_timeout: Duration,
    pub smoke_test_timeout: Duration,
    pub max_warmup_attempts: u32,
    pub default_tone: Tone,
}

impl From<&ComposeSection> for CoordinatorOptions {
    fn from(c: &ComposeSection) -> Self {
        Self {
            request_timeout: c.request_timeout(),
            smoke_test_timeout: c.smoke_test_timeout(),
            max_warmup_attempts: c.max_warmup_attempts,
            default_tone: Tone::parse(&c.default_tone),
        }
    }
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from(&ComposeSection::default())
    }
}

pub struct RequestCoordinator {
    engine: Arc<CompositionEngine>,
    settings: Arc<dyn SettingsProvider>,
    recorder: Arc<dyn WarmupRecorder>,
    options: CoordinatorOptions,
    /// 持锁贯穿整个预热周期，保证预热串行
    cycle: Mutex<()>,
    /// 只在读写状态时短暂持有，热路径不受进行中的预热影响
    warmup: Mutex<WarmupState>,
}

impl RequestCoordinator {
    pub fn new(
        engine: Arc<CompositionEngine>,
        settings: Arc<dyn SettingsProvider>,
        recorder: Arc<dyn WarmupRecorder>,
        options: CoordinatorOptions,
    ) -> Self {
        let warmup = Mutex::new(WarmupState::new(options.max_warmup_attempts));
        Self {
            engine,
            settings,
            recorder,
            options,
            cycle: Mutex::new(()),
            warmup,
        }
    }

    /// 按配置组装 Tracker / Engine / Settings / 预热标记
    pub fn from_config(cfg: &AppConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let tracker = Arc::new(AvailabilityTracker::new(provider.clone()));
        let engine = Arc::new(CompositionEngine::new(
            provider,
            tracker,
            EngineConfig::from(&cfg.session),
        ));
        let recorder: Arc<dyn WarmupRecorder> = match &cfg.settings.marker_path {
            Some(path) => Arc::new(JsonFileWarmupRecorder::new(path)),
            None => Arc::new(InMemoryWarmupRecorder::new()),
        };
        Self::new(
            engine,
            Arc::new(InMemorySettings::from_config(&cfg.settings)),
            recorder,
            CoordinatorOptions::from(&cfg.compose),
        )
    }

    pub fn engine(&self) -> &Arc<CompositionEngine> {
        &self.engine
    }

    pub async fn warmup_state(&self) -> WarmupState {
        self.warmup.lock().await.clone()
    }

    pub async fn phase(&self) -> WarmupPhase {
        self.warmup.lock().await.phase()
    }

    pub async fn is_warm(&self) -> bool {
        self.warmup.lock().await.complete
    }

    /// 处理一次请求；任何错误都转为 `{success: false, error}`
    pub async fn handle(&self, request: Request) -> Response {
        let span = tracing::info_span!(
            "request",
            id = %Uuid::new_v4(),
            action = request.action.as_deref().unwrap_or("-"),
        );
        async {
            match self.dispatch(request).await {
                Ok(result) => Response::ok(result),
                Err(e) => {
                    tracing::error!(kind = ?e.kind(), retryable = e.is_retryable(), "Handler error: {}", e);
                    if e.is_fatal() {
                        self.invalidate().await;
                    }
                    Response::failure(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, request: Request) -> Result<Value, ComposeError> {
        let action = request.action()?;

        // warmup 动作本身就是一个预热周期，结果以 {ok} 返回
        if action == Action::Warmup {
            return Ok(json!({ "ok": self.warmup(true).await }));
        }

        if !self.is_warm().await && !self.warmup(false).await {
            return Err(self.unavailable_with_guidance().await);
        }

        match action {
            Action::Availability => {
                self.engine.tracker().refresh().await;
                let snapshot = self.engine.tracker().snapshot().await;
                serde_json::to_value(snapshot).map_err(|e| ComposeError::Provider(e.to_string()))
            }
            _ => {
                let task = self.build_task(action, &request.data)?;
                let output = self.execute(&task, self.options.request_timeout).await?;
                Ok(Value::String(output))
            }
        }
    }

    fn build_task(&self, action: Action, data: &RequestData) -> Result<Task, ComposeError> {
        let text = data.text.clone().unwrap_or_default();
        let task = match action {
            Action::Rewrite => Task::Rewrite {
                text,
                tone: data.tone().map(Tone::parse).unwrap_or(self.options.default_tone),
            },
            Action::Shorten => Task::Shorten { text },
            Action::Expand => Task::Expand { text },
            Action::Proofread => Task::Proofread { text },
            Action::Write => Task::Write {
                instruction: data.instruction.clone().unwrap_or_default(),
                context: data.context.clone().unwrap_or_default(),
            },
            Action::Explain => {
                if text.trim().is_empty() {
                    return Err(ComposeError::InvalidInput("Nothing to explain.".to_string()));
                }
                Task::explain(text)
            }
            Action::Availability | Action::Warmup => {
                return Err(ComposeError::InvalidRequest(format!("'{}' is not a compose action", action)))
            }
        };
        task.validate()?;
        Ok(task)
    }

    /// 在截止时间内准备会话并执行任务
    async fn execute(&self, task: &Task, timeout: Duration) -> Result<String, ComposeError> {
        let deadline = Deadline::after(timeout);
        let token = deadline.token();

        let ready = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ComposeError::Timeout),
            r = self.engine.ensure_ready() => r,
        };
        if !ready? {
            return Err(ComposeError::Downloading);
        }

        self.engine.run(task, token).await
    }

    /// 预热：force 为 false 时已完成则直接返回；预算耗尽时不访问提供方
    pub async fn warmup(&self, force: bool) -> bool {
        let cycle = self.cycle.lock().await;
        {
            let mut state = self.warmup.lock().await;
            if state.complete && !force {
                return true;
            }
            if !state.begin_attempt() {
                tracing::warn!("Max warmup attempts reached ({})", state.max_attempts);
                return false;
            }
        }

        let debug_mode = match self.prepare_session().await {
            Ok(debug_mode) => {
                self.warmup.lock().await.record_success();
                tracing::info!("Warmup complete");
                debug_mode
            }
            Err(e) => {
                let mut state = self.warmup.lock().await;
                tracing::error!(attempt = state.attempts, transient = e.is_transient(), "Warmup error: {}", e);
                state.record_failure(&e);
                return false;
            }
        };

        if let Err(e) = self.recorder.record(&WarmupMarker::completed_now()).await {
            tracing::warn!("Failed to record warmup marker: {:#}", e);
        }
        drop(cycle);

        if debug_mode {
            self.smoke_test().await;
        }
        true
    }

    /// 读取设置（每个预热周期一次）并准备会话；返回调试开关
    async fn prepare_session(&self) -> Result<bool, ComposeError> {
        let lang = self.settings.preferred_language().await;
        self.engine.set_language(&lang).await;
        let debug_mode = self.settings.debug_mode().await;

        let ready = tokio::time::timeout(self.options.request_timeout, self.engine.ensure_ready())
            .await
            .map_err(|_| ComposeError::Timeout)??;
        if !ready {
            return Err(ComposeError::Downloading);
        }
        Ok(debug_mode)
    }

    /// 调试模式下的自检；失败只记日志
    async fn smoke_test(&self) {
        let task = Task::Rewrite {
            text: "test".to_string(),
            tone: Tone::Grammar,
        };
        let deadline = Deadline::after(self.options.smoke_test_timeout);
        match self.engine.run(&task, deadline.token()).await {
            Ok(_) => tracing::info!("Warmup smoke test passed"),
            Err(e) => tracing::warn!("Warmup smoke test failed: {}", e),
        }
    }

    async fn unavailable_with_guidance(&self) -> ComposeError {
        let state = self.warmup.lock().await;
        let mut msg = format!(
            "ensure the local model runtime ('{}') is running and the on-device model is installed, then try again",
            self.engine.tracker().provider_name()
        );
        if let Some(last) = &state.last_error {
            msg.push_str(&format!(" (last error: {})", last));
        }
        ComposeError::Unavailable(msg)
    }

    /// 销毁会话并标记未预热
    async fn invalidate(&self) {
        self.engine.destroy().await;
        self.warmup.lock().await.invalidate();
    }

    /// 外部重置：回到 {false, 0}
    pub async fn reset(&self) {
        self.warmup.lock().await.reset();
    }

    /// 安装事件：预热，然后写入默认设置
    pub async fn on_install(&self) -> bool {
        let ok = self.warmup(false).await;
        let defaults = DefaultSettings {
            default_tone: self.options.default_tone.as_str().to_string(),
            ..DefaultSettings::default()
        };
        self.settings.seed_defaults(&defaults).await;
        ok
    }

    /// 启动事件：重置后预热
    pub async fn on_start(&self) -> bool {
        self.reset().await;
        self.warmup(false).await
    }

    /// 退出时释放会话
    pub async fn shutdown(&self) {
        self.engine.destroy().await;
    }
}
