//! Stub 提供方（用于测试与离线演示，无需本地运行时）
//!
//! 状态（含挂起）、回复、会话创建失败均可脚本化；记录每类调用次数、最大并发 prompt 数与最近一次 prompt，
//! 便于断言「无调用」「不并发」等属性。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::provider::{
    ModelProvider, ModelSession, PromptOptions, ProviderError, SamplingParams, SessionOptions,
};

/// Stub 会话的回复方式
#[derive(Debug, Clone)]
pub enum StubReply {
    /// 回显 prompt 中最后一个定界块的内容
    Echo,
    Text(String),
    Fail(ProviderError),
    /// 永不返回（用于超时场景）
    Hang,
}

#[derive(Debug)]
struct StubState {
    status: Mutex<String>,
    /// 为 true 时 availability 永不返回
    hang_availability: AtomicBool,
    device_defaults: Mutex<Option<SamplingParams>>,
    create_error: Mutex<Option<ProviderError>>,
    destroy_error: Mutex<Option<ProviderError>>,
    reply: Mutex<StubReply>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    availability_calls: AtomicUsize,
    create_calls: AtomicUsize,
    prompt_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    last_prompt: Mutex<Option<(String, PromptOptions)>>,
    last_session: Mutex<Option<SessionOptions>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// 可脚本化的 Stub 提供方；克隆共享同一份状态
#[derive(Debug, Clone)]
pub struct StubProvider {
    state: Arc<StubState>,
}

impl StubProvider {
    /// 状态为 available、回显输入的 Stub
    pub fn new() -> Self {
        Self::with_status("available")
    }

    pub fn with_status(status: &str) -> Self {
        Self {
            state: Arc::new(StubState {
                status: Mutex::new(status.to_string()),
                hang_availability: AtomicBool::new(false),
                device_defaults: Mutex::new(None),
                create_error: Mutex::new(None),
                destroy_error: Mutex::new(None),
                reply: Mutex::new(StubReply::Echo),
                gate: Mutex::new(None),
                availability_calls: AtomicUsize::new(0),
                create_calls: AtomicUsize::new(0),
                prompt_calls: AtomicUsize::new(0),
                destroy_calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
                last_session: Mutex::new(None),
            }),
        }
    }

    pub fn with_reply(self, reply: StubReply) -> Self {
        self.set_reply(reply);
        self
    }

    pub fn with_device_defaults(self, params: SamplingParams) -> Self {
        *lock(&self.state.device_defaults) = Some(params);
        self
    }

    pub fn set_status(&self, status: &str) {
        *lock(&self.state.status) = status.to_string();
    }

    /// 之后的 availability 查询挂起（模拟无响应的运行时）
    pub fn hang_availability(&self, on: bool) {
        self.state.hang_availability.store(on, Ordering::SeqCst);
    }

    pub fn set_reply(&self, reply: StubReply) {
        *lock(&self.state.reply) = reply;
    }

    pub fn fail_create_session(&self, err: Option<ProviderError>) {
        *lock(&self.state.create_error) = err;
    }

    pub fn fail_destroy(&self, err: Option<ProviderError>) {
        *lock(&self.state.destroy_error) = err;
    }

    /// 之后的 prompt 在 release_prompts 之前阻塞
    pub fn hold_prompts(&self) {
        *lock(&self.state.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_prompts(&self, n: usize) {
        if let Some(gate) = lock(&self.state.gate).as_ref() {
            gate.add_permits(n);
        }
    }

    pub fn availability_calls(&self) -> usize {
        self.state.availability_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    pub fn prompt_calls(&self) -> usize {
        self.state.prompt_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.state.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<(String, PromptOptions)> {
        lock(&self.state.last_prompt).clone()
    }

    pub fn last_session_options(&self) -> Option<SessionOptions> {
        lock(&self.state.last_session).clone()
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn availability(&self) -> Result<String, ProviderError> {
        self.state.availability_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_availability.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(lock(&self.state.status).clone())
    }

    async fn default_params(&self) -> Option<SamplingParams> {
        *lock(&self.state.device_defaults)
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, ProviderError> {
        self.state.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.state.create_error).clone() {
            return Err(err);
        }
        *lock(&self.state.last_session) = Some(options);
        Ok(Arc::new(StubSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubSession {
    state: Arc<StubState>,
}

/// 离开作用域（含被取消）时递减并发计数
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelSession for StubSession {
    async fn prompt(&self, input: &str, options: &PromptOptions) -> Result<String, ProviderError> {
        self.state.prompt_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.state.in_flight);

        *lock(&self.state.last_prompt) = Some((input.to_string(), options.clone()));

        let gate = lock(&self.state.gate).clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| ProviderError::Failed(e.to_string()))?
                .forget();
        }

        let reply = lock(&self.state.reply).clone();
        match reply {
            StubReply::Echo => Ok(last_block(input)),
            StubReply::Text(text) => Ok(text),
            StubReply::Fail(err) => Err(err),
            StubReply::Hang => std::future::pending().await,
        }
    }

    async fn destroy(&self) -> Result<(), ProviderError> {
        self.state.destroy_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.state.destroy_error).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// 取 prompt 中最后一个 `<<<...` / `>>>` 定界块的内容；没有定界块时返回原文
fn last_block(prompt: &str) -> String {
    let lines: Vec<&str> = prompt.lines().collect();
    match lines.iter().rposition(|l| l.starts_with("<<<")) {
        Some(start) => lines[start + 1..]
            .iter()
            .take_while(|l| **l != ">>>")
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
        None => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> PromptOptions {
        PromptOptions {
            language: "en".to_string(),
            sampling: SamplingParams::default(),
        }
    }

    #[test]
    fn test_last_block_takes_final_payload() {
        let prompt = "Do it.\n<<<CONTEXT\nctx\n>>>\n<<<INSTRUCTION\nline one\nline two\n>>>";
        assert_eq!(last_block(prompt), "line one\nline two");
        assert_eq!(last_block("plain"), "plain");
    }

    #[tokio::test]
    async fn test_hanging_availability_until_cleared() {
        let stub = StubProvider::with_status("downloadable");
        stub.hang_availability(true);
        let hung = tokio::time::timeout(std::time::Duration::from_millis(50), stub.availability()).await;
        assert!(hung.is_err());

        stub.hang_availability(false);
        assert_eq!(stub.availability().await.unwrap(), "downloadable");
        assert_eq!(stub.availability_calls(), 2);
    }

    #[tokio::test]
    async fn test_session_reply_and_counters() {
        let stub = StubProvider::new().with_reply(StubReply::Text("done".into()));
        let session = stub
            .create_session(SessionOptions {
                system_prompt: "sys".into(),
                sampling: SamplingParams::default(),
                language: "en".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.prompt("hello", &opts()).await.unwrap(), "done");
        assert_eq!(stub.prompt_calls(), 1);
        assert_eq!(stub.max_in_flight(), 1);
        assert_eq!(stub.last_prompt().unwrap().0, "hello");

        stub.fail_destroy(Some(ProviderError::Failed("boom".into())));
        assert!(session.destroy().await.is_err());
        assert_eq!(stub.destroy_calls(), 1);
    }
}
