//! 预热状态：完成标记与重试预算
//!
//! Cold → Warming → Warm；连续 max_attempts 次非瞬时失败后进入 Exhausted，直到显式 reset。
//! 瞬时失败（模型仍在下载 / 超时）把尝试次数清零。

use crate::core::ComposeError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPhase {
    Cold,
    Warming,
    Warm,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarmupState {
    pub complete: bool,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl WarmupState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            complete: false,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
        }
    }

    pub fn phase(&self) -> WarmupPhase {
        if self.complete {
            WarmupPhase::Warm
        } else if self.is_exhausted() {
            WarmupPhase::Exhausted
        } else if self.attempts == 0 {
            WarmupPhase::Cold
        } else {
            WarmupPhase::Warming
        }
    }

    pub fn is_exhausted(&self) -> bool {
        !self.complete && self.attempts >= self.max_attempts
    }

    /// 开始一次尝试；预算耗尽时返回 false 且不计数
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        true
    }

    pub fn record_success(&mut self) {
        self.complete = true;
        self.attempts = 0;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, err: &ComposeError) {
        self.complete = false;
        if err.is_transient() {
            self.attempts = 0;
        }
        self.last_error = Some(err.to_string());
    }

    /// 会话失效：下次请求重新预热，但不动重试预算
    pub fn invalidate(&mut self) {
        self.complete = false;
    }

    /// 进程启动等外部事件：回到 {false, 0}
    pub fn reset(&mut self) {
        self.complete = false;
        self.attempts = 0;
        self.last_error = None;
    }
}

impl Default for WarmupState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}
