//! 截止时间信号
//!
//! 持有 CancellationToken，后台计时任务在到期时取消它；Deadline 被丢弃时 token 随之取消，计时任务退出。

use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};

pub struct Deadline {
    token: CancellationToken,
    _guard: DropGuard,
}

impl Deadline {
    /// 在 timeout 后触发取消
    pub fn after(timeout: Duration) -> Self {
        let token = CancellationToken::new();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });
        Self {
            _guard: token.clone().drop_guard(),
            token,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }
}
