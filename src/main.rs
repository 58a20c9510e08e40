//! Nano Composer 后台进程
//!
//! 入口：初始化日志、加载配置、创建提供方与协调器并触发启动预热，
//! 然后逐行读取 stdin 上的 JSON 请求，把响应信封逐行写到 stdout，直到 EOF。

use std::path::PathBuf;

use anyhow::Context;
use nano_composer::config::{load_config, AppConfig};
use nano_composer::observability;
use nano_composer::provider::create_provider_from_config;
use nano_composer::{Request, RequestCoordinator, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let provider = create_provider_from_config(&cfg);
    let coordinator = RequestCoordinator::from_config(&cfg, provider);

    if coordinator.on_start().await {
        tracing::info!("Ready");
    } else {
        tracing::warn!("Started without a warm model; requests will retry warmup");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => coordinator.handle(request).await,
            Err(e) => Response::failure(format!("Invalid request: {}", e)),
        };
        let mut out = serde_json::to_vec(&response).context("Failed to encode response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    coordinator.shutdown().await;
    Ok(())
}
