//! Synapse - 对话式智能体网关
//!
//! 入口：初始化日志、加载配置、装配组件，并以控制台作为传输运行 REPL（每行一条消息，Ctrl+C 退出）。

use std::sync::Arc;

use anyhow::Context;
use synapse::config::load_config;
use synapse::integrations::{ConsoleTransport, Transport};
use synapse::{create_agent_components, observability};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// 控制台 REPL 使用的会话 ID
const CONSOLE_CONVERSATION_ID: i64 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::new());
    let components = create_agent_components(&cfg, transport).context("Failed to create agent")?;

    let token = CancellationToken::new();
    let background = components.spawn_background(token.clone());

    let handler = components.handler.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!(app = %cfg.app.name, "ready, type a message (Ctrl+C to quit)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle_message(CONSOLE_CONVERSATION_ID, None, &line).await;
                });
            }
        }
    }

    token.cancel();
    for handle in background {
        let _ = handle.await;
    }
    Ok(())
}
