//! council - 多角色回合制推理运行时
//!
//! 入口：初始化日志、加载配置、构建回合运行时，stdin REPL 逐行处理回合。

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use council::llm::create_backend_from_config;
use council::memory::{KeywordMemoryStore, MemoryStore, NoopMemoryStore};
use council::{load_config, TurnRuntime};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let config = load_config(None).context("Failed to load config")?;
    let _ = std::fs::create_dir_all(&config.app.sessions_dir);
    let _ = std::fs::create_dir_all(&config.app.trace_dir);

    let backend = create_backend_from_config(&config.llm);
    let memory: Arc<dyn MemoryStore> = if config.app.memory_enabled {
        Arc::new(KeywordMemoryStore::new())
    } else {
        Arc::new(NoopMemoryStore)
    };
    let runtime = TurnRuntime::new(&config, backend, memory);

    let session_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::info!(session = %session_id, provider = %config.llm.provider, "session start");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let user_text = line.trim();
        if user_text.is_empty() {
            continue;
        }
        if user_text == "/quit" || user_text == "/exit" {
            break;
        }
        match runtime.process_turn(&session_id, user_text).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => tracing::error!(error = %e, "turn failed"),
        }
    }
    Ok(())
}
