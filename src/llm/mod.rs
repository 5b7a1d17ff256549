//! 模型后端层：抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmConfig;

pub use mock::ScriptedBackend;
pub use openai::{create_deepseek_backend, OpenAiBackend, TokenUsage, DEEPSEEK_CHAT};
pub use traits::{ModelBackend, RoleParams};

/// 按配置创建后端：deepseek / openai / scripted
pub fn create_backend_from_config(config: &LlmConfig) -> Arc<dyn ModelBackend> {
    match config.provider.as_str() {
        "deepseek" => Arc::new(create_deepseek_backend(Some(config.model.as_str()))),
        "scripted" => Arc::new(ScriptedBackend::new()),
        _ => Arc::new(OpenAiBackend::new(
            config.base_url.as_deref(),
            &config.model,
            config.api_key.as_deref(),
        )),
    }
}
