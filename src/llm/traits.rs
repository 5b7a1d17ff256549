//! 模型后端抽象
//!
//! 流水线各角色通过 ModelBackend 拿到一段完整文本；
//! 错误以 String 返回，由回合编排器决定软失败或终止。

use async_trait::async_trait;
use serde::Deserialize;

/// 每角色采样参数（config [roles] 段可覆盖）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoleParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// 模型后端 trait：按角色完成一次非流式生成
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, role: &str, prompt: &str, params: &RoleParams)
        -> Result<String, String>;

    /// 后端标识（入 trace）
    fn name(&self) -> &str;
}
