//! 工具调用结果
//!
//! 每次调用（含被拒绝与未知工具）都产出一条 ToolResult；
//! 拒绝与失败只是 ok=false 的结果，绝不让回合失败。

use serde::Serialize;
use serde_json::Value;

use crate::core::error::ToolError;
use crate::protocol::tool_call::ToolCall;

/// 单次工具调用的统一结果
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub id: String,
    pub tool: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: Value) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            ok: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failure(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            id: call.id.clone(),
            tool: call.tool.clone(),
            ok: false,
            output: None,
            error: Some(error.to_string()),
        }
    }
}

/// 将一组结果格式化为回馈治理者的 TOOL_RESULTS 块
pub fn format_tool_results(results: &[ToolResult]) -> String {
    let lines: Vec<String> = results
        .iter()
        .map(|r| serde_json::to_string(r).unwrap_or_else(|_| "{}".to_string()))
        .collect();
    format!("TOOL_RESULTS:\n{}", lines.join("\n"))
}
