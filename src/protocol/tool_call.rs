//! 工具调用块：<<<TOOL_CALLS_JSON>>> ... <<<END_TOOL_CALLS_JSON>>>
//!
//! 负载为 {id, tool, args} 对象数组；单个裸对象按一元数组接受。
//! id 在同一响应内唯一，tool 为带命名空间的 "ns.verb" 名称。

use serde::Deserialize;

use crate::core::trace::{TraceEvent, TraceSink};
use crate::protocol::block::{scan_block, TOOL_CALLS_MARKERS};

/// 一次工具调用请求（回合内短命）
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn args_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.args.clone())
    }
}

/// 负载可能是数组或单个对象
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ToolCallsPayload {
    Many(Vec<ToolCall>),
    One(ToolCall),
}

/// 从角色输出中剥离工具调用块：返回 (剥离后的文本, 解析出的调用序列)
pub fn parse_tool_calls(text: &str, role: &str, trace: &dyn TraceSink) -> (String, Vec<ToolCall>) {
    let scan = scan_block(text, &TOOL_CALLS_MARKERS);
    if scan.duplicate_stripped {
        trace.append(TraceEvent::new(
            "decode_ambiguity",
            serde_json::json!({"role": role, "block": "tool_calls"}),
        ));
    }
    let Some(payload) = scan.payload else {
        return (scan.remaining, Vec::new());
    };

    match serde_json::from_str::<ToolCallsPayload>(&payload) {
        Ok(ToolCallsPayload::Many(calls)) => (scan.remaining, calls),
        Ok(ToolCallsPayload::One(call)) => (scan.remaining, vec![call]),
        Err(e) => {
            trace.append(TraceEvent::new(
                "decode_error",
                serde_json::json!({
                    "role": role,
                    "block": "tool_calls",
                    "error": e.to_string(),
                }),
            ));
            (scan.remaining, Vec::new())
        }
    }
}
