//! 状态补丁块：<<<STATE_PATCH_JSON>>> ... <<<END_STATE_PATCH_JSON>>>
//!
//! 负载为 JSON 对象，字段全部可选（缺省即「不变」）；未知字段解码时忽略。
//! 负载损坏属于非致命错误：块仍从可见文本剥离，但不产出补丁，并发 decode_error 事件。

use serde::Deserialize;

use crate::core::trace::{TraceEvent, TraceSink};
use crate::protocol::block::{scan_block, STATE_PATCH_MARKERS};

/// 一个角色产出的状态补丁（回合内短命，折入检查点后丢弃）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatePatch {
    pub set_goals: Option<Vec<String>>,
    pub add_open_loops: Option<Vec<String>>,
    pub close_open_loops: Option<Vec<String>>,
    pub add_decisions: Option<Vec<String>>,
    pub add_constraints: Option<Vec<String>>,
    pub set_episode_summary: Option<String>,
    pub add_memory_tags: Option<Vec<String>>,
    /// 不透明动作串：能力动作由 StateManager 处理，其余交回编排器
    pub actions: Option<Vec<String>>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        self.set_goals.is_none()
            && self.add_open_loops.is_none()
            && self.close_open_loops.is_none()
            && self.add_decisions.is_none()
            && self.add_constraints.is_none()
            && self.set_episode_summary.is_none()
            && self.add_memory_tags.is_none()
            && self.actions.as_ref().map_or(true, |a| a.is_empty())
    }
}

/// 从角色输出中剥离状态补丁块：返回 (剥离后的文本, 解码成功的补丁)
pub fn parse_state_patch(
    text: &str,
    role: &str,
    trace: &dyn TraceSink,
) -> (String, Option<StatePatch>) {
    let scan = scan_block(text, &STATE_PATCH_MARKERS);
    if scan.duplicate_stripped {
        trace.append(TraceEvent::new(
            "decode_ambiguity",
            serde_json::json!({"role": role, "block": "state_patch"}),
        ));
    }
    let Some(payload) = scan.payload else {
        return (scan.remaining, None);
    };

    match serde_json::from_str::<StatePatch>(&payload) {
        Ok(patch) => (scan.remaining, Some(patch)),
        Err(e) => {
            trace.append(TraceEvent::new(
                "decode_error",
                serde_json::json!({
                    "role": role,
                    "block": "state_patch",
                    "error": e.to_string(),
                }),
            ));
            (scan.remaining, None)
        }
    }
}
