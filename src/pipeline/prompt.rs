//! 提示组装
//!
//! 角色提示 = 指令 + STATE + 可选 MEMORY FEEDBACK / RETRIEVAL + HISTORY_JSON +
//! UPSTREAM + USER，段落间空行分隔。历史块最多 8 条 user/assistant 消息、
//! 2000 字符预算：超限先丢最旧，仍超则尾截最后一条的内容。

use serde_json::json;

use crate::core::types::{ChatMessage, Role, State};
use crate::pipeline::role::RoleSpec;

pub const HISTORY_MAX_MESSAGES: usize = 8;
pub const HISTORY_MAX_CHARS: usize = 2000;

/// 状态的单行紧凑 JSON，嵌入提示与检索查询
pub fn compact_state(state: &State) -> String {
    serde_json::to_string(state).unwrap_or_else(|_| "{}".to_string())
}

/// 历史块：user/assistant 消息的 JSON 数组，受条数与字符双重预算
pub fn format_history(messages: &[ChatMessage]) -> String {
    let filtered: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .collect();
    let keep = filtered.len().saturating_sub(HISTORY_MAX_MESSAGES);
    let mut history: Vec<(String, String)> = filtered[keep..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                _ => "assistant",
            };
            (role.to_string(), m.content.clone())
        })
        .collect();

    loop {
        let serialized = serialize_history(&history);
        if serialized.chars().count() <= HISTORY_MAX_CHARS {
            return serialized;
        }
        if history.len() > 1 {
            history.remove(0);
            continue;
        }
        // 只剩一条：尾截其内容到预算内
        let (role, content) = history.remove(0);
        let base_len = serialize_history(&[(role.clone(), String::new())])
            .chars()
            .count();
        if HISTORY_MAX_CHARS <= base_len {
            return "[]".to_string();
        }
        let allowed = HISTORY_MAX_CHARS - base_len;
        let chars: Vec<char> = content.chars().collect();
        let keep_from = chars.len().saturating_sub(allowed);
        let tail: String = chars[keep_from..].iter().collect();
        return serialize_history(&[(role, tail)]);
    }
}

fn serialize_history(history: &[(String, String)]) -> String {
    let items: Vec<serde_json::Value> = history
        .iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect();
    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
}

/// 组装一个角色的完整提示
#[allow(clippy::too_many_arguments)]
pub fn compose_prompt(
    role: &RoleSpec,
    state: &State,
    upstream: &[(String, String)],
    history: &str,
    user_text: &str,
    memory_feedback: Option<&str>,
    retrieval_block: Option<&str>,
) -> String {
    let mut parts: Vec<String> = vec![
        role.instructions.clone(),
        format!("STATE:\n{}", compact_state(state)),
    ];
    if let Some(feedback) = memory_feedback {
        parts.push(feedback.to_string());
    }
    if role.wants_retrieval {
        if let Some(block) = retrieval_block {
            parts.push(block.to_string());
        }
    }
    let history_text = if history.is_empty() { "[]" } else { history };
    parts.push(format!("HISTORY_JSON:\n{history_text}"));
    if !upstream.is_empty() {
        let upstream_text: Vec<String> = upstream
            .iter()
            .map(|(name, text)| format!("{name}: {text}"))
            .collect();
        parts.push(format!("UPSTREAM:\n{}", upstream_text.join("\n")));
    }
    parts.push(format!("USER:\n{user_text}"));
    parts.retain(|part| !part.is_empty());
    parts.join("\n\n")
}
