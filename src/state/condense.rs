//! 记忆压缩（Condenser）
//!
//! 确定性收缩有界容器：先保序去重，再从最旧端（FIFO）淘汰至界内；
//! 被淘汰的原始条目按序返回，供编排器回写外部记忆库并把引用追加到 memory_refs。
//! 饱和后再次运行为 no-op（幂等）；同一输入与界限下淘汰集合与顺序恒定（确定性）。
//! 同时提供上游文本截断与近期消息剪枝。

use serde::Deserialize;

use crate::core::types::{ChatMessage, State};

/// 截断标记
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// 压缩界限（config [condense] 段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CondensePolicy {
    pub max_goals: usize,
    pub max_open_loops: usize,
    pub max_decisions: usize,
    pub max_constraints: usize,
    pub max_memory_tags: usize,
    /// 近期消息条数上限（跨回合保留）
    pub max_recent_messages: usize,
    pub max_upstream_chars_per_role: usize,
    pub max_upstream_total_chars: usize,
}

impl Default for CondensePolicy {
    fn default() -> Self {
        Self {
            max_goals: 32,
            max_open_loops: 32,
            max_decisions: 32,
            max_constraints: 32,
            max_memory_tags: 32,
            max_recent_messages: 16,
            max_upstream_chars_per_role: 1500,
            max_upstream_total_chars: 4000,
        }
    }
}

/// 每个字段移除的条目数（含去重与淘汰）
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CondenseReport {
    pub goals_removed: usize,
    pub open_loops_removed: usize,
    pub decisions_removed: usize,
    pub constraints_removed: usize,
    pub memory_tags_removed: usize,
    pub messages_removed: usize,
}

impl CondenseReport {
    pub fn trimmed(&self) -> bool {
        self.goals_removed > 0
            || self.open_loops_removed > 0
            || self.decisions_removed > 0
            || self.constraints_removed > 0
            || self.memory_tags_removed > 0
            || self.messages_removed > 0
    }
}

/// 一次压缩的产物：报告 + 按淘汰顺序排列的原始条目（供记忆回写）
#[derive(Debug, Default)]
pub struct CondenseOutcome {
    pub report: CondenseReport,
    pub evicted: Vec<String>,
}

/// 保序去重
pub fn dedupe_preserve_order(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str().to_string()))
        .cloned()
        .collect()
}

/// 保留尾部 max_n 条（最旧在前，故淘汰的是头部）
fn cap_tail(items: Vec<String>, max_n: usize, evicted: &mut Vec<String>) -> Vec<String> {
    if items.len() <= max_n {
        return items;
    }
    let cut = items.len() - max_n;
    let mut items = items;
    let tail = items.split_off(cut);
    evicted.extend(items);
    tail
}

/// 单字段压缩：去重 + 截尾；返回新列表与移除总数
fn condense_list(
    items: &[String],
    max_items: usize,
    evicted: &mut Vec<String>,
) -> (Vec<String>, usize) {
    let before = items.len();
    let deduped = dedupe_preserve_order(items);
    let capped = cap_tail(deduped, max_items, evicted);
    let removed = before - capped.len();
    (capped, removed)
}

/// 压缩持久状态的各有界列表
pub fn condense_state(state: &mut State, policy: &CondensePolicy) -> CondenseOutcome {
    let mut evicted = Vec::new();
    let mut report = CondenseReport::default();

    let (goals, removed) = condense_list(&state.goals, policy.max_goals, &mut evicted);
    state.goals = goals;
    report.goals_removed = removed;

    let (open_loops, removed) = condense_list(&state.open_loops, policy.max_open_loops, &mut evicted);
    state.open_loops = open_loops;
    report.open_loops_removed = removed;

    let (decisions, removed) = condense_list(&state.decisions, policy.max_decisions, &mut evicted);
    state.decisions = decisions;
    report.decisions_removed = removed;

    let (constraints, removed) =
        condense_list(&state.constraints, policy.max_constraints, &mut evicted);
    state.constraints = constraints;
    report.constraints_removed = removed;

    let (memory_tags, removed) =
        condense_list(&state.memory_tags, policy.max_memory_tags, &mut evicted);
    state.memory_tags = memory_tags;
    report.memory_tags_removed = removed;

    CondenseOutcome { report, evicted }
}

/// 剪枝近期消息：超界时淘汰最旧，淘汰内容（role: content）返回供回写
pub fn condense_recent_messages(
    messages: &mut Vec<ChatMessage>,
    max_messages: usize,
) -> Vec<String> {
    if messages.len() <= max_messages {
        return Vec::new();
    }
    let cut = messages.len() - max_messages;
    messages
        .drain(..cut)
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect()
}

/// 截断文本至 max_chars（按字符数），超出时以截断标记结尾
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    if max_chars < TRUNCATION_MARKER.len() {
        return TRUNCATION_MARKER.chars().take(max_chars).collect();
    }
    let available = max_chars - TRUNCATION_MARKER.len();
    let head: String = chars[..available].iter().collect();
    format!("{head}{TRUNCATION_MARKER}")
}

/// 压缩上游贡献：先按角色截断，再按总预算从前往后分配
pub fn condense_upstream(texts: &[(String, String)], policy: &CondensePolicy) -> Vec<(String, String)> {
    let truncated: Vec<(String, String)> = texts
        .iter()
        .map(|(role, text)| {
            (
                role.clone(),
                truncate_text(text, policy.max_upstream_chars_per_role),
            )
        })
        .collect();

    let total: usize = truncated.iter().map(|(_, t)| t.chars().count()).sum();
    if total <= policy.max_upstream_total_chars {
        return truncated;
    }

    let mut remaining = policy.max_upstream_total_chars;
    truncated
        .into_iter()
        .map(|(role, text)| {
            let text = truncate_text(&text, remaining);
            remaining = remaining.saturating_sub(text.chars().count());
            (role, text)
        })
        .collect()
}
