//! 状态补丁应用（StateManager）
//!
//! set_* 整体替换；add_* 保序追加并去重；close_* 按值移除。
//! actions 顺序迭代：能力动作就地执行，condense 动作交回编排器，未知动作记 trace 后忽略。
//! 每次成功应用使检查点 revision 恰好 +1。

use crate::core::trace::{TraceEvent, TraceSink};
use crate::core::types::Checkpoint;
use crate::protocol::patch::StatePatch;
use crate::state::capabilities::{
    grant_permission, normalize, request_permission, GRANT_PREFIX, REQUEST_PREFIX,
};

/// 已解析的补丁动作（已知动作的和类型 + 未识别兜底）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchAction {
    RequestPermission(String),
    GrantPermission(String),
    /// 立即触发一次状态压缩
    CondenseNow,
    /// 触发压缩并允许记忆回写挑选（当前与 CondenseNow 同义，语义留给记忆层扩展）
    CondenseSmart,
    Unrecognized(String),
}

/// 解析单个动作串；空能力名视为未识别
pub fn parse_action(raw: &str) -> PatchAction {
    if let Some(cap) = raw.strip_prefix(REQUEST_PREFIX) {
        if cap.is_empty() {
            return PatchAction::Unrecognized(raw.to_string());
        }
        return PatchAction::RequestPermission(cap.to_string());
    }
    if let Some(cap) = raw.strip_prefix(GRANT_PREFIX) {
        if cap.is_empty() {
            return PatchAction::Unrecognized(raw.to_string());
        }
        return PatchAction::GrantPermission(cap.to_string());
    }
    match raw {
        "condense_now" => PatchAction::CondenseNow,
        "condense_smart" => PatchAction::CondenseSmart,
        _ => PatchAction::Unrecognized(raw.to_string()),
    }
}

/// 应用结果：交回编排器的不透明动作
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// condense_now / condense_smart
    pub condense_requested: bool,
}

/// 保序追加并去重
fn extend_unique(target: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !target.iter().any(|item| item == value) {
            target.push(value.clone());
        }
    }
}

/// 将补丁折入检查点：更新 state、执行动作、revision +1、发 patch_applied 事件
pub fn apply_patch(
    checkpoint: &mut Checkpoint,
    patch: &StatePatch,
    role: &str,
    trace: &dyn TraceSink,
) -> ApplyOutcome {
    let state = &mut checkpoint.state;

    if let Some(goals) = &patch.set_goals {
        state.goals = goals.clone();
    }
    if let Some(items) = &patch.add_open_loops {
        extend_unique(&mut state.open_loops, items);
    }
    if let Some(items) = &patch.close_open_loops {
        state.open_loops.retain(|entry| !items.contains(entry));
    }
    if let Some(items) = &patch.add_decisions {
        extend_unique(&mut state.decisions, items);
    }
    if let Some(items) = &patch.add_constraints {
        extend_unique(&mut state.constraints, items);
    }
    if let Some(summary) = &patch.set_episode_summary {
        state.episode_summary = summary.clone();
    }
    if let Some(items) = &patch.add_memory_tags {
        extend_unique(&mut state.memory_tags, items);
    }

    let mut outcome = ApplyOutcome::default();
    if let Some(actions) = &patch.actions {
        for raw in actions {
            let action = parse_action(raw);
            let (applied, ignored) = match &action {
                PatchAction::RequestPermission(cap) => (request_permission(state, cap), false),
                PatchAction::GrantPermission(cap) => (grant_permission(state, cap), false),
                PatchAction::CondenseNow | PatchAction::CondenseSmart => {
                    outcome.condense_requested = true;
                    (true, false)
                }
                PatchAction::Unrecognized(_) => (false, true),
            };
            trace.append(TraceEvent::new(
                "action_run",
                serde_json::json!({
                    "role": role,
                    "action": raw,
                    "applied": applied,
                    "ignored": ignored,
                }),
            ));
        }
        normalize(state);
    }

    checkpoint.revision += 1;
    trace.append(TraceEvent::new(
        "patch_applied",
        serde_json::json!({
            "role": role,
            "revision": checkpoint.revision,
            "goals": checkpoint.state.goals.len(),
            "open_loops": checkpoint.state.open_loops.len(),
            "decisions": checkpoint.state.decisions.len(),
            "constraints": checkpoint.state.constraints.len(),
        }),
    ));
    outcome
}
