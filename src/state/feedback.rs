//! 记忆压力反馈
//!
//! 按压缩界限计算各有界容器的填充率，≥0.8 的字段列入 high_fields；
//! 格式化为 MEMORY FEEDBACK 块注入带 memory_feedback 标志的角色提示。

use crate::core::types::State;
use crate::state::condense::{CondensePolicy, CondenseReport};

/// 各字段填充率快照
#[derive(Debug, Clone)]
pub struct MemoryPressure {
    pub goals_ratio: f64,
    pub open_loops_ratio: f64,
    pub decisions_ratio: f64,
    pub constraints_ratio: f64,
    pub memory_tags_ratio: f64,
    pub upstream_ratio: f64,
    pub high_fields: Vec<String>,
    pub condensed: bool,
}

fn ratio(current: usize, maximum: usize) -> f64 {
    if maximum == 0 {
        return if current > 0 { 1.0 } else { 0.0 };
    }
    current as f64 / maximum as f64
}

pub fn compute_memory_pressure(
    state: &State,
    policy: &CondensePolicy,
    upstream_chars: usize,
    last_report: Option<&CondenseReport>,
) -> MemoryPressure {
    let fields = [
        ("goals_ratio", ratio(state.goals.len(), policy.max_goals)),
        (
            "open_loops_ratio",
            ratio(state.open_loops.len(), policy.max_open_loops),
        ),
        (
            "decisions_ratio",
            ratio(state.decisions.len(), policy.max_decisions),
        ),
        (
            "constraints_ratio",
            ratio(state.constraints.len(), policy.max_constraints),
        ),
        (
            "memory_tags_ratio",
            ratio(state.memory_tags.len(), policy.max_memory_tags),
        ),
        (
            "upstream_ratio",
            ratio(upstream_chars, policy.max_upstream_total_chars),
        ),
    ];
    let high_fields = fields
        .iter()
        .filter(|(_, r)| *r >= 0.8)
        .map(|(name, _)| name.to_string())
        .collect();

    MemoryPressure {
        goals_ratio: fields[0].1,
        open_loops_ratio: fields[1].1,
        decisions_ratio: fields[2].1,
        constraints_ratio: fields[3].1,
        memory_tags_ratio: fields[4].1,
        upstream_ratio: fields[5].1,
        high_fields,
        condensed: last_report.map(CondenseReport::trimmed).unwrap_or(false),
    }
}

pub fn format_memory_feedback(pressure: &MemoryPressure) -> String {
    [
        "=== MEMORY FEEDBACK ===".to_string(),
        format!("goals_ratio: {:.2}", pressure.goals_ratio),
        format!("open_loops_ratio: {:.2}", pressure.open_loops_ratio),
        format!("decisions_ratio: {:.2}", pressure.decisions_ratio),
        format!("constraints_ratio: {:.2}", pressure.constraints_ratio),
        format!("memory_tags_ratio: {:.2}", pressure.memory_tags_ratio),
        format!("upstream_ratio: {:.2}", pressure.upstream_ratio),
        format!("high_fields: {:?}", pressure.high_fields),
        format!("condensed: {}", pressure.condensed),
        "=== END MEMORY FEEDBACK ===".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_fields_detected_at_80_percent() {
        let mut state = State::default();
        state.goals = (0..26).map(|i| format!("g{i}")).collect();
        let policy = CondensePolicy::default();
        let pressure = compute_memory_pressure(&state, &policy, 0, None);
        assert!(pressure.goals_ratio >= 0.8);
        assert_eq!(pressure.high_fields, vec!["goals_ratio"]);
    }

    #[test]
    fn test_feedback_block_is_delimited() {
        let pressure = compute_memory_pressure(&State::default(), &CondensePolicy::default(), 0, None);
        let block = format_memory_feedback(&pressure);
        assert!(block.starts_with("=== MEMORY FEEDBACK ==="));
        assert!(block.ends_with("=== END MEMORY FEEDBACK ==="));
    }
}
