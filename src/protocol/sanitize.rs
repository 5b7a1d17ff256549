//! 输出净化：用户可见文本的最后一道关口
//!
//! 全函数：任意文本进、净化文本出，永不失败。剥离残留协议标记（纵深防御，
//! 无论上游解析是否成功）、推理包裹段（<think> 等多种定界对）、行首内部节头；
//! 结果为空白时输出固定占位串。

use crate::protocol::block::{STATE_PATCH_MARKERS, TOOL_CALLS_MARKERS};

/// 净化后为空白时的固定占位串
pub const EMPTY_PLACEHOLDER: &str = "(no output)";

/// 推理包裹段的已知定界对
const REASONING_MARKERS: &[(&str, &str)] = &[
    ("<think>", "</think>"),
    ("<<<THOUGHTS>>>", "<<<END_THOUGHTS>>>"),
    ("=== REASONING ===", "=== END REASONING ==="),
];

/// 行首内部节头（后接冒号时剥去该前缀）
const SECTION_HEADERS: &[&str] = &[
    "STATE",
    "UPSTREAM",
    "HISTORY_JSON",
    "USER",
    "TOOL_RESULTS",
    "RETRIEVAL",
    "MEMORY FEEDBACK",
    "REFLECTION",
    "PLANNER",
    "CRITIC",
    "GOVERNOR",
    "ANSWER",
    "FINAL",
];

/// 剥离 begin..end 整段；strip_stray 时连无配对的孤立标记也剥掉
fn strip_delimited(text: &str, begin: &str, end: &str, strip_stray: bool) -> String {
    let mut out = text.to_string();
    loop {
        let Some(start) = out.find(begin) else { break };
        match out[start + begin.len()..].find(end) {
            Some(rel) => {
                let stop = start + begin.len() + rel + end.len();
                out = format!("{}{}", &out[..start], &out[stop..]);
            }
            None => {
                if !strip_stray {
                    break;
                }
                out = format!("{}{}", &out[..start], &out[start + begin.len()..]);
            }
        }
    }
    if strip_stray {
        out = out.replace(end, "");
    }
    out
}

/// 剥去开头若干「节头: 」前缀
fn strip_leading_section_headers(text: &str) -> String {
    let mut rest = text.trim_start();
    'outer: loop {
        for header in SECTION_HEADERS {
            if let Some(after) = rest.strip_prefix(header) {
                if let Some(after_colon) = after.strip_prefix(':') {
                    rest = after_colon.trim_start();
                    continue 'outer;
                }
            }
        }
        break;
    }
    rest.to_string()
}

/// 净化并报告：(净化文本, 是否有剥离, 净化后是否为空白)
pub fn sanitize_visible_with_report(text: &str) -> (String, bool, bool) {
    let mut sanitized = text.to_string();

    // 残留协议块：整块（含负载）剥离，孤立标记也剥离
    for markers in [&STATE_PATCH_MARKERS, &TOOL_CALLS_MARKERS] {
        sanitized = strip_delimited(&sanitized, markers.begin, markers.end, true);
    }
    // 推理包裹段
    for (begin, end) in REASONING_MARKERS {
        sanitized = strip_delimited(&sanitized, begin, end, true);
    }
    sanitized = strip_leading_section_headers(&sanitized);

    let trimmed = sanitized.trim();
    let was_empty = trimmed.is_empty();
    let removed = trimmed != text.trim();
    let visible = if was_empty {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    };
    (visible, removed, was_empty)
}

/// 净化用户可见文本（见模块文档）
pub fn sanitize_visible(text: &str) -> String {
    sanitize_visible_with_report(text).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_only_becomes_placeholder() {
        assert_eq!(sanitize_visible("   \n\t "), EMPTY_PLACEHOLDER);
        assert_eq!(sanitize_visible(""), EMPTY_PLACEHOLDER);
    }

    #[test]
    fn test_strips_residual_protocol_blocks_with_payload() {
        let text = concat!(
            "answer ",
            "<<<STATE_PATCH_JSON>>>{\"set_goals\":[\"x\"]}<<<END_STATE_PATCH_JSON>>>",
            " tail",
        );
        let out = sanitize_visible(text);
        assert_eq!(out, "answer  tail");
        assert!(!out.contains("set_goals"));
    }

    #[test]
    fn test_strips_stray_marker_without_pair() {
        let out = sanitize_visible("answer <<<TOOL_CALLS_JSON>>> tail");
        assert!(!out.contains("TOOL_CALLS_JSON"));
        assert!(out.contains("answer"));
    }

    #[test]
    fn test_strips_reasoning_wrappers() {
        let out = sanitize_visible("<think>secret plan</think>Final answer.");
        assert_eq!(out, "Final answer.");
        let out = sanitize_visible("=== REASONING ===\nhmm\n=== END REASONING ===\nok");
        assert_eq!(out, "ok");
        let out = sanitize_visible("<<<THOUGHTS>>>deep<<<END_THOUGHTS>>>shallow");
        assert_eq!(out, "shallow");
    }

    #[test]
    fn test_strips_leading_section_header_tokens() {
        assert_eq!(sanitize_visible("GOVERNOR: here it is"), "here it is");
        assert_eq!(sanitize_visible("FINAL: ANSWER: done"), "done");
        // 行中的冒号不受影响
        assert_eq!(sanitize_visible("note: keep this"), "note: keep this");
    }

    #[test]
    fn test_reasoning_only_yields_placeholder() {
        assert_eq!(sanitize_visible("<think>all hidden</think>"), EMPTY_PLACEHOLDER);
    }
}
