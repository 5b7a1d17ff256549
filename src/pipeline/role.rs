//! 角色定义
//!
//! 流水线为固定顺序：reflection → planner → critic → governor。
//! 角色集在启动时构建一次，回合中绝不增删重排；末位角色为终止角色，
//! 其输出是回合的唯一对外文本，也只有它的工具调用会被执行。

use std::collections::HashMap;

use crate::llm::RoleParams;

/// 单个角色的静态规格
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    /// 提示首段的角色指令
    pub instructions: String,
    pub params: RoleParams,
    /// 是否注入 RETRIEVAL 块
    pub wants_retrieval: bool,
    /// 是否注入 MEMORY FEEDBACK 块
    pub memory_feedback: bool,
}

const PATCH_FORMAT: &str = "\
To update persistent notes, emit exactly one block:\n\
<<<STATE_PATCH_JSON>>>\n\
{\"add_open_loops\": [], \"add_decisions\": [], \"set_episode_summary\": \"...\"}\n\
<<<END_STATE_PATCH_JSON>>>";

const TOOL_FORMAT: &str = "\
To run tools, emit exactly one block:\n\
<<<TOOL_CALLS_JSON>>>\n\
[{\"id\": \"c1\", \"tool\": \"fs.list_dir\", \"args\": {\"path\": \".\"}}]\n\
<<<END_TOOL_CALLS_JSON>>>";

/// 默认四角色流水线；params 可按角色名从 config [roles] 覆盖
pub fn default_roles(overrides: &HashMap<String, RoleParams>) -> Vec<RoleSpec> {
    let params_for = |name: &str| overrides.get(name).cloned().unwrap_or_default();
    vec![
        RoleSpec {
            name: "reflection".to_string(),
            instructions: format!(
                "You are the reflection role. Re-read the user's request and the \
                 persistent state, and surface what actually matters: unstated \
                 assumptions, missing information, risks. Be brief.\n\n{PATCH_FORMAT}"
            ),
            params: params_for("reflection"),
            wants_retrieval: true,
            memory_feedback: false,
        },
        RoleSpec {
            name: "planner".to_string(),
            instructions: format!(
                "You are the planner role. Using the reflection above, lay out a \
                 concrete plan for answering the user: steps, what to check, what \
                 to skip.\n\n{PATCH_FORMAT}"
            ),
            params: params_for("planner"),
            wants_retrieval: true,
            memory_feedback: false,
        },
        RoleSpec {
            name: "critic".to_string(),
            instructions: format!(
                "You are the critic role. Attack the plan above: find the weakest \
                 step, the wrong assumption, the cheaper alternative. If the plan \
                 is sound, say so in one line.\n\n{PATCH_FORMAT}"
            ),
            params: params_for("critic"),
            wants_retrieval: false,
            memory_feedback: false,
        },
        RoleSpec {
            name: "governor".to_string(),
            instructions: format!(
                "You are the governor role. Produce the final answer for the user, \
                 taking the upstream roles as advice, not orders. Only your text is \
                 shown to the user.\n\n{PATCH_FORMAT}\n\n{TOOL_FORMAT}"
            ),
            params: params_for("governor"),
            wants_retrieval: false,
            memory_feedback: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_order() {
        let roles = default_roles(&HashMap::new());
        let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["reflection", "planner", "critic", "governor"]);
        // 只有终止角色拿到工具块格式
        assert!(roles[3].instructions.contains("TOOL_CALLS_JSON"));
        assert!(!roles[0].instructions.contains("TOOL_CALLS_JSON"));
    }

    #[test]
    fn test_param_overrides_apply_by_name() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "governor".to_string(),
            RoleParams {
                temperature: Some(0.2),
                max_tokens: Some(512),
            },
        );
        let roles = default_roles(&overrides);
        assert_eq!(roles[3].params.temperature, Some(0.2));
        assert!(roles[0].params.temperature.is_none());
    }
}
