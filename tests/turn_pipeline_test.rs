//! 回合流水线集成测试：脚本化后端驱动完整四角色回合

use std::sync::Arc;

use council::config::AppConfig;
use council::core::types::Role;
use council::llm::ScriptedBackend;
use council::memory::KeywordMemoryStore;
use council::session::CheckpointStore;
use council::TurnRuntime;

struct Harness {
    runtime: TurnRuntime,
    backend: Arc<ScriptedBackend>,
    config: AppConfig,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.app.sessions_dir = dir.path().join("sessions");
    config.app.trace_dir = dir.path().join("traces");
    config.tools.sandbox_root = Some(dir.path().join("sandbox"));
    std::fs::create_dir_all(dir.path().join("sandbox")).unwrap();

    let backend = Arc::new(ScriptedBackend::new());
    let runtime = TurnRuntime::new(
        &config,
        backend.clone(),
        Arc::new(KeywordMemoryStore::new()),
    );
    Harness {
        runtime,
        backend,
        config,
        _dir: dir,
    }
}

fn store(config: &AppConfig) -> CheckpointStore {
    CheckpointStore::new(config.app.sessions_dir.clone())
}

/// 完整回合：各角色纯文本，治理者带状态补丁与推理包裹
#[tokio::test]
async fn test_full_turn_sanitizes_and_persists() {
    let h = harness();
    h.backend.push_role("reflection", "The user wants a summary.");
    h.backend.push_role("planner", "1. summarize 2. answer");
    h.backend.push_role("critic", "Plan is fine.");
    h.backend.push_role(
        "governor",
        "<think>internal musings</think>Here is your summary.\n\
         <<<STATE_PATCH_JSON>>>\n\
         {\"add_decisions\": [\"answered with summary\"], \"set_episode_summary\": \"summarized\"}\n\
         <<<END_STATE_PATCH_JSON>>>",
    );

    let answer = h.runtime.process_turn("s-full", "summarize this").await.unwrap();
    assert_eq!(answer, "Here is your summary.");

    let cp = store(&h.config).load("s-full").unwrap().unwrap();
    // 一次补丁应用 +1，落盘 +1
    assert_eq!(cp.revision, 2);
    assert_eq!(cp.state.decisions, vec!["answered with summary"]);
    assert_eq!(cp.state.episode_summary, "summarized");
    // user + assistant 各一条
    assert_eq!(cp.recent_messages.len(), 2);
    assert_eq!(cp.recent_messages[1].content, "Here is your summary.");
    // trace 文件按回合命名（会话 + 回合起始修订号）
    assert_eq!(cp.trace_tail, vec!["s-full-rev-0.jsonl"]);

    // 每个角色都拿到了提示，顺序固定
    let roles: Vec<String> = h.backend.calls().into_iter().map(|(r, _)| r).collect();
    assert_eq!(roles, vec!["reflection", "planner", "critic", "governor"]);
}

/// 治理者工具循环：一轮 fs.list_dir，再次询问后给出最终文本
#[tokio::test]
async fn test_governor_tool_loop_single_round() {
    let h = harness();
    let sandbox = h.config.tools.sandbox_root.clone().unwrap();
    std::fs::write(sandbox.join("report.txt"), "data").unwrap();

    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role(
        "governor",
        "Checking files.\n\
         <<<TOOL_CALLS_JSON>>>\n\
         [{\"id\": \"c1\", \"tool\": \"fs.list_dir\", \"args\": {\"path\": \".\"}}]\n\
         <<<END_TOOL_CALLS_JSON>>>",
    );
    h.backend
        .push_role("governor", "The sandbox contains report.txt.");

    let answer = h.runtime.process_turn("s-tools", "what files exist?").await.unwrap();
    assert_eq!(answer, "The sandbox contains report.txt.");

    // 第二次治理者提示携带 TOOL_RESULTS 块
    let prompts = h.backend.prompts_for("governor");
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("TOOL_RESULTS:"));
    assert!(prompts[1].contains("report.txt"));

    // 每条结果追加一条 tool 消息
    let cp = store(&h.config).load("s-tools").unwrap().unwrap();
    let tool_messages: Vec<_> = cp
        .recent_messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 1);
    assert!(tool_messages[0].content.contains("\"ok\":true"));
}

/// 未知工具：结果 ok=false 且回合照常完成
#[tokio::test]
async fn test_unknown_tool_feeds_back_failure() {
    let h = harness();
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role(
        "governor",
        "<<<TOOL_CALLS_JSON>>>\n\
         [{\"id\": \"c1\", \"tool\": \"fs.delete_tree\", \"args\": {}}]\n\
         <<<END_TOOL_CALLS_JSON>>>",
    );
    h.backend.push_role("governor", "That tool does not exist.");

    let answer = h.runtime.process_turn("s-unknown", "delete it all").await.unwrap();
    assert_eq!(answer, "That tool does not exist.");

    let prompts = h.backend.prompts_for("governor");
    assert!(prompts[1].contains("unknown tool: fs.delete_tree"));
}

/// 危险 shell 命令在 spawn 前被拒，折为 ok=false 的结果
#[tokio::test]
async fn test_denied_shell_command_is_rejected() {
    let h = harness();
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role(
        "governor",
        "<<<TOOL_CALLS_JSON>>>\n\
         [{\"id\": \"c1\", \"tool\": \"shell.exec\", \"args\": {\"cmd\": \"rm -rf /\"}}]\n\
         <<<END_TOOL_CALLS_JSON>>>",
    );
    h.backend.push_role("governor", "I will not run that.");

    let answer = h.runtime.process_turn("s-shell", "wipe the disk").await.unwrap();
    assert_eq!(answer, "I will not run that.");

    let prompts = h.backend.prompts_for("governor");
    assert!(prompts[1].contains("\"ok\":false"));
    assert!(prompts[1].contains("sandbox violation"));
}

/// 非终止角色失败：软失败，回合继续
#[tokio::test]
async fn test_non_terminal_failure_is_soft() {
    let h = harness();
    h.backend.push_role_error("reflection", "backend unavailable");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role("governor", "Done anyway.");

    let answer = h.runtime.process_turn("s-soft", "hello").await.unwrap();
    assert_eq!(answer, "Done anyway.");
    // 四个角色都被调用（reflection 失败后流水线未中断）
    assert_eq!(h.backend.calls().len(), 4);
}

/// 终止角色失败：回合中止，磁盘检查点保持回合前内容
#[tokio::test]
async fn test_terminal_failure_aborts_without_persisting() {
    let h = harness();

    // 第一回合成功落盘
    for role in ["reflection", "planner", "critic", "governor"] {
        h.backend.push_role(role, "ok");
    }
    h.runtime.process_turn("s-fatal", "first").await.unwrap();
    let before = store(&h.config).load("s-fatal").unwrap().unwrap();

    // 第二回合治理者失败
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role_error("governor", "backend down");

    let err = h.runtime.process_turn("s-fatal", "second").await.unwrap_err();
    assert!(err.to_string().contains("governor"));

    let after = store(&h.config).load("s-fatal").unwrap().unwrap();
    assert_eq!(after.revision, before.revision);
    assert_eq!(after.recent_messages.len(), before.recent_messages.len());
}

/// 纯空白的治理者输出净化为固定占位符
#[tokio::test]
async fn test_whitespace_output_becomes_placeholder() {
    let h = harness();
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role("governor", "   \n\t  ");

    let answer = h.runtime.process_turn("s-empty", "hello").await.unwrap();
    assert_eq!(answer, "(no output)");
}

/// 能力动作经补丁生效并持久化；pending 与 granted 不相交
#[tokio::test]
async fn test_permission_actions_persist() {
    let h = harness();
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role(
        "governor",
        "Requesting network access.\n\
         <<<STATE_PATCH_JSON>>>\n\
         {\"actions\": [\"request_permission:net\", \"grant_permission:net:docs.rs\"]}\n\
         <<<END_STATE_PATCH_JSON>>>",
    );

    h.runtime.process_turn("s-caps", "fetch docs").await.unwrap();
    let cp = store(&h.config).load("s-caps").unwrap().unwrap();
    assert_eq!(cp.state.capabilities_pending, vec!["net"]);
    assert_eq!(cp.state.capabilities_granted, vec!["net:docs.rs"]);
}

/// 坏 JSON 的补丁块：剥离但不产生补丁，回合不失败
#[tokio::test]
async fn test_malformed_patch_is_stripped_not_fatal() {
    let h = harness();
    h.backend.push_role("reflection", "r");
    h.backend.push_role("planner", "p");
    h.backend.push_role("critic", "c");
    h.backend.push_role(
        "governor",
        "Answer text.\n\
         <<<STATE_PATCH_JSON>>>\n\
         {not valid json\n\
         <<<END_STATE_PATCH_JSON>>>",
    );

    let answer = h.runtime.process_turn("s-badjson", "hello").await.unwrap();
    assert_eq!(answer, "Answer text.");

    let cp = store(&h.config).load("s-badjson").unwrap().unwrap();
    // 无补丁应用，仅落盘 +1
    assert_eq!(cp.revision, 1);
    assert!(cp.state.decisions.is_empty());
}

/// 多回合后近期消息保持在界内，淘汰内容回写为 memory_refs
#[tokio::test]
async fn test_recent_messages_stay_bounded_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.app.sessions_dir = dir.path().join("sessions");
    config.app.trace_dir = dir.path().join("traces");
    config.tools.sandbox_root = Some(dir.path().join("sandbox"));
    config.condense.max_recent_messages = 4;

    let backend = Arc::new(ScriptedBackend::new());
    let runtime = TurnRuntime::new(
        &config,
        backend.clone(),
        Arc::new(KeywordMemoryStore::new()),
    );

    for i in 0..5 {
        for role in ["reflection", "planner", "critic", "governor"] {
            backend.push_role(role, format!("turn {i} from {role}"));
        }
        runtime
            .process_turn("s-bound", &format!("message {i}"))
            .await
            .unwrap();
    }

    let cp = CheckpointStore::new(config.app.sessions_dir.clone())
        .load("s-bound")
        .unwrap()
        .unwrap();
    assert!(cp.recent_messages.len() <= 5);
    assert!(!cp.state.memory_refs.is_empty());
    // 五个回合留下五个不同的 trace 文件引用
    assert_eq!(cp.trace_tail.len(), 5);
}

/// 同会话并发回合被串行化：两个回合都成功，revision 单调
#[tokio::test]
async fn test_concurrent_turns_same_session_serialize() {
    let h = harness();
    for _ in 0..2 {
        for role in ["reflection", "planner", "critic", "governor"] {
            h.backend.push_role(role, "ok");
        }
    }
    let runtime = Arc::new(h.runtime);
    let a = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.process_turn("s-conc", "one").await })
    };
    let b = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.process_turn("s-conc", "two").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let cp = store(&h.config).load("s-conc").unwrap().unwrap();
    assert_eq!(cp.revision, 2);
    assert_eq!(cp.recent_messages.len(), 4);
}
