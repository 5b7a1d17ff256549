//! 回合编排
//!
//! 一个回合 = 固定角色流水线顺序推进的状态机：Role(0..n) → 可选 ToolLoop → Done。
//! 非终止角色后端失败为软失败（空上游贡献 + llm_error 事件，流水线继续）；
//! 终止角色失败为致命，回合中止且不落盘，上一检查点保持完整。
//! 工具循环恰好一轮：终止角色的调用计划执行后携 TOOL_RESULTS 块重新询问，
//! 第二次响应即为最终文本，其中再出现的工具请求只剥离并记 trace。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::AppConfig;
use crate::core::error::TurnError;
use crate::core::trace::{JsonlTraceSink, TraceEvent, TraceSink};
use crate::core::types::{ChatMessage, Checkpoint, State};
use crate::llm::ModelBackend;
use crate::memory::{format_retrieval_block, MemoryStore};
use crate::pipeline::prompt::{compact_state, compose_prompt, format_history};
use crate::pipeline::role::{default_roles, RoleSpec};
use crate::protocol::{parse_state_patch, parse_tool_calls, sanitize_visible_with_report};
use crate::session::{CheckpointStore, SessionSupervisor};
use crate::state::{
    apply_patch, compute_memory_pressure, condense_recent_messages, condense_state,
    condense_upstream, format_memory_feedback, CapabilityGate, CondensePolicy, CondenseReport,
};
use crate::tools::{
    build_default_registry, format_tool_results, HttpCache, ToolContext, ToolExecutor,
    ToolSettings,
};

/// 检索命中条数
const RETRIEVAL_TOP_K: usize = 5;

/// 回合状态机的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// 第 i 个角色待执行
    Role(usize),
    /// 终止角色的工具循环（至多一轮）
    ToolLoop,
    Done,
}

/// 回合运行时：按配置构建一次，跨会话共享
pub struct TurnRuntime {
    backend: Arc<dyn ModelBackend>,
    roles: Vec<RoleSpec>,
    executor: ToolExecutor,
    memory: Arc<dyn MemoryStore>,
    store: CheckpointStore,
    supervisor: SessionSupervisor,
    policy: CondensePolicy,
    gate: CapabilityGate,
    tool_settings: ToolSettings,
    http_cache: Arc<HttpCache>,
    backend_timeout: Duration,
    trace_dir: std::path::PathBuf,
}

impl TurnRuntime {
    pub fn new(
        config: &AppConfig,
        backend: Arc<dyn ModelBackend>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        let tool_settings = ToolSettings::from_config(&config.tools);
        let http_cache = Arc::new(HttpCache::new(
            config.tools.http.cache_ttl_secs,
            config.tools.http.cache_path.clone(),
        ));
        Self {
            backend,
            roles: default_roles(&config.roles),
            executor: ToolExecutor::new(build_default_registry(), config.tools.tool_timeout_secs),
            memory,
            store: CheckpointStore::new(config.app.sessions_dir.clone()),
            supervisor: SessionSupervisor::new(),
            policy: config.condense.clone(),
            gate: CapabilityGate::new(
                config.tools.net_allowlist_enabled,
                config.tools.http.allowed_domains.clone(),
            ),
            tool_settings,
            http_cache,
            backend_timeout: Duration::from_secs(config.app.backend_timeout_secs),
            trace_dir: config.app.trace_dir.clone(),
        }
    }

    /// 处理一个用户回合：取会话锁 → 读检查点 → 跑流水线 → 落盘
    ///
    /// 成功返回净化后的对外文本；失败时磁盘上的检查点保持回合前的内容。
    pub async fn process_turn(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<String, TurnError> {
        let _guard = self.supervisor.acquire(session_id).await;

        let mut checkpoint = self.store.load_or_create(session_id)?;
        // trace 文件按回合命名：会话 + 回合起始修订号
        let run_id = format!("{session_id}-rev-{}", checkpoint.revision);
        let trace = JsonlTraceSink::new(&self.trace_dir, &run_id);
        checkpoint.push_recent(ChatMessage::user(user_text));
        self.prune_messages_if_over_bound(&mut checkpoint, &trace)
            .await;

        let final_text = self.run_turn(&mut checkpoint, user_text, &trace).await?;

        checkpoint.push_recent(ChatMessage::assistant(final_text.clone()));
        if let Some(trace_name) = trace.trace_ref() {
            checkpoint.push_trace_ref(&trace_name);
        }
        self.store.save(&mut checkpoint)?;
        Ok(final_text)
    }

    /// 近期消息越界时剪枝并回写淘汰内容
    async fn prune_messages_if_over_bound(
        &self,
        checkpoint: &mut Checkpoint,
        trace: &dyn TraceSink,
    ) {
        if checkpoint.recent_messages.len() <= self.policy.max_recent_messages {
            return;
        }
        let evicted = condense_recent_messages(
            &mut checkpoint.recent_messages,
            self.policy.max_recent_messages,
        );
        trace.append(TraceEvent::new(
            "condense",
            serde_json::json!({
                "scope": "messages",
                "messages_removed": evicted.len(),
            }),
        ));
        self.writeback_evicted(&mut checkpoint.state, evicted).await;
    }

    /// 固定角色流水线：Role(i) 依次推进，终止角色带工具循环
    async fn run_turn(
        &self,
        checkpoint: &mut Checkpoint,
        user_text: &str,
        trace: &dyn TraceSink,
    ) -> Result<String, TurnError> {
        let history = format_history(&checkpoint.recent_messages);
        let retrieval_block = self.retrieve_once(checkpoint, user_text, trace).await;

        let mut upstream: Vec<(String, String)> = Vec::new();
        let mut last_report: Option<CondenseReport> = None;
        let mut phase = TurnPhase::Role(0);

        while let TurnPhase::Role(index) = phase {
            let role = &self.roles[index];
            let terminal = index == self.roles.len() - 1;

            upstream = self.condense_upstream_traced(upstream, &role.name, trace);
            let upstream_chars: usize = upstream.iter().map(|(_, t)| t.chars().count()).sum();
            let pressure = compute_memory_pressure(
                &checkpoint.state,
                &self.policy,
                upstream_chars,
                last_report.as_ref(),
            );
            let feedback = role
                .memory_feedback
                .then(|| format_memory_feedback(&pressure));

            let prompt = compose_prompt(
                role,
                &checkpoint.state,
                &upstream,
                &history,
                user_text,
                feedback.as_deref(),
                retrieval_block.as_deref(),
            );

            let response = match self.complete_traced(role, &prompt, trace).await {
                Ok(response) => response,
                Err(message) if terminal => {
                    return Err(TurnError::TerminalBackend {
                        role: role.name.clone(),
                        message,
                    });
                }
                Err(_) => {
                    // 软失败：空上游贡献，流水线继续
                    upstream.push((role.name.clone(), String::new()));
                    phase = TurnPhase::Role(index + 1);
                    continue;
                }
            };

            let response = if terminal {
                phase = TurnPhase::ToolLoop;
                self.tool_loop(role, &prompt, response, checkpoint, trace)
                    .await?
            } else {
                // 非终止角色的工具请求剥离后忽略
                let (stripped, ignored) = parse_tool_calls(&response, &role.name, trace);
                if !ignored.is_empty() {
                    trace.append(TraceEvent::new(
                        "tool_plan",
                        serde_json::json!({
                            "role": role.name,
                            "ignored": true,
                            "calls": ignored
                                .iter()
                                .map(|c| serde_json::json!({"id": c.id, "tool": c.tool}))
                                .collect::<Vec<_>>(),
                        }),
                    ));
                }
                stripped
            };

            let (stripped, patch) = parse_state_patch(&response, &role.name, trace);
            let visible = self.sanitize_traced(&role.name, &stripped, trace);

            if let Some(patch) = patch {
                let outcome = apply_patch(checkpoint, &patch, &role.name, trace);
                last_report = self
                    .condense_state_traced(checkpoint, &role.name, trace)
                    .await;
                if outcome.condense_requested {
                    self.prune_messages_if_over_bound(checkpoint, trace).await;
                }
            }

            upstream.push((role.name.clone(), visible));
            phase = if terminal {
                TurnPhase::Done
            } else {
                TurnPhase::Role(index + 1)
            };
        }

        let final_text = upstream
            .last()
            .map(|(_, text)| text.clone())
            .unwrap_or_default();
        Ok(final_text)
    }

    /// 终止角色的工具循环：执行计划、逐结果追加 tool 消息、携结果重新询问
    async fn tool_loop(
        &self,
        role: &RoleSpec,
        prompt: &str,
        response: String,
        checkpoint: &mut Checkpoint,
        trace: &dyn TraceSink,
    ) -> Result<String, TurnError> {
        let (visible, calls) = parse_tool_calls(&response, &role.name, trace);
        if calls.is_empty() {
            return Ok(visible);
        }

        trace.append(TraceEvent::new(
            "tool_plan",
            serde_json::json!({
                "role": role.name,
                "calls": calls
                    .iter()
                    .map(|c| serde_json::json!({"id": c.id, "tool": c.tool}))
                    .collect::<Vec<_>>(),
            }),
        ));

        let ctx = self.tool_context(checkpoint.state.clone());
        let results = self.executor.execute_calls(&calls, &ctx, trace).await;
        for result in &results {
            let line = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
            checkpoint.push_recent(ChatMessage::tool(line));
        }

        let results_block = format_tool_results(&results);
        let second_prompt = format!("{prompt}\n\n{results_block}");
        let second = self
            .complete_traced(role, &second_prompt, trace)
            .await
            .map_err(|message| TurnError::TerminalBackend {
                role: role.name.clone(),
                message,
            })?;

        // 恰好一轮：第二次响应中的工具请求剥离并标记 ignored
        let (final_text, ignored) = parse_tool_calls(&second, &role.name, trace);
        if !ignored.is_empty() {
            trace.append(TraceEvent::new(
                "tool_plan",
                serde_json::json!({
                    "role": role.name,
                    "ignored": true,
                    "calls": ignored
                        .iter()
                        .map(|c| serde_json::json!({"id": c.id, "tool": c.tool}))
                        .collect::<Vec<_>>(),
                }),
            ));
        }
        Ok(final_text)
    }

    /// 带超时与 llm_req / llm_done / llm_error 事件的后端调用
    async fn complete_traced(
        &self,
        role: &RoleSpec,
        prompt: &str,
        trace: &dyn TraceSink,
    ) -> Result<String, String> {
        trace.append(TraceEvent::new(
            "llm_req",
            serde_json::json!({"role": role.name, "prompt": prompt}),
        ));
        let outcome = match timeout(
            self.backend_timeout,
            self.backend.complete(&role.name, prompt, &role.params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "backend timed out after {}s",
                self.backend_timeout.as_secs()
            )),
        };
        match &outcome {
            Ok(response) => trace.append(TraceEvent::new(
                "llm_done",
                serde_json::json!({"role": role.name, "response": response}),
            )),
            Err(message) => trace.append(TraceEvent::new(
                "llm_error",
                serde_json::json!({"role": role.name, "error": message}),
            )),
        }
        outcome
    }

    /// 净化可见文本并发 sanitize / sanitize_warning / visible_response 事件
    fn sanitize_traced(&self, role: &str, text: &str, trace: &dyn TraceSink) -> String {
        let (sanitized, removed, was_empty) = sanitize_visible_with_report(text);
        if sanitized != text {
            trace.append(TraceEvent::new(
                "sanitize",
                serde_json::json!({
                    "role": role,
                    "before_chars": text.chars().count(),
                    "after_chars": sanitized.chars().count(),
                    "removed": removed,
                }),
            ));
        }
        if was_empty {
            trace.append(TraceEvent::new(
                "sanitize_warning",
                serde_json::json!({
                    "role": role,
                    "message": "visible output empty after sanitization",
                }),
            ));
        }
        trace.append(TraceEvent::new(
            "visible_response",
            serde_json::json!({"role": role, "visible_response": sanitized}),
        ));
        sanitized
    }

    /// 上游收缩；有缩减时发 condense(scope=upstream) 事件
    fn condense_upstream_traced(
        &self,
        upstream: Vec<(String, String)>,
        next_role: &str,
        trace: &dyn TraceSink,
    ) -> Vec<(String, String)> {
        if upstream.is_empty() {
            return upstream;
        }
        let before: usize = upstream.iter().map(|(_, t)| t.chars().count()).sum();
        let condensed = condense_upstream(&upstream, &self.policy);
        let after: usize = condensed.iter().map(|(_, t)| t.chars().count()).sum();
        if after < before {
            trace.append(TraceEvent::new(
                "condense",
                serde_json::json!({
                    "scope": "upstream",
                    "role": next_role,
                    "before_total_chars": before,
                    "after_total_chars": after,
                }),
            ));
        }
        condensed
    }

    /// 补丁后的状态压缩：淘汰条目回写记忆库，引用并入 memory_refs
    async fn condense_state_traced(
        &self,
        checkpoint: &mut Checkpoint,
        role: &str,
        trace: &dyn TraceSink,
    ) -> Option<CondenseReport> {
        let outcome = condense_state(&mut checkpoint.state, &self.policy);
        if outcome.report.trimmed() {
            trace.append(TraceEvent::new(
                "condense",
                serde_json::json!({
                    "scope": "state",
                    "role": role,
                    "report": outcome.report,
                }),
            ));
        }
        let trimmed = outcome.report.trimmed();
        self.writeback_evicted(&mut checkpoint.state, outcome.evicted)
            .await;
        trimmed.then_some(outcome.report)
    }

    async fn writeback_evicted(&self, state: &mut State, evicted: Vec<String>) {
        if evicted.is_empty() || !self.memory.enabled() {
            return;
        }
        let refs = self.memory.writeback(&evicted).await;
        for reference in refs {
            if !state.memory_refs.iter().any(|r| r == &reference) {
                state.memory_refs.push(reference);
            }
        }
    }

    /// 每回合至多一次检索；结果注入所有 wants_retrieval 角色
    async fn retrieve_once(
        &self,
        checkpoint: &Checkpoint,
        user_text: &str,
        trace: &dyn TraceSink,
    ) -> Option<String> {
        if !self.memory.enabled() || !self.roles.iter().any(|r| r.wants_retrieval) {
            return None;
        }
        let query = format!("{user_text}\nSTATE:{}", compact_state(&checkpoint.state));
        let hits = self.memory.retrieve(&query, RETRIEVAL_TOP_K).await;
        trace.append(TraceEvent::new(
            "retrieval_used",
            serde_json::json!({
                "roles": self
                    .roles
                    .iter()
                    .filter(|r| r.wants_retrieval)
                    .map(|r| r.name.clone())
                    .collect::<Vec<_>>(),
                "k": RETRIEVAL_TOP_K,
                "count": hits.len(),
                "ids": hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>(),
                "scores": hits.iter().map(|h| h.score).collect::<Vec<_>>(),
            }),
        ));
        format_retrieval_block(&hits)
    }

    fn tool_context(&self, state: State) -> ToolContext {
        ToolContext::new(
            state,
            self.tool_settings.clone(),
            self.gate.clone(),
            self.http_cache.clone(),
        )
    }
}
