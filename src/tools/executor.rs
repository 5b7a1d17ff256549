//! 工具执行器
//!
//! 按计划顺序逐个执行调用，每次施加超时；未知工具、能力拒绝、沙箱违规、
//! 超时都折为 ok=false 的 ToolResult，绝不向上抛错中断回合。
//! 每次调用发 tool_start / tool_done trace 事件并输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::error::ToolError;
use crate::core::trace::{TraceEvent, TraceSink};
use crate::protocol::tool_call::ToolCall;
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolRegistry;
use crate::tools::result::ToolResult;

/// 工具执行器：持有注册表与全局单调用超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    /// 顺序执行一轮计划，结果与调用一一对应
    pub async fn execute_calls(
        &self,
        calls: &[ToolCall],
        ctx: &ToolContext,
        trace: &dyn TraceSink,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_one(call, ctx, trace).await);
        }
        results
    }

    async fn execute_one(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
        trace: &dyn TraceSink,
    ) -> ToolResult {
        trace.append(TraceEvent::new(
            "tool_start",
            serde_json::json!({ "id": call.id, "tool": call.tool }),
        ));
        let start = Instant::now();

        let outcome: Result<serde_json::Value, ToolError> = match self.registry.get(&call.tool) {
            None => Err(ToolError::UnknownTool(call.tool.clone())),
            Some(tool) => match timeout(self.timeout, tool.call(&call.args, ctx)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout(self.timeout.as_secs())),
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(output) => ToolResult::success(call, output),
            Err(error) => ToolResult::failure(call, &error),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "id": call.id,
            "ok": result.ok,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        trace.append(TraceEvent::new(
            "tool_done",
            serde_json::json!({
                "id": call.id,
                "tool": call.tool,
                "ok": result.ok,
                "duration_ms": duration_ms,
                "error": result.error,
            }),
        ));
        result
    }
}

fn args_preview(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::trace::BufferTraceSink;
    use crate::state::CapabilityGate;
    use crate::tools::context::ToolSettings;
    use crate::tools::http_cache::HttpCache;
    use crate::tools::registry::Tool;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "test.slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn call(
            &self,
            _args: &serde_json::Map<String, serde_json::Value>,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::json!({}))
        }
    }

    fn test_ctx() -> ToolContext {
        ToolContext::new(
            Default::default(),
            ToolSettings::from_config(&crate::config::ToolsSection::default()),
            CapabilityGate::new(true, Vec::new()),
            Arc::new(HttpCache::new(0, None)),
        )
    }

    fn call(tool: &str) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            tool: tool.into(),
            args: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let executor = ToolExecutor::new(ToolRegistry::new(), 5);
        let trace = BufferTraceSink::new();
        let results = executor
            .execute_calls(&[call("fs.delete_tree")], &test_ctx(), &trace)
            .await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].ok);
        assert_eq!(
            results[0].error.as_deref(),
            Some("unknown tool: fs.delete_tree")
        );
        assert!(trace.kinds().contains(&"tool_done".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failed_result() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, 1);
        let trace = BufferTraceSink::new();
        let results = executor
            .execute_calls(&[call("test.slow")], &test_ctx(), &trace)
            .await;
        assert!(!results[0].ok);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timed_out_shell_command_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ToolSettings::from_config(&crate::config::ToolsSection::default());
        settings.sandbox_root = dir.path().to_path_buf();
        settings.shell_allowed_prefixes.push("sleep".to_string());
        let ctx = ToolContext::new(
            Default::default(),
            settings,
            CapabilityGate::new(true, Vec::new()),
            Arc::new(HttpCache::new(0, None)),
        );

        let mut registry = ToolRegistry::new();
        registry.register(crate::tools::shell::ShellExecTool);
        let executor = ToolExecutor::new(registry, 1);
        let trace = BufferTraceSink::new();

        let mut args = serde_json::Map::new();
        args.insert(
            "cmd".into(),
            serde_json::Value::String("sleep 2 && echo leaked > marker.txt".into()),
        );
        let results = executor
            .execute_calls(
                &[ToolCall {
                    id: "c1".into(),
                    tool: "shell.exec".into(),
                    args,
                }],
                &ctx,
                &trace,
            )
            .await;
        assert!(!results[0].ok);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));

        // 子进程已被终止：等过原定完成时刻，marker 不应出现
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("marker.txt").exists());
    }

    #[tokio::test]
    async fn test_results_preserve_plan_order() {
        let executor = ToolExecutor::new(ToolRegistry::new(), 5);
        let trace = BufferTraceSink::new();
        let calls = vec![
            ToolCall {
                id: "a".into(),
                tool: "x.one".into(),
                args: serde_json::Map::new(),
            },
            ToolCall {
                id: "b".into(),
                tool: "x.two".into(),
                args: serde_json::Map::new(),
            },
        ];
        let results = executor.execute_calls(&calls, &test_ctx(), &trace).await;
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "b");
    }
}
