//! 受限 Shell 工具（shell.exec）
//!
//! 命令过白名单/黑名单后以 `sh -c` 在沙箱根下执行；stdout/stderr 截断到
//! MAX_OUTPUT_CHARS，非零退出码不算工具失败（returncode 照实返回）。

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::core::error::ToolError;
use crate::tools::context::ToolContext;
use crate::tools::registry::{require_str, Tool};
use crate::tools::sandbox::validate_shell_command;

pub const MAX_OUTPUT_CHARS: usize = 20_000;

fn clip(text: &str) -> String {
    text.chars().take(MAX_OUTPUT_CHARS).collect()
}

pub struct ShellExecTool;

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell.exec"
    }

    fn description(&self) -> &str {
        r#"Run an allowlisted shell command in the sandbox. Args: {"cmd": "ls -la"}"#
    }

    async fn call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let cmd = require_str(args, "cmd")?;
        validate_shell_command(
            cmd,
            &ctx.settings.shell_allowed_prefixes,
            &ctx.settings.shell_denied_substrings,
        )?;

        std::fs::create_dir_all(&ctx.settings.sandbox_root)
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        // 执行器超时会丢弃本 future；kill_on_drop 保证子进程随之终止
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&ctx.settings.sandbox_root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ToolError::Failed(format!("spawn failed: {e}")))?;

        Ok(json!({
            "returncode": output.status.code().unwrap_or(-1),
            "stdout": clip(&String::from_utf8_lossy(&output.stdout)),
            "stderr": clip(&String::from_utf8_lossy(&output.stderr)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CapabilityGate;
    use crate::tools::context::ToolSettings;
    use crate::tools::http_cache::HttpCache;
    use std::sync::Arc;

    fn ctx_with_root(root: &std::path::Path) -> ToolContext {
        let mut settings = ToolSettings::from_config(&crate::config::ToolsSection::default());
        settings.sandbox_root = root.to_path_buf();
        ToolContext::new(
            Default::default(),
            settings,
            CapabilityGate::new(true, Vec::new()),
            Arc::new(HttpCache::new(0, None)),
        )
    }

    fn cmd_args(cmd: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("cmd".into(), Value::String(cmd.into()));
        map
    }

    #[tokio::test]
    async fn test_allowed_command_runs_in_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "x").unwrap();
        let ctx = ctx_with_root(dir.path());
        let out = ShellExecTool.call(&cmd_args("ls"), &ctx).await.unwrap();
        assert_eq!(out["returncode"], 0);
        assert!(out["stdout"].as_str().unwrap().contains("hello.txt"));
    }

    #[tokio::test]
    async fn test_denied_command_is_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let err = ShellExecTool
            .call(&cmd_args("rm -rf /"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let out = ShellExecTool
            .call(&cmd_args("ls /definitely-not-here-xyz"), &ctx)
            .await
            .unwrap();
        assert_ne!(out["returncode"], 0);
        assert!(!out["stderr"].as_str().unwrap().is_empty());
    }
}
