//! 路径与命令沙箱
//!
//! 文件工具的所有路径经 resolve_under_root 校验：拒绝 NUL、绝对路径、
//! `..` 组件，并对已存在的最深祖先做 canonicalize 检查以封堵符号链接逃逸。
//! 模型习惯性写出的 `/sandbox/...` 前缀视为根目录别名。
//! Shell 命令先过首词白名单与子串黑名单，再进入 spawn。

use std::path::{Component, Path, PathBuf};

use crate::core::error::ToolError;

/// 沙箱根别名：以此开头的路径重写为相对根
const SANDBOX_ALIAS: &str = "/sandbox";

/// 将模型给出的路径解析到沙箱根之下
pub fn resolve_under_root(root: &Path, raw: &str) -> Result<PathBuf, ToolError> {
    if raw.contains('\0') {
        return Err(ToolError::SandboxViolation(
            "path contains NUL byte".to_string(),
        ));
    }

    let rewritten = if raw == SANDBOX_ALIAS {
        "."
    } else if let Some(rest) = raw.strip_prefix("/sandbox/") {
        rest
    } else {
        raw
    };

    let candidate = Path::new(rewritten);
    if candidate.is_absolute() {
        return Err(ToolError::SandboxViolation(format!(
            "absolute path not allowed: {raw}"
        )));
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ToolError::SandboxViolation(format!(
                "parent traversal not allowed: {raw}"
            )));
        }
    }

    let joined = root.join(candidate);
    verify_no_symlink_escape(root, &joined)?;
    Ok(joined)
}

/// 对已存在的最深祖先做 canonicalize，确认仍在根下
fn verify_no_symlink_escape(root: &Path, joined: &Path) -> Result<(), ToolError> {
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut probe = joined.to_path_buf();
    loop {
        if probe.exists() {
            let canonical = probe
                .canonicalize()
                .map_err(|e| ToolError::SandboxViolation(format!("{}: {e}", probe.display())))?;
            if !canonical.starts_with(&canonical_root) {
                return Err(ToolError::SandboxViolation(format!(
                    "path escapes sandbox: {}",
                    joined.display()
                )));
            }
            return Ok(());
        }
        match probe.parent() {
            Some(parent) if parent != probe => probe = parent.to_path_buf(),
            _ => return Ok(()),
        }
    }
}

/// 校验 shell 命令：首词必须在白名单，整串不得含黑名单子串
pub fn validate_shell_command(
    command: &str,
    allowed_prefixes: &[String],
    denied_substrings: &[String],
) -> Result<(), ToolError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArgs("empty command".to_string()));
    }
    for denied in denied_substrings {
        if !denied.is_empty() && trimmed.contains(denied.as_str()) {
            return Err(ToolError::SandboxViolation(format!(
                "command contains denied fragment: {denied}"
            )));
        }
    }
    let first_word = trimmed.split_whitespace().next().unwrap_or("");
    if !allowed_prefixes.iter().any(|p| p == first_word) {
        return Err(ToolError::SandboxViolation(format!(
            "command not in allowlist: {first_word}"
        )));
    }
    Ok(())
}
