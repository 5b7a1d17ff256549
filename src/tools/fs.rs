//! 沙箱文件系统工具（fs.read_text / fs.write_text / fs.list_dir）
//!
//! 所有路径过 resolve_under_root；读有字节上限、写默认拒绝覆盖、列目录排序限条数。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::error::ToolError;
use crate::tools::context::ToolContext;
use crate::tools::registry::{optional_bool, optional_u64, require_str, Tool};
use crate::tools::sandbox::resolve_under_root;

/// fs.read_text：读取文件前 max_bytes 字节，非 UTF-8 以替换字符解码
pub struct ReadTextTool;

#[async_trait]
impl Tool for ReadTextTool {
    fn name(&self) -> &str {
        "fs.read_text"
    }

    fn description(&self) -> &str {
        r#"Read a text file inside the sandbox. Args: {"path": "relative path", "max_bytes": 20000}"#
    }

    async fn call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let max_bytes = optional_u64(args, "max_bytes")
            .map(|n| n as usize)
            .unwrap_or(ctx.settings.fs_max_bytes);
        if max_bytes == 0 {
            return Err(ToolError::InvalidArgs("max_bytes must be positive".into()));
        }

        let resolved = resolve_under_root(&ctx.settings.sandbox_root, path)?;
        if !resolved.is_file() {
            return Err(ToolError::Failed(format!("path is not a file: {path}")));
        }
        let data =
            std::fs::read(&resolved).map_err(|e| ToolError::Failed(format!("{path}: {e}")))?;
        let slice = &data[..data.len().min(max_bytes)];
        let text = String::from_utf8_lossy(slice).to_string();
        Ok(json!({ "path": path, "text": text }))
    }
}

/// fs.write_text：写入 UTF-8 文本；已存在且未置 overwrite 时拒绝
pub struct WriteTextTool;

#[async_trait]
impl Tool for WriteTextTool {
    fn name(&self) -> &str {
        "fs.write_text"
    }

    fn description(&self) -> &str {
        r#"Write a text file inside the sandbox. Args: {"path": "relative path", "text": "...", "overwrite": false}"#
    }

    async fn call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let text = require_str(args, "text")?;
        let overwrite = optional_bool(args, "overwrite").unwrap_or(false);

        let resolved = resolve_under_root(&ctx.settings.sandbox_root, path)?;
        if resolved.exists() && !overwrite {
            return Err(ToolError::Failed(format!(
                "refusing to overwrite existing file: {path}"
            )));
        }
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ToolError::Failed(format!("{path}: {e}")))?;
        }
        std::fs::write(&resolved, text).map_err(|e| ToolError::Failed(format!("{path}: {e}")))?;
        Ok(json!({ "path": path, "bytes": text.len() }))
    }
}

/// fs.list_dir：排序后的目录条目，至多 max_entries 条
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "fs.list_dir"
    }

    fn description(&self) -> &str {
        r#"List a sandbox directory, sorted. Args: {"path": ".", "max_entries": 200}"#
    }

    async fn call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let max_entries = optional_u64(args, "max_entries")
            .map(|n| n as usize)
            .unwrap_or(ctx.settings.fs_max_entries);
        if max_entries == 0 {
            return Err(ToolError::InvalidArgs("max_entries must be positive".into()));
        }

        let resolved = resolve_under_root(&ctx.settings.sandbox_root, path)?;
        if !resolved.is_dir() {
            return Err(ToolError::Failed(format!("path is not a directory: {path}")));
        }
        let mut entries = Vec::new();
        let dir =
            std::fs::read_dir(&resolved).map_err(|e| ToolError::Failed(format!("{path}: {e}")))?;
        for entry in dir {
            let entry = entry.map_err(|e| ToolError::Failed(e.to_string()))?;
            entries.push(entry.file_name().to_string_lossy().to_string());
        }
        entries.sort();
        entries.truncate(max_entries);
        Ok(json!({ "path": path, "entries": entries }))
    }
}
