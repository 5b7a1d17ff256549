//! 工具执行上下文
//!
//! 每轮工具循环为一组调用构建一个 ToolContext：状态快照（能力检查用）、
//! 沙箱与网络设置、能力门、HTTP 缓存。工具本身无全局可变状态。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ToolsSection;
use crate::core::types::State;
use crate::state::CapabilityGate;
use crate::tools::http_cache::HttpCache;

/// 工具层设置（由 config [tools] 段构建）
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub sandbox_root: PathBuf,
    pub tool_timeout_secs: u64,
    pub shell_allowed_prefixes: Vec<String>,
    pub shell_denied_substrings: Vec<String>,
    pub http_timeout_secs: u64,
    pub http_max_bytes: usize,
    /// 单文件读取默认字节上限
    pub fs_max_bytes: usize,
    /// 列目录默认条目上限
    pub fs_max_entries: usize,
}

impl ToolSettings {
    pub fn from_config(section: &ToolsSection) -> Self {
        Self {
            sandbox_root: section
                .sandbox_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("workspace")),
            tool_timeout_secs: section.tool_timeout_secs,
            shell_allowed_prefixes: section.shell.allowed_prefixes.clone(),
            shell_denied_substrings: section.shell.denied_substrings.clone(),
            http_timeout_secs: section.http.timeout_secs,
            http_max_bytes: section.http.max_bytes,
            fs_max_bytes: 20_000,
            fs_max_entries: 200,
        }
    }
}

/// 一轮工具调用共享的上下文
pub struct ToolContext {
    /// 执行时刻的状态快照（能力集合在此快照上判定）
    pub state: State,
    pub settings: ToolSettings,
    pub gate: CapabilityGate,
    pub http_cache: Arc<HttpCache>,
}

impl ToolContext {
    pub fn new(
        state: State,
        settings: ToolSettings,
        gate: CapabilityGate,
        http_cache: Arc<HttpCache>,
    ) -> Self {
        Self {
            state,
            settings,
            gate,
            http_cache,
        }
    }
}
