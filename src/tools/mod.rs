//! 工具层：注册表、执行器、沙箱与内置工具

pub mod context;
pub mod executor;
pub mod fs;
pub mod http;
pub mod http_cache;
pub mod registry;
pub mod result;
pub mod sandbox;
pub mod shell;
pub mod time;

pub use context::{ToolContext, ToolSettings};
pub use executor::ToolExecutor;
pub use http_cache::HttpCache;
pub use registry::{Tool, ToolRegistry};
pub use result::{format_tool_results, ToolResult};
pub use sandbox::{resolve_under_root, validate_shell_command};

/// 内置工具全集：fs.* / shell.exec / http.get / time.now
pub fn build_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(fs::ReadTextTool);
    registry.register(fs::WriteTextTool);
    registry.register(fs::ListDirTool);
    registry.register(shell::ShellExecTool);
    registry.register(http::HttpGetTool);
    registry.register(time::TimeNowTool);
    registry
}
