//! 错误类型
//!
//! 两层错误：TurnError 为回合级致命错误（终止角色失败、检查点写入失败等）；
//! ToolError 为工具级错误，由 ToolExecutor 统一转为 ToolResult{ok:false}，永不向上抛出。

use thiserror::Error;

/// 回合级错误：出现即终止当前回合，且不落盘（上一检查点保持完整）
#[derive(Error, Debug)]
pub enum TurnError {
    /// 终止角色（governor）后端调用失败，无后续角色可产出输出
    #[error("terminal role '{role}' backend failed: {message}")]
    TerminalBackend { role: String, message: String },

    /// 检查点写入失败：回合效果可能未持久化，必须告知调用方
    #[error("checkpoint write failed: {0}")]
    CheckpointWrite(String),

    #[error("checkpoint load failed: {0}")]
    CheckpointLoad(String),

    #[error("config error: {0}")]
    Config(String),
}

/// 工具级错误：由 ToolExecutor 捕获并转为 ToolResult，绝不冒泡为回合级错误
#[derive(Error, Debug)]
pub enum ToolError {
    /// 注册表中不存在该工具（错误文案为协议的一部分，勿改）
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// 能力未授权（错误信息指明缺失的能力）
    #[error("capability denied: {0}")]
    CapabilityDenied(String),

    /// 路径逃逸或命令被拒（如 ../../etc/passwd、rm -rf）
    #[error("sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("tool timed out after {0}s")]
    Timeout(u64),

    /// 参数缺失或类型错误
    #[error("invalid args: {0}")]
    InvalidArgs(String),

    /// 处理器内部失败（IO、网络等）
    #[error("{0}")]
    Failed(String),
}
