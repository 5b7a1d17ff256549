//! council — 多角色回合制推理运行时
//!
//! 固定角色流水线（reflection → planner → critic → governor）处理每个用户
//! 回合：各角色依次补全，输出经结构化块协议解析（状态补丁、工具调用）与
//! 可见文本净化，治理者可在一轮工具循环中调用沙箱化工具，状态变更以补丁
//! 折入检查点并受确定性记忆压缩约束，回合结束原子落盘。
//!
//! 模块：
//! - core：数据类型、错误、trace 事件
//! - protocol：定界 JSON 块提取与可见文本净化
//! - state：补丁应用、能力集合、记忆压缩与压力反馈
//! - session：检查点持久化与每会话串行化
//! - memory：外部记忆库（回写 / 检索）
//! - llm：模型后端（OpenAI 兼容 / DeepSeek / 脚本化）
//! - tools：注册表、执行器、沙箱与内置工具
//! - pipeline：角色、提示组装与回合编排

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod state;
pub mod tools;

pub use config::{load_config, AppConfig};
pub use pipeline::TurnRuntime;
