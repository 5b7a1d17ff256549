//! 回合流水线：角色定义、提示组装与回合编排

pub mod prompt;
pub mod role;
pub mod turn;

pub use prompt::{compact_state, compose_prompt, format_history};
pub use role::{default_roles, RoleSpec};
pub use turn::{TurnPhase, TurnRuntime};
