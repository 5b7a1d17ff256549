//! 会话层：检查点持久化与每会话回合串行化

pub mod checkpoint;
pub mod supervisor;

pub use checkpoint::CheckpointStore;
pub use supervisor::SessionSupervisor;
