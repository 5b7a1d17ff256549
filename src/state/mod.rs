//! 状态变更层：补丁应用、能力集合、记忆压缩与压力反馈

pub mod apply;
pub mod capabilities;
pub mod condense;
pub mod feedback;

pub use apply::{apply_patch, parse_action, ApplyOutcome, PatchAction};
pub use capabilities::{grant_permission, normalize, request_permission, CapabilityGate};
pub use condense::{
    condense_recent_messages, condense_state, condense_upstream, truncate_text, CondenseOutcome,
    CondensePolicy, CondenseReport, TRUNCATION_MARKER,
};
pub use feedback::{compute_memory_pressure, format_memory_feedback, MemoryPressure};
