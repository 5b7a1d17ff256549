//! 结构化块协议：模型输出中的定界 JSON 块提取与可见文本净化

pub mod block;
pub mod patch;
pub mod sanitize;
pub mod tool_call;

pub use block::{scan_block, BlockMarkers, BlockScan, STATE_PATCH_MARKERS, TOOL_CALLS_MARKERS};
pub use patch::{parse_state_patch, StatePatch};
pub use sanitize::{sanitize_visible, sanitize_visible_with_report, EMPTY_PLACEHOLDER};
pub use tool_call::{parse_tool_calls, ToolCall};
