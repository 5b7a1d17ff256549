//! 核心层：数据类型、错误与 trace 事件

pub mod error;
pub mod trace;
pub mod types;

pub use error::{ToolError, TurnError};
pub use trace::{BufferTraceSink, JsonlTraceSink, NoopTraceSink, TraceEvent, TraceSink};
pub use types::{now_ts, ChatMessage, Checkpoint, Role, State};
