//! 核心数据类型
//!
//! State 为跨回合持久的笔记状态；Checkpoint 为单会话的完整落盘单元
//! （状态 + 近期消息 + trace 尾部引用 + 修订号）。
//! 所有字段 serde(default)，老版本检查点文件可直接读入。

use serde::{Deserialize, Serialize};

/// trace_tail 至多保留最近 20 个 trace 文件名
pub const MAX_TRACE_TAIL: usize = 20;

/// 消息角色，序列化为小写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// 小写标签，与序列化形式一致
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 会话消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// 跨回合持久状态：目标、未决事项、决定、约束、摘要、记忆标签与引用、能力集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub goals: Vec<String>,
    pub open_loops: Vec<String>,
    pub decisions: Vec<String>,
    pub constraints: Vec<String>,
    pub episode_summary: String,
    pub memory_tags: Vec<String>,
    /// 已回写外部记忆库的条目引用 ID
    pub memory_refs: Vec<String>,
    /// 待批能力；与 granted 永不相交
    pub capabilities_pending: Vec<String>,
    pub capabilities_granted: Vec<String>,
}

/// 单会话检查点：整体读、整体写
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Checkpoint {
    pub session_id: String,
    pub revision: u64,
    /// epoch 秒
    pub updated_ts: f64,
    pub state: State,
    pub recent_messages: Vec<ChatMessage>,
    /// 最近若干回合的 trace 文件名
    pub trace_tail: Vec<String>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new("")
    }
}

impl Checkpoint {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            revision: 0,
            updated_ts: now_ts(),
            state: State::default(),
            recent_messages: Vec::new(),
            trace_tail: Vec::new(),
        }
    }

    /// 追加一条近期消息（剪枝由 Condenser 负责）
    pub fn push_recent(&mut self, message: ChatMessage) {
        self.recent_messages.push(message);
    }

    /// 记录本回合 trace 文件名：去重并保留尾部 MAX_TRACE_TAIL 个
    pub fn push_trace_ref(&mut self, trace_name: &str) {
        if !self.trace_tail.iter().any(|name| name == trace_name) {
            self.trace_tail.push(trace_name.to_string());
        }
        if self.trace_tail.len() > MAX_TRACE_TAIL {
            let cut = self.trace_tail.len() - MAX_TRACE_TAIL;
            self.trace_tail.drain(..cut);
        }
    }
}

/// 当前 epoch 秒（f64，保留亚秒）
pub fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
