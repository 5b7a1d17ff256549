//! Trace 事件落盘（JSONL）
//!
//! TraceSink 为 fire-and-forget：写入失败只打 warn 日志，绝不阻塞或中断回合。
//! 事件种类包括 llm_req / llm_done / patch_applied / action_run / retrieval_used /
//! tool_plan / tool_start / tool_done / decode_error / condense / sanitize 等。

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::types::now_ts;

/// 单条 trace 事件：时间戳、种类、任意 JSON 负载
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub ts: f64,
    pub kind: String,
    pub data: serde_json::Value,
}

impl TraceEvent {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            ts: now_ts(),
            kind: kind.into(),
            data,
        }
    }
}

/// Trace 接收端：append 永不失败、永不阻塞回合
pub trait TraceSink: Send + Sync {
    fn append(&self, event: TraceEvent);

    /// 本回合 trace 的可寻址引用（文件名），用于写入检查点 trace_tail
    fn trace_ref(&self) -> Option<String> {
        None
    }
}

/// 空实现：未启用 trace 时使用
#[derive(Debug, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn append(&self, _event: TraceEvent) {}
}

/// JSONL 文件实现：每个回合一个文件（run_id = 会话 + 修订号），逐行追加
#[derive(Debug)]
pub struct JsonlTraceSink {
    path: PathBuf,
}

impl JsonlTraceSink {
    /// base_dir/<run_id>.jsonl；目录按需创建
    pub fn new(base_dir: impl Into<PathBuf>, run_id: &str) -> Self {
        let mut path = base_dir.into();
        path.push(format!("{run_id}.jsonl"));
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TraceSink for JsonlTraceSink {
    fn append(&self, event: TraceEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("trace serialize failed: {e}");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("trace dir create failed: {e}");
                return;
            }
        }
        use std::io::Write;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            tracing::warn!("trace append failed: {e}");
        }
    }

    fn trace_ref(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
    }
}

/// 内存缓冲实现：测试中用于断言事件序列
#[derive(Debug, Default)]
pub struct BufferTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl BufferTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.kind)
            .collect()
    }
}

impl TraceSink for BufferTraceSink {
    fn append(&self, event: TraceEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlTraceSink::new(dir.path(), "s-1-rev-0");
        sink.append(TraceEvent::new("llm_req", serde_json::json!({"role": "planner"})));
        sink.append(TraceEvent::new("llm_done", serde_json::json!({"role": "planner"})));

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "llm_req");
        assert_eq!(sink.trace_ref().unwrap(), "s-1-rev-0.jsonl");
    }

    #[test]
    fn test_buffer_sink_records_kinds() {
        let sink = BufferTraceSink::new();
        sink.append(TraceEvent::new("tool_start", serde_json::json!({})));
        sink.append(TraceEvent::new("tool_done", serde_json::json!({})));
        assert_eq!(sink.kinds(), vec!["tool_start", "tool_done"]);
    }
}
