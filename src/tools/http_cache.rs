//! HTTP 抓取缓存
//!
//! URL -> (存入时刻, 状态码, 正文) 的 TTL 缓存。配置了 cache_path 时整表以 JSON
//! 落盘、进程重启可复用；未配置时仅在内存（测试与一次性运行）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::core::types::now_ts;

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    stored_ts: f64,
    /// 老缓存文件无此字段，按 200 读入
    #[serde(default = "default_status")]
    status: u16,
    body: String,
}

/// TTL 读穿缓存
#[derive(Debug)]
pub struct HttpCache {
    ttl_secs: u64,
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl HttpCache {
    /// path 为 None 时纯内存
    pub fn new(ttl_secs: u64, path: Option<PathBuf>) -> Self {
        let entries = path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self {
            ttl_secs,
            path,
            entries: Mutex::new(entries),
        }
    }

    /// 命中且未过期时返回 (状态码, 正文)
    pub fn get(&self, url: &str) -> Option<(u16, String)> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(url)?;
        if now_ts() - entry.stored_ts > self.ttl_secs as f64 {
            return None;
        }
        Some((entry.status, entry.body.clone()))
    }

    pub fn put(&self, url: &str, status: u16, body: &str) {
        let snapshot = {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                url.to_string(),
                CacheEntry {
                    stored_ts: now_ts(),
                    status,
                    body: body.to_string(),
                },
            );
            self.path.as_ref().map(|_| entries.clone())
        };
        if let (Some(path), Some(snapshot)) = (self.path.as_ref(), snapshot) {
            if let Ok(payload) = serde_json::to_string(&snapshot) {
                if let Err(e) = std::fs::write(path, payload) {
                    tracing::warn!(path = %path.display(), error = %e, "http cache persist failed");
                }
            }
        }
    }
}
