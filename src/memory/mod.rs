//! 外部记忆库
//!
//! Condenser 淘汰的条目经 writeback 存入记忆库，返回的引用 ID 追加到
//! state.memory_refs；检索结果以 RETRIEVAL 块注入需要的角色提示。
//! 默认实现为关键词重叠打分的内存库，接口留给向量库等替换。

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

/// 一条检索命中
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
    pub id: String,
    pub score: f64,
    pub excerpt: String,
}

/// 记忆库抽象：回写淘汰条目、按查询检索
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 存入条目并返回各自的引用 ID（与输入一一对应、保序）
    async fn writeback(&self, entries: &[String]) -> Vec<String>;

    /// 按查询返回至多 k 条命中，分值降序
    async fn retrieve(&self, query: &str, k: usize) -> Vec<Retrieved>;

    fn enabled(&self) -> bool {
        true
    }
}

/// 关闭记忆功能时的空实现
#[derive(Debug, Default)]
pub struct NoopMemoryStore;

#[async_trait]
impl MemoryStore for NoopMemoryStore {
    async fn writeback(&self, _entries: &[String]) -> Vec<String> {
        Vec::new()
    }

    async fn retrieve(&self, _query: &str, _k: usize) -> Vec<Retrieved> {
        Vec::new()
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    id: String,
    text: String,
}

/// 进程内关键词记忆库
///
/// 打分 = 查询词与条目词的小写重叠数 / 查询词数；0 分不返回。
#[derive(Debug, Default)]
pub struct KeywordMemoryStore {
    entries: Mutex<Vec<MemoryEntry>>,
}

impl KeywordMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl MemoryStore for KeywordMemoryStore {
    async fn writeback(&self, new_entries: &[String]) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap();
        let mut refs = Vec::with_capacity(new_entries.len());
        for text in new_entries {
            let id = format!("mem-{:04}", entries.len() + 1);
            entries.push(MemoryEntry {
                id: id.clone(),
                text: text.clone(),
            });
            refs.push(id);
        }
        refs
    }

    async fn retrieve(&self, query: &str, k: usize) -> Vec<Retrieved> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Vec::new();
        }
        let entries = self.entries.lock().unwrap();
        let mut hits: Vec<Retrieved> = entries
            .iter()
            .filter_map(|entry| {
                let entry_tokens = tokenize(&entry.text);
                let overlap = query_tokens
                    .iter()
                    .filter(|t| entry_tokens.contains(t))
                    .count();
                if overlap == 0 {
                    return None;
                }
                Some(Retrieved {
                    id: entry.id.clone(),
                    score: overlap as f64 / query_tokens.len() as f64,
                    excerpt: entry.text.chars().take(200).collect(),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }
}

/// 将检索命中格式化为提示中的 RETRIEVAL 块；无命中返回 None
pub fn format_retrieval_block(hits: &[Retrieved]) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let mut lines = vec!["RETRIEVAL:".to_string()];
    for hit in hits {
        lines.push(format!("- [{}] (score {:.2}) {}", hit.id, hit.score, hit.excerpt));
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writeback_returns_ordered_refs() {
        let store = KeywordMemoryStore::new();
        let refs = store
            .writeback(&["first note".into(), "second note".into()])
            .await;
        assert_eq!(refs, vec!["mem-0001", "mem-0002"]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_overlap() {
        let store = KeywordMemoryStore::new();
        store
            .writeback(&[
                "rust ownership rules".into(),
                "rust borrow checker and ownership".into(),
                "python packaging".into(),
            ])
            .await;
        let hits = store.retrieve("rust ownership", 2).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "mem-0001");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_no_overlap_returns_nothing() {
        let store = KeywordMemoryStore::new();
        store.writeback(&["alpha beta".into()]).await;
        assert!(store.retrieve("gamma", 3).await.is_empty());
    }

    #[test]
    fn test_retrieval_block_formatting() {
        assert!(format_retrieval_block(&[]).is_none());
        let block = format_retrieval_block(&[Retrieved {
            id: "mem-0001".into(),
            score: 0.5,
            excerpt: "hello".into(),
        }])
        .unwrap();
        assert!(block.starts_with("RETRIEVAL:"));
        assert!(block.contains("mem-0001"));
    }
}
