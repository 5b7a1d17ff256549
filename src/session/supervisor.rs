//! 会话并发监督
//!
//! 每个会话同一时刻最多一个在途回合。以 session_id 为键维护异步互斥锁，
//! 回合入口处取锁，后到的请求排队等待而不是并发修改同一检查点。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// 会话锁表
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得某会话的回合锁；持有 guard 期间该会话不会有第二个回合运行
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 仅表内持有的锁说明该会话既无在途回合也无等待者，可回收
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
