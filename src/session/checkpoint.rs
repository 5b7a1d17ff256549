//! 检查点存储
//!
//! 每会话一个 JSON 文件。写入走「临时文件 + fsync + 原子重命名」，
//! 崩溃不会留下半写状态；revision 必须严格大于磁盘上的值，否则拒绝写入。

use std::path::{Path, PathBuf};

use crate::core::error::TurnError;
use crate::core::types::{now_ts, Checkpoint};

/// 文件系统检查点存储：base_dir/<session_id>.json
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    base_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.json"))
    }

    /// 读取最新检查点；文件不存在时返回 None
    pub fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, TurnError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| TurnError::CheckpointLoad(format!("{}: {e}", path.display())))?;
        let checkpoint: Checkpoint = serde_json::from_str(&data)
            .map_err(|e| TurnError::CheckpointLoad(format!("{}: {e}", path.display())))?;
        Ok(Some(checkpoint))
    }

    pub fn load_or_create(&self, session_id: &str) -> Result<Checkpoint, TurnError> {
        Ok(self
            .load(session_id)?
            .unwrap_or_else(|| Checkpoint::new(session_id)))
    }

    /// 落盘：revision +1、刷新时间戳、整体构建后原子替换
    ///
    /// 若磁盘上已有 revision 不小于新值（如并发进程已写入），拒绝并返回 CheckpointWrite。
    pub fn save(&self, checkpoint: &mut Checkpoint) -> Result<PathBuf, TurnError> {
        let path = self.path_for(&checkpoint.session_id);
        checkpoint.revision += 1;
        checkpoint.updated_ts = now_ts();

        if let Some(existing) = self.load(&checkpoint.session_id).ok().flatten() {
            if existing.revision >= checkpoint.revision {
                checkpoint.revision -= 1;
                return Err(TurnError::CheckpointWrite(format!(
                    "stale revision: on-disk {} >= new {}",
                    existing.revision,
                    checkpoint.revision + 1
                )));
            }
        }

        let payload = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| TurnError::CheckpointWrite(e.to_string()))?;
        write_atomic(&path, &payload).map_err(|e| TurnError::CheckpointWrite(e.to_string()))?;
        Ok(path)
    }
}

/// 临时文件写入 + fsync + rename；目录按需创建
fn write_atomic(path: &Path, payload: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(payload.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
