//! 系统时间工具（time.now）

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::core::error::ToolError;
use crate::tools::context::ToolContext;
use crate::tools::registry::Tool;

pub struct TimeNowTool;

#[async_trait]
impl Tool for TimeNowTool {
    fn name(&self) -> &str {
        "time.now"
    }

    fn description(&self) -> &str {
        r#"Current time in UTC and local timezone. Args: {}"#
    }

    async fn call(
        &self,
        _args: &Map<String, Value>,
        _ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let utc = Utc::now();
        Ok(json!({
            "utc": utc.to_rfc3339_opts(SecondsFormat::Secs, true),
            "local": Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            "epoch_s": utc.timestamp() as f64,
        }))
    }
}
