//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / call），由 ToolRegistry 按
//! `命名空间.动词` 的全名注册与查找；未注册的名字由执行器转为失败结果。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::error::ToolError;
use crate::tools::context::ToolContext;

/// 工具 trait：名称（"ns.verb"）、描述（供提示列出）、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn call(&self, args: &Map<String, Value>, ctx: &ToolContext)
        -> Result<Value, ToolError>;
}

/// 工具注册表：按全名存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description) 列表，用于生成提示中的可用工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        pairs.sort();
        pairs
    }
}

/// 工具参数取值辅助：必填字符串
pub fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing string arg: {key}")))
}

/// 工具参数取值辅助：可选整数
pub fn optional_u64(args: &Map<String, Value>, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

/// 工具参数取值辅助：可选布尔
pub fn optional_bool(args: &Map<String, Value>, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}
