//! 脚本化后端（用于测试，无需 API）
//!
//! 按角色预先排入响应脚本，回合按序消费；可对指定角色注入失败，
//! 并记录每次调用的 (role, prompt) 供断言提示组装。

use std::collections::HashMap;
use std::sync::Mutex;
use std::collections::VecDeque;

use async_trait::async_trait;

use crate::llm::traits::{ModelBackend, RoleParams};

/// 脚本化后端：角色队列优先，其次全局队列，耗尽后返回固定文本
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    per_role: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    global: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为指定角色排入一条响应
    pub fn push_role(&self, role: &str, response: impl Into<String>) {
        self.per_role
            .lock()
            .unwrap()
            .entry(role.to_string())
            .or_default()
            .push_back(Ok(response.into()));
    }

    /// 为指定角色排入一次失败
    pub fn push_role_error(&self, role: &str, message: impl Into<String>) {
        self.per_role
            .lock()
            .unwrap()
            .entry(role.to_string())
            .or_default()
            .push_back(Err(message.into()));
    }

    /// 排入一条全局响应（任意角色消费）
    pub fn push(&self, response: impl Into<String>) {
        self.global.lock().unwrap().push_back(Ok(response.into()));
    }

    /// 所有已发生调用的 (role, prompt)
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// 指定角色收到的提示
    pub fn prompts_for(&self, role: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == role)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(
        &self,
        role: &str,
        prompt: &str,
        _params: &RoleParams,
    ) -> Result<String, String> {
        self.calls
            .lock()
            .unwrap()
            .push((role.to_string(), prompt.to_string()));

        if let Some(queue) = self.per_role.lock().unwrap().get_mut(role) {
            if let Some(next) = queue.pop_front() {
                return next;
            }
        }
        if let Some(next) = self.global.lock().unwrap().pop_front() {
            return next;
        }
        Ok(format!("(scripted backend exhausted for {role})"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
