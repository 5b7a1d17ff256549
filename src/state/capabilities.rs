//! 能力集合与网络门禁
//!
//! 能力为字符串："net"（宽域）、"net:<domain>"（限域）。
//! 不变式：pending 与 granted 永不相交；授权即从 pending 移除。
//! CapabilityGate 在网络工具执行前裁决，拒绝时由执行器转为 ToolResult，绝不中断回合。

use std::collections::HashSet;

use crate::core::types::State;

pub const REQUEST_PREFIX: &str = "request_permission:";
pub const GRANT_PREFIX: &str = "grant_permission:";

/// 申请能力：已授权或已在待批中则为 no-op，返回是否发生变化
pub fn request_permission(state: &mut State, cap: &str) -> bool {
    if state.capabilities_granted.iter().any(|c| c == cap) {
        return false;
    }
    if state.capabilities_pending.iter().any(|c| c == cap) {
        return false;
    }
    state.capabilities_pending.push(cap.to_string());
    true
}

/// 授予能力：加入 granted 并从 pending 移除（幂等），返回是否发生变化
pub fn grant_permission(state: &mut State, cap: &str) -> bool {
    let mut changed = false;
    if !state.capabilities_granted.iter().any(|c| c == cap) {
        state.capabilities_granted.push(cap.to_string());
        changed = true;
    }
    let before = state.capabilities_pending.len();
    state.capabilities_pending.retain(|c| c != cap);
    changed || state.capabilities_pending.len() != before
}

/// 重建不变式：从 pending 移除所有已授权的能力
pub fn normalize(state: &mut State) {
    if state.capabilities_granted.is_empty() {
        return;
    }
    let granted: HashSet<&str> = state.capabilities_granted.iter().map(String::as_str).collect();
    state
        .capabilities_pending
        .retain(|cap| !granted.contains(cap.as_str()));
}

/// 网络门禁：限域授权优先于白名单；无匹配授权一律拒绝
#[derive(Debug, Clone, Default)]
pub struct CapabilityGate {
    pub allowlist_enabled: bool,
    pub allowlist: HashSet<String>,
}

impl CapabilityGate {
    pub fn new(allowlist_enabled: bool, allowlist: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowlist_enabled,
            allowlist: allowlist.into_iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    /// domain 可访问 iff："net:<domain>" 已授权，或 "net" 已授权且（白名单关闭或域名在单内）
    pub fn allows(&self, state: &State, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        let scoped = format!("net:{domain}");
        if state.capabilities_granted.iter().any(|c| c == &scoped) {
            return true;
        }
        if !state.capabilities_granted.iter().any(|c| c == "net") {
            return false;
        }
        if self.allowlist_enabled {
            return self.allowlist.contains(&domain);
        }
        true
    }

    /// 拒绝时的错误文案：指明缺失的能力
    pub fn denial_message(&self, domain: &str) -> String {
        format!("network access denied: missing capability net:{domain} (or net)")
    }
}
