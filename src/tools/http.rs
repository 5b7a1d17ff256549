//! 网络抓取工具（http.get）
//!
//! 发起请求前完成全部校验：URL 必须是 http/https 且带主机名，
//! 域名过能力门（net:<domain> 定向授权或 net 宽授权 + 白名单）。
//! 命中 TTL 缓存直接返回；正文超过字节上限即中止；HTML 转纯文本。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::error::ToolError;
use crate::tools::context::ToolContext;
use crate::tools::registry::{optional_bool, require_str, Tool};

const USER_AGENT: &str = concat!("council/", env!("CARGO_PKG_VERSION"));

fn extract_domain(url: &str) -> Result<String, ToolError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ToolError::InvalidArgs(format!("bad url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ToolError::InvalidArgs(format!(
                "url must be http or https, got {other}"
            )))
        }
    }
    parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| ToolError::InvalidArgs("url must include a hostname".to_string()))
}

fn looks_like_html(content_type: &str, body: &str) -> bool {
    content_type.to_lowercase().contains("html") || body.to_lowercase().contains("<html")
}

pub struct HttpGetTool;

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http.get"
    }

    fn description(&self) -> &str {
        r#"Fetch a URL (requires net capability). Args: {"url": "https://...", "use_cache": true}"#
    }

    async fn call(
        &self,
        args: &Map<String, Value>,
        ctx: &ToolContext,
    ) -> Result<Value, ToolError> {
        let url = require_str(args, "url")?;
        let use_cache = optional_bool(args, "use_cache").unwrap_or(true);

        let domain = extract_domain(url)?;
        if !ctx.gate.allows(&ctx.state, &domain) {
            return Err(ToolError::CapabilityDenied(ctx.gate.denial_message(&domain)));
        }

        if use_cache {
            if let Some((status, body)) = ctx.http_cache.get(url) {
                return Ok(json!({ "url": url, "status": status, "text": body, "cache_hit": true }));
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(ctx.settings.http_timeout_secs))
            .build()
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("request failed: {e}")))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ToolError::Failed(format!("read failed: {e}")))?
        {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > ctx.settings.http_max_bytes {
                return Err(ToolError::Failed(format!(
                    "response exceeded byte limit ({})",
                    ctx.settings.http_max_bytes
                )));
            }
        }

        let mut text = String::from_utf8_lossy(&bytes).to_string();
        if looks_like_html(&content_type, &text) {
            text = html2text::from_read(text.as_bytes(), 100)
                .unwrap_or_else(|_| text.clone());
        }

        if use_cache {
            ctx.http_cache.put(url, status, &text);
        }
        Ok(json!({ "url": url, "status": status, "text": text, "cache_hit": false }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CapabilityGate;
    use crate::tools::context::ToolSettings;
    use crate::tools::http_cache::HttpCache;
    use std::sync::Arc;

    fn ctx_with_caps(granted: &[&str]) -> ToolContext {
        let mut state = crate::core::types::State::default();
        state.capabilities_granted = granted.iter().map(|s| s.to_string()).collect();
        ToolContext::new(
            state,
            ToolSettings::from_config(&crate::config::ToolsSection::default()),
            CapabilityGate::new(true, vec!["docs.rs".to_string()]),
            Arc::new(HttpCache::new(600, None)),
        )
    }

    fn url_args(url: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("url".into(), Value::String(url.into()));
        map
    }

    #[test]
    fn test_domain_extraction() {
        assert_eq!(extract_domain("https://Docs.RS/serde").unwrap(), "docs.rs");
        assert!(extract_domain("ftp://host/x").is_err());
        assert!(extract_domain("not a url").is_err());
    }

    #[tokio::test]
    async fn test_denied_without_capability() {
        let ctx = ctx_with_caps(&[]);
        let err = HttpGetTool
            .call(&url_args("https://docs.rs/serde"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::CapabilityDenied(_)));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let ctx = ctx_with_caps(&["net"]);
        // 预置缓存后无需任何网络即可命中
        ctx.http_cache.put("https://docs.rs/serde", 200, "cached body");
        let out = HttpGetTool
            .call(&url_args("https://docs.rs/serde"), &ctx)
            .await
            .unwrap();
        assert_eq!(out["cache_hit"], true);
        assert_eq!(out["status"], 200);
        assert_eq!(out["text"], "cached body");
    }

    #[tokio::test]
    async fn test_scoped_grant_beats_allowlist() {
        let ctx = ctx_with_caps(&["net:example.com"]);
        ctx.http_cache.put("https://example.com/", 200, "ok");
        let out = HttpGetTool
            .call(&url_args("https://example.com/"), &ctx)
            .await
            .unwrap();
        assert_eq!(out["cache_hit"], true);
    }
}
