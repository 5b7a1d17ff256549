//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COUNCIL__*` 覆盖（双下划线表示嵌套，如 `COUNCIL__LLM__PROVIDER=openai`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RoleParams;
use crate::state::CondensePolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmConfig,
    pub tools: ToolsSection,
    pub condense: CondensePolicy,
    /// 按角色名覆盖采样参数，如 [roles.governor] temperature = 0.2
    pub roles: HashMap<String, RoleParams>,
}

/// [app] 段：会话存储、trace 目录、记忆开关
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 检查点目录，未设置时用 ./sessions
    pub sessions_dir: PathBuf,
    /// 回合 trace（JSONL）目录
    pub trace_dir: PathBuf,
    /// 是否启用外部记忆库（回写 + 检索）
    pub memory_enabled: bool,
    /// 单角色后端调用超时（秒）
    pub backend_timeout_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            sessions_dir: PathBuf::from("sessions"),
            trace_dir: PathBuf::from("traces"),
            memory_enabled: true,
            backend_timeout_secs: 60,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// 后端：deepseek / openai / scripted
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// [tools] 段：沙箱根、工具超时、Shell 与 HTTP 子段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 沙箱根目录，未设置时用 ./workspace
    pub sandbox_root: Option<PathBuf>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 能力白名单开关：开启时 net 宽授权还需命中域名白名单
    pub net_allowlist_enabled: bool,
    pub shell: ShellSection,
    pub http: HttpSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            sandbox_root: None,
            tool_timeout_secs: 30,
            net_allowlist_enabled: true,
            shell: ShellSection::default(),
            http: HttpSection::default(),
        }
    }
}

/// [tools.shell] 段：允许的命令首词与禁止出现的子串
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub allowed_prefixes: Vec<String>,
    pub denied_substrings: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_prefixes: vec![
                "ls".into(),
                "grep".into(),
                "cat".into(),
                "head".into(),
                "tail".into(),
                "wc".into(),
                "find".into(),
                "echo".into(),
                "date".into(),
            ],
            denied_substrings: vec![
                "rm -rf".into(),
                "sudo".into(),
                "mkfs".into(),
                ">/dev/".into(),
                "shutdown".into(),
                "reboot".into(),
            ],
        }
    }
}

/// [tools.http] 段：抓取超时、字节上限、缓存 TTL、域名白名单
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    pub max_bytes: usize,
    pub cache_ttl_secs: u64,
    /// 缓存文件路径，未设置时仅在内存缓存
    pub cache_path: Option<PathBuf>,
    pub allowed_domains: Vec<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_bytes: 200_000,
            cache_ttl_secs: 600,
            cache_path: None,
            allowed_domains: vec![
                "en.wikipedia.org".into(),
                "zh.wikipedia.org".into(),
                "github.com".into(),
                "raw.githubusercontent.com".into(),
                "stackoverflow.com".into(),
                "docs.rs".into(),
                "crates.io".into(),
                "doc.rust-lang.org".into(),
                "developer.mozilla.org".into(),
                "arxiv.org".into(),
                "news.ycombinator.com".into(),
            ],
        }
    }
}

/// 从 config 目录加载配置，环境变量 COUNCIL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COUNCIL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COUNCIL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
