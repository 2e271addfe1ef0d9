//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WASP__*` 覆盖（双下划线表示嵌套，如 `WASP__LLM__MODEL=...`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub server: ServerSection,
    pub report: ReportSection,
}

/// [agent] 段：回合处理相关参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 提供给预言机的对话历史窗口（user/agent 对数）
    pub max_history_turns: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_history_turns: 10,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 模型名（Groq / OpenAI 兼容端点均可）
    pub model: String,
    /// 自定义 base_url；未设置时走官方 OpenAI 端点
    pub base_url: Option<String>,
    /// 单次预言机调用超时（秒）；超时按预言机不可用处理
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            request_timeout_secs: 30,
        }
    }
}

/// [server] 段：HTTP 接口（feature = "http"）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// /api/chat 的 x-api-key 校验值；未设置时不校验
    pub api_key: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8000,
            api_key: None,
        }
    }
}

/// [report] 段：任务完成后的上报端点
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ReportSection {
    /// 未设置时不上报（NoopReporter）
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// 从 config 目录加载配置，环境变量 WASP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WASP__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("WASP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
