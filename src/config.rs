//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SYNAPSE__*` 覆盖（双下划线表示嵌套，如 `SYNAPSE__LLM__MODEL=gemini-1.5-pro`）。
//! 每个字段都有默认值，缺少配置文件时也能启动。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::gate::{DEFAULT_GATE_TIMEOUT, DEFAULT_JANITOR_PERIOD};
use crate::core::AgentError;
use crate::extractor::fetch::{DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT};
use crate::extractor::search::DEFAULT_SEARCH_BASE_URL;
use crate::extractor::{DEFAULT_BATCH_DEADLINE, DEFAULT_MAX_CONCURRENCY};
use crate::integrations::MAX_MESSAGE_CHARS;
use crate::llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::memory::DEFAULT_HISTORY_CAPACITY;
use crate::react::DEFAULT_MAX_TOOL_DEPTH;
use crate::tools::{DEFAULT_SANDBOX_DIR, DEFAULT_TOP_K};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub gate: GateSection,
    pub tools: ToolsSection,
    pub extractor: ExtractorSection,
    pub janitor: JanitorSection,
}

/// [app] 段：应用名、沙箱目录、每个会话保留的轮次数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub sandbox_dir: PathBuf,
    pub history_capacity: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "synapse".to_string(),
            sandbox_dir: PathBuf::from(DEFAULT_SANDBOX_DIR),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// [llm] 段：模型、接口地址、API Key 所在的环境变量、请求超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// 系统提示词文件；不存在时使用内置提示词
    pub system_prompt_path: PathBuf,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            request_timeout_secs: 60,
            system_prompt_path: PathBuf::from("config/prompts/system.md"),
        }
    }
}

/// [gate] 段：处理超时（清理阈值为其 2 倍）与清理周期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSection {
    pub timeout_secs: u64,
    pub janitor_period_secs: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_GATE_TIMEOUT.as_secs(),
            janitor_period_secs: DEFAULT_JANITOR_PERIOD.as_secs(),
        }
    }
}

/// [tools] 段：单次工具调用超时、工具调用深度上限、单条消息长度上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub max_tool_depth: usize,
    pub message_limit: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            message_limit: MAX_MESSAGE_CHARS,
        }
    }
}

/// [extractor] 段：并发数、整批截止时间、单请求超时、响应体上限、搜索后抓取的链接数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorSection {
    pub max_concurrency: usize,
    pub batch_deadline_secs: u64,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub top_k: usize,
    pub search_base_url: String,
}

impl Default for ExtractorSection {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_deadline_secs: DEFAULT_BATCH_DEADLINE.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            top_k: DEFAULT_TOP_K,
            search_base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
        }
    }
}

/// [janitor] 段：沙箱文件最长保留时间与清理周期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JanitorSection {
    pub max_age_secs: u64,
    pub interval_secs: u64,
}

impl Default for JanitorSection {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            interval_secs: 3600,
        }
    }
}

impl GateSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn janitor_period(&self) -> Duration {
        Duration::from_secs(self.janitor_period_secs)
    }
}

impl JanitorSection {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// 从 config 目录加载配置，环境变量 SYNAPSE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SYNAPSE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
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
        config::Environment::with_prefix("SYNAPSE")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}
