//! 生成式后端抽象
//!
//! LlmClient::start_chat 以历史轮次开启一个会话；ChatSession::send 发送新消息（用户文本或工具结果）并返回响应。
//! 会话对象自身维护已发送 / 已收到的内容，与单个后端连接绑定。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{Part, Turn};

/// 后端调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("API key not set: {0}")]
    MissingApiKey(String),
}

/// 单个候选回复
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    /// None 表示候选没有内容（如被安全策略拦截）
    pub content: Option<Vec<Part>>,
    pub finish_reason: Option<String>,
}

/// 一次生成的响应：零个或多个候选
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// 单候选响应
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(parts),
                finish_reason: None,
            }],
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::text(text)])
    }

    /// 是否含有需要继续处理的内容：非空白文本、工具调用或其他片段
    pub fn has_non_empty_content(&self) -> bool {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flatten()
            .any(|part| match part {
                Part::Text { text } => !text.trim().is_empty(),
                Part::ToolCall { .. } => true,
                Part::ToolResult { .. } => false,
                Part::Unknown { raw } => !raw.is_null(),
            })
    }
}

/// 与后端绑定的一次对话会话
#[async_trait]
pub trait ChatSession: Send {
    /// 发送新内容（用户文本或工具结果），返回后端响应
    async fn send(&mut self, parts: Vec<Part>) -> Result<GenerateResponse, LlmError>;
}

/// 生成式后端客户端
pub trait LlmClient: Send + Sync {
    /// 以给定历史开启会话
    fn start_chat(&self, history: Vec<Turn>) -> Box<dyn ChatSession>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "llm"
    }
}
