//! Agent 错误类型
//!
//! Backend 对当前轮次是终止性的；ToolNotFound / ToolExecutionFailed / ToolTimeout 在循环内转为工具结果回传给后端；
//! HistoryEmpty 仅提示，调用方按「全新会话」处理。

use thiserror::Error;

use crate::integrations::TransportError;
use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("No message available")]
    HistoryEmpty,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 单次请求内工具调用链超过上限
    #[error("Too many tool calls (depth {0})")]
    TooManyToolCalls(usize),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}

impl AgentError {
    /// 回传给后端的工具错误信息：执行失败时直接使用工具自身的错误文本
    pub fn tool_message(&self) -> String {
        match self {
            AgentError::ToolExecutionFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_message() {
        let err = AgentError::ToolNotFound("summon_dragon".to_string());
        assert_eq!(err.to_string(), "Tool 'summon_dragon' not found");
        assert_eq!(err.tool_message(), "Tool 'summon_dragon' not found");
    }

    #[test]
    fn test_tool_message_uses_raw_failure() {
        let err = AgentError::ToolExecutionFailed("failed to read file".to_string());
        assert_eq!(err.tool_message(), "failed to read file");
    }

    #[test]
    fn test_config_error_from_loader() {
        let err: AgentError = config::ConfigError::Message("bad value".into()).into();
        assert!(matches!(err, AgentError::ConfigError(_)));
        assert_eq!(err.to_string(), "Config error: bad value");
    }
}
