//! 聊天传输抽象：发送 / 更新消息、发送文件
//!
//! 核心逻辑只依赖这个 trait；Markdown 渲染等平台相关的处理归传输实现所有。

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::ConversationId;

/// 平台消息 ID
pub type MessageId = i64;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送新消息，返回消息 ID
    async fn send_message(&self, conversation_id: ConversationId, text: &str) -> Result<MessageId, TransportError>;

    /// 就地更新已发送的消息（状态消息）
    async fn update_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError>;

    /// 发送文件（可带上传进度提示）
    async fn send_file_with_progress(&self, conversation_id: ConversationId, path: &Path) -> Result<(), TransportError>;
}
