//! 控制台传输：把消息打印到标准输出，供本地 REPL 使用

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::integrations::{MessageId, Transport, TransportError};
use crate::memory::ConversationId;

/// 打印到 stdout 的传输；消息 ID 自增
#[derive(Debug, Default)]
pub struct ConsoleTransport {
    next_id: AtomicI64,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_message(&self, conversation_id: ConversationId, text: &str) -> Result<MessageId, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[{conversation_id}#{id}] {text}");
        Ok(id)
    }

    async fn update_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        println!("[{conversation_id}#{message_id}*] {text}");
        Ok(())
    }

    async fn send_file_with_progress(&self, conversation_id: ConversationId, path: &Path) -> Result<(), TransportError> {
        let meta = tokio::fs::metadata(path).await?;
        println!("[{conversation_id}] 📎 {} ({} bytes)", path.display(), meta.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_increase() {
        let transport = ConsoleTransport::new();
        let a = transport.send_message(1, "a").await.expect("send");
        let b = transport.send_message(1, "b").await.expect("send");
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let transport = ConsoleTransport::new();
        let err = transport
            .send_file_with_progress(1, Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
