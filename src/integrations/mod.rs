//! 外部集成：聊天传输抽象、控制台实现与长消息切分

pub mod console;
pub mod split;
pub mod transport;

pub use console::ConsoleTransport;
pub use split::{split_message, MAX_MESSAGE_CHARS};
pub use transport::{MessageId, Transport, TransportError};
