//! 记忆层：对话轮次与按会话划分的有界历史

pub mod conversation;
pub mod history;

pub use conversation::{ConversationId, ConversationMemory, Part, Role, ToolPayload, Turn};
pub use history::{HistoryStore, DEFAULT_HISTORY_CAPACITY};
