//! 核心层：错误类型、按会话的处理闸门、沙箱文件清理

pub mod error;
pub mod file_janitor;
pub mod gate;

pub use error::AgentError;
pub use file_janitor::FileJanitor;
pub use gate::{GateGuard, ProcessingGate, ProcessingState};
