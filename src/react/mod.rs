//! 编排层：工具调用主循环

pub mod loop_;

pub use loop_::{Orchestrator, DEFAULT_MAX_TOOL_DEPTH, TOO_MANY_TOOL_CALLS_MESSAGE};
