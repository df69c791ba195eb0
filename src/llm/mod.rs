//! LLM 层：生成式后端抽象与实现（Gemini REST / 脚本化 Mock）

pub mod gemini;
pub mod mock;
pub mod traits;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
pub use mock::ScriptedLlmClient;
pub use traits::{Candidate, ChatSession, GenerateResponse, LlmClient, LlmError};
