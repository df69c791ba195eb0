//! 脚本化 LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序回放预先排好的响应；脚本耗尽后返回空响应（正常结束当前轮次）。
//! 记录每个会话开启时的历史与每次 send 的内容，便于断言。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatSession, GenerateResponse, LlmClient, LlmError};
use crate::memory::{Part, Turn};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<GenerateResponse, LlmError>>,
    histories: Vec<Vec<Turn>>,
    sent: Vec<Vec<Part>>,
}

/// 回放脚本的客户端；clone 后共享同一份脚本
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个成功响应
    pub fn push_response(&self, response: GenerateResponse) -> &Self {
        self.with_script(|s| s.responses.push_back(Ok(response)));
        self
    }

    /// 追加一个失败响应
    pub fn push_error(&self, error: LlmError) -> &Self {
        self.with_script(|s| s.responses.push_back(Err(error)));
        self
    }

    /// 所有 send 调用的内容（按时间顺序）
    pub fn sent(&self) -> Vec<Vec<Part>> {
        self.with_script(|s| s.sent.clone())
    }

    /// 每次 start_chat 时传入的历史
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.with_script(|s| s.histories.clone())
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut script)
    }
}

impl LlmClient for ScriptedLlmClient {
    fn start_chat(&self, history: Vec<Turn>) -> Box<dyn ChatSession> {
        self.with_script(|s| s.histories.push(history));
        Box::new(ScriptedSession {
            client: self.clone(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    client: ScriptedLlmClient,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send(&mut self, parts: Vec<Part>) -> Result<GenerateResponse, LlmError> {
        self.client.with_script(|s| {
            s.sent.push(parts);
            s.responses
                .pop_front()
                .unwrap_or_else(|| Ok(GenerateResponse::default()))
        })
    }
}
