//! 工具调用主循环
//!
//! 用户消息写入历史 -> 以历史开启会话并发送 -> handle_response 逐个处理候选中的片段：
//! 文本写入历史并投递给用户（首段替换状态消息）；工具调用写入历史、执行、把结果（或错误）回传给后端，
//! 再递归处理新的响应。递归深度受 max_tool_depth 限制。

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use crate::core::AgentError;
use crate::integrations::{split_message, MessageId, Transport, MAX_MESSAGE_CHARS};
use crate::llm::{ChatSession, GenerateResponse, LlmClient};
use crate::memory::{ConversationId, HistoryStore, Part, ToolPayload, Turn};
use crate::tools::{ToolExecutor, ToolOutput};

/// 单次请求内最多连续工具调用轮数，防止后端无限调用工具
pub const DEFAULT_MAX_TOOL_DEPTH: usize = 10;

pub const TOO_MANY_TOOL_CALLS_MESSAGE: &str = "Too many tool calls in a single request, stopping here.";

/// 单个轮次的可变状态
struct TurnState {
    conversation_id: ConversationId,
    /// 可就地更新的状态消息；被回复文本占用后置为 None
    status_message: Option<MessageId>,
}

/// 编排器：历史、工具执行器、后端与传输的组合
pub struct Orchestrator {
    history: Arc<HistoryStore>,
    executor: Arc<ToolExecutor>,
    llm: Arc<dyn LlmClient>,
    transport: Arc<dyn Transport>,
    max_tool_depth: usize,
    message_limit: usize,
}

impl Orchestrator {
    pub fn new(
        history: Arc<HistoryStore>,
        executor: Arc<ToolExecutor>,
        llm: Arc<dyn LlmClient>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            history,
            executor,
            llm,
            transport,
            max_tool_depth: DEFAULT_MAX_TOOL_DEPTH,
            message_limit: MAX_MESSAGE_CHARS,
        }
    }

    pub fn with_max_tool_depth(mut self, depth: usize) -> Self {
        self.max_tool_depth = depth;
        self
    }

    pub fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit.max(1);
        self
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// 驱动一个用户轮次直到完成
    ///
    /// 任何一次后端调用失败都返回 Backend 错误（不重试），本轮结束；工具错误都在循环内回传给后端，不会冒泡。
    pub async fn run(
        &self,
        conversation_id: ConversationId,
        status_message: Option<MessageId>,
        user_text: &str,
    ) -> Result<(), AgentError> {
        self.history.append(conversation_id, Turn::user_text(user_text));

        let mut context = match self.history.snapshot(conversation_id) {
            Ok(turns) => turns,
            Err(AgentError::HistoryEmpty) => {
                tracing::debug!(conversation_id, "no history, starting fresh");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        // 刚写入的用户消息作为新消息发送，不放进上下文
        context.pop();

        tracing::info!(
            conversation_id,
            context_turns = context.len(),
            backend = %self.llm.name(),
            "starting chat"
        );
        let mut session = self.llm.start_chat(context);
        let response = session.send(vec![Part::text(user_text)]).await?;

        if !response.has_non_empty_content() {
            tracing::info!(conversation_id, "empty response from backend");
            return Ok(());
        }

        let mut state = TurnState {
            conversation_id,
            status_message,
        };
        let result = self.handle_response(&mut state, &mut session, response, 0).await;
        match result {
            Err(AgentError::TooManyToolCalls(depth)) => {
                tracing::warn!(conversation_id, depth, "tool call depth exceeded");
                self.notify(&mut state, TOO_MANY_TOOL_CALLS_MESSAGE).await;
                Ok(())
            }
            other => other,
        }
    }

    fn handle_response<'a>(
        &'a self,
        state: &'a mut TurnState,
        session: &'a mut Box<dyn ChatSession>,
        response: GenerateResponse,
        depth: usize,
    ) -> BoxFuture<'a, Result<(), AgentError>> {
        async move {
            for candidate in response.candidates {
                let Some(parts) = candidate.content else {
                    tracing::debug!(finish_reason = ?candidate.finish_reason, "candidate without content");
                    continue;
                };
                for part in parts {
                    match part {
                        Part::Text { text } => {
                            let text = text.trim();
                            if text.is_empty() {
                                continue;
                            }
                            self.history.append(state.conversation_id, Turn::model_text(text));
                            self.deliver(state, text).await;
                        }
                        Part::ToolCall { name, args } => {
                            if depth >= self.max_tool_depth {
                                return Err(AgentError::TooManyToolCalls(depth));
                            }
                            self.handle_tool_call(state, session, name, args, depth).await?;
                        }
                        Part::ToolResult { name, .. } => {
                            tracing::debug!(tool = %name, "ignoring tool result sent by backend");
                        }
                        Part::Unknown { raw } => {
                            tracing::debug!(part = %raw, "ignoring unsupported part");
                        }
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn handle_tool_call(
        &self,
        state: &mut TurnState,
        session: &mut Box<dyn ChatSession>,
        name: String,
        args: Map<String, Value>,
        depth: usize,
    ) -> Result<(), AgentError> {
        let conversation_id = state.conversation_id;
        tracing::info!(conversation_id, tool = %name, depth, "tool call");
        self.history.append(conversation_id, Turn::tool_call(name.clone(), args.clone()));

        let outcome = if self.executor.has_tool(&name) {
            self.notify(state, &format!("Executing {name}")).await;
            self.executor.execute(&name, Value::Object(args)).await
        } else {
            Err(AgentError::ToolNotFound(name.clone()))
        };

        let payload = match outcome {
            Ok(output) => {
                self.notify(state, &format!("{name} executed successfully")).await;
                self.spawn_artifact_delivery(conversation_id, &output);
                ToolPayload::result(output.content)
            }
            Err(e) => {
                let message = e.tool_message();
                tracing::warn!(conversation_id, tool = %name, error = %message, "tool failed");
                self.notify(state, &message).await;
                ToolPayload::Error(message)
            }
        };
        let failed = payload.is_error();
        self.history
            .append(conversation_id, Turn::tool_result(name.clone(), payload.clone()));

        let next = match session.send(vec![Part::tool_result(name.clone(), payload)]).await {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(conversation_id, tool = %name, error = %e, "failed to send tool result");
                return Err(AgentError::Backend(e));
            }
        };

        if failed || next.has_non_empty_content() {
            self.handle_response(state, session, next, depth + 1).await
        } else {
            tracing::debug!(conversation_id, tool = %name, "no follow-up after tool result");
            Ok(())
        }
    }

    /// 工具产物异步发送，不阻塞循环
    fn spawn_artifact_delivery(&self, conversation_id: ConversationId, output: &ToolOutput) {
        let Some(path) = output.artifact.clone() else {
            return;
        };
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.send_file_with_progress(conversation_id, &path).await {
                tracing::warn!(conversation_id, path = %path.display(), error = %e, "failed to send file");
            }
        });
    }

    /// 状态提示：有状态消息就更新它，否则发一条新的作为状态消息
    async fn notify(&self, state: &mut TurnState, text: &str) {
        let conversation_id = state.conversation_id;
        match state.status_message {
            Some(message_id) => {
                if let Err(e) = self.transport.update_message(conversation_id, message_id, text).await {
                    tracing::warn!(conversation_id, error = %e, "failed to update status message");
                }
            }
            None => match self.transport.send_message(conversation_id, text).await {
                Ok(message_id) => state.status_message = Some(message_id),
                Err(e) => tracing::warn!(conversation_id, error = %e, "failed to send status message"),
            },
        }
    }

    /// 投递回复文本：首段替换状态消息，其余按顺序作为新消息发送
    async fn deliver(&self, state: &mut TurnState, text: &str) {
        let conversation_id = state.conversation_id;
        for (i, chunk) in split_message(text, self.message_limit).iter().enumerate() {
            let result = match (i, state.status_message.take()) {
                (0, Some(message_id)) => self
                    .transport
                    .update_message(conversation_id, message_id, chunk)
                    .await
                    .map(|_| ()),
                _ => self.transport.send_message(conversation_id, chunk).await.map(|_| ()),
            };
            if let Err(e) = result {
                tracing::warn!(conversation_id, error = %e, "failed to deliver reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::TransportError;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send_message(&self, _id: ConversationId, text: &str) -> Result<MessageId, TransportError> {
            let mut calls = self.calls.lock().expect("lock");
            calls.push(format!("send:{text}"));
            Ok(calls.len() as MessageId + 100)
        }

        async fn update_message(&self, _id: ConversationId, message_id: MessageId, text: &str) -> Result<(), TransportError> {
            self.calls.lock().expect("lock").push(format!("update:{message_id}:{text}"));
            Ok(())
        }

        async fn send_file_with_progress(&self, _id: ConversationId, path: &Path) -> Result<(), TransportError> {
            self.calls.lock().expect("lock").push(format!("file:{}", path.display()));
            Ok(())
        }
    }

    fn orchestrator(llm: &ScriptedLlmClient, transport: Arc<Recorder>) -> Orchestrator {
        let executor = ToolExecutor::new(ToolRegistry::new(), Duration::from_secs(5));
        Orchestrator::new(
            Arc::new(HistoryStore::default()),
            Arc::new(executor),
            Arc::new(llm.clone()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_reply_replaces_status_message() {
        let llm = ScriptedLlmClient::new();
        llm.push_response(GenerateResponse::text("  Hello!  "));
        let transport = Arc::new(Recorder::default());
        let orch = orchestrator(&llm, transport.clone());

        orch.run(7, Some(1), "hi").await.expect("run");

        assert_eq!(*transport.calls.lock().expect("lock"), vec!["update:1:Hello!"]);
        let history = orch.history().snapshot(7).expect("history");
        assert_eq!(history, vec![Turn::user_text("hi"), Turn::model_text("Hello!")]);
        // 首个会话的上下文不包含刚发出的用户消息
        assert_eq!(llm.histories(), vec![Vec::<Turn>::new()]);
    }

    #[tokio::test]
    async fn test_long_reply_is_split() {
        let llm = ScriptedLlmClient::new();
        llm.push_response(GenerateResponse::text("aaaa bbbb cccc"));
        let transport = Arc::new(Recorder::default());
        let orch = orchestrator(&llm, transport.clone()).with_message_limit(9);

        orch.run(7, Some(1), "hi").await.expect("run");

        assert_eq!(
            *transport.calls.lock().expect("lock"),
            vec!["update:1:aaaa bbbb", "send:cccc"]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_terminal() {
        let llm = ScriptedLlmClient::new();
        llm.push_error(crate::llm::LlmError::Http("connection reset".into()));
        let transport = Arc::new(Recorder::default());
        let orch = orchestrator(&llm, transport.clone());

        let err = orch.run(7, Some(1), "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
        assert!(transport.calls.lock().expect("lock").is_empty());
        assert_eq!(orch.history().len(7), 1);
    }
}
