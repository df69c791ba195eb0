//! Headless Agent 运行时
//!
//! create_agent_components 从配置构建历史、闸门、工具、Gemini 客户端与编排器；
//! MessageHandler::handle_message 是每条入站消息的入口：斜杠命令直接回复，其余消息先过闸门，
//! 再在 catch_unwind 监管下跑编排循环，任何错误或 panic 都转成通用提示，闸门在所有路径上释放。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, FileJanitor, ProcessingGate};
use crate::extractor::{ContentExtractor, HttpPageFetcher, PageFetcher, SearchEngine};
use crate::integrations::{MessageId, Transport};
use crate::llm::{GeminiClient, LlmClient, LlmError};
use crate::memory::{ConversationId, HistoryStore};
use crate::react::Orchestrator;
use crate::tools::{
    CreateFileTool, ExtractWebsitesTool, ReadFileTool, SafeFs, ToolExecutor, ToolRegistry, WebSearchTool,
};

pub const BUSY_MESSAGE: &str = "Please wait, processing previous request...";
pub const PROCESSING_MESSAGE: &str = "⏳ Processing your request...";
pub const BACKEND_FAILURE_MESSAGE: &str = "something went wrong!, please try again after sometime.";
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred, please try again";
pub const INVALID_COMMAND_MESSAGE: &str =
    "Not a valid command. Type **/help** to see the list of available commands.";

const WELCOME_MESSAGE: &str = "Welcome to Synapse AI chat bot";

const HELP_GUIDE: &str = "**🤖 Synapse Help Guide**

Hi there! I'm **Synapse**, your versatile assistant. Here's what I can do for you:

✨ **Features and Capabilities**

 **Create File**: Create new text files and receive them in the chat.
 **Read File**: Read a file created earlier in the conversation.
 **Web Search**: Retrieve relevant information from the web.
 **Content Extraction**: Extract data from websites.

Type **/help** at anytime to revisit this guide!";

const PRIVACY_POLICY: &str = "**🤖 Synapse Privacy Policy**

* Synapse uses your chat ID and text to respond.

* Recent messages are kept in memory for context,
but no data is permanently saved.";

/// 提示词文件缺失时使用的系统提示词
const DEFAULT_SYSTEM_PROMPT: &str = "You are Synapse, a helpful chat assistant. Be concise and answer directly. \
Use tools only when a task requires them, and briefly explain why when you do.";

/// 单条入站消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// 斜杠命令，已直接回复
    Command,
    /// 会话正在处理上一条消息
    Busy,
    Completed,
    /// 编排循环出错或 panic，已回复通用提示
    Failed,
}

/// 入站消息处理器
pub struct MessageHandler {
    gate: Arc<ProcessingGate>,
    orchestrator: Arc<Orchestrator>,
    transport: Arc<dyn Transport>,
}

impl MessageHandler {
    pub fn new(gate: Arc<ProcessingGate>, orchestrator: Arc<Orchestrator>, transport: Arc<dyn Transport>) -> Self {
        Self {
            gate,
            orchestrator,
            transport,
        }
    }

    pub async fn handle_message(
        &self,
        conversation_id: ConversationId,
        status_message: Option<MessageId>,
        text: &str,
    ) -> HandleOutcome {
        let text = text.trim();
        let mut status_message = status_message;

        if text.starts_with('/') {
            let reply = command_reply(text);
            if let Err(e) = self.transport.send_message(conversation_id, reply).await {
                tracing::warn!(conversation_id, error = %e, "failed to reply to command");
            }
            return HandleOutcome::Command;
        }

        let Some(guard) = self.gate.try_acquire(conversation_id) else {
            self.set_status(conversation_id, &mut status_message, BUSY_MESSAGE).await;
            return HandleOutcome::Busy;
        };

        self.set_status(conversation_id, &mut status_message, PROCESSING_MESSAGE).await;

        let run = self.orchestrator.run(conversation_id, status_message, text);
        let outcome = match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(())) => HandleOutcome::Completed,
            Ok(Err(e)) => {
                tracing::error!(conversation_id, error = %e, "request failed");
                let reply = match e {
                    AgentError::Backend(_) => BACKEND_FAILURE_MESSAGE,
                    _ => GENERIC_FAILURE_MESSAGE,
                };
                self.set_status(conversation_id, &mut status_message, reply).await;
                HandleOutcome::Failed
            }
            Err(panic) => {
                tracing::error!(conversation_id, panic = %panic_message(panic.as_ref()), "request panicked");
                self.set_status(conversation_id, &mut status_message, GENERIC_FAILURE_MESSAGE)
                    .await;
                HandleOutcome::Failed
            }
        };

        drop(guard);
        outcome
    }

    /// 更新状态消息；还没有状态消息时发一条新的
    async fn set_status(&self, conversation_id: ConversationId, status_message: &mut Option<MessageId>, text: &str) {
        let result = match *status_message {
            Some(message_id) => self.transport.update_message(conversation_id, message_id, text).await,
            None => self
                .transport
                .send_message(conversation_id, text)
                .await
                .map(|message_id| *status_message = Some(message_id)),
        };
        if let Err(e) = result {
            tracing::warn!(conversation_id, error = %e, "failed to set status message");
        }
    }
}

fn command_reply(text: &str) -> &'static str {
    match text {
        "/start" => WELCOME_MESSAGE,
        "/help" => HELP_GUIDE,
        "/privacy" => PRIVACY_POLICY,
        _ => INVALID_COMMAND_MESSAGE,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 预构建的 Agent 组件，多会话共享
pub struct AgentComponents {
    pub history: Arc<HistoryStore>,
    pub gate: Arc<ProcessingGate>,
    pub orchestrator: Arc<Orchestrator>,
    pub handler: Arc<MessageHandler>,
    pub file_janitor: FileJanitor,
    gate_janitor_period: Duration,
}

impl AgentComponents {
    /// 以给定后端与工具注册表组装组件（测试可注入脚本化后端）
    pub fn new(
        cfg: &AppConfig,
        transport: Arc<dyn Transport>,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
    ) -> Self {
        let history = Arc::new(HistoryStore::new(cfg.app.history_capacity));
        let gate = Arc::new(ProcessingGate::new(cfg.gate.timeout()));
        let executor = Arc::new(ToolExecutor::new(
            registry,
            Duration::from_secs(cfg.tools.tool_timeout_secs),
        ));
        let orchestrator = Arc::new(
            Orchestrator::new(history.clone(), executor, llm, transport.clone())
                .with_max_tool_depth(cfg.tools.max_tool_depth)
                .with_message_limit(cfg.tools.message_limit),
        );
        let handler = Arc::new(MessageHandler::new(gate.clone(), orchestrator.clone(), transport));
        let file_janitor = FileJanitor::new(&cfg.app.sandbox_dir, cfg.janitor.max_age(), cfg.janitor.interval());

        Self {
            history,
            gate,
            orchestrator,
            handler,
            file_janitor,
            gate_janitor_period: cfg.gate.janitor_period(),
        }
    }

    /// 启动后台清理任务（闸门状态、沙箱文件），token 取消后退出
    pub fn spawn_background(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            self.gate.clone().spawn_janitor(self.gate_janitor_period, token.clone()),
            self.file_janitor.clone().spawn(token),
        ]
    }
}

/// 按配置注册 create_file / read_file / web_search / extract_websites
pub fn build_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let fs = SafeFs::new(&cfg.app.sandbox_dir);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(
        Duration::from_secs(cfg.extractor.request_timeout_secs),
        cfg.extractor.max_body_bytes,
    ));
    let engine = Arc::new(SearchEngine::new(fetcher.clone(), cfg.extractor.search_base_url.clone()));
    let extractor = Arc::new(ContentExtractor::new(
        fetcher,
        cfg.extractor.max_concurrency,
        Duration::from_secs(cfg.extractor.batch_deadline_secs),
    ));

    let mut tools = ToolRegistry::new();
    tools.register(CreateFileTool::new(fs.clone()));
    tools.register(ReadFileTool::new(fs));
    tools.register(WebSearchTool::new(engine, extractor.clone(), cfg.extractor.top_k));
    tools.register(ExtractWebsitesTool::new(extractor));
    tools
}

/// 读取系统提示词：配置路径优先，其次 config/prompts/system.md、../config/prompts/system.md
pub fn load_system_prompt(path: &Path) -> String {
    [
        path,
        Path::new("config/prompts/system.md"),
        Path::new("../config/prompts/system.md"),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 从配置创建 Agent 组件：Gemini 后端 + 全部工具
pub fn create_agent_components(cfg: &AppConfig, transport: Arc<dyn Transport>) -> Result<AgentComponents, AgentError> {
    let api_key = std::env::var(&cfg.llm.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| LlmError::MissingApiKey(cfg.llm.api_key_env.clone()))?;

    let registry = build_tool_registry(cfg);
    tracing::info!(tools = ?registry.tool_names(), model = %cfg.llm.model, "agent components ready");

    let llm = GeminiClient::new(
        &cfg.llm.base_url,
        &cfg.llm.model,
        api_key,
        load_system_prompt(&cfg.llm.system_prompt_path),
        registry.function_declarations(),
        Duration::from_secs(cfg.llm.request_timeout_secs),
    );

    Ok(AgentComponents::new(cfg, transport, Arc::new(llm), registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_replies() {
        assert_eq!(command_reply("/start"), WELCOME_MESSAGE);
        assert!(command_reply("/help").contains("Help Guide"));
        assert!(command_reply("/privacy").contains("Privacy Policy"));
        assert_eq!(command_reply("/dance"), INVALID_COMMAND_MESSAGE);
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_registry_has_all_tools() {
        let registry = build_tool_registry(&AppConfig::default());
        assert_eq!(
            registry.tool_names(),
            vec!["create_file", "extract_websites", "read_file", "web_search"]
        );
    }

    #[test]
    fn test_missing_api_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.api_key_env = "SYNAPSE_TEST_KEY_THAT_IS_NOT_SET".to_string();
        let transport: Arc<dyn Transport> = Arc::new(crate::integrations::ConsoleTransport::new());
        let err = create_agent_components(&cfg, transport).err().expect("missing key");
        assert!(matches!(err, AgentError::Backend(LlmError::MissingApiKey(_))));
    }
}
