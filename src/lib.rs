//! Synapse - 对话式智能体网关
//!
//! 模块划分：
//! - **agent**: 入站消息处理（命令、闸门、监管）与组件装配
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、按会话的处理闸门、沙箱文件清理
//! - **extractor**: 有界并发的网页抓取、正文提取与搜索
//! - **integrations**: 聊天传输抽象、控制台实现、长消息切分
//! - **llm**: 生成式后端抽象与实现（Gemini / 脚本化 Mock）
//! - **memory**: 对话轮次与按会话的有界历史
//! - **react**: 工具调用主循环
//! - **tools**: 文件与 Web 工具、注册表与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod extractor;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents, HandleOutcome, MessageHandler};
