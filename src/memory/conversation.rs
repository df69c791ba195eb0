//! 短期记忆：对话轮次（Turn）与有界历史
//!
//! Turn 由有序的 Part 组成（文本 / 工具调用 / 工具结果）；ConversationMemory 只保留最近 N 个 Turn，
//! 超出时按 FIFO 丢弃最旧的一条，不感知模型语义（不会成对剪掉工具调用与结果）。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 会话 ID（聊天平台的 chat id）
pub type ConversationId = i64;

/// 轮次角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// 工具结果载荷：成功时为结构化 JSON 对象，失败时为错误信息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPayload {
    Ok(Map<String, Value>),
    Error(String),
}

impl ToolPayload {
    /// 以 `{"result": content}` 包装工具的文本输出
    pub fn result(content: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("result".to_string(), Value::String(content.into()));
        Self::Ok(map)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// 发回后端时使用的 JSON 对象
    pub fn to_response_object(&self) -> Map<String, Value> {
        match self {
            Self::Ok(map) => map.clone(),
            Self::Error(msg) => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(msg.clone()));
                map
            }
        }
    }
}

/// 轮次中的单个片段（封闭枚举，穷尽匹配）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolCall {
        name: String,
        args: Map<String, Value>,
    },
    ToolResult {
        name: String,
        payload: ToolPayload,
    },
    /// 后端返回但本系统不处理的片段（inline data、executable code 等），原样保留
    Unknown {
        raw: Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::ToolCall {
            name: name.into(),
            args,
        }
    }

    pub fn tool_result(name: impl Into<String>, payload: ToolPayload) -> Self {
        Self::ToolResult {
            name: name.into(),
            payload,
        }
    }

    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::tool_result(name, ToolPayload::Error(message.into()))
    }
}

/// 一个对话轮次
///
/// 构造函数保证不变量：Tool 轮次只含 ToolResult；Model 轮次可以混合 Text 与 ToolCall。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    pub fn tool_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::tool_call(name, args)],
        }
    }

    pub fn tool_result(name: impl Into<String>, payload: ToolPayload) -> Self {
        Self {
            role: Role::Tool,
            parts: vec![Part::tool_result(name, payload)],
        }
    }
}

/// 有界对话历史：最多保留 max_turns 个 Turn
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns.max(1) + 1),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        self.prune();
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// 超出容量时丢弃最旧的轮次
    fn prune(&mut self) {
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
