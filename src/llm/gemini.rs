//! Gemini REST 客户端
//!
//! 通过 `models/{model}:generateContent` 调用；每个 ChatSession 在本地累积 contents（历史 + 新消息 + 模型回复），
//! 每次 send 带上完整 contents、system instruction、工具声明与安全设置。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::llm::{Candidate, ChatSession, GenerateResponse, LlmClient, LlmError};
use crate::memory::{Part, Role, ToolPayload, Turn};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// 会话间共享的请求配置
struct GeminiShared {
    client: Client,
    endpoint: String,
    api_key: String,
    system_prompt: String,
    function_declarations: Vec<Value>,
}

/// Gemini 客户端：持有 HTTP Client、模型与工具声明
pub struct GeminiClient {
    shared: Arc<GeminiShared>,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        system_prompt: impl Into<String>,
        function_declarations: Vec<Value>,
        request_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );
        Self {
            shared: Arc::new(GeminiShared {
                client,
                endpoint,
                api_key: api_key.into(),
                system_prompt: system_prompt.into(),
                function_declarations,
            }),
            model: model.to_string(),
        }
    }
}

impl LlmClient for GeminiClient {
    fn start_chat(&self, history: Vec<Turn>) -> Box<dyn ChatSession> {
        let contents = history.iter().map(WireContent::from_turn).collect();
        Box::new(GeminiSession {
            shared: self.shared.clone(),
            contents,
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 单次对话会话：contents 随 send 增长
pub struct GeminiSession {
    shared: Arc<GeminiShared>,
    contents: Vec<WireContent>,
}

impl GeminiSession {
    fn request_body(&self) -> Value {
        let mut body = json!({
            "contents": self.contents,
            "safetySettings": safety_settings(),
        });
        if !self.shared.system_prompt.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": self.shared.system_prompt }] });
        }
        if !self.shared.function_declarations.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": self.shared.function_declarations }]);
        }
        body
    }

    async fn post(&self) -> Result<WireResponse, LlmError> {
        let resp = self
            .shared
            .client
            .post(&self.shared.endpoint)
            .query(&[("key", self.shared.api_key.as_str())])
            .json(&self.request_body())
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, parts: Vec<Part>) -> Result<GenerateResponse, LlmError> {
        let role = if parts.iter().all(|p| matches!(p, Part::ToolResult { .. })) {
            Role::Tool
        } else {
            Role::User
        };
        self.contents.push(WireContent::from_turn(&Turn { role, parts }));

        let wire = match self.post().await {
            Ok(wire) => wire,
            Err(e) => {
                // 失败的请求不留在会话里，避免污染后续请求
                self.contents.pop();
                return Err(e);
            }
        };

        // 与 SDK 的 ChatSession 一致：把首个候选的内容记入会话
        if let Some(content) = wire.candidates.first().and_then(|c| c.content.clone()) {
            self.contents.push(content);
        }

        Ok(wire.into_response())
    }
}

fn safety_settings() -> Value {
    let categories = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ];
    Value::Array(
        categories
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect(),
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl WireContent {
    fn from_turn(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::User | Role::Tool => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: turn.parts.iter().map(WirePart::from_part).collect(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    /// 其余字段（inlineData、executableCode 等）
    #[serde(flatten)]
    other: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    #[serde(default)]
    response: Map<String, Value>,
}

impl WirePart {
    fn from_part(part: &Part) -> Self {
        match part {
            Part::Text { text } => Self {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::ToolCall { name, args } => Self {
                function_call: Some(WireFunctionCall {
                    name: name.clone(),
                    args: args.clone(),
                }),
                ..Default::default()
            },
            Part::ToolResult { name, payload } => Self {
                function_response: Some(WireFunctionResponse {
                    name: name.clone(),
                    response: payload.to_response_object(),
                }),
                ..Default::default()
            },
            Part::Unknown { raw } => Self {
                other: raw.as_object().cloned().unwrap_or_default(),
                ..Default::default()
            },
        }
    }

    fn into_part(self) -> Part {
        if let Some(call) = self.function_call {
            return Part::tool_call(call.name, call.args);
        }
        if let Some(resp) = self.function_response {
            let payload = match resp.response.get("error").and_then(|v| v.as_str()) {
                Some(msg) if resp.response.len() == 1 => ToolPayload::Error(msg.to_string()),
                _ => ToolPayload::Ok(resp.response),
            };
            return Part::tool_result(resp.name, payload);
        }
        if let Some(text) = self.text {
            return Part::text(text);
        }
        Part::Unknown {
            raw: Value::Object(self.other),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl WireResponse {
    fn into_response(self) -> GenerateResponse {
        GenerateResponse {
            candidates: self
                .candidates
                .into_iter()
                .map(|c| Candidate {
                    content: c
                        .content
                        .map(|content| content.parts.into_iter().map(WirePart::into_part).collect()),
                    finish_reason: c.finish_reason,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mixed_candidate_parts() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Let me check." },
                        { "functionCall": { "name": "web_search", "args": { "query": "rust", "extract_websites": false } } },
                        { "inlineData": { "mimeType": "image/png", "data": "AA==" } }
                    ]
                },
                "finishReason": "STOP"
            }]
        });
        let wire: WireResponse = serde_json::from_value(raw).expect("decode");
        let resp = wire.into_response();
        let parts = resp.candidates[0].content.clone().expect("content");
        assert_eq!(parts[0], Part::text("Let me check."));
        assert!(matches!(&parts[1], Part::ToolCall { name, args } if name == "web_search" && args.contains_key("query")));
        assert!(matches!(&parts[2], Part::Unknown { raw } if raw.get("inlineData").is_some()));
        assert_eq!(resp.candidates[0].finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_candidate_without_content() {
        let wire: WireResponse =
            serde_json::from_value(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).expect("decode");
        let resp = wire.into_response();
        assert!(resp.candidates[0].content.is_none());
        assert!(!resp.has_non_empty_content());
    }

    #[test]
    fn test_tool_turn_encodes_as_function_response() {
        let turn = Turn::tool_result("read_file", ToolPayload::Error("Tool 'read_file' not found".into()));
        let value = serde_json::to_value(WireContent::from_turn(&turn)).expect("encode");
        assert_eq!(value["role"], "user");
        assert_eq!(value["parts"][0]["functionResponse"]["name"], "read_file");
        assert_eq!(
            value["parts"][0]["functionResponse"]["response"]["error"],
            "Tool 'read_file' not found"
        );
    }

    #[test]
    fn test_request_body_includes_tools_and_system() {
        let client = GeminiClient::new(
            DEFAULT_GEMINI_BASE_URL,
            DEFAULT_GEMINI_MODEL,
            "key",
            "be brief",
            vec![json!({ "name": "read_file", "description": "Read", "parameters": { "type": "object" } })],
            Duration::from_secs(5),
        );
        let session = GeminiSession {
            shared: client.shared.clone(),
            contents: vec![WireContent::from_turn(&Turn::user_text("hi"))],
        };
        let body = session.request_body();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "read_file");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["safetySettings"].as_array().map(|a| a.len()), Some(4));
    }
}
