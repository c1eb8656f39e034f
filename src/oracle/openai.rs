//! `OpenAI` chat-completions oracle

use super::types::{OracleReply, OracleResponse, ToolDescriptor, Usage};
use super::{Oracle, OracleError};
use crate::state_machine::{Message, Role, ToolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client, deterministic sampling
pub struct OpenAIOracle {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAIOracle {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, OracleError> {
        let endpoint = format!(
            "{}/chat/completions",
            base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| OracleError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint,
        })
    }

    fn translate_request(&self, transcript: &[Message], tools: &[ToolDescriptor]) -> OpenAIRequest {
        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages: translate_messages(transcript),
            tools,
            temperature: 0.0,
            stream: false,
        }
    }

    fn normalize_response(resp: OpenAIResponse) -> Result<OracleResponse, OracleError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::unknown("No choices in response"))?;

        let calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter(|tc| !tc.function.name.is_empty())
            .map(|tc| {
                // Schema validation downstream reports the missing fields
                let arguments = serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                    tracing::warn!(
                        error = %e,
                        tool = %tc.function.name,
                        arguments = %tc.function.arguments,
                        "Failed to parse tool call arguments"
                    );
                    serde_json::json!({})
                });
                ToolCall::new(tc.id, tc.function.name, arguments)
            })
            .collect();

        let reply = if calls.is_empty() {
            OracleReply::final_answer(choice.message.content.unwrap_or_default())
        } else {
            OracleReply::tool_calls(calls)
        };

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(OracleResponse { reply, usage })
    }
}

/// Translate the transcript to chat-completions messages.
///
/// Consecutive assistant tool-call entries collapse into one assistant
/// message carrying all calls, since the API expects every tool result to
/// follow the message that requested it.
fn translate_messages(transcript: &[Message]) -> Vec<OpenAIMessage> {
    let mut messages: Vec<OpenAIMessage> = Vec::with_capacity(transcript.len());

    for msg in transcript {
        match (msg.role, &msg.tool_call) {
            (Role::Assistant, Some(call)) => {
                let translated = OpenAIToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAIFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::to_string(&call.arguments)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                };
                if let Some(OpenAIMessage {
                    role,
                    tool_calls: Some(calls),
                    ..
                }) = messages.last_mut()
                {
                    if role.as_str() == "assistant" {
                        calls.push(translated);
                        continue;
                    }
                }
                messages.push(OpenAIMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: Some(vec![translated]),
                    tool_call_id: None,
                });
            }
            (Role::Tool, _) => messages.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: msg.tool_call_id.clone(),
            }),
            (role, _) => messages.push(OpenAIMessage {
                role: role.as_str().to_string(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            }),
        }
    }

    messages
}

#[async_trait]
impl Oracle for OpenAIOracle {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError> {
        let request = self.translate_request(transcript, tools);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    OracleError::network(format!("Connection failed: {e}"))
                } else {
                    OracleError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| OracleError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |r| r.error.message);
            let error = match status.as_u16() {
                401 | 403 => OracleError::auth(format!("Authentication failed: {message}")),
                429 => OracleError::rate_limit(format!("Rate limit exceeded: {message}")),
                400 => OracleError::invalid_request(format!("Invalid request: {message}")),
                500..=599 => OracleError::server_error(format!("Server error: {message}")),
                _ => OracleError::unknown(format!("HTTP {status}: {message}")),
            };
            return Err(match retry_after {
                Some(after) => error.with_retry_after(after),
                None => error,
            });
        }

        let parsed: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            OracleError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    r#type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_consecutive_tool_calls_are_merged() {
        let transcript = vec![
            Message::user("price of AAPL and MSFT"),
            Message::assistant_tool_call(ToolCall::new("a", "quote", json!({"symbol": "AAPL"}))),
            Message::assistant_tool_call(ToolCall::new("b", "quote", json!({"symbol": "MSFT"}))),
            Message::tool_result("a", "100.4"),
            Message::tool_result("b", "200.3"),
            Message::assistant("AAPL is 100.4, MSFT is 200.3"),
        ];

        let messages = translate_messages(&transcript);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "tool", "assistant"]);
        assert_eq!(messages[1].tool_calls.as_ref().map(Vec::len), Some(2));
        assert!(messages[1].content.is_none());
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_request_is_deterministic_and_lists_tools() {
        let oracle = OpenAIOracle::new("key", DEFAULT_MODEL, Some("http://localhost:1/v1/")).unwrap();
        assert_eq!(oracle.endpoint, "http://localhost:1/v1/chat/completions");

        let tools = vec![ToolDescriptor {
            name: "quote".to_string(),
            description: "Return the current price of a stock".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let request = oracle.translate_request(&[Message::user("hi")], &tools);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["tools"][0]["function"]["name"], "quote");
    }

    #[test]
    fn test_normalize_tool_call_response() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "quote", "arguments": "{\"symbol\":\"AAPL\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let parsed: OpenAIResponse = serde_json::from_value(body).unwrap();
        let response = OpenAIOracle::normalize_response(parsed).unwrap();

        assert_eq!(
            response.reply,
            OracleReply::tool_calls(vec![ToolCall::new("call_1", "quote", json!({"symbol": "AAPL"}))])
        );
        assert_eq!(response.usage.input_tokens, 12);
    }

    #[test]
    fn test_normalize_text_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "AAPL is 100.4"}}]
        });
        let parsed: OpenAIResponse = serde_json::from_value(body).unwrap();
        let response = OpenAIOracle::normalize_response(parsed).unwrap();
        assert_eq!(response.reply, OracleReply::final_answer("AAPL is 100.4"));
    }

    #[test]
    fn test_malformed_arguments_become_empty_object() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "quote", "arguments": "{\"symbol\": \"AA"}
                    }]
                }
            }]
        });
        let parsed: OpenAIResponse = serde_json::from_value(body).unwrap();
        let response = OpenAIOracle::normalize_response(parsed).unwrap();
        assert_eq!(
            response.reply,
            OracleReply::tool_calls(vec![ToolCall::new("call_1", "quote", json!({}))])
        );
    }
}
