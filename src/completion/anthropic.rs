//! Anthropic Messages API completion client.
//!
//! Handles conversion between Sotto's message model and the API's content
//! blocks: assistant capability calls become `tool_use` blocks, capability
//! results become `tool_result` blocks inside user messages.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::{Result, SottoError};
use crate::session::{Message, Role};

use super::{CapabilitySchema, CompletionClient, CompletionReply, Invocation, Usage};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic-backed completion client.
pub struct AnthropicClient {
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

impl AnthropicClient {
    /// Build from config. Errors if no API key is configured.
    pub fn from_config(
        completion: &CompletionConfig,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self> {
        let api_key = completion
            .api_key
            .clone()
            .ok_or_else(|| SottoError::Config("no completion API key configured".into()))?;
        let api_url = completion
            .api_base
            .clone()
            .map(|base| format!("{}/v1/messages", base.trim_end_matches('/')))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(completion.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            api_key,
            api_url,
            model: model.to_string(),
            max_tokens,
            temperature,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn send(
        &self,
        transcript: Vec<Message>,
        capabilities: Vec<CapabilitySchema>,
    ) -> Result<CompletionReply> {
        let (system, api_messages) = convert_messages(transcript);

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: api_messages,
            system,
            tools: if capabilities.is_empty() {
                None
            } else {
                Some(convert_capabilities(capabilities))
            },
            temperature: Some(self.temperature),
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| SottoError::Completion(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
                Ok(err) => format!("{} - {}", err.error.r#type, err.error.message),
                Err(_) => error_text,
            };
            return Err(SottoError::Completion(format!("HTTP {}: {}", status, detail)));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| SottoError::Completion(format!("malformed response: {}", e)))?;
        Ok(convert_response(api_response))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    r#type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert session messages to API format, extracting the system prompt.
///
/// Consecutive capability results are grouped into one user message, as the
/// API requires.
fn convert_messages(messages: Vec<Message>) -> (Option<String>, Vec<ApiMessage>) {
    let mut system: Option<String> = None;
    let mut api_messages: Vec<ApiMessage> = Vec::new();
    let mut pending_results: Vec<ApiContentBlock> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                system = Some(msg.content);
            }
            Role::User => {
                flush_results(&mut api_messages, &mut pending_results);
                api_messages.push(ApiMessage {
                    role: "user".to_string(),
                    content: ApiContent::Text(msg.content),
                });
            }
            Role::Assistant => {
                flush_results(&mut api_messages, &mut pending_results);
                if let Some(calls) = msg.capability_calls {
                    let mut blocks: Vec<ApiContentBlock> = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(ApiContentBlock::Text { text: msg.content });
                    }
                    for call in calls {
                        blocks.push(ApiContentBlock::ToolUse {
                            id: call.id,
                            name: call.name,
                            input: call.arguments,
                        });
                    }
                    api_messages.push(ApiMessage {
                        role: "assistant".to_string(),
                        content: ApiContent::Blocks(blocks),
                    });
                } else {
                    api_messages.push(ApiMessage {
                        role: "assistant".to_string(),
                        content: ApiContent::Text(msg.content),
                    });
                }
            }
            Role::Capability => {
                if let Some(call_id) = msg.capability_call_id {
                    pending_results.push(ApiContentBlock::ToolResult {
                        tool_use_id: call_id,
                        content: msg.content,
                    });
                }
            }
        }
    }

    flush_results(&mut api_messages, &mut pending_results);
    (system, api_messages)
}

fn flush_results(api_messages: &mut Vec<ApiMessage>, pending: &mut Vec<ApiContentBlock>) {
    if !pending.is_empty() {
        api_messages.push(ApiMessage {
            role: "user".to_string(),
            content: ApiContent::Blocks(std::mem::take(pending)),
        });
    }
}

fn convert_capabilities(capabilities: Vec<CapabilitySchema>) -> Vec<ApiTool> {
    capabilities
        .into_iter()
        .map(|c| ApiTool {
            name: c.name,
            description: c.description,
            input_schema: c.input_schema,
        })
        .collect()
}

fn convert_response(response: ApiResponse) -> CompletionReply {
    let mut text = String::new();
    let mut invocations: Vec<Invocation> = Vec::new();

    for block in response.content {
        match block {
            ApiContentBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            ApiContentBlock::ToolUse { id, name, input } => {
                invocations.push(Invocation::new(&id, &name, input));
            }
            ApiContentBlock::ToolResult { .. } => {
                // Results don't appear in service replies; ignore if they do.
            }
        }
    }

    CompletionReply {
        text,
        invocations,
        usage: Some(Usage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CapabilityCall, Channel};

    #[test]
    fn test_from_config_requires_api_key() {
        let completion = CompletionConfig::default();
        assert!(AnthropicClient::from_config(&completion, "model", 1024, 0.7).is_err());

        let completion = CompletionConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let client = AnthropicClient::from_config(&completion, "model", 1024, 0.7).unwrap();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_from_config_base_override() {
        let completion = CompletionConfig {
            api_key: Some("sk-test".to_string()),
            api_base: Some("http://localhost:8080/".to_string()),
            ..Default::default()
        };
        let client = AnthropicClient::from_config(&completion, "model", 1024, 0.7).unwrap();
        assert_eq!(client.api_url, "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_convert_messages_simple() {
        let messages = vec![
            Message::system("Be helpful."),
            Message::user("Hello", Channel::Text),
            Message::assistant("Hi there!", Channel::Text),
        ];

        let (system, api_messages) = convert_messages(messages);
        assert_eq!(system.as_deref(), Some("Be helpful."));
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "user");
        assert_eq!(api_messages[1].role, "assistant");
    }

    #[test]
    fn test_convert_messages_with_capability_round() {
        let call = CapabilityCall::new("call_1", "echo", serde_json::json!({"message": "hi"}));
        let messages = vec![
            Message::user("Echo hi", Channel::Text),
            Message::assistant_with_calls("Echoing.", vec![call], Channel::Text),
            Message::capability_result("call_1", "hi", Channel::Text),
            Message::assistant("Done: hi", Channel::Text),
        ];

        let (_, api_messages) = convert_messages(messages);
        assert_eq!(api_messages.len(), 4);

        match &api_messages[1].content {
            ApiContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(blocks[0], ApiContentBlock::Text { .. }));
                assert!(matches!(blocks[1], ApiContentBlock::ToolUse { .. }));
            }
            _ => panic!("expected blocks for the calling message"),
        }

        match &api_messages[2].content {
            ApiContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(blocks[0], ApiContentBlock::ToolResult { .. }));
            }
            _ => panic!("expected blocks for the result message"),
        }
    }

    #[test]
    fn test_convert_messages_groups_consecutive_results() {
        let messages = vec![
            Message::capability_result("call_1", "A", Channel::Text),
            Message::capability_result("call_2", "B", Channel::Text),
        ];
        let (_, api_messages) = convert_messages(messages);
        assert_eq!(api_messages.len(), 1);
        match &api_messages[0].content {
            ApiContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("expected grouped result blocks"),
        }
    }

    #[test]
    fn test_convert_response_text_and_invocation() {
        let response = ApiResponse {
            content: vec![
                ApiContentBlock::Text {
                    text: "Calling echo.".to_string(),
                },
                ApiContentBlock::ToolUse {
                    id: "toolu_01".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({"message": "hi"}),
                },
            ],
            usage: ApiUsage {
                input_tokens: 12,
                output_tokens: 7,
            },
        };

        let reply = convert_response(response);
        assert_eq!(reply.text, "Calling echo.");
        assert!(reply.has_invocations());
        assert_eq!(reply.invocations[0].id, "toolu_01");
        assert_eq!(reply.usage.unwrap().output_tokens, 7);
    }

    #[test]
    fn test_request_serialization_skips_optionals() {
        let request = ApiRequest {
            model: "m".to_string(),
            max_tokens: 64,
            messages: vec![],
            system: None,
            tools: None,
            temperature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("system"));
        assert!(!json.contains("tools"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_content_block_tags() {
        let block = ApiContentBlock::ToolResult {
            tool_use_id: "call_1".to_string(),
            content: "ok".to_string(),
        };
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""tool_use_id":"call_1""#));
    }
}
