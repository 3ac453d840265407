use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, TextStream, Usage};
use super::configs::AnthropicProviderConfig;
use super::utils::{handle_response, sse_text_stream, SseStep};
use crate::errors::AgentError;
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: i32 = 2000;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = &data["usage"];
        let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
        let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    /// System messages are folded into the top level `system` field, and tool
    /// responses travel as `tool_result` blocks inside a user turn.
    ///
    /// The API rejects `tool_use`/`tool_result` blocks in a request that
    /// declares no tools, so without tools the round is rendered as text.
    fn messages_to_anthropic_spec(messages: &[Message], with_tools: bool) -> Vec<Value> {
        let mut anthropic_messages = Vec::new();

        for message in messages {
            let role = match message.role {
                Role::System => continue,
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };

            let mut blocks = Vec::new();
            for content in &message.content {
                match content {
                    MessageContent::Text(text) => {
                        if !text.text.is_empty() {
                            blocks.push(json!({"type": "text", "text": text.text}));
                        }
                    }
                    MessageContent::ToolRequest(request) => match &request.tool_call {
                        Ok(tool_call) if !with_tools => blocks.push(json!({
                            "type": "text",
                            "text": format!("Called tool {} with {}", tool_call.name, tool_call.arguments),
                        })),
                        Ok(tool_call) => blocks.push(json!({
                            "type": "tool_use",
                            "id": request.id,
                            "name": tool_call.name,
                            "input": tool_call.arguments,
                        })),
                        Err(e) => blocks.push(json!({
                            "type": "text",
                            "text": format!("Error: {}", e),
                        })),
                    },
                    MessageContent::ToolResponse(_) if !with_tools => blocks.push(json!({
                        "type": "text",
                        "text": format!("Tool result: {}", content.as_tool_response_text().unwrap_or_default()),
                    })),
                    MessageContent::ToolResponse(response) => blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": response.id,
                        "content": content.as_tool_response_text().unwrap_or_default(),
                        "is_error": response.tool_result.is_err(),
                    })),
                }
            }

            if !blocks.is_empty() {
                anthropic_messages.push(json!({
                    "role": role,
                    "content": blocks
                }));
            }
        }

        anthropic_messages
    }

    fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                })
            })
            .collect()
    }

    fn anthropic_response_to_message(response: &Value) -> Result<Message> {
        let blocks = response
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut message = Message::assistant();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    message = message.with_text(block["text"].as_str().unwrap_or_default());
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default();
                    let name = block["name"].as_str().unwrap_or_default();
                    let tool_call = match block.get("input") {
                        Some(input) if input.is_object() => {
                            Ok(ToolCall::new(name, input.clone()))
                        }
                        _ => Err(AgentError::InvalidParameters(format!(
                            "Tool use {} did not carry an input object",
                            id
                        ))),
                    };
                    message = message.with_tool_request(id, tool_call);
                }
                _ => {}
            }
        }

        Ok(message)
    }

    fn build_payload(&self, system: &str, messages: &[Message], tools: &[Tool]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "system": system,
            "messages": Self::messages_to_anthropic_spec(messages, !tools.is_empty()),
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
        });

        if !tools.is_empty() {
            payload["tools"] = json!(Self::tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        payload
    }

    async fn post(&self, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
            .send()
            .await?;

        handle_response(response).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools);
        let response: Value = self.post(&payload).await?.json().await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Anthropic API error: {}", error));
        }

        let message = Self::anthropic_response_to_message(&response)?;
        Ok((message, Self::get_usage(&response)))
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        let mut payload = self.build_payload(system, messages, &[]);
        payload["stream"] = json!(true);

        let response = self.post(&payload).await?;
        Ok(sse_text_stream(response, |event, data| match event {
            "message_stop" => Ok(SseStep::Done),
            "error" => Err(anyhow!("Anthropic stream error: {}", data)),
            "content_block_delta" => {
                let chunk: Value = serde_json::from_str(data)?;
                match chunk["delta"]["text"].as_str() {
                    Some(text) if !text.is_empty() => Ok(SseStep::Text(text.to_string())),
                    _ => Ok(SseStep::Skip),
                }
            }
            _ => Ok(SseStep::Skip),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AnthropicProviderConfig {
        AnthropicProviderConfig {
            host: server.uri(),
            api_key: "test_api_key".to_string(),
            model: "claude-3-5-sonnet-20240620".to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    async fn setup_mock_server(response_body: Value) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(config_for(&mock_server)).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{
                "type": "text",
                "text": "Hello! How can I assist you today?"
            }],
            "model": "claude-3-5-sonnet-20240620",
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 12,
                "output_tokens": 15
            }
        });

        let (_, provider) = setup_mock_server(response_body).await;
        let messages = vec![Message::user().with_text("Hello?")];

        let (message, usage) = provider
            .complete("You are a helpful assistant.", &messages, &[])
            .await?;

        assert_eq!(message.text(), "Hello! How can I assist you today?");
        assert_eq!(usage.input_tokens, Some(12));
        assert_eq!(usage.output_tokens, Some(15));
        assert_eq!(usage.total_tokens, Some(27));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use() -> Result<()> {
        let response_body = json!({
            "id": "msg_tool",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {
                    "type": "tool_use",
                    "id": "toolu_01",
                    "name": "get_ticket_price",
                    "input": {"destination_city": "Tokyo"}
                }
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 30, "output_tokens": 10}
        });

        let (_, provider) = setup_mock_server(response_body).await;
        let tool = Tool::new("get_ticket_price", "price lookup", json!({"type": "object"}));
        let (message, _) = provider
            .complete(
                "system",
                &[Message::user().with_text("Tokyo price?")],
                &[tool],
            )
            .await?;

        assert_eq!(message.text(), "Let me check.");
        let request = message.first_tool_request().unwrap();
        assert_eq!(request.id, "toolu_01");
        assert_eq!(
            request.tool_call.as_ref().unwrap().arguments,
            json!({"destination_city": "Tokyo"})
        );
        Ok(())
    }

    #[test]
    fn test_messages_to_anthropic_spec_tool_round() {
        let messages = vec![
            Message::system().with_text("ignored here"),
            Message::user().with_text("Book Berlin"),
            Message::assistant().with_tool_request(
                "toolu_1",
                Ok(ToolCall::new("book_ticket", json!({"destination_city": "Berlin"}))),
            ),
            Message::tool().with_tool_response("toolu_1", Ok("Return ticket booked to Berlin".into())),
        ];

        let spec = AnthropicProvider::messages_to_anthropic_spec(&messages, true);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[1]["content"][0]["type"], "tool_use");
        assert_eq!(spec[1]["content"][0]["input"]["destination_city"], "Berlin");
        assert_eq!(spec[2]["role"], "user");
        assert_eq!(spec[2]["content"][0]["type"], "tool_result");
        assert_eq!(spec[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(spec[2]["content"][0]["is_error"], false);
    }

    #[tokio::test]
    async fn test_follow_up_without_tools_sends_tool_round_as_text() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "messages": [
                    {"role": "user", "content": [{"type": "text", "text": "Price to Paris?"}]},
                    {"role": "assistant", "content": [{
                        "type": "text",
                        "text": "Called tool get_ticket_price with {\"destination_city\":\"Paris\"}"
                    }]},
                    {"role": "user", "content": [{"type": "text", "text": "Tool result: $899"}]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Paris is $899."}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(config_for(&mock_server))?;
        let history = vec![
            Message::user().with_text("Price to Paris?"),
            Message::assistant().with_tool_request(
                "toolu_1",
                Ok(ToolCall::new("get_ticket_price", json!({"destination_city": "Paris"}))),
            ),
            Message::tool().with_tool_response("toolu_1", Ok("$899".into())),
        ];

        let payload = provider.build_payload("sys", &history, &[]);
        assert!(payload.get("tools").is_none());
        assert!(!payload.to_string().contains("tool_use"));

        let (message, _) = provider.complete("sys", &history, &[]).await?;
        assert_eq!(message.text(), "Paris is $899.");
        Ok(())
    }

    #[tokio::test]
    async fn test_payload_uses_top_level_system_and_default_max_tokens() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({
                "system": "Respond only with python code",
                "max_tokens": DEFAULT_MAX_TOKENS
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(config_for(&mock_server))?;
        let (message, _) = provider
            .complete(
                "Respond only with python code",
                &[Message::user().with_text("hi")],
                &[],
            )
            .await?;
        assert_eq!(message.text(), "ok");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_collects_text_deltas() -> Result<()> {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"def test_\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lcg():\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(config_for(&mock_server))?;
        let fragments: Vec<String> = provider
            .stream("system", &[Message::user().with_text("tests please")])
            .await?
            .try_collect()
            .await?;

        assert_eq!(fragments.concat(), "def test_lcg():");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let mock_server = MockServer::start().await;
        let body = concat!(
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let provider = AnthropicProvider::new(config_for(&mock_server)).unwrap();
        let result: Result<Vec<String>> = provider
            .stream("system", &[Message::user().with_text("hi")])
            .await
            .unwrap()
            .try_collect()
            .await;
        assert!(result.unwrap_err().to_string().contains("overloaded_error"));
    }
}
