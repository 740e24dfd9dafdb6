//! Default SDK backed by the Anthropic messages API

use async_trait::async_trait;
use relay_protocol::{InstallationStatus, ModelDefinition, StreamEvent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::deadline::CallDeadline;
use crate::error_classify::{classify_http_error, classify_response};
use crate::sse::{ensure_event_stream, SseEvent};
use crate::stream::{log_malformed_line, parse_tool_input, pump_sse, EventStream, SseHandler};
use crate::traits::{AgentSdk, ModelResult, SdkQueryOptions};
use crate::ProviderError;

pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: usize = 8192;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
const PROVIDER_NAME: &str = "messages-api";

/// Single-turn streaming client for the messages API
///
/// Endpoint and credential come from the call's environment map
/// ([`BASE_URL_VAR`], [`API_KEY_VAR`]), so proxy profiles can redirect it
/// without touching process state.
#[derive(Clone)]
pub struct MessagesApiSdk {
    client: Client,
}

impl MessagesApiSdk {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(env: &HashMap<String, String>) -> String {
        let base = env
            .get(BASE_URL_VAR)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_BASE_URL);
        format!("{}/v1/messages", base.trim_end_matches('/'))
    }

    fn build_request(options: &SdkQueryOptions) -> MessagesRequest {
        MessagesRequest {
            model: options.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: vec![MessagesMessage {
                role: "user",
                content: options.prompt.clone(),
            }],
            system: options.system_prompt.clone(),
            stream: true,
        }
    }
}

#[async_trait]
impl AgentSdk for MessagesApiSdk {
    async fn query(&self, options: SdkQueryOptions) -> ModelResult<EventStream> {
        let api_key = options
            .env
            .get(API_KEY_VAR)
            .filter(|k| !k.is_empty())
            .cloned()
            .ok_or_else(|| ProviderError::Configuration(format!("{API_KEY_VAR} is not set")))?;

        let url = Self::endpoint(&options.env);
        let body = Self::build_request(&options);
        let deadline = CallDeadline::new(
            options.timeout.unwrap_or(DEFAULT_TIMEOUT),
            Some(&options.abort),
        );

        debug!(model = %options.model, %url, "sending messages request");

        let send = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send();
        let response = deadline
            .guard(send)
            .await
            .and_then(|sent| sent.map_err(ProviderError::from))?;

        if !response.status().is_success() {
            return Err(deadline
                .guard(classify_response(response))
                .await
                .unwrap_or_else(|e| e));
        }
        let response = ensure_event_stream(response, &deadline).await?;

        let (sender, stream) = EventStream::channel(options.session_id.clone());
        let session_id = options.session_id;
        tokio::spawn(async move {
            let handler = MessagesStreamState::new(session_id);
            if let Err(err) = pump_sse(response, &deadline, &sender, handler).await {
                warn!(error = %err, "messages stream failed");
                sender.fail(err).await;
            }
        });

        Ok(stream)
    }

    async fn detect_installation(&self) -> InstallationStatus {
        let authenticated = std::env::var(API_KEY_VAR).is_ok_and(|k| !k.is_empty());
        InstallationStatus {
            installed: true,
            method: Some("http".to_string()),
            version: Some(ANTHROPIC_VERSION.to_string()),
            authenticated,
            error: (!authenticated).then(|| format!("{API_KEY_VAR} is not set")),
        }
    }

    fn available_models(&self) -> Vec<ModelDefinition> {
        [
            ("claude-opus-4-1", "Claude Opus 4.1"),
            ("claude-sonnet-4-5", "Claude Sonnet 4.5"),
            ("claude-haiku-4-5", "Claude Haiku 4.5"),
        ]
        .into_iter()
        .map(|(id, name)| ModelDefinition {
            id: id.to_string(),
            name: name.to_string(),
            provider: "claude".to_string(),
            description: None,
        })
        .collect()
    }
}

#[derive(Debug, Default)]
struct ToolUseBuffer {
    id: String,
    name: String,
    input_json: String,
}

/// Decodes messages-API stream events into normalized events
#[derive(Debug)]
struct MessagesStreamState {
    session_id: String,
    text: String,
    tool_uses: BTreeMap<usize, ToolUseBuffer>,
}

impl MessagesStreamState {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            text: String::new(),
            tool_uses: BTreeMap::new(),
        }
    }

    fn apply(&mut self, event: MessagesStreamEvent, raw: &str) -> ModelResult<Vec<StreamEvent>> {
        let mut events = Vec::new();
        match event {
            MessagesStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name },
            } => {
                self.tool_uses.insert(
                    index,
                    ToolUseBuffer {
                        id,
                        name,
                        input_json: String::new(),
                    },
                );
            }
            MessagesStreamEvent::ContentBlockStart {
                content_block: ContentBlock::Text { text },
                ..
            } if !text.is_empty() => {
                self.text.push_str(&text);
                events.push(StreamEvent::text_delta(&self.session_id, text));
            }
            MessagesStreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        self.text.push_str(&text);
                        events.push(StreamEvent::text_delta(&self.session_id, text));
                    }
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(buffer) = self.tool_uses.get_mut(&index) {
                        buffer.input_json.push_str(&partial_json);
                    }
                }
                BlockDelta::Other => {}
            },
            MessagesStreamEvent::ContentBlockStop { index } => {
                if let Some(call) = self.tool_uses.remove(&index) {
                    events.push(StreamEvent::AssistantToolCall {
                        session_id: self.session_id.clone(),
                        id: call.id,
                        name: call.name,
                        input: parse_tool_input(&call.input_json),
                    });
                }
            }
            MessagesStreamEvent::Error { error } => {
                return Err(classify_http_error(0, &error.error_type, raw, None));
            }
            _ => {}
        }
        Ok(events)
    }
}

impl SseHandler for MessagesStreamState {
    fn on_event(&mut self, event: SseEvent) -> ModelResult<Vec<StreamEvent>> {
        let payload = event.data;
        match serde_json::from_str::<MessagesStreamEvent>(&payload) {
            Ok(event) => self.apply(event, &payload),
            Err(e) => {
                log_malformed_line(PROVIDER_NAME, &payload, &e);
                Ok(Vec::new())
            }
        }
    }

    fn finish(&mut self) -> ModelResult<Vec<StreamEvent>> {
        Ok(vec![StreamEvent::result(&self.session_id, self.text.clone())])
    }
}

// API request types
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<MessagesMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct MessagesMessage {
    role: &'static str,
    content: String,
}

// Streaming response types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagesStreamEvent {
    MessageStart {},
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {},
    MessageStop,
    Ping,
    Error {
        error: StreamError,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type")]
    error_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decode_body;

    async fn decode(input: &'static str) -> ModelResult<Vec<StreamEvent>> {
        decode_body(MessagesStreamState::new("s1".to_string()), input).await
    }

    #[tokio::test]
    async fn test_text_and_tool_use() {
        let input = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"tu_1\",\"name\":\"bash\",\"input\":{}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"cmd\\\":\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"ls\\\"}\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let events = decode(input).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::text_delta("s1", "Hello"));
        match &events[1] {
            StreamEvent::AssistantToolCall { id, name, input, .. } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "bash");
                assert_eq!(input, &serde_json::json!({"cmd": "ls"}));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events[2], StreamEvent::result("s1", "Hello"));
    }

    #[tokio::test]
    async fn test_error_event_fails_stream() {
        let input = "data: {\"type\":\"error\",\"error\":{\"type\":\"rate_limit_error\",\"message\":\"slow down\"}}\n\n";
        let err = decode(input).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[test]
    fn test_endpoint_from_env() {
        let mut env = HashMap::new();
        assert_eq!(
            MessagesApiSdk::endpoint(&env),
            "https://api.anthropic.com/v1/messages"
        );
        env.insert(BASE_URL_VAR.to_string(), "https://proxy.local/".to_string());
        assert_eq!(MessagesApiSdk::endpoint(&env), "https://proxy.local/v1/messages");
    }
}
