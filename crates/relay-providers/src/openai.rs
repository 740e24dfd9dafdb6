//! OpenAI chat-completions compatible translator

use relay_protocol::{
    Feature, InstallationStatus, ModelDefinition, ProfileType, ProviderProfile, StreamEvent,
};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::deadline::CallDeadline;
use crate::error_classify::classify_response;
use crate::model_mapping::map_model_to_remote;
use crate::request::QueryRequest;
use crate::sse::{ensure_event_stream, SseEvent, DONE_SENTINEL};
use crate::stream::{log_malformed_line, parse_tool_input, pump_sse, EventStream, SseHandler};
use crate::traits::ModelResult;
use crate::ProviderError;

const DEFAULT_MAX_TOKENS: usize = 4096;
const PROVIDER_NAME: &str = "openai-compatible";

/// Provider bound to one `openai-compatible` profile
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    profile: ProviderProfile,
}

impl OpenAiCompatibleProvider {
    pub fn new(profile: ProviderProfile, client: Client) -> Self {
        Self { client, profile }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn build_request(&self, request: &QueryRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.flatten(),
        });

        ChatCompletionRequest {
            model: map_model_to_remote(&request.model, &self.profile),
            messages,
            stream: true,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Issue the call and return a stream of decoded events
    ///
    /// Connection, auth, and status failures are returned here; failures after
    /// the first byte arrive as the stream's final `Err` item.
    pub async fn stream_query(&self, request: &QueryRequest) -> ModelResult<EventStream> {
        let body = self.build_request(request);
        let url = format!("{}/v1/chat/completions", self.profile.trimmed_base_url());
        let deadline = CallDeadline::new(
            Duration::from_millis(self.profile.timeout),
            request.cancel.as_ref(),
        );
        let session_id = request.resolve_session_id();

        debug!(
            profile_id = %self.profile.id,
            model = %request.model,
            remote_model = %body.model,
            %url,
            "sending chat completions request"
        );

        let send = self
            .client
            .post(&url)
            .bearer_auth(self.profile.api_key.expose_secret())
            .json(&body)
            .send();
        let response = deadline
            .guard(send)
            .await
            .and_then(|sent| sent.map_err(ProviderError::from))
            .map_err(|e| e.with_profile(&self.profile))?;

        if !response.status().is_success() {
            let err = deadline
                .guard(classify_response(response))
                .await
                .unwrap_or_else(|e| e);
            return Err(err.with_profile(&self.profile));
        }
        let response = ensure_event_stream(response, &deadline)
            .await
            .map_err(|e| e.with_profile(&self.profile))?;

        let (sender, stream) = EventStream::channel(session_id.clone());
        let profile = self.profile.clone();
        tokio::spawn(async move {
            let handler = OpenAiStreamState::new(session_id);
            if let Err(err) = pump_sse(response, &deadline, &sender, handler).await {
                let err = err.with_profile(&profile);
                warn!(profile_id = %profile.id, error = %err, "chat completions stream failed");
                sender.fail(err).await;
            }
        });

        Ok(stream)
    }

    pub async fn detect_installation(&self) -> InstallationStatus {
        InstallationStatus {
            installed: true,
            method: Some("http".to_string()),
            version: None,
            authenticated: self.profile.has_api_key(),
            error: None,
        }
    }

    pub fn get_available_models(&self) -> Vec<ModelDefinition> {
        models_from_mapping(&self.profile)
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        matches!(feature, Feature::Streaming | Feature::Tools)
    }
}

/// One model per mapping row, named by its local alias
pub(crate) fn models_from_mapping(profile: &ProviderProfile) -> Vec<ModelDefinition> {
    profile
        .model_mapping
        .iter()
        .map(|entry| ModelDefinition {
            id: entry.local_model.clone(),
            name: entry.local_model.clone(),
            provider: format!("{}:{}", profile_type_label(profile.profile_type), profile.id),
            description: Some(format!("{} via {}", entry.remote_model, profile.name)),
        })
        .collect()
}

fn profile_type_label(profile_type: ProfileType) -> &'static str {
    profile_type.as_str()
}

#[derive(Debug, Default)]
struct ToolCallBuffer {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates chat-completion chunks into normalized events
///
/// Text deltas are emitted as they arrive. Tool calls are buffered by index
/// and emitted when a `stop` or `tool_calls` finish reason arrives.
#[derive(Debug)]
pub struct OpenAiStreamState {
    session_id: String,
    text: String,
    tool_calls: BTreeMap<usize, ToolCallBuffer>,
}

impl OpenAiStreamState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply one `data:` payload
    pub fn apply_data(&mut self, payload: &str) -> Result<Vec<StreamEvent>, serde_json::Error> {
        if payload.trim() == DONE_SENTINEL {
            return Ok(Vec::new());
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
        let mut events = Vec::new();

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(events);
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                self.text.push_str(&content);
                events.push(StreamEvent::text_delta(&self.session_id, content));
            }
        }

        for delta in choice.delta.tool_calls.unwrap_or_default() {
            let buffer = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                buffer.id.get_or_insert(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                    buffer.name.get_or_insert(name);
                }
                if let Some(arguments) = function.arguments {
                    buffer.arguments.push_str(&arguments);
                }
            }
        }

        if matches!(choice.finish_reason.as_deref(), Some("stop" | "tool_calls")) {
            events.extend(self.drain_tool_calls());
        }

        Ok(events)
    }

    fn drain_tool_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .filter_map(|call| match (call.id, call.name) {
                (Some(id), Some(name)) => Some(StreamEvent::AssistantToolCall {
                    session_id: self.session_id.clone(),
                    id,
                    name,
                    input: parse_tool_input(&call.arguments),
                }),
                _ => None,
            })
            .collect()
    }

    /// Terminal event carrying the accumulated text
    pub fn result_event(&self) -> StreamEvent {
        StreamEvent::result(&self.session_id, self.text.clone())
    }
}

impl SseHandler for OpenAiStreamState {
    fn on_event(&mut self, event: SseEvent) -> ModelResult<Vec<StreamEvent>> {
        match self.apply_data(&event.data) {
            Ok(events) => Ok(events),
            Err(e) => {
                log_malformed_line(PROVIDER_NAME, &event.data, &e);
                Ok(Vec::new())
            }
        }
    }

    fn finish(&mut self) -> ModelResult<Vec<StreamEvent>> {
        Ok(vec![self.result_event()])
    }
}

// API request types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

// Streaming response types
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decode_body;

    async fn decode(input: &'static str) -> Vec<StreamEvent> {
        decode_body(OpenAiStreamState::new("s1"), input).await.unwrap()
    }

    #[tokio::test]
    async fn test_single_text_delta_then_result() {
        let input = "data: {\"id\":\"1\",\"object\":\"x\",\"created\":0,\"model\":\"m\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
        let events = decode(input).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::text_delta("s1", "Hi"),
                StreamEvent::result("s1", "Hi"),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_arguments_split_across_chunks() {
        let input = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"read_file\",\"arguments\":\"{\\\"pa\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"th\\\":\\\"a.rs\\\"}\"}}]},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = decode(input).await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::AssistantToolCall { id, name, input, .. } => {
                assert_eq!(id, "call_1");
                assert_eq!(name, "read_file");
                assert_eq!(input, &serde_json::json!({"path": "a.rs"}));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(events[1], StreamEvent::result("s1", ""));
    }

    #[test]
    fn test_multiple_tool_calls_emitted_in_index_order() {
        let mut state = OpenAiStreamState::new("s1");
        state
            .apply_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"b","function":{"name":"second","arguments":"{}"}}]}}]}"#)
            .unwrap();
        state
            .apply_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"first","arguments":"{}"}}]}}]}"#)
            .unwrap();
        let events = state
            .apply_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        let names: Vec<_> = events
            .iter()
            .map(|e| match e {
                StreamEvent::AssistantToolCall { name, .. } => name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_unparseable_arguments_degrade_to_string() {
        let mut state = OpenAiStreamState::new("s1");
        state
            .apply_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"name":"run","arguments":"{not json"}}]}}]}"#)
            .unwrap();
        let events = state
            .apply_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#)
            .unwrap();
        match &events[..] {
            [StreamEvent::AssistantToolCall { input, .. }] => {
                assert_eq!(input, &serde_json::Value::String("{not json".into()));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_without_name_is_dropped() {
        let mut state = OpenAiStreamState::new("s1");
        state
            .apply_data(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c","function":{"arguments":"{}"}}]}}]}"#)
            .unwrap();
        let events = state
            .apply_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {garbage\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = decode(input).await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], StreamEvent::result("s1", "ab"));
    }

    #[test]
    fn test_empty_content_and_empty_choices_ignored() {
        let mut state = OpenAiStreamState::new("s1");
        assert!(state
            .apply_data(r#"{"choices":[{"delta":{"content":""}}]}"#)
            .unwrap()
            .is_empty());
        assert!(state.apply_data(r#"{"choices":[]}"#).unwrap().is_empty());
        assert!(state.apply_data("[DONE]").unwrap().is_empty());
    }

    #[test]
    fn test_build_request_flattens_prompt_and_maps_model() {
        use relay_protocol::{Prompt, PromptPart};

        let profile = ProviderProfile::new(
            "p1",
            "Proxy",
            ProfileType::OpenaiCompatible,
            "https://proxy.example.com/",
            "key",
        )
        .with_mapping("claude-sonnet-4", "gpt-4o");
        let provider = OpenAiCompatibleProvider::new(profile, Client::new());
        let request = QueryRequest::new(
            "CLAUDE-SONNET-4",
            Prompt::Parts(vec![PromptPart::text("one"), PromptPart::text("two")]),
        )
        .with_system_prompt("be brief");

        let body = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "one\ntwo");
    }
}
