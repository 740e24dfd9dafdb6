//! Server-Sent-Events decoding of streamed response bodies

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;

use crate::deadline::CallDeadline;
use crate::error_classify::truncate_body;
use crate::traits::ModelResult;
use crate::ProviderError;

pub use eventsource_stream::Event as SseEvent;

/// Payload marking the end of an OpenAI-style stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Decode a chunked body into SSE events
///
/// Transport failures keep their own classification; undecodable framing is a
/// protocol error.
pub(crate) fn sse_events<S, B, E>(body: S) -> impl Stream<Item = ModelResult<SseEvent>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ProviderError>,
{
    body.eventsource().map(|item| {
        item.map_err(|err| match err {
            EventStreamError::Transport(e) => e.into(),
            EventStreamError::Utf8(e) => {
                ProviderError::Protocol(format!("invalid UTF-8 in event stream: {}", e))
            }
            EventStreamError::Parser(e) => {
                ProviderError::Protocol(format!("malformed event stream: {}", e))
            }
        })
    })
}

/// Reject a successful response that carries a JSON document instead of a stream
///
/// Some proxies ignore `stream: true` and answer with a single completion body.
pub(crate) async fn ensure_event_stream(
    response: Response,
    deadline: &CallDeadline,
) -> ModelResult<Response> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"));
    if !is_json {
        return Ok(response);
    }

    let body = deadline
        .guard(response.text())
        .await
        .and_then(|read| read.map_err(ProviderError::from))?;
    Err(ProviderError::Protocol(format!(
        "expected an event stream, got a JSON body: {}",
        truncate_body(&body)
    )))
}
