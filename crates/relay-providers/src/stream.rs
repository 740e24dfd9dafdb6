//! Bounded event channel between a translator's producer task and its caller
//!
//! A producer owns an [`EventSender`] and the caller owns the matching
//! [`EventStream`]. The stream yields `Ok(StreamEvent)` items; a stream that
//! completed normally ends right after a [`StreamEvent::Result`], while a
//! stream that failed ends with a single `Err` item. Dropping the
//! `EventStream` makes every further send fail, which stops the producer and
//! drops its HTTP response.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use relay_protocol::StreamEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::deadline::CallDeadline;
use crate::error_classify::truncate_body;
use crate::sse::{sse_events, SseEvent};
use crate::traits::ModelResult;
use crate::ProviderError;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub type EventResult = Result<StreamEvent, ProviderError>;

/// Consumer side of a translator stream
pub struct EventStream {
    session_id: String,
    rx: mpsc::Receiver<EventResult>,
}

/// Producer side of a translator stream
#[derive(Clone)]
pub struct EventSender {
    session_id: String,
    tx: mpsc::Sender<EventResult>,
}

/// How a stream ended
#[derive(Debug)]
pub enum StreamOutcome {
    Completed {
        events: Vec<StreamEvent>,
        result: String,
    },
    Failed {
        events: Vec<StreamEvent>,
        error: ProviderError,
    },
    /// Channel closed without a terminal event
    Truncated { events: Vec<StreamEvent> },
}

impl EventStream {
    pub fn channel(session_id: impl Into<String>) -> (EventSender, EventStream) {
        let session_id = session_id.into();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            EventSender {
                session_id: session_id.clone(),
                tx,
            },
            EventStream { session_id, rx },
        )
    }

    /// Build an already-complete stream from a fixed list of items
    pub fn from_items(session_id: impl Into<String>, items: Vec<EventResult>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item
            let _ = tx.try_send(item);
        }
        Self {
            session_id: session_id.into(),
            rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn next_event(&mut self) -> Option<EventResult> {
        self.rx.recv().await
    }

    /// Drain the stream and report how it ended
    pub async fn finish(mut self) -> StreamOutcome {
        let mut events = Vec::new();
        while let Some(item) = self.rx.recv().await {
            match item {
                Ok(event) => {
                    if let StreamEvent::Result { result, .. } = &event {
                        let result = result.clone();
                        events.push(event);
                        return StreamOutcome::Completed { events, result };
                    }
                    events.push(event);
                }
                Err(error) => return StreamOutcome::Failed { events, error },
            }
        }
        StreamOutcome::Truncated { events }
    }

    /// Collect every event, failing on the first error
    pub async fn collect_events(mut self) -> ModelResult<Vec<StreamEvent>> {
        let mut events = Vec::new();
        while let Some(item) = self.rx.recv().await {
            events.push(item?);
        }
        Ok(events)
    }

    /// Convert errors into terminal [`StreamEvent::Error`] events
    pub fn into_events(self) -> impl Stream<Item = StreamEvent> + Send {
        let session_id = self.session_id.clone();
        self.map(move |item| match item {
            Ok(event) => event,
            Err(err) => StreamEvent::Error {
                session_id: session_id.clone(),
                message: err.to_string(),
                kind: Some(err.kind().to_string()),
            },
        })
    }
}

impl Stream for EventStream {
    type Item = EventResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl EventSender {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns `false` once the consumer has gone away
    pub async fn send(&self, event: StreamEvent) -> bool {
        self.tx.send(Ok(event)).await.is_ok()
    }

    /// Close the stream with an error
    pub async fn fail(&self, error: ProviderError) {
        if self.tx.send(Err(error)).await.is_err() {
            debug!(session_id = %self.session_id, "stream consumer dropped before error delivery");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Wire-format specific handling of decoded SSE events
pub(crate) trait SseHandler: Send {
    fn on_event(&mut self, event: SseEvent) -> ModelResult<Vec<StreamEvent>>;

    /// Events emitted after the body ends
    fn finish(&mut self) -> ModelResult<Vec<StreamEvent>>;
}

/// Decode an SSE response body through `handler`, forwarding events to `sender`
///
/// Every read and every send is bounded by `deadline`. Returns `Ok` when the
/// body ended or the consumer went away. A body that ends without a single
/// SSE record is a protocol error.
pub(crate) async fn pump_sse<H: SseHandler>(
    response: reqwest::Response,
    deadline: &CallDeadline,
    sender: &EventSender,
    mut handler: H,
) -> ModelResult<()> {
    let mut records = Box::pin(sse_events(response.bytes_stream()));
    let mut seen = 0usize;

    while let Some(record) = deadline.guard(records.next()).await? {
        seen += 1;
        for event in handler.on_event(record?)? {
            if !deadline.guard(sender.send(event)).await? {
                return Ok(());
            }
        }
    }

    if seen == 0 {
        return Err(ProviderError::Protocol(
            "response body ended without any server-sent events".to_string(),
        ));
    }

    for event in handler.finish()? {
        if !deadline.guard(sender.send(event)).await? {
            return Ok(());
        }
    }
    Ok(())
}

/// Run `handler` over an in-memory body; used by translator unit tests
#[cfg(test)]
pub(crate) async fn decode_body<H: SseHandler>(
    mut handler: H,
    body: &'static str,
) -> ModelResult<Vec<StreamEvent>> {
    let chunks = futures::stream::iter([Ok::<_, reqwest::Error>(body.as_bytes())]);
    let mut records = Box::pin(sse_events(chunks));
    let mut events = Vec::new();
    while let Some(record) = records.next().await {
        events.extend(handler.on_event(record?)?);
    }
    events.extend(handler.finish()?);
    Ok(events)
}

/// Forward an inner stream to `sender` under `deadline`
pub(crate) async fn forward_events(
    mut inner: EventStream,
    deadline: &CallDeadline,
    sender: &EventSender,
) -> ModelResult<()> {
    while let Some(item) = deadline.guard(inner.next_event()).await? {
        let event = item?;
        if !deadline.guard(sender.send(event)).await? {
            return Ok(());
        }
    }
    Ok(())
}

/// Best-effort JSON parse of accumulated tool input
///
/// Empty input becomes `{}`; unparseable input is kept as a raw string.
pub(crate) fn parse_tool_input(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

pub(crate) fn log_malformed_line(provider: &str, payload: &str, error: &serde_json::Error) {
    warn!(
        provider,
        error = %error,
        payload = %truncate_body(payload),
        "skipping malformed SSE data line"
    );
}
