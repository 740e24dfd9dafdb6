//! In-process [`AgentSdk`] double for tests and offline embedding

use async_trait::async_trait;
use relay_protocol::{InstallationStatus, ModelDefinition, StreamEvent};
use std::sync::{Arc, Mutex};

use crate::stream::EventStream;
use crate::traits::{AgentSdk, ModelResult, SdkQueryOptions};
use crate::ProviderError;

type ErrorFactory = Arc<dyn Fn() -> ProviderError + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail(ErrorFactory),
}

/// SDK that answers every query with a fixed reply or a fixed error
#[derive(Clone)]
pub struct StaticSdk {
    reply: Reply,
    seen: Arc<Mutex<Vec<SdkQueryOptions>>>,
}

impl StaticSdk {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Reply::Text(text.into()),
            seen: Arc::default(),
        }
    }

    pub fn failing<F>(make_error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        Self {
            reply: Reply::Fail(Arc::new(make_error)),
            seen: Arc::default(),
        }
    }

    /// Options of every query received so far
    pub fn calls(&self) -> Vec<SdkQueryOptions> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AgentSdk for StaticSdk {
    async fn query(&self, options: SdkQueryOptions) -> ModelResult<EventStream> {
        let session_id = options.session_id.clone();
        match self.seen.lock() {
            Ok(mut seen) => seen.push(options),
            Err(poisoned) => poisoned.into_inner().push(options),
        }

        match &self.reply {
            Reply::Text(text) => Ok(EventStream::from_items(
                session_id.clone(),
                vec![
                    Ok(StreamEvent::text_delta(&session_id, text.clone())),
                    Ok(StreamEvent::result(&session_id, text.clone())),
                ],
            )),
            Reply::Fail(make_error) => Err(make_error()),
        }
    }

    async fn detect_installation(&self) -> InstallationStatus {
        InstallationStatus {
            installed: true,
            method: Some("static".to_string()),
            version: None,
            authenticated: true,
            error: None,
        }
    }

    fn available_models(&self) -> Vec<ModelDefinition> {
        vec![ModelDefinition {
            id: "claude-sonnet-4-5".to_string(),
            name: "Claude Sonnet 4.5".to_string(),
            provider: "claude".to_string(),
            description: None,
        }]
    }
}
