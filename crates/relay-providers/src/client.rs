//! Shared HTTP client construction

use reqwest::Client;
use std::time::Duration;

use crate::traits::ModelResult;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for the HTTP client shared by all translators
///
/// No overall request timeout is set here; each call is bounded by its
/// profile's deadline instead.
pub struct HttpClientBuilder {
    connect_timeout: Duration,
    user_agent: String,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            user_agent: concat!("relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> ModelResult<Client> {
        Ok(Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent)
            .build()?)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
