//! Outbound calls to the upstream chat-completion provider

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};

use crate::adapter::{UpstreamFormat, UpstreamRequest};
use crate::{Error, Result};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Raw upstream reply, before translation
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends one request per call to the configured provider endpoint
///
/// No pooling guarantees and no retry. Anything that keeps the request from
/// completing is reported as [`Error::Transport`]; an error the provider
/// itself reports comes back as a normal [`UpstreamResponse`].
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    credential: Option<SecretString>,
    format: UpstreamFormat,
}

impl UpstreamClient {
    /// Create a new upstream client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        endpoint: impl Into<String>,
        credential: Option<SecretString>,
        format: UpstreamFormat,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            credential: credential.filter(|c| !c.expose_secret().is_empty()),
            format,
        })
    }

    /// Whether a credential will be attached to upstream calls
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a request upstream and collect the full reply
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on DNS, TLS, connection or timeout
    /// failures, and [`Error::Serialization`] if the body cannot be encoded
    pub async fn send(&self, request: &UpstreamRequest) -> Result<UpstreamResponse> {
        // Fixed-size body, so content-length is set from its length
        let body = serde_json::to_vec(request)?;
        let bytes = body.len();

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        builder = match (self.format, &self.credential) {
            (UpstreamFormat::Anthropic, Some(key)) => builder
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            (UpstreamFormat::Anthropic, None) => {
                builder.header("anthropic-version", ANTHROPIC_VERSION)
            }
            (UpstreamFormat::OpenAi, Some(key)) => builder.bearer_auth(key.expose_secret()),
            (UpstreamFormat::OpenAi, None) => builder,
        };

        tracing::debug!(endpoint = %self.endpoint, bytes, "sending upstream request");

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Transport(describe(&e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(describe(&e)))?;

        tracing::info!(status, bytes = body.len(), "upstream response");

        Ok(UpstreamResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Human-readable transport failure, including the root cause
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    if error.is_timeout() {
        message.push_str(" (timed out)");
    }
    message
}
