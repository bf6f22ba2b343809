//! Chat proxy: inbound OpenAI-style request in, normalized reply out

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::Error;
use crate::adapter::{self, AdapterConfig, Adapted, NormalizedResponse, ProxyRequest};
use crate::config::UpstreamConfig;
use crate::upstream::UpstreamClient;

/// Forwards chat requests to the upstream provider
///
/// Exactly one upstream call per inbound request. Every failure is turned
/// into a [`GatewayError`] response; nothing here panics on bad input.
pub struct Gateway {
    adapter: AdapterConfig,
    upstream: UpstreamClient,
}

impl Gateway {
    #[must_use]
    pub const fn new(adapter: AdapterConfig, upstream: UpstreamClient) -> Self {
        Self { adapter, upstream }
    }

    /// Build a gateway from upstream settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: UpstreamConfig) -> crate::Result<Self> {
        let adapter = config.adapter();
        let upstream =
            UpstreamClient::new(config.url, config.api_key, config.format, config.timeout)?;
        Ok(Self::new(adapter, upstream))
    }

    /// Whether an upstream credential is configured
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.upstream.has_credential()
    }

    /// Handle one inbound request body
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the body cannot be parsed, the upstream
    /// cannot be reached, or the upstream reports an error of its own
    pub async fn handle(&self, body: &[u8]) -> Result<NormalizedResponse, GatewayError> {
        let request: ProxyRequest = serde_json::from_slice(body).map_err(|e| {
            tracing::error!(error = %e, "setup error");
            GatewayError::Setup(e.to_string())
        })?;

        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            "received chat request"
        );

        let upstream_request = adapter::to_upstream(&request, &self.adapter);

        let response = match self.upstream.send(&upstream_request).await {
            Ok(response) => response,
            Err(Error::Serialization(e)) => return Err(GatewayError::Setup(e.to_string())),
            Err(e) => {
                tracing::error!(error = %e, "proxy error");
                return Err(GatewayError::Proxy(e.to_string()));
            }
        };

        match adapter::to_normalized(&response) {
            Ok(Adapted::Reply(reply)) => Ok(reply),
            Ok(Adapted::UpstreamError { status, payload }) => {
                tracing::warn!(status, "upstream reported an error");
                Err(GatewayError::Upstream { status, payload })
            }
            Err(e) => {
                tracing::error!(error = %e, "parse error");
                Err(GatewayError::Parse {
                    raw: String::from_utf8_lossy(&response.body).into_owned(),
                })
            }
        }
    }
}

/// Gateway failures, rendered as structured JSON bodies
#[derive(Debug)]
pub enum GatewayError {
    /// Inbound body could not be parsed
    Setup(String),
    /// Upstream could not be reached
    Proxy(String),
    /// Upstream body was not JSON
    Parse { raw: String },
    /// Upstream reported its own error
    Upstream { status: u16, payload: Value },
}

impl GatewayError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Setup(_) | Self::Proxy(_) | Self::Parse { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// JSON body sent back to the caller
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Setup(message) => json!({"error": "Setup error", "message": message}),
            Self::Proxy(message) => json!({"error": "Proxy error", "message": message}),
            Self::Parse { raw } => json!({"error": "Parse error", "raw": raw}),
            Self::Upstream { payload, .. } => payload.clone(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
