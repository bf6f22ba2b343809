//! Shared test utilities

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use secrecy::SecretString;
use talkback::api::ApiServerBuilder;
use talkback::{Gateway, UpstreamConfig, UpstreamFormat};
use tower::ServiceExt;

/// Upstream settings pointing at `url`
#[must_use]
pub fn upstream_config(url: &str, key: Option<&str>, format: UpstreamFormat) -> UpstreamConfig {
    UpstreamConfig {
        url: url.to_string(),
        format,
        api_key: key.map(|k| SecretString::from(k.to_string())),
        model: Some("claude-test".to_string()),
        max_tokens: 1024,
        timeout: Duration::from_secs(5),
        system_prompt: None,
    }
}

/// Router for a gateway talking to `url` in Anthropic format
#[must_use]
pub fn anthropic_router(url: &str, key: Option<&str>) -> Router {
    router_for(upstream_config(url, key, UpstreamFormat::Anthropic), None)
}

/// Router for arbitrary upstream settings, optionally serving static files
#[must_use]
pub fn router_for(config: UpstreamConfig, static_dir: Option<PathBuf>) -> Router {
    let gateway = Gateway::from_config(config).expect("failed to build gateway");
    ApiServerBuilder::new(gateway, 0)
        .static_dir(static_dir)
        .build()
        .router()
}

/// POST a raw body and decode the JSON reply
pub async fn post_chat(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// GET a path and return the status and raw body
pub async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}
