//! Chat-completion wire format translation
//!
//! The gateway speaks one inbound shape (OpenAI-style chat completions) and
//! forwards to an upstream provider that may use a different one. Translation
//! covers role and content only; everything else is rebuilt from
//! [`AdapterConfig`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::upstream::UpstreamResponse;
use crate::{Error, Result};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Map a wire role onto the two supported roles
    ///
    /// Anything other than `user` is treated as the assistant.
    #[must_use]
    pub fn from_wire(role: &str) -> Self {
        if role == "user" {
            Self::User
        } else {
            Self::Assistant
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        Self::from_wire(&role)
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Inbound request body accepted by `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

/// The single reply shape handed back to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

impl NormalizedResponse {
    /// Wrap reply text as a single assistant choice
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ChatMessage::assistant(content),
            }],
        }
    }

    /// Content of the first choice, if any
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Wire format spoken by the upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamFormat {
    /// Anthropic Messages API
    #[default]
    Anthropic,
    /// OpenAI-compatible chat completions (pass-through)
    OpenAi,
}

impl FromStr for UpstreamFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" | "open-ai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown upstream format: {other}"))),
        }
    }
}

/// Request-side settings that the inbound body does not carry
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub format: UpstreamFormat,
    /// Upstream model; when unset the inbound model is used
    pub model: Option<String>,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            format: UpstreamFormat::Anthropic,
            model: None,
            max_tokens: 1024,
            system_prompt: None,
        }
    }
}

/// Provider-specific request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UpstreamRequest {
    Anthropic(AnthropicRequest),
    OpenAi(OpenAiRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenAiMessage {
    pub role: &'static str,
    pub content: String,
}

/// Upstream reply after translation
#[derive(Debug, Clone, PartialEq)]
pub enum Adapted {
    /// Reply text, normalized
    Reply(NormalizedResponse),
    /// Upstream reported its own error; payload is passed through untouched
    UpstreamError { status: u16, payload: Value },
}

/// Pick the model to send upstream
///
/// A configured model wins. Otherwise the inbound model is used with any
/// `provider/` prefix removed.
fn resolve_model(requested: &str, config: &AdapterConfig) -> String {
    if let Some(model) = config.model.as_deref().filter(|m| !m.is_empty()) {
        return model.to_string();
    }
    requested
        .split_once('/')
        .map_or(requested, |(_, name)| name)
        .to_string()
}

/// Translate an inbound request into the upstream provider's shape
#[must_use]
pub fn to_upstream(request: &ProxyRequest, config: &AdapterConfig) -> UpstreamRequest {
    let model = resolve_model(&request.model, config);

    match config.format {
        UpstreamFormat::Anthropic => UpstreamRequest::Anthropic(AnthropicRequest {
            model,
            max_tokens: config.max_tokens,
            system: config.system_prompt.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
        }),
        UpstreamFormat::OpenAi => {
            let system = config.system_prompt.iter().map(|prompt| OpenAiMessage {
                role: "system",
                content: prompt.clone(),
            });
            let turns = request.messages.iter().map(|m| OpenAiMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            });

            UpstreamRequest::OpenAi(OpenAiRequest {
                model,
                messages: system.chain(turns).collect(),
                max_tokens: config.max_tokens,
                stream: false,
            })
        }
    }
}

/// Translate a raw upstream reply into the normalized shape
///
/// # Errors
///
/// Returns [`Error::UpstreamParse`] if the body is not JSON
pub fn to_normalized(response: &UpstreamResponse) -> Result<Adapted> {
    let value: Value = serde_json::from_slice(&response.body)
        .map_err(|e| Error::UpstreamParse(e.to_string()))?;

    let has_error = value.get("error").is_some_and(|e| !e.is_null());
    let failed_status = !(200..300).contains(&response.status);

    if has_error || failed_status {
        // An error object on a 2xx is still an error from the client's view
        let status = if failed_status { response.status } else { 400 };
        return Ok(Adapted::UpstreamError {
            status,
            payload: value,
        });
    }

    Ok(Adapted::Reply(NormalizedResponse::assistant(extract_text(
        &value,
    ))))
}

/// First reply text found in either provider shape, or empty
#[must_use]
pub fn extract_text(value: &Value) -> String {
    anthropic_text(value)
        .or_else(|| openai_text(value))
        .unwrap_or_default()
        .to_string()
}

fn anthropic_text(value: &Value) -> Option<&str> {
    value
        .get("content")?
        .as_array()?
        .iter()
        .find_map(|block| block.get("text").and_then(Value::as_str))
}

fn openai_text(value: &Value) -> Option<&str> {
    value
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reply(status: u16, body: &Value) -> UpstreamResponse {
        UpstreamResponse {
            status,
            body: serde_json::to_vec(body).unwrap(),
        }
    }

    #[test]
    fn unknown_roles_become_assistant() {
        let request: ProxyRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "a"},
                {"role": "user", "content": "b"},
                {"role": "tool", "content": "c"}
            ]
        }))
        .unwrap();

        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert!(!request.stream);
    }

    #[test]
    fn anthropic_request_keeps_order_and_adds_settings() {
        let request = ProxyRequest {
            model: "anthropic/claude-sonnet-4-20250514".to_string(),
            messages: vec![
                ChatMessage::user("one"),
                ChatMessage::assistant("two"),
                ChatMessage::user("three"),
            ],
            stream: false,
        };
        let config = AdapterConfig {
            system_prompt: Some("be kind".to_string()),
            ..AdapterConfig::default()
        };

        let body = serde_json::to_value(to_upstream(&request, &config)).unwrap();

        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], "be kind");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "one"}));
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["messages"][2]["content"], "three");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn configured_model_overrides_inbound() {
        let request = ProxyRequest {
            model: "someone/else".to_string(),
            messages: vec![],
            stream: false,
        };
        let config = AdapterConfig {
            model: Some("claude-x".to_string()),
            ..AdapterConfig::default()
        };

        match to_upstream(&request, &config) {
            UpstreamRequest::Anthropic(r) => assert_eq!(r.model, "claude-x"),
            UpstreamRequest::OpenAi(_) => panic!("expected anthropic shape"),
        }
    }

    #[test]
    fn openai_request_prepends_system_and_disables_stream() {
        let request = ProxyRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::user("hi")],
            stream: true,
        };
        let config = AdapterConfig {
            format: UpstreamFormat::OpenAi,
            system_prompt: Some("sys".to_string()),
            ..AdapterConfig::default()
        };

        let body = serde_json::to_value(to_upstream(&request, &config)).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "sys"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn normalizes_anthropic_reply() {
        let adapted = to_normalized(&reply(
            200,
            &json!({"id": "msg_1", "content": [{"type": "text", "text": "hello"}]}),
        ))
        .unwrap();

        assert_eq!(adapted, Adapted::Reply(NormalizedResponse::assistant("hello")));
    }

    #[test]
    fn skips_non_text_blocks() {
        let adapted = to_normalized(&reply(
            200,
            &json!({"content": [{"type": "tool_use", "id": "t"}, {"type": "text", "text": "later"}]}),
        ))
        .unwrap();

        assert_eq!(adapted, Adapted::Reply(NormalizedResponse::assistant("later")));
    }

    #[test]
    fn normalizes_openai_reply() {
        let adapted = to_normalized(&reply(
            200,
            &json!({"choices": [{"message": {"role": "assistant", "content": "yo"}}]}),
        ))
        .unwrap();

        assert_eq!(adapted, Adapted::Reply(NormalizedResponse::assistant("yo")));
    }

    #[test]
    fn missing_text_yields_empty_string() {
        let adapted = to_normalized(&reply(200, &json!({"content": []}))).unwrap();

        assert_eq!(adapted, Adapted::Reply(NormalizedResponse::assistant("")));
    }

    #[test]
    fn upstream_error_passes_through_with_status() {
        let payload = json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        });

        let adapted = to_normalized(&reply(401, &payload)).unwrap();

        assert_eq!(adapted, Adapted::UpstreamError { status: 401, payload });
    }

    #[test]
    fn error_object_on_success_status_maps_to_bad_request() {
        let payload = json!({"error": {"message": "nope"}});

        match to_normalized(&reply(200, &payload)).unwrap() {
            Adapted::UpstreamError { status, .. } => assert_eq!(status, 400),
            Adapted::Reply(_) => panic!("expected error"),
        }
    }

    #[test]
    fn non_json_body_is_a_parse_error() {
        let response = UpstreamResponse {
            status: 502,
            body: b"<html>bad gateway</html>".to_vec(),
        };

        assert!(matches!(to_normalized(&response), Err(Error::UpstreamParse(_))));
    }

    #[test]
    fn upstream_format_parses() {
        assert_eq!("anthropic".parse::<UpstreamFormat>().unwrap(), UpstreamFormat::Anthropic);
        assert_eq!("OpenAI".parse::<UpstreamFormat>().unwrap(), UpstreamFormat::OpenAi);
        assert!("bard".parse::<UpstreamFormat>().is_err());
    }
}
