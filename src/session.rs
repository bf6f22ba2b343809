//! Conversation history and the turn-taking protocol
//!
//! A [`ConversationSession`] owns the history for one session. Each call to
//! [`ConversationSession::submit`] is one turn: the user's text is recorded,
//! the most recent window of history is sent through the gateway, and the
//! reply comes back ready for display.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{ChatMessage, NormalizedResponse, ProxyRequest};
use crate::{Error, Result};

/// Number of most recent messages sent with each request
pub const HISTORY_WINDOW: usize = 10;

/// Model identifier sent by the client; the gateway may override it
pub const DEFAULT_CLIENT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";

/// Shown and spoken when a turn fails; never stored in history
pub const FALLBACK_REPLY: &str = "ごめんね、接続エラーが起きたみたい。もう一度試してね！";

/// Substituted when the gateway answers without any content
pub const EMPTY_REPLY: &str = "ごめん、うまく返答できなかった...";

/// Lines starting with this marker carry attachments, not speech
pub const MEDIA_PREFIX: &str = "MEDIA:";

/// Display text when nothing is left after removing media lines
pub const ELIDED_REPLY: &str = "...";

/// Sends a chat request and returns the normalized reply
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Perform one chat round trip
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, non-2xx status or unparseable body
    async fn complete(&self, request: &ProxyRequest) -> Result<NormalizedResponse>;
}

/// Talks to the gateway's `POST /api/chat`
pub struct HttpChatClient {
    client: reqwest::Client,
    url: String,
}

impl HttpChatClient {
    /// Create a client for the gateway at `base_url`
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn complete(&self, request: &ProxyRequest) -> Result<NormalizedResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Chat(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Chat(format!("HTTP {}", response.status().as_u16())));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Chat(format!("invalid reply: {e}")))
    }
}

/// Rolling conversation for one session
pub struct ConversationSession {
    transport: Arc<dyn ChatTransport>,
    model: String,
    history: Vec<ChatMessage>,
}

impl ConversationSession {
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_model(transport, DEFAULT_CLIENT_MODEL)
    }

    #[must_use]
    pub fn with_model(transport: Arc<dyn ChatTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Full history, oldest first
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The slice of history sent upstream
    #[must_use]
    pub fn window(&self) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        &self.history[start..]
    }

    /// Run one turn and return the text to display
    ///
    /// The user's message is recorded before the call, so it survives a
    /// failure. A failed call yields [`FALLBACK_REPLY`], which is not added
    /// to history.
    pub async fn submit(&mut self, user_text: &str) -> String {
        self.history.push(ChatMessage::user(user_text));

        let request = ProxyRequest {
            model: self.model.clone(),
            messages: self.window().to_vec(),
            stream: false,
        };

        let reply = match self.transport.complete(&request).await {
            Ok(response) => response
                .content()
                .filter(|c| !c.is_empty())
                .unwrap_or(EMPTY_REPLY)
                .to_string(),
            Err(e) => {
                tracing::error!(error = %e, "chat request failed");
                return FALLBACK_REPLY.to_string();
            }
        };

        self.history.push(ChatMessage::assistant(reply.as_str()));
        tracing::debug!(turns = self.history.len(), "assistant reply recorded");

        display_text(&reply)
    }
}

/// Remove media lines and fall back to [`ELIDED_REPLY`] when nothing remains
#[must_use]
pub fn display_text(reply: &str) -> String {
    let stripped = strip_media_lines(reply);
    if stripped.trim().is_empty() {
        ELIDED_REPLY.to_string()
    } else {
        stripped
    }
}

/// Drop every line that begins with [`MEDIA_PREFIX`]
#[must_use]
pub fn strip_media_lines(reply: &str) -> String {
    reply
        .lines()
        .filter(|line| !line.trim_start().starts_with(MEDIA_PREFIX))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Replies with a canned text and records every request
    struct Scripted {
        reply: Option<String>,
        requests: Mutex<Vec<ProxyRequest>>,
    }

    impl Scripted {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for Scripted {
        async fn complete(&self, request: &ProxyRequest) -> Result<NormalizedResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply
                .as_deref()
                .map(NormalizedResponse::assistant)
                .ok_or_else(|| Error::Chat("HTTP 500".to_string()))
        }
    }

    #[tokio::test]
    async fn successful_turn_records_both_messages() {
        let transport = Scripted::replying("hello");
        let mut session = ConversationSession::new(transport.clone());

        let shown = session.submit("hi").await;

        assert_eq!(shown, "hello");
        assert_eq!(
            session.history(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].model, DEFAULT_CLIENT_MODEL);
        assert!(!requests[0].stream);
        assert_eq!(requests[0].messages, vec![ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn failed_turn_keeps_user_message_only() {
        let mut session = ConversationSession::new(Scripted::failing());

        let shown = session.submit("hi").await;

        assert_eq!(shown, FALLBACK_REPLY);
        assert_eq!(session.history(), &[ChatMessage::user("hi")]);
    }

    #[tokio::test]
    async fn window_never_exceeds_limit() {
        let transport = Scripted::replying("ok");
        let mut session = ConversationSession::new(transport.clone());

        for turn in 0..100 {
            session.submit(&format!("turn {turn}")).await;
        }

        assert_eq!(session.history().len(), 200);
        let requests = transport.requests.lock().unwrap();
        assert!(requests.iter().all(|r| r.messages.len() <= HISTORY_WINDOW));

        let last = requests.last().unwrap();
        assert_eq!(last.messages.len(), HISTORY_WINDOW);
        assert_eq!(last.messages.last().unwrap(), &ChatMessage::user("turn 99"));
        assert_eq!(last.messages[0], ChatMessage::assistant("ok"));
    }

    #[tokio::test]
    async fn empty_content_uses_placeholder() {
        let mut session = ConversationSession::new(Scripted::replying(""));

        let shown = session.submit("hi").await;

        assert_eq!(shown, EMPTY_REPLY);
        assert_eq!(session.history()[1], ChatMessage::assistant(EMPTY_REPLY));
    }

    #[tokio::test]
    async fn media_lines_are_hidden_but_kept_in_history() {
        let raw = "MEDIA: /tmp/a.png\nこんにちは\nMEDIA: /tmp/b.png";
        let mut session = ConversationSession::new(Scripted::replying(raw));

        let shown = session.submit("hi").await;

        assert_eq!(shown, "こんにちは");
        assert_eq!(session.history()[1].content, raw);
    }

    #[test]
    fn media_only_reply_is_elided() {
        assert_eq!(display_text("MEDIA: /tmp/a.png\n  MEDIA:x"), ELIDED_REPLY);
    }

    #[test]
    fn media_marker_mid_line_is_kept() {
        assert_eq!(strip_media_lines("see MEDIA: here"), "see MEDIA: here");
    }
}
