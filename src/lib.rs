//! Talkback - voice conversation client and chat gateway
//!
//! This library provides the two halves of a talking assistant:
//! - A gateway that accepts OpenAI-style chat requests and forwards them to
//!   an upstream provider, normalizing the reply
//! - A voice session that records speech, takes turns through the gateway
//!   and speaks the answers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Voice session                     │
//! │  Recognizer │ SpeechController │ Synthesizer │ Avatar│
//! └────────────────────┬────────────────────────────────┘
//!                      │ POST /api/chat
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Gateway                         │
//! │        FormatAdapter  │  UpstreamClient             │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Upstream provider                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod api;
pub mod avatar;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod upstream;
pub mod voice;

pub use adapter::{ChatMessage, NormalizedResponse, ProxyRequest, Role, UpstreamFormat};
pub use config::{Config, UpstreamConfig, VoiceConfig};
pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayError};
pub use session::{ChatTransport, ConversationSession, HttpChatClient};
pub use upstream::UpstreamClient;
