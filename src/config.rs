//! Configuration management for talkback
//!
//! Everything is read once at process start; there is no reload.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::adapter::{AdapterConfig, UpstreamFormat};
use crate::{Error, Result};

/// Default upstream endpoint (Anthropic Messages API)
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com/v1/messages";

/// Default persona prompt sent as the system message
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "あなたは「オールイン番長」です。親しみやすく、時にユーモラスに会話してください。";

/// talkback configuration
#[derive(Debug)]
pub struct Config {
    /// Upstream provider configuration
    pub upstream: UpstreamConfig,

    /// Voice output configuration
    pub voice: VoiceConfig,

    /// Base URL of the gateway, used by the voice session client
    pub gateway_url: String,
}

/// Upstream provider configuration
#[derive(Debug)]
pub struct UpstreamConfig {
    /// Provider endpoint
    pub url: String,

    /// Wire format the provider speaks
    pub format: UpstreamFormat,

    /// Credential (from `ANTHROPIC_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Model sent upstream; when unset the inbound model is used
    pub model: Option<String>,

    pub max_tokens: u32,

    /// Per-request timeout for the upstream call
    pub timeout: Duration,

    pub system_prompt: Option<String>,
}

impl UpstreamConfig {
    /// Request-side adapter settings derived from this config
    #[must_use]
    pub fn adapter(&self) -> AdapterConfig {
        AdapterConfig {
            format: self.format,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Voice output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// VOICEVOX engine base URL
    pub voicevox_url: String,

    /// VOICEVOX speaker ID (3 = Zundamon)
    pub voicevox_speaker: u32,

    /// Speech speed multiplier applied to the VOICEVOX query
    pub voicevox_speed: f64,

    /// On-device synthesizer program (e.g. `espeak-ng`, `say`)
    pub tts_command: String,

    /// Voice passed to the on-device synthesizer
    pub tts_voice: String,

    /// On-device speaking rate in words per minute; `None` keeps the program default
    pub tts_rate: Option<u32>,

    /// On-device pitch (0-99); `None` keeps the program default
    pub tts_pitch: Option<u32>,

    /// Program used to play WAV audio
    pub player_command: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voicevox_url: "http://localhost:50021".to_string(),
            voicevox_speaker: 3,
            voicevox_speed: 1.5,
            tts_command: "espeak-ng".to_string(),
            tts_voice: "ja".to_string(),
            // 1.1x and 1.2x the espeak-ng defaults of 175 wpm and pitch 50
            tts_rate: Some(192),
            tts_pitch: Some(60),
            player_command: "aplay".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if `UPSTREAM_FORMAT` names an unknown format
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns error if `UPSTREAM_FORMAT` names an unknown format
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let format = match var("UPSTREAM_FORMAT") {
            Some(raw) => raw.parse()?,
            None => UpstreamFormat::default(),
        };

        let upstream = UpstreamConfig {
            url: var("UPSTREAM_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            format,
            api_key: var("ANTHROPIC_API_KEY").map(SecretString::from),
            model: var("UPSTREAM_MODEL"),
            max_tokens: parse_or("UPSTREAM_MAX_TOKENS", var("UPSTREAM_MAX_TOKENS"), 1024),
            timeout: Duration::from_secs(parse_or(
                "UPSTREAM_TIMEOUT_SECS",
                var("UPSTREAM_TIMEOUT_SECS"),
                60,
            )),
            system_prompt: Some(
                var("TALKBACK_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
        };

        let defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            voicevox_url: var("VOICEVOX_URL").unwrap_or(defaults.voicevox_url),
            voicevox_speaker: parse_or(
                "VOICEVOX_SPEAKER",
                var("VOICEVOX_SPEAKER"),
                defaults.voicevox_speaker,
            ),
            voicevox_speed: parse_or(
                "VOICEVOX_SPEED",
                var("VOICEVOX_SPEED"),
                defaults.voicevox_speed,
            ),
            tts_command: var("TALKBACK_TTS_COMMAND").unwrap_or(defaults.tts_command),
            tts_voice: var("TALKBACK_TTS_VOICE").unwrap_or(defaults.tts_voice),
            tts_rate: optional_setting(
                "TALKBACK_TTS_RATE",
                var("TALKBACK_TTS_RATE"),
                defaults.tts_rate,
            ),
            tts_pitch: optional_setting(
                "TALKBACK_TTS_PITCH",
                var("TALKBACK_TTS_PITCH"),
                defaults.tts_pitch,
            ),
            player_command: var("TALKBACK_PLAYER").unwrap_or(defaults.player_command),
        };

        Ok(Self {
            upstream,
            voice,
            gateway_url: var("TALKBACK_GATEWAY_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }

    /// Validate that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns error if the upstream URL is not http(s)
    pub fn validate(&self) -> Result<()> {
        let url = &self.upstream.url;
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(Error::Config(format!("upstream URL must be http(s): {url}")));
        }
        if self.upstream.timeout.is_zero() {
            return Err(Error::Config("upstream timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Parse a numeric variable, warning and using the default when invalid
fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
    }
}

/// Like [`parse_or`], but `0` turns the setting off
fn optional_setting(key: &str, raw: Option<String>, default: Option<u32>) -> Option<u32> {
    let Some(raw) = raw else {
        return default;
    };
    match parse_or(key, Some(raw), default.unwrap_or(0)) {
        0 => None,
        value => Some(value),
    }
}
