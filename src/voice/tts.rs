//! Text-to-speech (TTS) backends

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::playback::{AudioSink, CommandPlayer};
use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Speaks text aloud, resolving when the utterance ends
///
/// Dropping the returned future must stop the utterance; the session
/// relies on this to interrupt speech.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Which backend to try first
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceSelection {
    /// The on-device voice
    #[default]
    Device,
    /// A VOICEVOX engine, falling back to the on-device voice
    Voicevox,
}

impl FromStr for VoiceSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" | "default" | "system" => Ok(Self::Device),
            "voicevox" => Ok(Self::Voicevox),
            other => Err(Error::Config(format!("unknown voice backend: {other}"))),
        }
    }
}

/// Build the synthesizer for a selection
#[must_use]
pub fn build_synthesizer(selection: VoiceSelection, config: &VoiceConfig) -> Arc<dyn Synthesizer> {
    let device: Arc<dyn Synthesizer> = Arc::new(
        SystemVoice::new(&config.tts_command, &config.tts_voice)
            .with_rate(config.tts_rate)
            .with_pitch(config.tts_pitch),
    );

    match selection {
        VoiceSelection::Device => device,
        VoiceSelection::Voicevox => {
            let player: Arc<dyn AudioSink> = Arc::new(CommandPlayer::new(&config.player_command));
            let voicevox = Voicevox::new(&config.voicevox_url, player)
                .with_speaker(config.voicevox_speaker)
                .with_speed(config.voicevox_speed);
            Arc::new(FallbackSynthesizer::new(Arc::new(voicevox), device))
        }
    }
}

/// On-device speech through a command such as `espeak-ng` or `say`
///
/// Runs `<program> -v <voice> [-s <rate>] [-p <pitch>] -- <text>`, so the
/// text is always one positional argument even when it starts with `-`.
pub struct SystemVoice {
    program: String,
    voice: String,
    rate: Option<u32>,
    pitch: Option<u32>,
}

impl SystemVoice {
    #[must_use]
    pub fn new(program: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            voice: voice.into(),
            rate: None,
            pitch: None,
        }
    }

    /// Speaking rate passed with `-s`
    #[must_use]
    pub const fn with_rate(mut self, rate: Option<u32>) -> Self {
        self.rate = rate;
        self
    }

    /// Pitch passed with `-p`
    #[must_use]
    pub const fn with_pitch(mut self, pitch: Option<u32>) -> Self {
        self.pitch = pitch;
        self
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = vec!["-v".to_string(), self.voice.clone()];
        if let Some(rate) = self.rate {
            args.extend(["-s".to_string(), rate.to_string()]);
        }
        if let Some(pitch) = self.pitch {
            args.extend(["-p".to_string(), pitch.to_string()]);
        }
        args.extend(["--".to_string(), text.to_string()]);
        args
    }
}

#[async_trait]
impl Synthesizer for SystemVoice {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn speak(&self, text: &str) -> Result<()> {
        tracing::debug!(program = %self.program, voice = %self.voice, chars = text.chars().count(), "speaking");

        let status = tokio::process::Command::new(&self.program)
            .args(self.args(text))
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            return Err(Error::Synthesis(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        Ok(())
    }
}

/// Client for a VOICEVOX engine
///
/// Synthesis is two requests: `audio_query` builds a query for the text,
/// then `synthesis` renders it to WAV.
pub struct Voicevox {
    client: reqwest::Client,
    base_url: String,
    speaker: u32,
    speed: f64,
    player: Arc<dyn AudioSink>,
}

impl Voicevox {
    #[must_use]
    pub fn new(base_url: &str, player: Arc<dyn AudioSink>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            speaker: 3,
            speed: 1.5,
            player,
        }
    }

    #[must_use]
    pub const fn with_speaker(mut self, speaker: u32) -> Self {
        self.speaker = speaker;
        self
    }

    #[must_use]
    pub const fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Render text to WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the engine is unreachable or either request fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let speaker = self.speaker.to_string();

        let response = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("VOICEVOX unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "VOICEVOX audio_query error {}",
                response.status()
            )));
        }

        let mut query: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Synthesis(format!("VOICEVOX audio_query body: {e}")))?;
        if let Some(fields) = query.as_object_mut() {
            fields.insert("speedScale".to_string(), serde_json::json!(self.speed));
        }

        let response = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("VOICEVOX unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "VOICEVOX synthesis error {}",
                response.status()
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for Voicevox {
    fn name(&self) -> &'static str {
        "voicevox"
    }

    async fn speak(&self, text: &str) -> Result<()> {
        let wav = self.synthesize(text).await?;
        tracing::debug!(bytes = wav.len(), speaker = self.speaker, "VOICEVOX audio ready");
        self.player.play(&wav).await
    }
}

/// Tries `primary`, then speaks with `fallback` if it fails
pub struct FallbackSynthesizer {
    primary: Arc<dyn Synthesizer>,
    fallback: Arc<dyn Synthesizer>,
}

impl FallbackSynthesizer {
    #[must_use]
    pub fn new(primary: Arc<dyn Synthesizer>, fallback: Arc<dyn Synthesizer>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Synthesizer for FallbackSynthesizer {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn speak(&self, text: &str) -> Result<()> {
        match self.primary.speak(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "synthesizer failed, falling back"
                );
                self.fallback.speak(text).await
            }
        }
    }
}
