//! Audio playback for synthesized speech

use std::io::{Cursor, Write};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, Result};

/// Plays a complete WAV clip, resolving when playback ends
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the clip is not valid WAV or playback fails
    async fn play(&self, wav: &[u8]) -> Result<()>;
}

/// Length of a WAV clip
///
/// # Errors
///
/// Returns error if the bytes are not a readable WAV file
pub fn wav_duration(wav: &[u8]) -> Result<Duration> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| Error::Audio(format!("invalid WAV data: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(Error::Audio("WAV sample rate is zero".to_string()));
    }

    let frames = u64::from(reader.duration());
    Ok(Duration::from_millis(frames * 1000 / u64::from(spec.sample_rate)))
}

/// Plays clips through an external player program (e.g. `aplay`, `afplay`)
///
/// The player is killed if the playing future is dropped, so aborting the
/// task interrupts the utterance.
pub struct CommandPlayer {
    program: String,
}

impl CommandPlayer {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl AudioSink for CommandPlayer {
    async fn play(&self, wav: &[u8]) -> Result<()> {
        let duration = wav_duration(wav)?;

        let mut file = tempfile::Builder::new()
            .prefix("talkback-")
            .suffix(".wav")
            .tempfile()?;
        file.write_all(wav)?;
        file.flush()?;

        tracing::debug!(
            player = %self.program,
            bytes = wav.len(),
            duration_ms = duration.as_millis(),
            "playing audio"
        );

        let status = tokio::process::Command::new(&self.program)
            .arg(file.path())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Audio(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            return Err(Error::Audio(format!("{} exited with {status}", self.program)));
        }

        tracing::debug!("playback complete");
        Ok(())
    }
}
