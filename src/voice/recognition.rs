//! Speech capture: microphone access, recognizers and their error codes

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::SpeechEvent;
use crate::Result;

/// Where recognizers deliver their events
pub type EventSink = mpsc::UnboundedSender<SpeechEvent>;

/// User-facing message for a recognition error code
///
/// Unknown codes are shown as-is.
#[must_use]
pub fn recognition_error_message(code: &str) -> &str {
    match code {
        "no-speech" => "音声が検出されませんでした",
        "aborted" => "音声認識が中断されました",
        "audio-capture" => "マイクが見つかりません",
        "network" => "ネットワークエラーが発生しました",
        "not-allowed" => "マイクの使用が許可されていません",
        "service-not-allowed" => "音声認識サービスが利用できません",
        "bad-grammar" => "認識文法に誤りがあります",
        "language-not-supported" => "この言語には対応していません",
        other => other,
    }
}

/// Checks that the microphone can be opened
///
/// The probe opens and immediately releases an input stream; its only
/// purpose is to surface a permission failure before recognition starts.
#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::Error::Permission`] if access is denied or no device exists
    async fn probe(&self) -> Result<()>;
}

/// A speech recognizer producing [`SpeechEvent::Transcript`] events
///
/// Recognizers report interim and final transcripts, then
/// [`SpeechEvent::RecognitionEnded`] or [`SpeechEvent::RecognitionFailed`].
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Begin a recognition session delivering events to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the recognizer cannot start
    async fn start(&self, sink: EventSink) -> Result<()>;

    /// End the current recognition session, if any
    async fn stop(&self);
}

/// Typed lines stand in for speech
///
/// Each recognition session consumes one line: a non-empty line is a final
/// transcript, an empty line ends the session without one. Input never needs
/// a permission check.
pub struct KeyboardInput {
    lines: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardInput {
    #[must_use]
    pub fn new(lines: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Arc::new(tokio::sync::Mutex::new(lines)),
            active: Mutex::new(None),
        }
    }

    fn replace_active(&self, task: Option<JoinHandle<()>>) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *active, task) {
            previous.abort();
        }
    }
}

#[async_trait]
impl MicrophoneAccess for KeyboardInput {
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Recognizer for KeyboardInput {
    async fn start(&self, sink: EventSink) -> Result<()> {
        let lines = Arc::clone(&self.lines);
        let task = tokio::spawn(async move {
            let line = lines.lock().await.recv().await;
            let event = match line {
                Some(text) if text.trim().is_empty() => SpeechEvent::RecognitionEnded,
                Some(text) => SpeechEvent::Transcript {
                    text: text.trim().to_string(),
                    is_final: true,
                },
                None => SpeechEvent::RecognitionFailed("aborted".to_string()),
            };
            let _ = sink.send(event);
        });
        self.replace_active(Some(task));
        Ok(())
    }

    async fn stop(&self) {
        self.replace_active(None);
    }
}
