//! Speech state machine
//!
//! [`SpeechController`] is a pure transition table: it consumes named
//! [`SpeechEvent`]s and answers with [`SpeechCommand`]s for the runtime to
//! carry out. It never performs I/O itself, so every transition can be
//! exercised without audio hardware or a network.

use super::recognition::recognition_error_message;
use super::sanitize::sanitize_for_speech;

/// Current phase of the voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechState {
    /// Waiting for the user
    #[default]
    Idle,
    /// Capturing speech
    Recording,
    /// Waiting for the assistant's reply
    Thinking,
    /// Speaking the reply
    Speaking,
}

impl SpeechState {
    /// Status line shown for this state
    #[must_use]
    pub const fn status_text(self) -> &'static str {
        match self {
            Self::Idle => "待機中...",
            Self::Recording => "聞いています...",
            Self::Thinking => "考え中...",
            Self::Speaking => "話しています...",
        }
    }
}

/// Something that happened, from the user, a recognizer, or the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// User asked to start recording
    StartRequested,
    /// User asked to stop recording
    StopRequested,
    /// Microphone probe succeeded
    PermissionGranted,
    /// Microphone probe failed
    PermissionDenied(String),
    /// Recognizer produced a transcript
    Transcript { text: String, is_final: bool },
    /// Recognizer finished on its own
    RecognitionEnded,
    /// Recognizer failed with an error code
    RecognitionFailed(String),
    /// The turn resolved; carries the text to display
    ReplyReady(String),
    /// Synthesizer finished the current utterance
    SpeechFinished,
}

/// Who a log line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// Work for the runtime to carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCommand {
    /// Probe the microphone, answering with a permission event
    AcquireMicrophone,
    StartRecognition,
    StopRecognition,
    /// Replace the interim transcript display
    ShowInterim(String),
    /// Append a line to the visible conversation log
    AppendLog { speaker: Speaker, text: String },
    /// Hand a final transcript to the conversation session
    Submit(String),
    /// Speak sanitized text, replacing any current utterance
    Speak(String),
    /// Interrupt the current utterance
    CancelSpeech,
    /// Show a failure on the status line
    ReportError(String),
}

/// Transition table for one voice session
#[derive(Debug, Default)]
pub struct SpeechController {
    state: SpeechState,
    /// A microphone probe is outstanding
    awaiting_permission: bool,
    /// Latest interim transcript for the current recording
    interim: String,
}

impl SpeechController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> SpeechState {
        self.state
    }

    /// Latest interim transcript while recording
    #[must_use]
    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Apply an event and return the commands it produces
    pub fn handle(&mut self, event: SpeechEvent) -> Vec<SpeechCommand> {
        use SpeechCommand as Cmd;
        use SpeechEvent as Ev;
        use SpeechState as St;

        match (self.state, event) {
            (St::Idle, Ev::StartRequested) if !self.awaiting_permission => {
                self.awaiting_permission = true;
                vec![Cmd::AcquireMicrophone]
            }
            (St::Speaking, Ev::StartRequested) => {
                self.state = St::Idle;
                self.awaiting_permission = true;
                vec![Cmd::CancelSpeech, Cmd::AcquireMicrophone]
            }

            (St::Idle, Ev::PermissionGranted) if self.awaiting_permission => {
                self.awaiting_permission = false;
                self.interim.clear();
                self.state = St::Recording;
                vec![Cmd::StartRecognition]
            }
            (St::Idle, Ev::StopRequested) if self.awaiting_permission => {
                self.awaiting_permission = false;
                Vec::new()
            }
            (St::Idle, Ev::PermissionDenied(reason)) if self.awaiting_permission => {
                self.awaiting_permission = false;
                tracing::warn!(%reason, "microphone access denied");
                vec![Cmd::ReportError(format!(
                    "マイクへのアクセスが許可されませんでした: {reason}"
                ))]
            }

            (St::Recording, Ev::Transcript { text, is_final: false }) => {
                self.interim.clone_from(&text);
                vec![Cmd::ShowInterim(text)]
            }
            (St::Recording, Ev::Transcript { text, is_final: true }) => {
                self.interim.clear();
                let text = text.trim().to_string();
                if text.is_empty() {
                    self.state = St::Idle;
                    vec![Cmd::StopRecognition]
                } else {
                    self.state = St::Thinking;
                    vec![
                        Cmd::StopRecognition,
                        Cmd::AppendLog {
                            speaker: Speaker::User,
                            text: text.clone(),
                        },
                        Cmd::Submit(text),
                    ]
                }
            }
            (St::Recording, Ev::StopRequested) => {
                self.interim.clear();
                self.state = St::Idle;
                vec![Cmd::StopRecognition]
            }
            (St::Recording, Ev::RecognitionEnded) => {
                self.interim.clear();
                self.state = St::Idle;
                Vec::new()
            }
            (St::Recording, Ev::RecognitionFailed(code)) => {
                self.interim.clear();
                self.state = St::Idle;
                tracing::warn!(%code, "speech recognition error");
                vec![Cmd::ReportError(format!(
                    "エラー: {}",
                    recognition_error_message(&code)
                ))]
            }

            (St::Thinking, Ev::ReplyReady(text)) => {
                let spoken = sanitize_for_speech(&text);
                let log = Cmd::AppendLog {
                    speaker: Speaker::Assistant,
                    text,
                };
                if spoken.is_empty() {
                    self.state = St::Idle;
                    vec![log]
                } else {
                    self.state = St::Speaking;
                    vec![log, Cmd::Speak(spoken)]
                }
            }

            (St::Speaking, Ev::SpeechFinished) => {
                self.state = St::Idle;
                Vec::new()
            }

            (state, event) => {
                tracing::debug!(?state, ?event, "event ignored");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> SpeechController {
        let mut controller = SpeechController::new();
        controller.handle(SpeechEvent::StartRequested);
        controller.handle(SpeechEvent::PermissionGranted);
        assert_eq!(controller.state(), SpeechState::Recording);
        controller
    }

    fn final_transcript(text: &str) -> SpeechEvent {
        SpeechEvent::Transcript {
            text: text.to_string(),
            is_final: true,
        }
    }

    fn submits(commands: &[SpeechCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, SpeechCommand::Submit(_)))
            .count()
    }

    #[test]
    fn start_waits_for_microphone() {
        let mut controller = SpeechController::new();

        let commands = controller.handle(SpeechEvent::StartRequested);

        assert_eq!(commands, vec![SpeechCommand::AcquireMicrophone]);
        assert_eq!(controller.state(), SpeechState::Idle);

        // A second start while the probe is outstanding does nothing
        assert!(controller.handle(SpeechEvent::StartRequested).is_empty());

        let commands = controller.handle(SpeechEvent::PermissionGranted);
        assert_eq!(commands, vec![SpeechCommand::StartRecognition]);
        assert_eq!(controller.state(), SpeechState::Recording);
    }

    #[test]
    fn denied_permission_stays_idle() {
        let mut controller = SpeechController::new();
        controller.handle(SpeechEvent::StartRequested);

        let commands = controller.handle(SpeechEvent::PermissionDenied("denied".to_string()));

        assert_eq!(controller.state(), SpeechState::Idle);
        assert!(matches!(&commands[..], [SpeechCommand::ReportError(m)] if m.contains("denied")));

        // Recognition never starts, and a new start is allowed again
        assert_eq!(
            controller.handle(SpeechEvent::StartRequested),
            vec![SpeechCommand::AcquireMicrophone]
        );
    }

    #[test]
    fn stop_during_permission_check_cancels_start() {
        let mut controller = SpeechController::new();
        controller.handle(SpeechEvent::StartRequested);

        assert!(controller.handle(SpeechEvent::StopRequested).is_empty());
        assert!(controller.handle(SpeechEvent::PermissionGranted).is_empty());
        assert_eq!(controller.state(), SpeechState::Idle);

        assert_eq!(
            controller.handle(SpeechEvent::StartRequested),
            vec![SpeechCommand::AcquireMicrophone]
        );
    }

    #[test]
    fn unsolicited_permission_is_ignored() {
        let mut controller = SpeechController::new();

        assert!(controller.handle(SpeechEvent::PermissionGranted).is_empty());
        assert_eq!(controller.state(), SpeechState::Idle);
    }

    #[test]
    fn interim_results_do_not_submit() {
        let mut controller = recording();

        let commands = controller.handle(SpeechEvent::Transcript {
            text: "こん".to_string(),
            is_final: false,
        });

        assert_eq!(commands, vec![SpeechCommand::ShowInterim("こん".to_string())]);
        assert_eq!(controller.interim(), "こん");
        assert_eq!(controller.state(), SpeechState::Recording);
    }

    #[test]
    fn stop_before_final_cancels_capture() {
        let mut controller = recording();
        controller.handle(SpeechEvent::Transcript {
            text: "途中".to_string(),
            is_final: false,
        });

        let commands = controller.handle(SpeechEvent::StopRequested);

        assert_eq!(commands, vec![SpeechCommand::StopRecognition]);
        assert_eq!(controller.state(), SpeechState::Idle);
        assert!(controller.interim().is_empty());

        // Late results after the stop are dropped
        assert_eq!(submits(&controller.handle(final_transcript("遅い"))), 0);
    }

    #[test]
    fn final_transcript_submits_exactly_once() {
        let mut controller = recording();

        let commands = controller.handle(final_transcript(" こんにちは "));

        assert_eq!(controller.state(), SpeechState::Thinking);
        assert_eq!(
            commands,
            vec![
                SpeechCommand::StopRecognition,
                SpeechCommand::AppendLog {
                    speaker: Speaker::User,
                    text: "こんにちは".to_string()
                },
                SpeechCommand::Submit("こんにちは".to_string()),
            ]
        );

        // A duplicate final and the recognizer's end event change nothing
        assert_eq!(submits(&controller.handle(final_transcript("こんにちは"))), 0);
        assert!(controller.handle(SpeechEvent::RecognitionEnded).is_empty());
        assert_eq!(controller.state(), SpeechState::Thinking);
    }

    #[test]
    fn blank_final_transcript_returns_to_idle() {
        let mut controller = recording();

        let commands = controller.handle(final_transcript("   "));

        assert_eq!(commands, vec![SpeechCommand::StopRecognition]);
        assert_eq!(controller.state(), SpeechState::Idle);
    }

    #[test]
    fn recognition_end_returns_to_idle() {
        let mut controller = recording();

        assert!(controller.handle(SpeechEvent::RecognitionEnded).is_empty());
        assert_eq!(controller.state(), SpeechState::Idle);
    }

    #[test]
    fn recognition_errors_use_message_table() {
        let mut controller = recording();

        let commands = controller.handle(SpeechEvent::RecognitionFailed("no-speech".to_string()));
        assert_eq!(
            commands,
            vec![SpeechCommand::ReportError(
                "エラー: 音声が検出されませんでした".to_string()
            )]
        );
        assert_eq!(controller.state(), SpeechState::Idle);

        let mut controller = recording();
        let commands = controller.handle(SpeechEvent::RecognitionFailed("weird".to_string()));
        assert_eq!(
            commands,
            vec![SpeechCommand::ReportError("エラー: weird".to_string())]
        );
    }

    #[test]
    fn reply_is_logged_raw_and_spoken_sanitized() {
        let mut controller = recording();
        controller.handle(final_transcript("やあ"));

        let commands = controller.handle(SpeechEvent::ReplyReady("**元気**だよ🎉".to_string()));

        assert_eq!(controller.state(), SpeechState::Speaking);
        assert_eq!(
            commands,
            vec![
                SpeechCommand::AppendLog {
                    speaker: Speaker::Assistant,
                    text: "**元気**だよ🎉".to_string()
                },
                SpeechCommand::Speak("元気だよ".to_string()),
            ]
        );

        assert!(controller.handle(SpeechEvent::SpeechFinished).is_empty());
        assert_eq!(controller.state(), SpeechState::Idle);
    }

    #[test]
    fn unspeakable_reply_skips_speech() {
        let mut controller = recording();
        controller.handle(final_transcript("やあ"));

        let commands = controller.handle(SpeechEvent::ReplyReady("👍".to_string()));

        assert_eq!(controller.state(), SpeechState::Idle);
        assert!(!commands.iter().any(|c| matches!(c, SpeechCommand::Speak(_))));
    }

    #[test]
    fn start_while_speaking_interrupts() {
        let mut controller = recording();
        controller.handle(final_transcript("やあ"));
        controller.handle(SpeechEvent::ReplyReady("はい".to_string()));

        let commands = controller.handle(SpeechEvent::StartRequested);

        assert_eq!(
            commands,
            vec![SpeechCommand::CancelSpeech, SpeechCommand::AcquireMicrophone]
        );
        assert_eq!(controller.state(), SpeechState::Idle);

        // The interrupted utterance's completion arrives late and is ignored
        assert!(controller.handle(SpeechEvent::SpeechFinished).is_empty());
    }

    #[test]
    fn start_while_thinking_is_ignored() {
        let mut controller = recording();
        controller.handle(final_transcript("やあ"));

        assert!(controller.handle(SpeechEvent::StartRequested).is_empty());
        assert_eq!(controller.state(), SpeechState::Thinking);
    }

    #[test]
    fn status_text_per_state() {
        assert_eq!(SpeechState::Idle.status_text(), "待機中...");
        assert_eq!(SpeechState::Recording.status_text(), "聞いています...");
        assert_eq!(SpeechState::Thinking.status_text(), "考え中...");
        assert_eq!(SpeechState::Speaking.status_text(), "話しています...");
    }
}
