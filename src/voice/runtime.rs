//! Async driver for a voice session
//!
//! [`VoiceSession`] feeds events into the [`SpeechController`] and carries out
//! the commands it returns: probing the microphone, running the recognizer,
//! submitting turns and speaking replies. The conversation is moved into the
//! task running the current turn and handed back when the turn resolves.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::controller::{Speaker, SpeechCommand, SpeechController, SpeechEvent, SpeechState};
use super::recognition::{MicrophoneAccess, Recognizer};
use super::tts::Synthesizer;
use crate::session::ConversationSession;

/// Capacity of the UI update channel
const UI_CHANNEL_CAPACITY: usize = 64;

/// Something the interface should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    /// Replace the status line
    Status(String),
    /// Append a conversation log line
    Log { speaker: Speaker, text: String },
    /// Replace the interim transcript; empty clears it
    Interim(String),
    /// Show a failure on the status line
    Error(String),
}

/// Cloneable handle for driving a running [`VoiceSession`]
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SpeechEvent>,
    state: watch::Receiver<SpeechState>,
    ui: broadcast::Sender<UiUpdate>,
}

impl SessionHandle {
    /// Deliver an event; returns false once the session has stopped
    pub fn send(&self, event: SpeechEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Press the record button
    pub fn start(&self) -> bool {
        self.send(SpeechEvent::StartRequested)
    }

    /// Release the record button
    pub fn stop(&self) -> bool {
        self.send(SpeechEvent::StopRequested)
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SpeechState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SpeechState> {
        self.state.clone()
    }

    /// Subscribe to interface updates
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiUpdate> {
        self.ui.subscribe()
    }
}

/// Sender for events raised by the session's own tasks
///
/// Weak so that the session ends once every [`SessionHandle`] is dropped.
type WeakEvents = mpsc::WeakUnboundedSender<SpeechEvent>;

/// Channels the run loop waits on
struct Inbox {
    events: mpsc::UnboundedReceiver<SpeechEvent>,
    turns: mpsc::UnboundedReceiver<(ConversationSession, String)>,
    utterances: mpsc::UnboundedReceiver<u64>,
}

/// State and collaborators owned by the run loop
struct Driver {
    controller: SpeechController,
    conversation: Option<ConversationSession>,
    microphone: Arc<dyn MicrophoneAccess>,
    recognizer: Arc<dyn Recognizer>,
    synthesizer: Arc<dyn Synthesizer>,
    events: WeakEvents,
    turns: mpsc::UnboundedSender<(ConversationSession, String)>,
    utterances: mpsc::UnboundedSender<u64>,
    state: watch::Sender<SpeechState>,
    ui: broadcast::Sender<UiUpdate>,
    speech: Option<JoinHandle<()>>,
    utterance: u64,
}

/// One voice conversation: controller, conversation and I/O backends
pub struct VoiceSession {
    driver: Driver,
    inbox: Inbox,
}

impl VoiceSession {
    /// Assemble a session and the handle that drives it
    #[must_use]
    pub fn new(
        conversation: ConversationSession,
        microphone: Arc<dyn MicrophoneAccess>,
        recognizer: Arc<dyn Recognizer>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (turns_tx, turns_rx) = mpsc::unbounded_channel();
        let (utterances_tx, utterances_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SpeechState::Idle);
        let (ui_tx, _) = broadcast::channel(UI_CHANNEL_CAPACITY);

        let handle = SessionHandle {
            events: events_tx.clone(),
            state: state_rx,
            ui: ui_tx.clone(),
        };

        let session = Self {
            driver: Driver {
                controller: SpeechController::new(),
                conversation: Some(conversation),
                microphone,
                recognizer,
                synthesizer,
                events: events_tx.downgrade(),
                turns: turns_tx,
                utterances: utterances_tx,
                state: state_tx,
                ui: ui_tx,
                speech: None,
                utterance: 0,
            },
            inbox: Inbox {
                events: events_rx,
                turns: turns_rx,
                utterances: utterances_rx,
            },
        };

        (session, handle)
    }

    /// Spawn the run loop onto the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process events until every [`SessionHandle`] is dropped
    pub async fn run(self) {
        let Self {
            mut driver,
            mut inbox,
        } = self;

        tracing::info!(synthesizer = driver.synthesizer.name(), "voice session started");
        driver.publish_status();

        loop {
            tokio::select! {
                event = inbox.events.recv() => match event {
                    Some(event) => driver.apply(event).await,
                    None => break,
                },
                Some((conversation, reply)) = inbox.turns.recv() => {
                    driver.conversation = Some(conversation);
                    driver.apply(SpeechEvent::ReplyReady(reply)).await;
                }
                Some(id) = inbox.utterances.recv() => {
                    if id == driver.utterance {
                        driver.speech = None;
                        driver.apply(SpeechEvent::SpeechFinished).await;
                    } else {
                        tracing::debug!(id, "stale utterance completion ignored");
                    }
                }
            }
        }

        driver.shutdown().await;
        tracing::info!("voice session ended");
    }
}

impl Driver {
    /// Run an event and any follow-up events it causes
    async fn apply(&mut self, event: SpeechEvent) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let before = self.controller.state();
            let commands = self.controller.handle(event);

            if self.controller.state() != before {
                if before == SpeechState::Recording {
                    self.emit(UiUpdate::Interim(String::new()));
                }
                self.publish_status();
            }

            for command in commands {
                if let Some(follow_up) = self.execute(command).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, command: SpeechCommand) -> Option<SpeechEvent> {
        match command {
            SpeechCommand::AcquireMicrophone => {
                let microphone = Arc::clone(&self.microphone);
                let events = self.events.clone();
                tokio::spawn(async move {
                    let event = match microphone.probe().await {
                        Ok(()) => SpeechEvent::PermissionGranted,
                        Err(e) => SpeechEvent::PermissionDenied(e.to_string()),
                    };
                    if let Some(events) = events.upgrade() {
                        let _ = events.send(event);
                    }
                });
                None
            }
            SpeechCommand::StartRecognition => {
                let sink = self.events.upgrade()?;
                match self.recognizer.start(sink).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to start recognition");
                        Some(SpeechEvent::RecognitionFailed(e.to_string()))
                    }
                }
            }
            SpeechCommand::StopRecognition => {
                self.recognizer.stop().await;
                None
            }
            SpeechCommand::ShowInterim(text) => {
                self.emit(UiUpdate::Interim(text));
                None
            }
            SpeechCommand::AppendLog { speaker, text } => {
                self.emit(UiUpdate::Log { speaker, text });
                None
            }
            SpeechCommand::Submit(text) => {
                self.submit(text);
                None
            }
            SpeechCommand::Speak(text) => {
                self.speak(text);
                None
            }
            SpeechCommand::CancelSpeech => {
                self.cancel_speech();
                None
            }
            SpeechCommand::ReportError(message) => {
                self.emit(UiUpdate::Error(message));
                None
            }
        }
    }

    fn submit(&mut self, text: String) {
        let Some(mut conversation) = self.conversation.take() else {
            tracing::error!("turn submitted while another is in flight");
            return;
        };

        let turns = self.turns.clone();
        tokio::spawn(async move {
            let reply = conversation.submit(&text).await;
            let _ = turns.send((conversation, reply));
        });
    }

    fn speak(&mut self, text: String) {
        self.cancel_speech();

        let id = self.utterance;
        let synthesizer = Arc::clone(&self.synthesizer);
        let utterances = self.utterances.clone();
        self.speech = Some(tokio::spawn(async move {
            if let Err(e) = synthesizer.speak(&text).await {
                tracing::warn!(backend = synthesizer.name(), error = %e, "speech failed");
            }
            let _ = utterances.send(id);
        }));
    }

    /// Abort the current utterance and invalidate its completion
    fn cancel_speech(&mut self) {
        if let Some(task) = self.speech.take() {
            task.abort();
            tracing::debug!(id = self.utterance, "utterance interrupted");
        }
        self.utterance = self.utterance.wrapping_add(1);
    }

    fn publish_status(&self) {
        let state = self.controller.state();
        self.state.send_replace(state);
        self.emit(UiUpdate::Status(state.status_text().to_string()));
    }

    fn emit(&self, update: UiUpdate) {
        // No subscribers is fine
        let _ = self.ui.send(update);
    }

    async fn shutdown(&mut self) {
        self.cancel_speech();
        self.recognizer.stop().await;
    }
}
