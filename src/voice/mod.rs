//! Voice session: speech capture, the turn state machine and synthesis
//!
//! The [`SpeechController`] decides what happens next; the [`VoiceSession`]
//! runtime performs it against pluggable recognizers and synthesizers.

mod controller;
mod playback;
mod recognition;
mod runtime;
mod sanitize;
mod tts;

pub use controller::{Speaker, SpeechCommand, SpeechController, SpeechEvent, SpeechState};
pub use playback::{AudioSink, CommandPlayer, wav_duration};
pub use recognition::{
    EventSink, KeyboardInput, MicrophoneAccess, Recognizer, recognition_error_message,
};
pub use runtime::{SessionHandle, UiUpdate, VoiceSession};
pub use sanitize::sanitize_for_speech;
pub use tts::{
    FallbackSynthesizer, Synthesizer, SystemVoice, VoiceSelection, Voicevox, build_synthesizer,
};
