//! Avatar animation driven by the voice session state
//!
//! The avatar only observes [`SpeechState`]: its mouth moves while the
//! session is speaking, and it blinks on a random timer regardless of state.

use std::f64::consts::TAU;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::voice::SpeechState;

/// Delay before the first blink
pub const FIRST_BLINK: Duration = Duration::from_millis(1000);

/// Shortest gap between blinks
pub const BLINK_MIN_GAP: Duration = Duration::from_millis(2000);

/// Longest gap between blinks
pub const BLINK_MAX_GAP: Duration = Duration::from_millis(5000);

/// How long the eyes stay closed
pub const BLINK_DURATION: Duration = Duration::from_millis(150);

/// Mouth cycles per second while speaking
pub const MOUTH_FREQUENCY_HZ: f64 = 4.0;

/// Roughly 30 frames per second
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// One rendered pose
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AvatarFrame {
    /// 0.0 is closed, 1.0 fully open
    pub mouth_open: f32,
    pub eyes_closed: bool,
}

/// Mouth openness after speaking for `elapsed`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn mouth_openness(elapsed: Duration) -> f32 {
    (TAU * MOUTH_FREQUENCY_HZ * elapsed.as_secs_f64()).sin().abs() as f32
}

/// Random blink schedule
pub struct Blinker {
    rng: StdRng,
    next_blink: Duration,
    open_at: Duration,
}

impl Blinker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic schedule for a seed
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            next_blink: FIRST_BLINK,
            open_at: Duration::ZERO,
        }
    }

    /// Whether the eyes are closed at `now`, measured from animation start
    ///
    /// `now` must not go backwards between calls.
    pub fn eyes_closed(&mut self, now: Duration) -> bool {
        if now >= self.next_blink {
            self.open_at = now + BLINK_DURATION;
            self.next_blink = now + self.rng.gen_range(BLINK_MIN_GAP..=BLINK_MAX_GAP);
        }
        now < self.open_at
    }
}

impl Default for Blinker {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame generator combining the blink timer and the mouth phase
pub struct Avatar {
    blinker: Blinker,
    speaking_since: Option<Duration>,
}

impl Avatar {
    #[must_use]
    pub const fn new(blinker: Blinker) -> Self {
        Self {
            blinker,
            speaking_since: None,
        }
    }

    /// Pose at `now` for the given session state
    pub fn frame(&mut self, now: Duration, state: SpeechState) -> AvatarFrame {
        let mouth_open = if state == SpeechState::Speaking {
            let since = *self.speaking_since.get_or_insert(now);
            mouth_openness(now.saturating_sub(since))
        } else {
            self.speaking_since = None;
            0.0
        };

        AvatarFrame {
            mouth_open,
            eyes_closed: self.blinker.eyes_closed(now),
        }
    }
}

/// Animate the avatar from a session's state
///
/// Frames are published until the state sender or every frame receiver is
/// dropped.
#[must_use]
pub fn spawn_avatar(
    mut state: watch::Receiver<SpeechState>,
) -> (watch::Receiver<AvatarFrame>, JoinHandle<()>) {
    let (frames_tx, frames_rx) = watch::channel(AvatarFrame::default());

    let task = tokio::spawn(async move {
        let mut avatar = Avatar::new(Blinker::new());
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let start = tokio::time::Instant::now();

        loop {
            ticker.tick().await;
            if state.has_changed().is_err() || frames_tx.is_closed() {
                break;
            }

            let current = *state.borrow_and_update();
            let frame = avatar.frame(start.elapsed(), current);
            frames_tx.send_if_modified(|previous| {
                let changed = *previous != frame;
                *previous = frame;
                changed
            });
        }

        tracing::debug!("avatar animation stopped");
    });

    (frames_rx, task)
}
