//! Game audio
//!
//! Sound is opt-in and owned by the host's policy: the host decides whether
//! games may make sound and at what master volume, and pushes that policy
//! with `audio_config`. The SDK applies it, clamps whatever the game asks
//! for, and hands finished notes to an [`AudioBackend`] that does the actual
//! synthesis.
//!
//! Games that never play a note of their own get "bloops": a short note per
//! button press, pitched by slot, so every game is audible by default.

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use web_time::Duration;

use super::input::{Button, InputSnapshot};
use crate::{
    constants::{
        audio::{DEFAULT_NOTE_MS, DEFAULT_VELOCITY, MASTER_VOLUME, MAX_NOTE_MS, MIN_NOTE_MS},
        lobby::SLOT_COUNT,
        sdk::BLOOP_THROTTLE_MS,
    },
    protocol::AudioConfig,
    slot::Slot,
};

/// Oscillator shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    /// Pure tone
    #[default]
    Sine,
    /// Square wave
    Square,
    /// Sawtooth wave
    Sawtooth,
    /// Triangle wave
    Triangle,
    /// White noise
    Noise,
}

/// A note request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Note {
    /// MIDI note number; 69 is A4
    pub note: f64,
    /// Loudness, `0..=1`
    pub velocity: f64,
    /// Length in milliseconds
    pub duration_ms: u32,
    /// Oscillator
    pub instrument: Instrument,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            note: 60.0,
            velocity: DEFAULT_VELOCITY,
            duration_ms: DEFAULT_NOTE_MS,
            instrument: Instrument::Sine,
        }
    }
}

impl Note {
    /// Frequency of the note in hertz; non-finite notes play A4
    pub fn frequency_hz(&self) -> f64 {
        if self.note.is_finite() {
            440.0 * 2f64.powf((self.note - 69.0) / 12.0)
        } else {
            440.0
        }
    }

    /// The note with duration and velocity forced into range
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            velocity: clamp01(self.velocity, DEFAULT_VELOCITY),
            duration_ms: self.duration_ms.clamp(MIN_NOTE_MS, MAX_NOTE_MS),
            ..self
        }
    }
}

/// Clamps to `0..=1`, using `default` for non-finite input
pub fn clamp01(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        default
    }
}

/// Sound output, implemented by the embedder
pub trait AudioBackend {
    /// Tries to start the output; returns whether it is running
    ///
    /// Platforms may refuse outside a user gesture.
    fn arm(&mut self) -> bool;

    /// Sets the master gain
    fn set_master_volume(&mut self, volume: f64);

    /// Plays an already clamped note
    fn play(&mut self, note: &Note);
}

/// The SDK's audio state
#[derive(Debug, Clone)]
pub struct Audio<A> {
    backend: A,
    enabled: bool,
    master_volume: f64,
    armed: bool,
    custom: bool,
}

impl<A: AudioBackend> Audio<A> {
    /// Enabled at the default master volume until the host says otherwise
    pub fn new(backend: A) -> Self {
        Self {
            backend,
            enabled: true,
            master_volume: MASTER_VOLUME,
            armed: false,
            custom: false,
        }
    }

    /// Applies a policy push; absent fields are left alone
    pub fn apply(&mut self, config: AudioConfig) {
        if let Some(enabled) = config.enabled {
            self.enabled = enabled;
        }
        if let Some(volume) = config.master_volume {
            self.master_volume = clamp01(volume, MASTER_VOLUME);
            self.backend.set_master_volume(self.master_volume);
        }
    }

    /// Asks the backend to start
    pub fn arm(&mut self) {
        if self.backend.arm() {
            self.armed = true;
        }
    }

    /// Plays a note requested by the game
    ///
    /// Dropped while audio is disabled. Playing marks the game as having its
    /// own audio, which turns the bloops off for good.
    pub fn play_note(&mut self, note: Note) -> bool {
        if !self.enabled {
            return false;
        }
        self.custom = true;
        self.backend.play(&note.clamped());
        true
    }

    /// Plays a fallback bloop; bloops never count as the game's own audio
    pub(super) fn bloop(&mut self, note: Note) {
        if self.enabled {
            self.backend.play(&note.clamped());
        }
    }

    /// Whether games may make sound
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current master volume
    pub fn master_volume(&self) -> f64 {
        self.master_volume
    }

    /// Whether the backend has started
    pub fn armed(&self) -> bool {
        self.armed
    }

    /// Whether the game has played its own notes
    pub fn custom(&self) -> bool {
        self.custom
    }

    /// The backend
    pub fn backend(&self) -> &A {
        &self.backend
    }
}

/// Buttons that bloop, in priority order
const BLOOP_BUTTONS: [Button; 12] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::L1,
    Button::R1,
    Button::Select,
    Button::Start,
    Button::DUp,
    Button::DDown,
    Button::DLeft,
    Button::DRight,
];

const BLOOP_BASE_NOTES: [f64; SLOT_COUNT] = [60.0, 64.0, 67.0, 72.0];

fn bloop_offset(button: Button) -> f64 {
    match button {
        Button::East => 2.0,
        Button::West => -2.0,
        Button::North => 4.0,
        b if b.is_dpad() => -5.0,
        _ => 0.0,
    }
}

/// Per-slot press tracking for bloops
#[derive(Debug, Clone, Default)]
pub struct Bloops {
    held: EnumMap<Slot, EnumMap<Button, bool>>,
    last_bloop: EnumMap<Slot, Option<Duration>>,
}

impl Bloops {
    /// Compares `snapshot` with the previous one for `slot`
    ///
    /// Returns a note on the first newly pressed button, unless the slot
    /// blooped less than the throttle interval ago.
    pub fn observe(&mut self, slot: Slot, snapshot: &InputSnapshot, now: Duration) -> Option<Note> {
        let held =
            EnumMap::from_fn(|button: Button| !button.is_analog() && snapshot.pressed(button));
        let previous = std::mem::replace(&mut self.held[slot], held);

        let edge = BLOOP_BUTTONS
            .into_iter()
            .find(|button| held[*button] && !previous[*button])?;

        let throttle = Duration::from_millis(BLOOP_THROTTLE_MS);
        if self.last_bloop[slot].is_some_and(|at| now.saturating_sub(at) < throttle) {
            debug!(%slot, "bloop throttled");
            return None;
        }
        self.last_bloop[slot] = Some(now);

        Some(Note {
            note: BLOOP_BASE_NOTES[slot.index()] + bloop_offset(edge),
            velocity: 0.25,
            duration_ms: 60,
            instrument: Instrument::Triangle,
        })
    }
}
