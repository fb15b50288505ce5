//! The in-frame game SDK
//!
//! [`Sdk`] is what a game links against. It answers the host's handshake,
//! normalizes controller input per slot, tracks the run clock, applies the
//! host's audio policy and reports the final scores. When no host answers it
//! switches to a keyboard-driven mock context so the game still runs on its
//! own.
//!
//! Like the lobby, the SDK does no IO of its own: messages from the host come
//! in through [`Sdk::receive_message`], alarms through [`Sdk::receive_alarm`],
//! and keyboard and pointer events through the `key_*` and
//! [`Sdk::pointer_down`] methods.

pub mod audio;
pub mod handshake;
pub mod input;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use web_time::Duration;

use self::{
    audio::{Audio, AudioBackend, Bloops, Note},
    handshake::{Context, ReadyHandshake},
    input::{InputNormalizer, InputSnapshot},
};
use crate::{
    config::SdkOptions,
    constants::{
        lobby::SLOT_COUNT,
        sdk::{UNKNOWN_TIME_REMAINING_MS, VERSION},
    },
    gamepad::GamepadSource,
    protocol::{
        self, EndReason, GameEndPayload, GameMessage, HostMessage, ReadyPayload, TickPayload,
    },
    scheduler::{Scheduler, TimerQueue, TimerToken},
    slot::Slot,
    tunnel::Tunnel,
};

/// Alarms the SDK schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdkAlarm {
    /// No `init` arrived in time
    MockFallback,
}

/// Pads or truncates game scores to one per slot
pub fn scores_by_slot(scores: &[f64]) -> [f64; SLOT_COUNT] {
    let mut padded = [0.0; SLOT_COUNT];
    for (slot, score) in padded.iter_mut().zip(scores) {
        *slot = *score;
    }
    padded
}

/// The game-side context object
#[derive(Debug)]
pub struct Sdk<H, C, A, P> {
    options: SdkOptions,
    host: H,
    scheduler: C,
    gamepads: P,

    handshake: ReadyHandshake,
    input: InputNormalizer,
    audio: Audio<A>,
    bloops: Bloops,

    fallback: Option<TimerToken>,
    last_tick: Option<TickPayload>,
    forced_end: Option<EndReason>,
}

impl<H, C, A, P> Sdk<H, C, A, P>
where
    H: Tunnel<GameMessage>,
    C: Scheduler<SdkAlarm>,
    A: AudioBackend,
    P: GamepadSource,
{
    /// Starts the SDK and its mock fallback timer
    ///
    /// A standalone game boots mock mode right away.
    pub fn new(options: SdkOptions, host: H, mut scheduler: C, backend: A, gamepads: P) -> Self {
        let fallback = options
            .embedded
            .then(|| scheduler.set_timeout(SdkAlarm::MockFallback, options.ready_fallback()));

        let mut sdk = Self {
            options,
            host,
            scheduler,
            gamepads,
            handshake: ReadyHandshake::new(),
            input: InputNormalizer::new(),
            audio: Audio::new(backend),
            bloops: Bloops::default(),
            fallback,
            last_tick: None,
            forced_end: None,
        };
        if !sdk.options.embedded {
            sdk.handshake.boot_mock();
        }
        sdk
    }

    /// Runs `handler` with the context once the game is ready
    pub fn on_ready(&mut self, handler: impl FnOnce(&Context) + 'static) {
        self.handshake.on_ready(handler);
    }

    /// Handles a message posted to the game's window
    ///
    /// Anything that is not a well-formed host message from the configured
    /// origin is ignored.
    pub fn receive_message(&mut self, origin: &str, data: &serde_json::Value) {
        let message = match protocol::decode::<HostMessage>(origin, &self.options.origin, data) {
            Ok(message) => message,
            Err(rejection) => {
                debug!(%rejection, "ignoring window message");
                return;
            }
        };

        match message {
            HostMessage::Init(init) => {
                if let Some(token) = self.fallback.take() {
                    self.scheduler.clear(token);
                }
                self.handshake.accept_init(init);
                self.host.send_message(&GameMessage::Ready(ReadyPayload {
                    sdk_version: VERSION.to_owned(),
                }));
            }
            HostMessage::Tick(tick) => self.last_tick = Some(tick),
            HostMessage::ForceEnd(force_end) => {
                info!(reason = ?force_end.reason, "run ended by host");
                self.forced_end = Some(force_end.reason);
            }
            HostMessage::AudioConfig(config) => self.audio.apply(config),
            HostMessage::AudioArm {} => self.audio.arm(),
        }
    }

    /// Handles an alarm from the scheduler
    pub fn receive_alarm(&mut self, alarm: SdkAlarm) {
        match alarm {
            SdkAlarm::MockFallback => {
                self.fallback = None;
                self.handshake.boot_mock();
            }
        }
    }

    /// Records a key press; keys only drive input in mock mode
    pub fn key_down(&mut self, code: &str) {
        if self.handshake.is_mock() {
            self.input.key_down(code);
        }
        self.user_gesture();
    }

    /// Records a key release
    pub fn key_up(&mut self, code: &str) {
        if self.handshake.is_mock() {
            self.input.key_up(code);
        }
    }

    /// Records a click or touch
    pub fn pointer_down(&mut self) {
        self.user_gesture();
    }

    fn user_gesture(&mut self) {
        if !self.audio.armed() {
            self.audio.arm();
        }
    }

    /// Input of `slot` right now
    ///
    /// Slots outside `0..=3`, slots without a controller and any slot before
    /// the game is ready read as neutral.
    pub fn input(&self, slot: i64) -> InputSnapshot {
        Slot::new(slot).map_or_else(InputSnapshot::neutral, |slot| self.snapshot(slot))
    }

    fn snapshot(&self, slot: Slot) -> InputSnapshot {
        if self.handshake.is_mock() {
            return self.input.from_keys(slot);
        }
        let pad = self
            .handshake
            .context()
            .and_then(|context| context.gamepad_index(slot))
            .and_then(|index| self.gamepads.gamepad(index));
        InputNormalizer::from_gamepad(pad.as_ref())
    }

    /// Slots taking part in the run
    pub fn active_slots(&self) -> &[Slot] {
        self.handshake
            .context()
            .map(|context| context.active_slots.as_slice())
            .unwrap_or_default()
    }

    /// Time left in the run, in milliseconds
    ///
    /// Uses the latest tick, else the full duration, else a 30 second guess.
    pub fn time_remaining_ms(&self) -> f64 {
        if let Some(tick) = self.last_tick {
            return tick.time_remaining_ms;
        }
        self.handshake
            .context()
            .map_or(UNKNOWN_TIME_REMAINING_MS, |context| {
                f64::from(context.max_duration_sec) * 1000.0
            })
    }

    /// Reports the run's scores to the host
    ///
    /// Missing scores count as zero and extra ones are dropped. In mock mode
    /// nothing is posted.
    pub fn end_game(&mut self, scores: &[f64]) {
        let scores_by_slot = scores_by_slot(scores);
        if self.handshake.is_mock() {
            info!(?scores_by_slot, "mock game ended");
            return;
        }
        self.host.send_message(&GameMessage::GameEnd(GameEndPayload {
            scores_by_slot,
            ended_at_ms: self.scheduler.now().as_secs_f64() * 1000.0,
        }));
    }

    /// Plays a note, if the host allows sound
    pub fn play_note(&mut self, note: Note) -> bool {
        self.audio.play_note(note)
    }

    /// Per-frame housekeeping: plays bloops for new button presses
    ///
    /// Bloops stop for good once the game plays a note of its own.
    pub fn animation_frame(&mut self) {
        if !self.handshake.is_ready() || !self.audio.enabled() || self.audio.custom() {
            return;
        }
        let now = self.scheduler.now();
        for slot in self.active_slots().to_vec() {
            let snapshot = self.snapshot(slot);
            if let Some(note) = self.bloops.observe(slot, &snapshot, now) {
                self.audio.bloop(note);
            }
        }
    }

    /// Whether the game knows its context
    pub fn is_ready(&self) -> bool {
        self.handshake.is_ready()
    }

    /// Whether the game runs on the mock context
    pub fn is_mock(&self) -> bool {
        self.handshake.is_mock()
    }

    /// The current context
    pub fn context(&self) -> Option<&Context> {
        self.handshake.context()
    }

    /// Why the host ended the run, once it has
    pub fn forced_end(&self) -> Option<EndReason> {
        self.forced_end
    }

    /// The audio state
    pub fn audio(&self) -> &Audio<A> {
        &self.audio
    }

    /// The channel to the host
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The scheduler
    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }

    /// The options the SDK was started with
    pub fn options(&self) -> &SdkOptions {
        &self.options
    }
}

impl<H, A, P> Sdk<H, TimerQueue<SdkAlarm>, A, P>
where
    H: Tunnel<GameMessage>,
    A: AudioBackend,
    P: GamepadSource,
{
    /// Fires every alarm due by `now`
    pub fn advance_to(&mut self, now: Duration) {
        while let Some(alarm) = self.scheduler.pop_due(now) {
            self.receive_alarm(alarm);
        }
    }
}
