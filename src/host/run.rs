//! Game run lifecycle
//!
//! A run is one timed play of one game. At most one run exists at a time;
//! it is `Idle → Running → Ended | TimedOut → Idle`. While running, the host
//! pushes a tick to the game every tick period, retries the `init` handshake
//! for a bounded number of attempts, and enforces a hard timeout that does
//! not depend on the game ever answering.
//!
//! Every timer a run owns lives in its [`RunHandle`]. All three ways a run
//! can end (a valid `game_end`, the host ending it, the timeout) go through
//! the same teardown, which stops the handle exactly once. Alarms carry the
//! [`RunId`] they were scheduled for, so an alarm that outlives its run is
//! recognized and dropped.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use web_time::Duration;

use super::sync::SessionSync;
use crate::{
    catalog::Game,
    config::Timings,
    constants::{
        game::DEFAULT_MAX_DURATION_SEC,
        lobby::{MIN_ACTIVE_SLOTS, SLOT_COUNT},
    },
    protocol::{
        AudioConfig, EndReason, ForceEndPayload, GameMessage, HostMessage, InitPayload,
        TickPayload,
    },
    scheduler::{Scheduler, TimerToken},
    session::Session,
    slot::Slot,
    tunnel::GameFrame,
};

/// Identifies one run
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Timer alarms belonging to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunAlarm {
    /// Push the remaining time to the game
    Tick {
        /// Run the alarm was scheduled for
        run: RunId,
    },
    /// The run has exceeded its duration plus slack
    Timeout {
        /// Run the alarm was scheduled for
        run: RunId,
    },
    /// Resend `init`
    Handshake {
        /// Run the alarm was scheduled for
        run: RunId,
    },
}

impl RunAlarm {
    /// The run this alarm belongs to
    pub fn run(&self) -> RunId {
        match self {
            Self::Tick { run } | Self::Timeout { run } | Self::Handshake { run } => *run,
        }
    }
}

/// Why a run could not start
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// Fewer than two slots have both an avatar and a controller
    #[error("Assign at least {required} players (avatar + pad) before starting.")]
    NotEnoughPlayers {
        /// Slots that qualify
        ready: usize,
        /// Slots needed
        required: usize,
    },
    /// Nothing is selected to play
    #[error("Select a game first.")]
    NoGameSelected,
    /// The game is not in the catalog
    #[error("unknown game {0}")]
    UnknownGame(String),
}

/// Slots qualified to play
///
/// # Errors
///
/// Returns [`StartError::NotEnoughPlayers`] when fewer than
/// [`MIN_ACTIVE_SLOTS`] slots have both an avatar and a controller.
pub fn qualified_slots(session: &Session) -> Result<Vec<Slot>, StartError> {
    let slots = session.active_slots();
    if slots.len() < MIN_ACTIVE_SLOTS {
        return Err(StartError::NotEnoughPlayers {
            ready: slots.len(),
            required: MIN_ACTIVE_SLOTS,
        });
    }
    Ok(slots)
}

/// The timers owned by a run
///
/// Stopping clears every timer that is still set. Each token is taken out as
/// it is cleared, so stopping twice does nothing the second time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunHandle {
    tick: Option<TimerToken>,
    timeout: Option<TimerToken>,
    handshake: Option<TimerToken>,
}

impl RunHandle {
    /// Cancels the handshake retries only
    pub fn stop_handshake<A>(&mut self, scheduler: &mut impl Scheduler<A>) {
        if let Some(token) = self.handshake.take() {
            scheduler.clear(token);
        }
    }

    /// Cancels every timer; returns whether anything was still running
    pub fn stop<A>(&mut self, scheduler: &mut impl Scheduler<A>) -> bool {
        let tokens = [self.tick.take(), self.timeout.take(), self.handshake.take()];
        let mut stopped = false;
        for token in tokens.into_iter().flatten() {
            scheduler.clear(token);
            stopped = true;
        }
        stopped
    }

    /// Whether every timer has been cleared
    pub fn is_stopped(&self) -> bool {
        self.tick.is_none() && self.timeout.is_none() && self.handshake.is_none()
    }
}

/// The run currently in progress
#[derive(Debug, Clone)]
pub struct ActiveRun {
    id: RunId,
    game_id: String,
    started_at: Duration,
    max_duration_sec: u32,
    init: InitPayload,
    handshake_attempts: u32,
    handle: RunHandle,
}

impl ActiveRun {
    /// Run identifier
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Game being played
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Scheduler time the run started at
    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    /// Hard cap on run length
    pub fn max_duration_sec(&self) -> u32 {
        self.max_duration_sec
    }

    /// The context sent in every handshake attempt
    pub fn init(&self) -> &InitPayload {
        &self.init
    }

    /// Handshake attempts made so far
    pub fn handshake_attempts(&self) -> u32 {
        self.handshake_attempts
    }

    /// Time left before the nominal end of the run, never negative
    pub fn time_remaining(&self, now: Duration) -> Duration {
        let elapsed = now.saturating_sub(self.started_at);
        Duration::from_secs(u64::from(self.max_duration_sec)).saturating_sub(elapsed)
    }
}

/// A run that has ended, with the result to record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finished {
    /// Run that ended
    pub run: RunId,
    /// Game that was played
    pub game_id: String,
    /// Score per slot; all zero unless the game reported a result
    pub scores_by_slot: [f64; SLOT_COUNT],
    /// How it ended
    pub outcome: Outcome,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The game reported its own scores
    Reported,
    /// The run was cut short and scores nothing
    Forced(EndReason),
}

/// Outcome of a successful start
#[derive(Debug, Clone, PartialEq)]
pub struct Started {
    /// The new run
    pub run: RunId,
    /// The run it replaced, if one was still going
    pub previous: Option<Finished>,
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1e6
}

/// The single-run state machine
#[derive(Debug, Clone)]
pub struct RunLifecycle {
    timings: Timings,
    active: Option<ActiveRun>,
}

impl RunLifecycle {
    /// An idle lifecycle using `timings`
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            active: None,
        }
    }

    /// The run in progress
    pub fn active(&self) -> Option<&ActiveRun> {
        self.active.as_ref()
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Starts `game` for the players in `sync`
    ///
    /// Any run still in progress is ended first with reason
    /// [`EndReason::Host`] and returned in [`Started::previous`] so its
    /// all-zero result can be recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] without touching any state when too few slots
    /// are ready.
    pub fn start<A, C, F>(
        &mut self,
        game: &Game,
        sync: &SessionSync,
        audio: AudioConfig,
        scheduler: &mut C,
        frame: &F,
    ) -> Result<Started, StartError>
    where
        A: From<RunAlarm>,
        C: Scheduler<A>,
        F: GameFrame,
    {
        let active_slots = qualified_slots(sync.session()).inspect_err(|e| {
            warn!(game_id = %game.id, error = %e, "refusing to start run");
        })?;

        let previous = self.end(EndReason::Host, audio, scheduler, frame);

        let id = RunId::new();
        let started_at = scheduler.now();
        let max_duration_sec = if game.max_duration_sec == 0 {
            DEFAULT_MAX_DURATION_SEC
        } else {
            game.max_duration_sec
        };
        let session = sync.session();
        let init = InitPayload {
            session_id: session.session_id(),
            slot_to_gamepad_index: session.slot_to_gamepad_index(),
            players_by_slot: sync.roster(),
            active_slots: Some(active_slots),
            max_duration_sec,
            started_at_ms: millis(started_at),
        };

        frame.load(&game.frame_path());

        let handle = RunHandle {
            tick: Some(scheduler.set_interval(RunAlarm::Tick { run: id }.into(), self.timings.tick())),
            timeout: Some(scheduler.set_timeout(
                RunAlarm::Timeout { run: id }.into(),
                self.timings.hard_timeout(max_duration_sec),
            )),
            handshake: Some(scheduler.set_interval(
                RunAlarm::Handshake { run: id }.into(),
                self.timings.handshake_retry(),
            )),
        };

        info!(run = %id, game_id = %game.id, max_duration_sec, "run started");
        self.active = Some(ActiveRun {
            id,
            game_id: game.id.clone(),
            started_at,
            max_duration_sec,
            init,
            handshake_attempts: 0,
            handle,
        });

        Ok(Started { run: id, previous })
    }

    /// Handles a run alarm
    ///
    /// Alarms for any run other than the active one are ignored. Returns the
    /// finished run when the alarm was the hard timeout.
    pub fn receive_alarm<A, C, F>(
        &mut self,
        alarm: RunAlarm,
        audio: AudioConfig,
        scheduler: &mut C,
        frame: &F,
    ) -> Option<Finished>
    where
        C: Scheduler<A>,
        F: GameFrame,
    {
        let Some(run) = self.active.as_mut().filter(|run| run.id == alarm.run()) else {
            debug!(run = %alarm.run(), "ignoring alarm for inactive run");
            return None;
        };

        match alarm {
            RunAlarm::Tick { .. } => {
                let now = scheduler.now();
                frame.send_message(&HostMessage::from(TickPayload {
                    now_ms: millis(now),
                    time_remaining_ms: millis(run.time_remaining(now)),
                }));
                None
            }
            RunAlarm::Handshake { .. } => {
                run.handshake_attempts += 1;
                frame.send_message(&HostMessage::from(run.init.clone()));
                frame.send_message(&HostMessage::from(audio));
                if run.handshake_attempts >= self.timings.handshake_attempts {
                    run.handle.stop_handshake(scheduler);
                }
                None
            }
            RunAlarm::Timeout { .. } => {
                warn!(run = %run.id, game_id = %run.game_id, "run timed out");
                self.end(EndReason::Timeout, audio, scheduler, frame)
            }
        }
    }

    /// Handles a decoded message from the game frame
    ///
    /// A `ready` acknowledgement cancels the remaining handshake retries.
    /// Returns the finished run when the message was a result. Messages that
    /// arrive with no run in progress are ignored.
    pub fn receive_message<A, C, F>(
        &mut self,
        message: GameMessage,
        audio: AudioConfig,
        scheduler: &mut C,
        frame: &F,
    ) -> Option<Finished>
    where
        C: Scheduler<A>,
        F: GameFrame,
    {
        let run = self.active.as_mut()?;
        match message {
            GameMessage::Ready(ready) => {
                debug!(run = %run.id, sdk_version = %ready.sdk_version, "game ready");
                run.handle.stop_handshake(scheduler);
                None
            }
            GameMessage::GameEnd(result) => {
                info!(run = %run.id, scores = ?result.scores_by_slot, "game reported result");
                let finished = self.end(EndReason::Host, audio, scheduler, frame)?;
                Some(Finished {
                    scores_by_slot: result.scores_by_slot,
                    outcome: Outcome::Reported,
                    ..finished
                })
            }
        }
    }

    /// Ends the active run with an all-zero result
    ///
    /// Stops the run's timers, tells the game why it ended, pushes the audio
    /// policy and unloads the frame. Returns `None`, doing nothing, when no
    /// run is in progress.
    pub fn end<A, C, F>(
        &mut self,
        reason: EndReason,
        audio: AudioConfig,
        scheduler: &mut C,
        frame: &F,
    ) -> Option<Finished>
    where
        C: Scheduler<A>,
        F: GameFrame,
    {
        let mut run = self.active.take()?;
        run.handle.stop(scheduler);

        frame.send_message(&HostMessage::from(ForceEndPayload { reason }));
        frame.send_message(&HostMessage::from(audio));
        frame.close();

        info!(run = %run.id, game_id = %run.game_id, ?reason, "run ended");
        Some(Finished {
            run: run.id,
            game_id: run.game_id,
            scores_by_slot: [0.0; SLOT_COUNT],
            outcome: Outcome::Forced(reason),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{
        catalog::Avatar,
        host::sync::PlayerEdit,
        protocol::{GameEndPayload, Message, ReadyPayload},
        scheduler::TimerQueue,
        store::MemoryStore,
        tunnel::Tunnel,
    };
    use serde_json::Value;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    #[derive(Debug, Clone, Default)]
    struct MockFrame {
        messages: Arc<Mutex<VecDeque<Value>>>,
        loads: Arc<Mutex<Vec<String>>>,
        closes: Arc<Mutex<usize>>,
    }

    impl MockFrame {
        fn types(&self) -> Vec<String> {
            self.messages
                .lock()
                .unwrap()
                .drain(..)
                .map(|m| m["type"].as_str().unwrap().to_owned())
                .collect()
        }
    }

    impl Tunnel<HostMessage> for MockFrame {
        fn send_message(&self, message: &HostMessage) {
            self.messages.lock().unwrap().push_back(message.to_message());
        }

        fn close(&self) {
            *self.closes.lock().unwrap() += 1;
        }
    }

    impl GameFrame for MockFrame {
        fn load(&self, path: &str) {
            self.loads.lock().unwrap().push(path.to_owned());
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn audio() -> AudioConfig {
        AudioConfig {
            enabled: Some(false),
            master_volume: Some(0.25),
        }
    }

    fn sync_with_ready(count: usize) -> SessionSync {
        let avatars = ["a", "b", "c", "d"]
            .map(|id| Avatar {
                id: id.to_owned(),
                name: id.to_uppercase(),
                color: "#000000".to_owned(),
            })
            .to_vec();
        let mut store = MemoryStore::new(avatars);
        let mut sync = SessionSync::new();
        sync.refresh(&store).unwrap();
        for (slot, id) in Slot::ALL.into_iter().zip(["a", "b", "c", "d"]).take(count) {
            let index = i32::try_from(slot.index()).unwrap();
            sync.update_players(&mut store, PlayerEdit::avatar(slot, id))
                .unwrap();
            sync.update_players(&mut store, PlayerEdit::gamepad(slot, index))
                .unwrap();
        }
        sync
    }

    fn game(max_duration_sec: u32) -> Game {
        let mut game = Game::from_filename("pong.html");
        game.max_duration_sec = max_duration_sec;
        game
    }

    struct Harness {
        lifecycle: RunLifecycle,
        queue: TimerQueue<RunAlarm>,
        frame: MockFrame,
        sync: SessionSync,
    }

    impl Harness {
        fn new(ready: usize) -> Self {
            Self {
                lifecycle: RunLifecycle::new(Timings::default()),
                queue: TimerQueue::new(),
                frame: MockFrame::default(),
                sync: sync_with_ready(ready),
            }
        }

        fn start(&mut self, game: &Game) -> Result<Started, StartError> {
            self.lifecycle
                .start(game, &self.sync, audio(), &mut self.queue, &self.frame)
        }

        /// Delivers alarms until `until`, collecting finished runs
        fn advance_to(&mut self, until: Duration) -> Vec<Finished> {
            let mut finished = Vec::new();
            while let Some(alarm) = self.queue.pop_due(until) {
                finished.extend(self.lifecycle.receive_alarm(
                    alarm,
                    audio(),
                    &mut self.queue,
                    &self.frame,
                ));
            }
            finished
        }

        fn message(&mut self, message: GameMessage) -> Option<Finished> {
            self.lifecycle
                .receive_message(message, audio(), &mut self.queue, &self.frame)
        }
    }

    #[test]
    fn test_start_requires_two_ready_slots() {
        let mut harness = Harness::new(1);

        assert_eq!(
            harness.start(&game(60)),
            Err(StartError::NotEnoughPlayers {
                ready: 1,
                required: 2
            })
        );
        assert!(!harness.lifecycle.is_running());
        assert_eq!(harness.queue.pending(), 0);
        assert!(harness.frame.loads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_schedules_timers_and_loads_frame() {
        let mut harness = Harness::new(2);
        let started = harness.start(&game(60)).unwrap();

        assert!(started.previous.is_none());
        assert_eq!(harness.queue.pending(), 3);
        assert_eq!(*harness.frame.loads.lock().unwrap(), vec!["/games/pong.html"]);

        let run = harness.lifecycle.active().unwrap();
        assert_eq!(run.id(), started.run);
        assert_eq!(run.max_duration_sec(), 60);
        assert_eq!(run.init().active_slots, Some(vec![Slot::ALL[0], Slot::ALL[1]]));
        assert_eq!(run.init().slot_to_gamepad_index, [0, 1, -1, -1]);
    }

    #[test]
    fn test_timeout_records_zeros_after_duration_plus_slack() {
        let mut harness = Harness::new(2);
        let started = harness.start(&game(60)).unwrap();

        assert!(harness.advance_to(ms(60_249)).is_empty());
        assert!(harness.lifecycle.is_running());

        let finished = harness.advance_to(ms(60_250));
        assert_eq!(
            finished,
            vec![Finished {
                run: started.run,
                game_id: "pong".to_owned(),
                scores_by_slot: [0.0; 4],
                outcome: Outcome::Forced(EndReason::Timeout),
            }]
        );
        assert!(!harness.lifecycle.is_running());
        assert_eq!(harness.queue.pending(), 0);
        assert_eq!(*harness.frame.closes.lock().unwrap(), 1);

        let types = harness.frame.types();
        let tail = &types[types.len() - 2..];
        assert_eq!(tail, ["maribro:force_end", "maribro:audio_config"]);
    }

    #[test]
    fn test_ticks_report_time_remaining() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();
        harness.advance_to(ms(150));

        let tick = harness
            .frame
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m["type"] == "maribro:tick")
            .cloned()
            .unwrap();
        assert_eq!(tick["payload"]["nowMs"], 150.0);
        assert_eq!(tick["payload"]["timeRemainingMs"], 59_850.0);
    }

    #[test]
    fn test_handshake_stops_after_ten_attempts() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();
        harness.advance_to(ms(5_000));

        let types = harness.frame.types();
        assert_eq!(types.iter().filter(|t| *t == "maribro:init").count(), 10);
        assert_eq!(types.iter().filter(|t| *t == "maribro:audio_config").count(), 10);
        assert_eq!(harness.lifecycle.active().unwrap().handshake_attempts(), 10);
    }

    #[test]
    fn test_ready_stops_handshake() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();
        harness.advance_to(ms(400));

        let ready = GameMessage::from(ReadyPayload {
            sdk_version: "0.1.0".to_owned(),
        });
        assert_eq!(harness.message(ready), None);
        harness.advance_to(ms(5_000));

        let types = harness.frame.types();
        assert_eq!(types.iter().filter(|t| *t == "maribro:init").count(), 2);
        assert_eq!(harness.lifecycle.active().unwrap().handshake_attempts(), 2);
        assert!(harness.lifecycle.is_running());
    }

    #[test]
    fn test_game_end_records_scores_once() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();

        let result = GameMessage::from(GameEndPayload {
            scores_by_slot: [3.0, 1.0, 0.0, 0.0],
            ended_at_ms: 1000.0,
        });
        let finished = harness.message(result.clone()).unwrap();
        assert_eq!(finished.scores_by_slot, [3.0, 1.0, 0.0, 0.0]);
        assert_eq!(finished.outcome, Outcome::Reported);

        assert_eq!(harness.message(result), None);
        assert!(harness.advance_to(ms(120_000)).is_empty());
        assert_eq!(*harness.frame.closes.lock().unwrap(), 1);
    }

    #[test]
    fn test_double_end_is_noop() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();

        let first = harness
            .lifecycle
            .end(EndReason::Host, audio(), &mut harness.queue, &harness.frame);
        let second = harness
            .lifecycle
            .end(EndReason::Host, audio(), &mut harness.queue, &harness.frame);

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(*harness.frame.closes.lock().unwrap(), 1);
    }

    #[test]
    fn test_run_handle_stop_is_idempotent() {
        let mut queue: TimerQueue<RunAlarm> = TimerQueue::new();
        let run = RunId::new();
        let mut handle = RunHandle {
            tick: Some(queue.set_interval(RunAlarm::Tick { run }, ms(150))),
            timeout: Some(queue.set_timeout(RunAlarm::Timeout { run }, ms(1000))),
            handshake: None,
        };

        assert!(handle.stop(&mut queue));
        assert!(handle.is_stopped());
        assert!(!handle.stop(&mut queue));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_restart_ends_previous_run_with_zeros() {
        let mut harness = Harness::new(2);
        let first = harness.start(&game(60)).unwrap();
        let second = harness.start(&game(30)).unwrap();

        let previous = second.previous.unwrap();
        assert_eq!(previous.run, first.run);
        assert_eq!(previous.scores_by_slot, [0.0; 4]);
        assert_eq!(previous.outcome, Outcome::Forced(EndReason::Host));
        assert_eq!(harness.queue.pending(), 3);

        // alarms left over from the first run never reach the second
        let finished = harness.advance_to(ms(30_250));
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].run, second.run);
    }

    #[test]
    fn test_stale_alarm_ignored() {
        let mut harness = Harness::new(2);
        harness.start(&game(60)).unwrap();

        let stale = RunAlarm::Timeout { run: RunId::new() };
        let finished =
            harness
                .lifecycle
                .receive_alarm(stale, audio(), &mut harness.queue, &harness.frame);
        assert!(finished.is_none());
        assert!(harness.lifecycle.is_running());
    }

    #[test]
    fn test_messages_ignored_when_idle() {
        let mut harness = Harness::new(2);
        let ready = GameMessage::from(ReadyPayload {
            sdk_version: "0.1.0".to_owned(),
        });
        assert_eq!(harness.message(ready), None);
        let result = GameMessage::from(GameEndPayload {
            scores_by_slot: [1.0; 4],
            ended_at_ms: 0.0,
        });
        assert_eq!(harness.message(result), None);
    }

    #[test]
    fn test_run_id_round_trips_as_string() {
        let id = RunId::new();
        let text = serde_json::to_string(&id).unwrap();
        assert_eq!(text, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<RunId>(&text).unwrap(), id);
    }
}
