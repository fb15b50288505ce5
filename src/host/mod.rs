//! The host lobby
//!
//! [`Lobby`] is the one object that owns everything on the host side: the
//! store client, the game frame, the scheduler, the controller source, the
//! local session copy and the state machines for claiming and running games.
//! Embedders drive it with three kinds of input: host actions (method calls
//! such as [`Lobby::toggle_claim`] or [`Lobby::start_selected_game`]), alarms
//! from the scheduler ([`Lobby::receive_alarm`]) and messages posted by the
//! game frame ([`Lobby::receive_frame_message`]).
//!
//! User-facing feedback is queued as [`Notice`]s rather than rendered, and
//! drained with [`Lobby::take_notices`].

pub mod claim;
pub mod recorder;
pub mod run;
pub mod sync;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use web_time::Duration;

use self::{
    claim::{ClaimCoordinator, PendingClaim, Press, Toggle},
    recorder::ScoreRecorder,
    run::{Finished, Outcome, RunAlarm, RunId, RunLifecycle, StartError},
    sync::{PlayerEdit, SessionSync},
};
use crate::{
    catalog::{Catalog, Game},
    config::LobbyOptions,
    constants::lobby::UNASSIGNED_GAMEPAD,
    gamepad::GamepadSource,
    protocol::{self, AudioConfig, EndReason, GameMessage, HostMessage, Rejection},
    scheduler::{Scheduler, TimerQueue, TimerToken},
    session::Session,
    slot::Slot,
    store::{self, SessionStore},
    tunnel::GameFrame,
};

/// Alarms the lobby schedules for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
pub enum LobbyAlarm {
    /// Look for controller presses
    #[from(skip)]
    PollGamepads,
    /// Reload the game list
    #[from(skip)]
    RefreshGames,
    /// An alarm belonging to a run
    Run(RunAlarm),
}

/// Feedback for the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Replaces the status line
    Status(String),
    /// Needs the host's attention
    Alert(String),
}

/// The host-side context object
#[derive(Debug)]
pub struct Lobby<S, F, C, P> {
    options: LobbyOptions,
    store: S,
    frame: F,
    scheduler: C,
    gamepads: P,

    sync: SessionSync,
    claim: ClaimCoordinator,
    pending_claim: Option<PendingClaim>,
    run: RunLifecycle,
    recorder: ScoreRecorder,

    selected_game_id: Option<String>,
    audio_enabled: bool,
    poll_token: Option<TimerToken>,
    refresh_token: Option<TimerToken>,
    notices: VecDeque<Notice>,
}

impl<S, F, C, P> Lobby<S, F, C, P>
where
    S: SessionStore,
    F: GameFrame,
    C: Scheduler<LobbyAlarm>,
    P: GamepadSource,
{
    /// Creates a lobby; nothing is loaded or scheduled until [`Lobby::open`]
    pub fn new(options: LobbyOptions, store: S, frame: F, scheduler: C, gamepads: P) -> Self {
        let timings = options.timings;
        Self {
            audio_enabled: options.audio_enabled,
            options,
            store,
            frame,
            scheduler,
            gamepads,
            sync: SessionSync::new(),
            claim: ClaimCoordinator::new(timings.press_debounce()),
            pending_claim: None,
            run: RunLifecycle::new(timings),
            recorder: ScoreRecorder::new(),
            selected_game_id: None,
            poll_token: None,
            refresh_token: None,
            notices: VecDeque::new(),
        }
    }

    /// Loads everything and starts the periodic tasks
    ///
    /// # Errors
    ///
    /// Returns the refresh error; no periodic task is started in that case.
    pub fn open(&mut self) -> Result<(), sync::Error> {
        self.status("Loading…");
        if let Err(e) = self.refresh() {
            self.status(format!("Error: {e}"));
            return Err(e);
        }

        let timings = self.options.timings;
        if self.poll_token.is_none() {
            self.poll_token = Some(
                self.scheduler
                    .set_interval(LobbyAlarm::PollGamepads, timings.gamepad_poll()),
            );
        }
        if self.refresh_token.is_none() {
            self.refresh_token = Some(
                self.scheduler
                    .set_interval(LobbyAlarm::RefreshGames, timings.games_refresh()),
            );
        }

        self.status("Ready.");
        Ok(())
    }

    /// Cancels the periodic tasks and ends any run in progress
    pub fn shutdown(&mut self) {
        for token in [self.poll_token.take(), self.refresh_token.take()]
            .into_iter()
            .flatten()
        {
            self.scheduler.clear(token);
        }
        self.end_game();
    }

    /// Reloads avatars, games and the session
    ///
    /// # Errors
    ///
    /// Returns the store error; local state is unchanged in that case.
    pub fn refresh(&mut self) -> Result<(), sync::Error> {
        self.sync.refresh(&self.store)?;
        self.reconcile_selection();
        Ok(())
    }

    /// Handles an alarm from the scheduler
    pub fn receive_alarm(&mut self, alarm: LobbyAlarm) {
        match alarm {
            LobbyAlarm::PollGamepads => self.poll_gamepads(),
            LobbyAlarm::RefreshGames => match self.sync.refresh_games(&self.store) {
                Ok(_) => self.reconcile_selection(),
                Err(e) => debug!(error = %e, "game list refresh failed"),
            },
            LobbyAlarm::Run(alarm) => {
                let audio = self.audio_config();
                if let Some(finished) =
                    self.run
                        .receive_alarm(alarm, audio, &mut self.scheduler, &self.frame)
                {
                    self.finish(finished);
                }
            }
        }
    }

    /// Handles data posted by the game frame
    ///
    /// Only messages from the configured origin are considered. A result
    /// with the wrong shape is ignored and the run keeps going.
    pub fn receive_frame_message(&mut self, origin: &str, data: &serde_json::Value) {
        match protocol::decode::<GameMessage>(origin, &self.options.origin, data) {
            Ok(message) => {
                let audio = self.audio_config();
                if let Some(finished) =
                    self.run
                        .receive_message(message, audio, &mut self.scheduler, &self.frame)
                {
                    self.finish(finished);
                }
            }
            Err(rejection @ Rejection::Malformed { .. }) if self.run.is_running() => {
                warn!(%rejection, "dropping malformed game message");
                self.status(format!("Ignored a malformed message from the game ({rejection})."));
            }
            Err(rejection) => debug!(%rejection, "ignoring frame message"),
        }
    }

    /// Clicks the claim button of `slot`
    pub fn toggle_claim(&mut self, slot: Slot) -> Toggle {
        let toggle = self.claim.toggle(slot);
        match toggle {
            Toggle::Ignored => {}
            Toggle::Listening(slot) => self.status(format!(
                "Slot {}: press any button on the controller you want to claim.",
                slot.number()
            )),
            Toggle::Cancelled => self.status("Claim cancelled."),
        }
        toggle
    }

    fn poll_gamepads(&mut self) {
        let pads = self.gamepads.gamepads();
        match self.claim.observe(&pads, self.scheduler.now()) {
            Press::Idle | Press::Debounced => {}
            Press::Detected(index) => self.status(format!(
                "Detected gamepad index {index}. Click “Claim pad” for a slot."
            )),
            Press::Claim {
                slot,
                gamepad_index,
            } => {
                self.status(format!(
                    "Claiming gamepad {gamepad_index} for slot {}…",
                    slot.number()
                ));
                let index = i32::try_from(gamepad_index).unwrap_or(UNASSIGNED_GAMEPAD);
                let request = self
                    .sync
                    .players_request(&PlayerEdit::gamepad(slot, index));
                self.pending_claim = Some(PendingClaim {
                    slot,
                    gamepad_index,
                    request,
                });
            }
        }
    }

    /// The players update a claim is waiting on
    pub fn pending_claim(&self) -> Option<&PendingClaim> {
        self.pending_claim.as_ref()
    }

    /// Hands the queued claim update to an embedder that sends it itself
    ///
    /// The claim stays in flight until [`Lobby::complete_claim`] is called.
    pub fn take_pending_claim(&mut self) -> Option<PendingClaim> {
        self.pending_claim.take()
    }

    /// Sends the queued claim update through the lobby's own store
    ///
    /// Returns whether there was a claim to send.
    pub fn send_pending_claim(&mut self) -> bool {
        let Some(pending) = self.pending_claim.take() else {
            return false;
        };
        let result = self.store.set_players(&pending.request);
        self.complete_claim(result);
        true
    }

    /// Finishes the claim in flight with the store's answer
    ///
    /// The session is replaced only on success. Either way the coordinator
    /// accepts claim clicks again.
    pub fn complete_claim(&mut self, result: Result<Session, store::Error>) {
        if !self.claim.in_flight() {
            debug!("no claim in flight, ignoring its result");
            return;
        }
        self.pending_claim = None;
        self.claim.settle();
        match result {
            Ok(session) => self.sync.replace_session(session),
            Err(e) => {
                warn!(error = %e, "claim failed");
                self.alert(format!("Failed to claim pad: {e}"));
            }
        }
    }

    /// Applies a slot edit through the store
    ///
    /// # Errors
    ///
    /// Returns the store error, after alerting the host.
    pub fn update_players(&mut self, edit: PlayerEdit) -> Result<(), sync::Error> {
        match self.sync.update_players(&mut self.store, edit) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "players update failed");
                self.alert(format!("Failed to update players: {e}"));
                Err(e)
            }
        }
    }

    /// Selects `avatar_id` for `slot`; an empty id clears it
    ///
    /// # Errors
    ///
    /// Returns the store error, after alerting the host.
    pub fn select_avatar(&mut self, slot: Slot, avatar_id: &str) -> Result<(), sync::Error> {
        self.update_players(PlayerEdit::avatar(slot, avatar_id))
    }

    /// Asks for confirmation, resets the session and reloads everything
    ///
    /// # Errors
    ///
    /// Returns [`sync::Error::Cancelled`] if the host declined, or the store
    /// error after alerting the host.
    pub fn reset_session(&mut self, confirm: impl FnOnce(&str) -> bool) -> Result<(), sync::Error> {
        match self.sync.reset(&mut self.store, confirm) {
            Ok(()) => {
                self.reconcile_selection();
                Ok(())
            }
            Err(sync::Error::Cancelled) => Err(sync::Error::Cancelled),
            Err(e) => {
                self.alert(format!("Failed to reset session: {e}"));
                Err(e)
            }
        }
    }

    /// Keeps the selection if the game still exists, else picks the first
    fn reconcile_selection(&mut self) {
        let games = &self.sync.catalog().games;
        let still_there = self
            .selected_game_id
            .as_ref()
            .is_some_and(|id| games.iter().any(|g| &g.id == id));
        if !still_there {
            self.selected_game_id = games.first().map(|g| g.id.clone());
        }
    }

    /// The game that [`Lobby::start_selected_game`] would start
    pub fn selected_game(&self) -> Option<&Game> {
        self.selected_game_id
            .as_deref()
            .and_then(|id| self.sync.catalog().game(id))
    }

    /// Selects a game by id; returns whether it exists
    pub fn select_game(&mut self, game_id: &str) -> bool {
        if self.sync.catalog().game(game_id).is_none() {
            return false;
        }
        self.selected_game_id = Some(game_id.to_owned());
        true
    }

    /// Selects a random game
    pub fn pick_random_game(&mut self) -> Option<&Game> {
        let id = self.sync.catalog().random_game()?.id.clone();
        self.selected_game_id = Some(id);
        self.selected_game()
    }

    /// Starts the selected game
    ///
    /// # Errors
    ///
    /// See [`Lobby::start_game`].
    pub fn start_selected_game(&mut self) -> Result<RunId, StartError> {
        match self.selected_game_id.clone() {
            Some(game_id) => self.start_game(&game_id),
            None => Err(self.reject_start(StartError::NoGameSelected)),
        }
    }

    /// Starts `game_id`, ending and recording any run in progress first
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] when the game is unknown or fewer than two
    /// slots are ready; the host is alerted and nothing changes.
    pub fn start_game(&mut self, game_id: &str) -> Result<RunId, StartError> {
        let Some(game) = self.sync.catalog().game(game_id).cloned() else {
            return Err(self.reject_start(StartError::UnknownGame(game_id.to_owned())));
        };

        let audio = self.audio_config();
        let started = match self
            .run
            .start(&game, &self.sync, audio, &mut self.scheduler, &self.frame)
        {
            Ok(started) => started,
            Err(e) => return Err(self.reject_start(e)),
        };

        if let Some(previous) = started.previous {
            self.record(&previous);
        }
        self.status(format!("Running {}…", game.id));
        Ok(started.run)
    }

    fn reject_start(&mut self, error: StartError) -> StartError {
        warn!(%error, "start rejected");
        self.alert(error.to_string());
        error
    }

    /// Ends the run in progress, recording zeros for every slot
    pub fn end_game(&mut self) {
        let audio = self.audio_config();
        if let Some(finished) = self
            .run
            .end(EndReason::Host, audio, &mut self.scheduler, &self.frame)
        {
            self.finish(finished);
        }
    }

    fn finish(&mut self, finished: Finished) {
        self.status("Back to lobby.");
        self.record(&finished);
    }

    /// Only failures to store a result the game reported are alerted
    fn record(&mut self, finished: &Finished) {
        if let Err(e) = self
            .recorder
            .record(&mut self.store, &mut self.sync, finished)
        {
            warn!(run = %finished.run, error = %e, "failed to record result");
            if finished.outcome == Outcome::Reported {
                self.alert(format!("Failed to record: {e}"));
            }
        }
    }

    /// Flips the audio policy and asks the game to unlock audio
    ///
    /// Meant to be called from a user gesture.
    pub fn toggle_audio(&mut self) -> bool {
        self.audio_enabled = !self.audio_enabled;
        info!(enabled = self.audio_enabled, "audio toggled");
        self.frame
            .send_message(&HostMessage::from(self.audio_config()));
        self.frame.send_message(&HostMessage::AudioArm {});
        self.audio_enabled
    }

    /// The audio policy pushed to games
    pub fn audio_config(&self) -> AudioConfig {
        AudioConfig {
            enabled: Some(self.audio_enabled),
            master_volume: Some(self.options.master_volume),
        }
    }

    /// Whether games may make sound
    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Time left in the run in progress
    pub fn time_remaining(&self) -> Option<Duration> {
        self.run
            .active()
            .map(|run| run.time_remaining(self.scheduler.now()))
    }

    fn status(&mut self, text: impl Into<String>) {
        self.notices.push_back(Notice::Status(text.into()));
    }

    fn alert(&mut self, text: impl Into<String>) {
        self.notices.push_back(Notice::Alert(text.into()));
    }

    /// Drains queued feedback, oldest first
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Lobby options
    pub fn options(&self) -> &LobbyOptions {
        &self.options
    }

    /// The local session copy
    pub fn session(&self) -> &Session {
        self.sync.session()
    }

    /// Avatars and games
    pub fn catalog(&self) -> &Catalog {
        self.sync.catalog()
    }

    /// Claim state
    pub fn claim(&self) -> &ClaimCoordinator {
        &self.claim
    }

    /// Run state
    pub fn run(&self) -> &RunLifecycle {
        &self.run
    }

    /// The store client
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The store client, mutably
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The game frame
    pub fn frame(&self) -> &F {
        &self.frame
    }

    /// The scheduler
    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }
}

impl<S, F, P> Lobby<S, F, TimerQueue<LobbyAlarm>, P>
where
    S: SessionStore,
    F: GameFrame,
    P: GamepadSource,
{
    /// Delivers every alarm due by `now`, in order
    ///
    /// Alarms are popped one at a time, so a timer cleared while handling an
    /// earlier alarm never fires.
    pub fn advance_to(&mut self, now: Duration) {
        while let Some(alarm) = self.scheduler.pop_due(now) {
            self.receive_alarm(alarm);
        }
    }
}
