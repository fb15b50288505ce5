//! Persisting run results
//!
//! Each finished run turns into exactly one `record_game` request. The store
//! does all the bookkeeping (clamping, totals, history); the lobby only
//! swaps in the session it gets back.

use tracing::{debug, info};

use super::{
    run::{Finished, RunId},
    sync::SessionSync,
};
use crate::store::{self, RecordGameRequest, SessionStore};

/// Sends run results to the store, once per run
#[derive(Debug, Clone, Default)]
pub struct ScoreRecorder {
    last_recorded: Option<RunId>,
}

impl ScoreRecorder {
    /// A recorder that has recorded nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// The run most recently sent to the store
    pub fn last_recorded(&self) -> Option<RunId> {
        self.last_recorded
    }

    /// Records `finished` and replaces the session with the store's answer
    ///
    /// Returns `Ok(false)` without contacting the store when this run was
    /// already recorded.
    ///
    /// # Errors
    ///
    /// Returns the store error when the request fails; the local session is
    /// left as it was and the run is not retried.
    pub fn record<S: SessionStore>(
        &mut self,
        store: &mut S,
        sync: &mut SessionSync,
        finished: &Finished,
    ) -> Result<bool, store::Error> {
        if self.last_recorded == Some(finished.run) {
            debug!(run = %finished.run, "result already recorded");
            return Ok(false);
        }
        self.last_recorded = Some(finished.run);

        let session = store.record_game(&RecordGameRequest {
            game_id: finished.game_id.clone(),
            scores_by_slot: finished.scores_by_slot,
            ratings_by_slot: None,
        })?;
        sync.replace_session(session);

        info!(run = %finished.run, game_id = %finished.game_id, "result recorded");
        Ok(true)
    }
}
