//! Session synchronization with the store
//!
//! The lobby never edits the session in place. Slot edits are merged into a
//! copy, sent to the store in full, and the store's answer replaces the local
//! session. Failed requests leave the local state untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    catalog::{Catalog, Game, NEUTRAL_COLOR},
    protocol::RosterEntry,
    session::Session,
    slot::Slot,
    store::{self, SessionStore, SetPlayersRequest},
};

/// Prompt shown before wiping the session
pub const RESET_PROMPT: &str = "Reset session scores + history?";

/// Errors from synchronizing with the store
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The store request failed
    #[error(transparent)]
    Store(#[from] store::Error),
    /// The host declined the confirmation
    #[error("reset cancelled")]
    Cancelled,
}

/// A partial update to one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEdit {
    /// Slot to update
    pub slot: Slot,
    /// New avatar, if changing
    #[serde(default)]
    pub avatar_id: Option<String>,
    /// New controller, if changing
    #[serde(default)]
    pub gamepad_index: Option<i32>,
}

impl PlayerEdit {
    /// Changes only the avatar of `slot`
    pub fn avatar(slot: Slot, avatar_id: impl Into<String>) -> Self {
        Self {
            slot,
            avatar_id: Some(avatar_id.into()),
            gamepad_index: None,
        }
    }

    /// Changes only the controller of `slot`
    pub fn gamepad(slot: Slot, gamepad_index: i32) -> Self {
        Self {
            slot,
            avatar_id: None,
            gamepad_index: Some(gamepad_index),
        }
    }
}

/// The lobby's copy of the session and catalog
#[derive(Debug, Clone, Default)]
pub struct SessionSync {
    session: Session,
    catalog: Catalog,
}

impl SessionSync {
    /// An empty copy, before the first refresh
    pub fn new() -> Self {
        Self::default()
    }

    /// The last session the store returned
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The last catalog the store returned
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Replaces the local session with a store response
    pub fn replace_session(&mut self, session: Session) {
        self.session = session;
    }

    /// Merges `edit` and sends all four slots to the store
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store rejects the update; the local
    /// session is unchanged in that case.
    pub fn update_players<S: SessionStore>(
        &mut self,
        store: &mut S,
        edit: PlayerEdit,
    ) -> Result<&Session, Error> {
        let request = self.players_request(&edit);
        debug!(slot = %edit.slot, "updating players");
        self.session = store.set_players(&request)?;
        Ok(&self.session)
    }

    /// The four-slot players update that applies `edit` to the local session
    pub fn players_request(&self, edit: &PlayerEdit) -> SetPlayersRequest {
        let mut players_by_slot = self.session.assignments();
        let entry = &mut players_by_slot[edit.slot.index()];
        if let Some(avatar_id) = &edit.avatar_id {
            entry.avatar_id.clone_from(avatar_id);
        }
        if let Some(gamepad_index) = edit.gamepad_index {
            entry.gamepad_index = gamepad_index;
        }
        SetPlayersRequest { players_by_slot }
    }

    /// Loads avatars, games and the session together
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if any of the three requests fails; nothing
    /// is replaced in that case.
    pub fn refresh<S: SessionStore>(&mut self, store: &S) -> Result<(), Error> {
        let avatars = store.avatars()?;
        let games = store.games()?;
        let session = store.session()?;

        self.catalog = Catalog { avatars, games };
        self.session = session;
        Ok(())
    }

    /// Reloads only the game list
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the request fails.
    pub fn refresh_games<S: SessionStore>(&mut self, store: &S) -> Result<&[Game], Error> {
        self.catalog.games = store.games()?;
        Ok(&self.catalog.games)
    }

    /// Resets the session after confirmation, then refreshes everything
    ///
    /// `confirm` receives the prompt to show and answers whether to proceed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `confirm` declines, and
    /// [`Error::Store`] if the reset or the following refresh fails.
    pub fn reset<S: SessionStore>(
        &mut self,
        store: &mut S,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<(), Error> {
        if !confirm(RESET_PROMPT) {
            return Err(Error::Cancelled);
        }
        store.reset()?;
        info!("session reset");
        self.refresh(store)
    }

    /// Players as presented to games, ordered by slot
    ///
    /// Names fall back to the avatar id and then to `Player N`; colours fall
    /// back to a neutral grey.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.session
            .players_by_slot
            .iter()
            .map(|player| {
                let avatar = self.catalog.avatar(&player.avatar_id);
                let name = avatar
                    .map(|a| a.name.as_str())
                    .filter(|name| !name.is_empty())
                    .or(Some(player.avatar_id.as_str()).filter(|id| !id.is_empty()))
                    .map_or_else(|| format!("Player {}", player.slot.number()), str::to_owned);
                let color = avatar
                    .map(|a| a.color.as_str())
                    .filter(|color| !color.is_empty())
                    .unwrap_or(NEUTRAL_COLOR)
                    .to_owned();
                RosterEntry {
                    slot: player.slot,
                    avatar_id: player.avatar_id.clone(),
                    name,
                    color,
                }
            })
            .collect()
    }
}
