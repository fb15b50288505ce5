//! The external session store
//!
//! Avatars, games and the session itself are owned by a store the lobby
//! reaches through a small request/response contract. Every response is an
//! envelope, `{ok: true, ...}` on success or `{ok: false, error: {message}}`
//! on failure. The lobby only depends on [`SessionStore`]; [`HttpStore`]
//! speaks the envelope over an embedder-supplied [`Transport`], and
//! [`MemoryStore`] keeps everything in process.

mod http;
mod memory;

pub use http::{HttpStore, Response, Transport};
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{
    catalog::{Avatar, Game},
    constants::lobby::SLOT_COUNT,
    session::{PlayerAssignment, Session},
};

/// Errors surfaced by store requests
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request never produced a response
    #[error("network error: {0}")]
    Transport(String),
    /// A non-envelope failure response
    #[error("{status} {status_text}")]
    Status {
        /// HTTP status code
        status: u16,
        /// HTTP status text
        status_text: String,
    },
    /// The store answered `ok: false`
    #[error("{message}")]
    Rejected {
        /// Machine-readable code, when the store sends one
        code: Option<String>,
        /// Human-readable message
        message: String,
    },
    /// The store answered `ok: true` with an unusable body
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Error {
    /// A rejection with a code, as raised by [`MemoryStore`]
    pub fn rejected(code: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: Some(code.to_owned()),
            message: message.into(),
        }
    }
}

/// Body of `POST session/players`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPlayersRequest {
    /// All four slots, without `lockedIn`
    pub players_by_slot: [PlayerAssignment; SLOT_COUNT],
}

/// Body of `POST session/record_game`
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordGameRequest {
    /// Game that was played
    pub game_id: String,
    /// One score per slot
    pub scores_by_slot: [f64; SLOT_COUNT],
    /// Optional per-slot rating of the game, `-1`, `0` or `1`
    #[serde(default)]
    pub ratings_by_slot: Option<[i8; SLOT_COUNT]>,
}

/// The store contract
///
/// Reads never change store state. Every write answers with the store's
/// authoritative session except [`SessionStore::reset`].
pub trait SessionStore {
    /// `GET avatars`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn avatars(&self) -> Result<Vec<Avatar>, Error>;

    /// `GET games`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn games(&self) -> Result<Vec<Game>, Error>;

    /// `GET session`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn session(&self) -> Result<Session, Error>;

    /// `POST session/players`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn set_players(&mut self, request: &SetPlayersRequest) -> Result<Session, Error>;

    /// `POST session/record_game`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn record_game(&mut self, request: &RecordGameRequest) -> Result<Session, Error>;

    /// `POST session/reset`
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the request fails or is rejected.
    fn reset(&mut self) -> Result<(), Error>;
}
