//! Lobby session state
//!
//! The session is the mutable lobby state owned by the external store: who
//! sits in which slot, which controller they hold, the running scoreboard and
//! the history of played games. The lobby only ever holds a copy, replaced
//! wholesale by every store response.
//!
//! Store responses are not trusted. Deserializing a [`Session`] always goes
//! through a lenient helper that renormalizes `playersBySlot` to exactly four
//! entries ordered by slot, filling any missing slot with an empty one.
//! Malformed scoreboard rows and history entries are dropped one by one.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnError, MapSkipError, VecSkipError, serde_as, skip_serializing_none};

use crate::{
    constants::lobby::{SLOT_COUNT, UNASSIGNED_GAMEPAD},
    slot::Slot,
};

/// One of the four player slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSlot {
    /// Slot index
    pub slot: Slot,
    /// Selected avatar, empty when none
    pub avatar_id: String,
    /// Claimed controller index, `-1` when none
    pub gamepad_index: i32,
    /// Store-derived readiness flag; never sent back to the store
    pub locked_in: bool,
}

impl PlayerSlot {
    /// An unassigned slot
    pub fn empty(slot: Slot) -> Self {
        Self {
            slot,
            avatar_id: String::new(),
            gamepad_index: UNASSIGNED_GAMEPAD,
            locked_in: false,
        }
    }

    /// Whether an avatar is selected
    pub fn has_avatar(&self) -> bool {
        !self.avatar_id.is_empty()
    }

    /// Whether a controller is claimed
    pub fn has_gamepad(&self) -> bool {
        self.gamepad_index >= 0
    }

    /// Whether this slot can take part in a run
    pub fn is_ready(&self) -> bool {
        self.has_avatar() && self.has_gamepad()
    }
}

/// Client-writable view of a slot, as sent to the store
///
/// Carries no `lockedIn`; the store derives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAssignment {
    /// Slot index
    pub slot: Slot,
    /// Selected avatar, empty when none
    pub avatar_id: String,
    /// Claimed controller index, `-1` when none
    pub gamepad_index: i32,
}

impl From<&PlayerSlot> for PlayerAssignment {
    fn from(player: &PlayerSlot) -> Self {
        Self {
            slot: player.slot,
            avatar_id: player.avatar_id.clone(),
            gamepad_index: player.gamepad_index,
        }
    }
}

/// Per-avatar scoreboard row
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreEntry {
    /// Points earned by playing
    pub play: f64,
    /// Points earned as a game creator
    pub creator: f64,
    /// `play + creator`, as computed by the store
    pub total: f64,
}

/// One played game
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Game that was played
    pub game_id: String,
    /// Recorded score per slot
    #[serde(default)]
    pub scores_by_slot: Vec<f64>,
    /// When the store recorded it
    pub played_at: Option<String>,
    /// Creator credited at the time
    pub creator_avatar_id: Option<String>,
    /// Optional per-slot thumbs up (1), down (-1) or abstain (0)
    pub ratings_by_slot: Option<Vec<i8>>,
}

/// The lobby state, always with exactly four slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SessionSerde", rename_all = "camelCase")]
pub struct Session {
    /// Creation timestamp, also used as the session id
    pub created_at: String,
    /// Slots 0..3 in order
    pub players_by_slot: [PlayerSlot; SLOT_COUNT],
    /// Scoreboard keyed by avatar id
    pub scoreboard_by_avatar_id: BTreeMap<String, ScoreEntry>,
    /// Played games, oldest first
    pub history: Vec<HistoryEntry>,
}

/// A slot as it may arrive from the store, every field optional
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerSlot {
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    slot: Option<i64>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    avatar_id: Option<String>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    gamepad_index: Option<i64>,
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    locked_in: Option<bool>,
}

/// Serialization helper for Session
#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionSerde {
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    created_at: String,
    #[serde_as(as = "DefaultOnError<Vec<DefaultOnError>>")]
    #[serde(default)]
    players_by_slot: Vec<RawPlayerSlot>,
    #[serde_as(as = "DefaultOnError<MapSkipError<_, _>>")]
    #[serde(default)]
    scoreboard_by_avatar_id: BTreeMap<String, ScoreEntry>,
    #[serde_as(as = "DefaultOnError<VecSkipError<_>>")]
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl From<SessionSerde> for Session {
    /// Rebuilds the session, forcing the four-slot shape
    fn from(serde: SessionSerde) -> Self {
        let SessionSerde {
            created_at,
            players_by_slot,
            scoreboard_by_avatar_id,
            history,
        } = serde;
        Self {
            created_at,
            players_by_slot: normalize_players(players_by_slot),
            scoreboard_by_avatar_id,
            history,
        }
    }
}

/// Orders raw slots by index, dropping out-of-range ones and filling gaps
///
/// When the store repeats a slot the last entry wins.
fn normalize_players(raw: Vec<RawPlayerSlot>) -> [PlayerSlot; SLOT_COUNT] {
    let by_slot: HashMap<Slot, RawPlayerSlot> = raw
        .into_iter()
        .filter_map(|p| Some((Slot::new(p.slot?)?, p)))
        .collect();

    Slot::ALL.map(|slot| match by_slot.get(&slot) {
        Some(raw) => PlayerSlot {
            slot,
            avatar_id: raw.avatar_id.clone().unwrap_or_default(),
            gamepad_index: raw
                .gamepad_index
                .and_then(|i| i32::try_from(i).ok())
                .unwrap_or(UNASSIGNED_GAMEPAD),
            locked_in: raw.locked_in.unwrap_or(false),
        },
        None => PlayerSlot::empty(slot),
    })
}

impl Default for Session {
    fn default() -> Self {
        Self {
            created_at: String::new(),
            players_by_slot: Slot::ALL.map(PlayerSlot::empty),
            scoreboard_by_avatar_id: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

impl Session {
    /// Identifier sent to games, derived from the creation time
    pub fn session_id(&self) -> String {
        if self.created_at.is_empty() {
            "session".to_owned()
        } else {
            self.created_at.clone()
        }
    }

    /// The player in `slot`
    pub fn player(&self, slot: Slot) -> &PlayerSlot {
        &self.players_by_slot[slot.index()]
    }

    /// Slots with both an avatar and a claimed controller
    pub fn active_slots(&self) -> Vec<Slot> {
        self.players_by_slot
            .iter()
            .filter(|p| p.is_ready())
            .map(|p| p.slot)
            .collect_vec()
    }

    /// Controller index for each slot, `-1` where unclaimed
    pub fn slot_to_gamepad_index(&self) -> [i32; SLOT_COUNT] {
        self.players_by_slot.each_ref().map(|p| p.gamepad_index)
    }

    /// All four slots in their client-writable form
    pub fn assignments(&self) -> [PlayerAssignment; SLOT_COUNT] {
        self.players_by_slot.each_ref().map(PlayerAssignment::from)
    }

    /// Scoreboard rows sorted by total, highest first
    pub fn standings(&self) -> Vec<(&str, &ScoreEntry)> {
        self.scoreboard_by_avatar_id
            .iter()
            .sorted_by(|(_, a), (_, b)| b.total.total_cmp(&a.total))
            .map(|(id, entry)| (id.as_str(), entry))
            .collect_vec()
    }

    /// The most recently played game
    pub fn last_result(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }
}
