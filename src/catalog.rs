//! Read-only reference data: avatars and games
//!
//! Both lists are owned by the external store. The lobby keeps a copy for
//! lookups and for picking which game to run next.

use garde::Validate;
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::constants::game::{DEFAULT_MAX_DURATION_SEC, MAX_DURATION_SEC, MIN_DURATION_SEC};

/// Fallback colour for slots and chips without an avatar
pub const NEUTRAL_COLOR: &str = "#888888";

/// A selectable player identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    /// Stable identifier used by the session
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// CSS colour
    #[serde(default)]
    pub color: String,
}

fn default_max_duration() -> u32 {
    DEFAULT_MAX_DURATION_SEC
}

/// A game that can be loaded into the frame
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Identifier, the file stem
    #[garde(length(min = 1))]
    pub id: String,
    /// Title; empty titles fall back to the id
    #[serde(default)]
    #[garde(skip)]
    pub title: String,
    /// Short description
    #[serde(default)]
    #[garde(skip)]
    pub description: String,
    /// File name served under the games directory
    #[garde(length(min = 1), custom(validate_filename))]
    pub filename: String,
    /// Hard cap on run length, in seconds
    #[serde(default = "default_max_duration")]
    #[garde(range(min = MIN_DURATION_SEC, max = MAX_DURATION_SEC))]
    pub max_duration_sec: u32,
    /// Avatar credited as the game's creator
    #[serde(default)]
    #[garde(skip)]
    pub creator_avatar_id: String,
    /// Free-form author credit
    #[garde(skip)]
    pub author: Option<String>,
    /// Upload time as reported by the store
    #[garde(skip)]
    pub uploaded_at: Option<String>,
}

fn validate_filename(filename: &str, _ctx: &()) -> garde::Result {
    let Some(stem) = filename.strip_suffix(".html") else {
        return Err(garde::Error::new("filename must end with .html"));
    };
    let kebab = !stem.is_empty()
        && stem
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    if kebab {
        Ok(())
    } else {
        Err(garde::Error::new(
            "filename must be kebab-case (letters/numbers/dashes)",
        ))
    }
}

impl Game {
    /// Creates a catalog entry named after its file
    pub fn from_filename(filename: &str) -> Self {
        let id = filename.strip_suffix(".html").unwrap_or(filename).to_owned();
        Self {
            id,
            title: String::new(),
            description: String::new(),
            filename: filename.to_owned(),
            max_duration_sec: DEFAULT_MAX_DURATION_SEC,
            creator_avatar_id: String::new(),
            author: None,
            uploaded_at: None,
        }
    }

    /// Title to show, falling back to a title-cased id
    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            self.id.to_title_case()
        } else {
            self.title.clone()
        }
    }

    /// Frame URL path for this game
    pub fn frame_path(&self) -> String {
        format!("/games/{}", self.filename)
    }
}

/// Avatars and games known to the lobby
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// All avatars, in store order
    pub avatars: Vec<Avatar>,
    /// All games, in store order (newest first)
    pub games: Vec<Game>,
}

impl Catalog {
    /// Looks up an avatar by id; empty ids never match
    pub fn avatar(&self, id: &str) -> Option<&Avatar> {
        if id.is_empty() {
            return None;
        }
        self.avatars.iter().find(|a| a.id == id)
    }

    /// Looks up a game by id
    pub fn game(&self, id: &str) -> Option<&Game> {
        self.games.iter().find(|g| g.id == id)
    }

    /// Picks a uniformly random game
    pub fn random_game(&self) -> Option<&Game> {
        if self.games.is_empty() {
            return None;
        }
        self.games.get(fastrand::usize(..self.games.len()))
    }
}
