//! In-process session store
//!
//! Keeps avatars, games and the session in memory and applies the same
//! bookkeeping rules as the lobby's HTTP backend: slot validation, derived
//! `lockedIn`, score clamping, creator bonuses and scoreboard totals. Useful
//! for standalone hosts and as the store double in tests.

use std::collections::HashMap;

use garde::Validate;
use tracing::info;
use web_time::{SystemTime, UNIX_EPOCH};

use super::{Error, RecordGameRequest, SessionStore, SetPlayersRequest};
use crate::{
    catalog::{Avatar, Game},
    constants::game::{MAX_CREATOR_BONUS, MAX_SLOT_SCORE},
    session::{HistoryEntry, PlayerSlot, Session},
    slot::Slot,
};

/// Milliseconds since the Unix epoch, as text
fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

/// Clamps a reported score to a whole number of points in `0..=10`
///
/// Halves round to the even neighbour.
fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, MAX_SLOT_SCORE).round_ties_even()
}

/// Creator bonus: the share of thumbs-up among non-abstaining votes, out of 10
fn creator_bonus(ratings: Option<&[i8]>) -> f64 {
    let Some(ratings) = ratings else {
        return 0.0;
    };
    let up = ratings.iter().filter(|r| **r == 1).count();
    let down = ratings.iter().filter(|r| **r == -1).count();
    let votes = up + down;
    if votes == 0 {
        return 0.0;
    }
    (MAX_CREATOR_BONUS * up as f64 / votes as f64).round_ties_even()
}

/// A [`SessionStore`] that lives in memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    avatars: Vec<Avatar>,
    games: Vec<Game>,
    session: Session,
}

impl MemoryStore {
    /// Creates a store with the given avatars, no games and a fresh session
    pub fn new(avatars: Vec<Avatar>) -> Self {
        Self {
            avatars,
            games: Vec::new(),
            session: Self::fresh_session(),
        }
    }

    fn fresh_session() -> Session {
        Session {
            created_at: timestamp(),
            ..Session::default()
        }
    }

    fn is_known_avatar(&self, id: &str) -> bool {
        self.avatars.iter().any(|a| a.id == id)
    }

    /// Adds or replaces a game; the newest game is listed first
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] if the entry fails validation or names an
    /// unknown creator.
    pub fn add_game(&mut self, game: Game) -> Result<(), Error> {
        game.validate()
            .map_err(|report| Error::rejected("bad_game", report.to_string()))?;
        if !game.creator_avatar_id.is_empty() && !self.is_known_avatar(&game.creator_avatar_id) {
            return Err(Error::rejected(
                "unknown_avatar",
                format!("unknown creator_avatar_id: {}", game.creator_avatar_id),
            ));
        }
        self.games.retain(|g| g.id != game.id);
        self.games.insert(0, game);
        Ok(())
    }

    /// The current session, without copying
    pub fn current_session(&self) -> &Session {
        &self.session
    }
}

impl SessionStore for MemoryStore {
    fn avatars(&self) -> Result<Vec<Avatar>, Error> {
        Ok(self.avatars.clone())
    }

    fn games(&self) -> Result<Vec<Game>, Error> {
        Ok(self.games.clone())
    }

    fn session(&self) -> Result<Session, Error> {
        Ok(self.session.clone())
    }

    fn set_players(&mut self, request: &SetPlayersRequest) -> Result<Session, Error> {
        let mut by_slot: HashMap<Slot, PlayerSlot> = HashMap::new();

        for entry in &request.players_by_slot {
            if !entry.avatar_id.is_empty() && !self.is_known_avatar(&entry.avatar_id) {
                return Err(Error::rejected(
                    "unknown_avatar",
                    format!("unknown avatarId: {}", entry.avatar_id),
                ));
            }
            let player = PlayerSlot {
                slot: entry.slot,
                avatar_id: entry.avatar_id.clone(),
                gamepad_index: entry.gamepad_index,
                locked_in: !entry.avatar_id.is_empty() && entry.gamepad_index >= 0,
            };
            if by_slot.insert(entry.slot, player).is_some() {
                return Err(Error::rejected("bad_body", "duplicate slot in playersBySlot"));
            }
        }

        self.session.players_by_slot = Slot::ALL.map(|slot| {
            by_slot
                .remove(&slot)
                .unwrap_or_else(|| PlayerSlot::empty(slot))
        });
        Ok(self.session.clone())
    }

    fn record_game(&mut self, request: &RecordGameRequest) -> Result<Session, Error> {
        if request.game_id.is_empty() {
            return Err(Error::rejected("bad_body", "gameId is required"));
        }
        let Some(game) = self.games.iter().find(|g| g.id == request.game_id) else {
            return Err(Error::rejected(
                "unknown_game",
                format!("unknown gameId: {}", request.game_id),
            ));
        };
        let creator = game.creator_avatar_id.clone();

        let scores = request.scores_by_slot.map(clamp_score);
        let ratings = request
            .ratings_by_slot
            .map(|ratings| ratings.map(|r| if (-1..=1).contains(&r) { r } else { 0 }));

        let scoreboard = &mut self.session.scoreboard_by_avatar_id;
        for (player, points) in self.session.players_by_slot.iter().zip(scores) {
            if player.avatar_id.is_empty() {
                continue;
            }
            scoreboard.entry(player.avatar_id.clone()).or_default().play += points;
        }

        if !creator.is_empty() {
            let bonus = creator_bonus(ratings.as_ref().map(<[i8; 4]>::as_slice));
            scoreboard.entry(creator.clone()).or_default().creator += bonus;
        }

        for entry in scoreboard.values_mut() {
            entry.total = entry.play + entry.creator;
        }

        self.session.history.push(HistoryEntry {
            game_id: request.game_id.clone(),
            scores_by_slot: scores.to_vec(),
            played_at: Some(timestamp()),
            creator_avatar_id: Some(creator),
            ratings_by_slot: ratings.map(|r| r.to_vec()),
        });

        info!(game_id = %request.game_id, ?scores, "recorded game");
        Ok(self.session.clone())
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.session = Self::fresh_session();
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::session::{PlayerAssignment, ScoreEntry};

    fn avatar(id: &str) -> Avatar {
        Avatar {
            id: id.to_owned(),
            name: id.to_uppercase(),
            color: "#123456".to_owned(),
        }
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new(vec![avatar("a"), avatar("b"), avatar("maker")]);
        let mut game = Game::from_filename("pong.html");
        game.creator_avatar_id = "maker".to_owned();
        store.add_game(game).unwrap();
        store
    }

    fn assign(store: &mut MemoryStore, players: [(&str, i32); 4]) -> Result<Session, Error> {
        let mut assignments = Session::default().assignments();
        for (assignment, (avatar_id, gamepad_index)) in assignments.iter_mut().zip(players) {
            assignment.avatar_id = avatar_id.to_owned();
            assignment.gamepad_index = gamepad_index;
        }
        store.set_players(&SetPlayersRequest {
            players_by_slot: assignments,
        })
    }

    #[test]
    fn test_set_players_derives_locked_in() {
        let mut store = store();
        let session = assign(&mut store, [("a", 0), ("b", -1), ("", 2), ("", -1)]).unwrap();

        let locked: Vec<bool> = session.players_by_slot.iter().map(|p| p.locked_in).collect();
        assert_eq!(locked, vec![true, false, false, false]);
    }

    #[test]
    fn test_set_players_rejects_unknown_avatar() {
        let mut store = store();
        let err = assign(&mut store, [("nobody", 0), ("", -1), ("", -1), ("", -1)]).unwrap_err();
        assert!(matches!(err, Error::Rejected { code: Some(ref c), .. } if c == "unknown_avatar"));
        assert_eq!(store.current_session().players_by_slot[0].avatar_id, "");
    }

    #[test]
    fn test_set_players_rejects_duplicate_slots() {
        let mut store = store();
        let mut assignments = Session::default().assignments();
        assignments[3] = PlayerAssignment {
            slot: Slot::ALL[0],
            avatar_id: String::new(),
            gamepad_index: -1,
        };
        let result = store.set_players(&SetPlayersRequest {
            players_by_slot: assignments,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_record_game_clamps_and_totals() {
        let mut store = store();
        assign(&mut store, [("a", 0), ("b", 1), ("", -1), ("", -1)]).unwrap();

        let session = store
            .record_game(&RecordGameRequest {
                game_id: "pong".to_owned(),
                scores_by_slot: [12.0, 3.4, 7.0, f64::NAN],
                ratings_by_slot: Some([1, 1, -1, 5]),
            })
            .unwrap();

        let a = session.scoreboard_by_avatar_id["a"];
        let b = session.scoreboard_by_avatar_id["b"];
        let maker = session.scoreboard_by_avatar_id["maker"];
        assert_eq!((a.play, a.total), (10.0, 10.0));
        assert_eq!((b.play, b.total), (3.0, 3.0));
        assert_eq!((maker.creator, maker.total), (7.0, 7.0));

        let last = session.last_result().unwrap();
        assert_eq!(last.scores_by_slot, vec![10.0, 3.0, 7.0, 0.0]);
        assert_eq!(last.ratings_by_slot, Some(vec![1, 1, -1, 0]));
        assert_eq!(last.creator_avatar_id.as_deref(), Some("maker"));
    }

    #[test]
    fn test_record_game_without_ratings_gives_no_bonus() {
        let mut store = store();
        let session = store
            .record_game(&RecordGameRequest {
                game_id: "pong".to_owned(),
                scores_by_slot: [0.0; 4],
                ratings_by_slot: None,
            })
            .unwrap();

        assert_eq!(session.scoreboard_by_avatar_id["maker"], ScoreEntry::default());
        assert_eq!(session.history.len(), 1);
    }

    #[test]
    fn test_record_game_unknown_game() {
        let mut store = store();
        let err = store
            .record_game(&RecordGameRequest {
                game_id: "missing".to_owned(),
                scores_by_slot: [0.0; 4],
                ratings_by_slot: None,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown gameId: missing");
        assert!(store.current_session().history.is_empty());
    }

    #[test]
    fn test_reset_clears_history_and_players() {
        let mut store = store();
        assign(&mut store, [("a", 0), ("b", 1), ("", -1), ("", -1)]).unwrap();
        store
            .record_game(&RecordGameRequest {
                game_id: "pong".to_owned(),
                scores_by_slot: [1.0; 4],
                ratings_by_slot: None,
            })
            .unwrap();

        store.reset().unwrap();

        let session = store.session().unwrap();
        assert!(session.history.is_empty());
        assert!(session.scoreboard_by_avatar_id.is_empty());
        assert!(session.active_slots().is_empty());
    }

    #[test]
    fn test_add_game_validates() {
        let mut store = store();
        let mut game = Game::from_filename("too-long.html");
        game.max_duration_sec = 1000;
        assert!(store.add_game(game).is_err());

        let mut game = Game::from_filename("orphan.html");
        game.creator_avatar_id = "ghost".to_owned();
        assert!(store.add_game(game).is_err());

        store.add_game(Game::from_filename("newer.html")).unwrap();
        let ids: Vec<String> = store.games().unwrap().into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec!["newer", "pong"]);
    }

    #[test]
    fn test_creator_bonus() {
        assert_eq!(creator_bonus(None), 0.0);
        assert_eq!(creator_bonus(Some(&[0, 0, 0, 0])), 0.0);
        assert_eq!(creator_bonus(Some(&[1, 1, 1, -1])), 8.0);
        assert_eq!(creator_bonus(Some(&[1, 0, 0, 0])), 10.0);
        assert_eq!(creator_bonus(Some(&[1, -1, -1, -1])), 2.0);
    }

    #[test]
    fn test_scores_round_half_to_even() {
        assert_eq!(clamp_score(2.5), 2.0);
        assert_eq!(clamp_score(3.5), 4.0);
        assert_eq!(clamp_score(9.5), 10.0);
        assert_eq!(clamp_score(-0.5), 0.0);
    }
}
