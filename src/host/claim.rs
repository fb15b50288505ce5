//! Controller claiming
//!
//! A host clicks "Claim pad" on a slot, then presses any button on the
//! controller that slot should own. [`ClaimCoordinator`] tracks which slot
//! is listening, coalesces repeated presses and makes sure only one claim is
//! ever in flight. It performs no I/O: the lobby queues the resulting players
//! update as a [`PendingClaim`] and calls [`ClaimCoordinator::settle`] once it
//! completes.

use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::{
    constants::host::ANALOG_PRESS_THRESHOLD, gamepad::Gamepad, slot::Slot,
    store::SetPlayersRequest,
};

/// Result of clicking a slot's claim button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    /// A claim is in flight; nothing changed
    Ignored,
    /// The slot now listens for a press
    Listening(Slot),
    /// The slot was listening and no longer is
    Cancelled,
}

/// Result of one controller poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Press {
    /// No button was held on any controller
    Idle,
    /// The same controller pressed again inside the debounce window
    Debounced,
    /// A press that cannot claim anything; the index is shown to the host
    Detected(usize),
    /// A press that claims `gamepad_index` for `slot`
    Claim {
        /// Slot being claimed
        slot: Slot,
        /// Controller that was pressed
        gamepad_index: usize,
    },
}

/// A claim waiting on its players update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingClaim {
    /// Slot being claimed
    pub slot: Slot,
    /// Controller that was pressed
    pub gamepad_index: usize,
    /// The update to send to the store
    pub request: SetPlayersRequest,
}

/// Press-to-claim state machine
#[derive(Debug, Clone)]
pub struct ClaimCoordinator {
    listening: Option<Slot>,
    in_flight: bool,
    last_press: Option<(usize, Duration)>,
    debounce: Duration,
}

impl ClaimCoordinator {
    /// Creates a coordinator that coalesces presses within `debounce`
    pub fn new(debounce: Duration) -> Self {
        Self {
            listening: None,
            in_flight: false,
            last_press: None,
            debounce,
        }
    }

    /// The slot waiting for a press
    pub fn listening(&self) -> Option<Slot> {
        self.listening
    }

    /// Whether a players update for a claim is outstanding
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Handles a click on `slot`'s claim button
    pub fn toggle(&mut self, slot: Slot) -> Toggle {
        if self.in_flight {
            return Toggle::Ignored;
        }
        if self.listening == Some(slot) {
            self.listening = None;
            Toggle::Cancelled
        } else {
            self.listening = Some(slot);
            Toggle::Listening(slot)
        }
    }

    /// Looks at the current controllers for a press
    ///
    /// Only the first controller holding a button is considered. Starting a
    /// claim clears the listening slot and marks the claim in flight; the
    /// listening slot is not restored if the claim later fails.
    pub fn observe(&mut self, pads: &[Gamepad], now: Duration) -> Press {
        let Some(index) = pads
            .iter()
            .find(|pad| pad.any_active(ANALOG_PRESS_THRESHOLD))
            .map(|pad| pad.index)
        else {
            return Press::Idle;
        };

        if let Some((last, at)) = self.last_press {
            if last == index && now.saturating_sub(at) < self.debounce {
                return Press::Debounced;
            }
        }
        self.last_press = Some((index, now));

        match self.listening {
            Some(slot) if !self.in_flight => {
                self.listening = None;
                self.in_flight = true;
                Press::Claim {
                    slot,
                    gamepad_index: index,
                }
            }
            _ => Press::Detected(index),
        }
    }

    /// Marks the outstanding claim as finished, whatever its outcome
    pub fn settle(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::gamepad::ButtonState;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn pressing(index: usize) -> Vec<Gamepad> {
        vec![Gamepad::new(index).with_button(0, ButtonState::down())]
    }

    fn slot(n: i64) -> Slot {
        Slot::new(n).unwrap()
    }

    #[test]
    fn test_toggle_listens_and_cancels() {
        let mut claim = ClaimCoordinator::new(ms(250));

        assert_eq!(claim.toggle(slot(1)), Toggle::Listening(slot(1)));
        assert_eq!(claim.toggle(slot(2)), Toggle::Listening(slot(2)));
        assert_eq!(claim.listening(), Some(slot(2)));
        assert_eq!(claim.toggle(slot(2)), Toggle::Cancelled);
        assert_eq!(claim.listening(), None);
    }

    #[test]
    fn test_press_claims_listening_slot() {
        let mut claim = ClaimCoordinator::new(ms(250));
        claim.toggle(slot(1));

        assert_eq!(
            claim.observe(&pressing(2), ms(0)),
            Press::Claim {
                slot: slot(1),
                gamepad_index: 2
            }
        );
        assert!(claim.in_flight());
        assert_eq!(claim.listening(), None);
    }

    #[test]
    fn test_toggle_ignored_while_in_flight() {
        let mut claim = ClaimCoordinator::new(ms(250));
        claim.toggle(slot(0));
        claim.observe(&pressing(0), ms(0));

        assert_eq!(claim.toggle(slot(3)), Toggle::Ignored);
        assert_eq!(claim.listening(), None);

        claim.settle();
        assert_eq!(claim.toggle(slot(3)), Toggle::Listening(slot(3)));
    }

    #[test]
    fn test_press_in_flight_only_detects() {
        let mut claim = ClaimCoordinator::new(ms(250));
        claim.toggle(slot(0));
        claim.observe(&pressing(0), ms(0));

        assert_eq!(claim.observe(&pressing(1), ms(10)), Press::Detected(1));
    }

    #[test]
    fn test_press_without_listener_only_detects() {
        let mut claim = ClaimCoordinator::new(ms(250));
        assert_eq!(claim.observe(&pressing(3), ms(0)), Press::Detected(3));
        assert!(!claim.in_flight());
    }

    #[test]
    fn test_same_controller_debounced_within_window() {
        let mut claim = ClaimCoordinator::new(ms(250));

        assert_eq!(claim.observe(&pressing(1), ms(1000)), Press::Detected(1));
        assert_eq!(claim.observe(&pressing(1), ms(1080)), Press::Debounced);
        assert_eq!(claim.observe(&pressing(1), ms(1249)), Press::Debounced);
        assert_eq!(claim.observe(&pressing(1), ms(1250)), Press::Detected(1));
    }

    #[test]
    fn test_other_controller_not_debounced() {
        let mut claim = ClaimCoordinator::new(ms(250));
        claim.observe(&pressing(1), ms(0));
        claim.toggle(slot(2));

        assert_eq!(
            claim.observe(&pressing(0), ms(50)),
            Press::Claim {
                slot: slot(2),
                gamepad_index: 0
            }
        );
    }

    #[test]
    fn test_analog_press_counts_past_threshold() {
        let mut claim = ClaimCoordinator::new(ms(250));
        let weak = vec![Gamepad::new(0).with_button(7, ButtonState::analog(0.5))];
        let strong = vec![Gamepad::new(0).with_button(7, ButtonState::analog(0.7))];

        assert_eq!(claim.observe(&weak, ms(0)), Press::Idle);
        assert_eq!(claim.observe(&strong, ms(0)), Press::Detected(0));
    }

    #[test]
    fn test_first_pressing_controller_wins() {
        let mut claim = ClaimCoordinator::new(ms(250));
        claim.toggle(slot(0));
        let pads = vec![
            Gamepad::new(0),
            Gamepad::new(1).with_button(2, ButtonState::down()),
            Gamepad::new(2).with_button(0, ButtonState::down()),
        ];

        assert_eq!(
            claim.observe(&pads, ms(0)),
            Press::Claim {
                slot: slot(0),
                gamepad_index: 1
            }
        );
    }
}
