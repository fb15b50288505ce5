//! Game-side handshake
//!
//! A game is ready once it knows who is playing. That knowledge arrives
//! either from the host's `init` message or, when no host answers in time,
//! from a fixed four-player mock context so the game can be developed on its
//! own.

use std::fmt::Debug;

use tracing::{debug, info};

use crate::{
    constants::{
        lobby::{SLOT_COUNT, UNASSIGNED_GAMEPAD},
        sdk::MOCK_DURATION_SEC,
    },
    protocol::{InitPayload, RosterEntry},
    slot::Slot,
};

const MOCK_COLORS: [&str; SLOT_COUNT] = ["#E53935", "#1E88E5", "#43A047", "#FDD835"];

/// What a game knows about its run
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// Identifier of the lobby session
    pub session_id: String,
    /// Players, ordered by slot
    pub players_by_slot: Vec<RosterEntry>,
    /// Controller index per slot, `-1` where unclaimed
    pub slot_to_gamepad_index: [i32; SLOT_COUNT],
    /// Slots taking part
    pub active_slots: Vec<Slot>,
    /// Hard cap on run length
    pub max_duration_sec: u32,
    /// Host clock at run start
    pub started_at_ms: f64,
}

impl Context {
    /// Builds the context for an `init` message
    ///
    /// When the host leaves out the active slots, a slot is active if its
    /// player has an avatar and a mapped controller.
    pub fn from_init(init: InitPayload) -> Self {
        let active_slots = init.active_slots.unwrap_or_else(|| {
            Slot::ALL
                .into_iter()
                .filter(|slot| {
                    let has_avatar = init
                        .players_by_slot
                        .iter()
                        .any(|p| p.slot == *slot && !p.avatar_id.is_empty());
                    has_avatar && init.slot_to_gamepad_index[slot.index()] >= 0
                })
                .collect()
        });

        Self {
            session_id: init.session_id,
            players_by_slot: init.players_by_slot,
            slot_to_gamepad_index: init.slot_to_gamepad_index,
            active_slots,
            max_duration_sec: init.max_duration_sec,
            started_at_ms: init.started_at_ms,
        }
    }

    /// The stand-in context used when no host is present
    pub fn mock() -> Self {
        Self {
            session_id: "mock".to_owned(),
            players_by_slot: Slot::ALL
                .into_iter()
                .map(|slot| RosterEntry {
                    slot,
                    avatar_id: format!("mock-{slot}"),
                    name: format!("Mock {}", slot.number()),
                    color: MOCK_COLORS[slot.index()].to_owned(),
                })
                .collect(),
            slot_to_gamepad_index: [UNASSIGNED_GAMEPAD; SLOT_COUNT],
            active_slots: Slot::ALL.to_vec(),
            max_duration_sec: MOCK_DURATION_SEC,
            started_at_ms: 0.0,
        }
    }

    /// Controller index mapped to `slot`, if any
    pub fn gamepad_index(&self, slot: Slot) -> Option<usize> {
        usize::try_from(self.slot_to_gamepad_index[slot.index()]).ok()
    }
}

type ReadyHandler = Box<dyn FnOnce(&Context)>;

/// Tracks readiness and the callbacks waiting on it
#[derive(Default)]
pub struct ReadyHandshake {
    context: Option<Context>,
    mock: bool,
    pending: Vec<ReadyHandler>,
}

impl Debug for ReadyHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyHandshake")
            .field("context", &self.context)
            .field("mock", &self.mock)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ReadyHandshake {
    /// A handshake that has not completed
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a context is known
    pub fn is_ready(&self) -> bool {
        self.context.is_some()
    }

    /// Whether the context is the mock one
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// The current context
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Runs `handler` once the game is ready, immediately if it already is
    pub fn on_ready(&mut self, handler: impl FnOnce(&Context) + 'static) {
        match &self.context {
            Some(context) => handler(context),
            None => self.pending.push(Box::new(handler)),
        }
    }

    /// Adopts the host's context
    ///
    /// A later `init` replaces the context, including a mock one, but queued
    /// handlers only ever run once.
    pub fn accept_init(&mut self, init: InitPayload) -> &Context {
        let context = Context::from_init(init);
        info!(
            session_id = %context.session_id,
            active = context.active_slots.len(),
            "init received"
        );
        self.mock = false;
        self.become_ready(context)
    }

    /// Boots the mock context unless the game is already ready
    ///
    /// Returns whether mock mode started.
    pub fn boot_mock(&mut self) -> bool {
        if self.is_ready() {
            debug!("init arrived before the fallback, staying with the host");
            return false;
        }
        info!("no host answered, booting mock mode");
        self.mock = true;
        self.become_ready(Context::mock());
        true
    }

    fn become_ready(&mut self, context: Context) -> &Context {
        let context = self.context.insert(context);
        for handler in self.pending.drain(..) {
            handler(context);
        }
        context
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn entry(slot: usize, avatar_id: &str) -> RosterEntry {
        RosterEntry {
            slot: Slot::ALL[slot],
            avatar_id: avatar_id.to_owned(),
            name: avatar_id.to_owned(),
            color: "#000".to_owned(),
        }
    }

    fn init(active_slots: Option<Vec<Slot>>) -> InitPayload {
        InitPayload {
            session_id: "s-1".to_owned(),
            slot_to_gamepad_index: [0, -1, 2, 1],
            players_by_slot: vec![
                entry(0, "ana"),
                entry(1, "bo"),
                entry(2, "cy"),
                entry(3, ""),
            ],
            active_slots,
            max_duration_sec: 45,
            started_at_ms: 1000.0,
        }
    }

    #[test]
    fn test_active_slots_derived_when_absent() {
        let context = Context::from_init(init(None));
        assert_eq!(context.active_slots, vec![Slot::ALL[0], Slot::ALL[2]]);
        assert_eq!(context.gamepad_index(Slot::ALL[2]), Some(2));
        assert_eq!(context.gamepad_index(Slot::ALL[1]), None);
    }

    #[test]
    fn test_explicit_active_slots_win() {
        let context = Context::from_init(init(Some(vec![Slot::ALL[3]])));
        assert_eq!(context.active_slots, vec![Slot::ALL[3]]);
    }

    #[test]
    fn test_mock_context() {
        let context = Context::mock();
        assert_eq!(context.active_slots, Slot::ALL.to_vec());
        assert_eq!(context.max_duration_sec, 30);
        assert_eq!(context.players_by_slot[2].name, "Mock 3");
        assert_eq!(context.players_by_slot[2].avatar_id, "mock-2");
        assert_eq!(context.players_by_slot[0].color, "#E53935");
        assert_eq!(context.slot_to_gamepad_index, [-1; 4]);
    }

    #[test]
    fn test_handlers_flush_once_on_ready() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut handshake = ReadyHandshake::new();

        let log = Rc::clone(&calls);
        handshake.on_ready(move |c| log.borrow_mut().push(c.session_id.clone()));
        assert!(calls.borrow().is_empty());

        handshake.accept_init(init(None));
        handshake.accept_init(init(None));
        assert_eq!(*calls.borrow(), vec!["s-1".to_owned()]);

        let log = Rc::clone(&calls);
        handshake.on_ready(move |c| log.borrow_mut().push(format!("late {}", c.max_duration_sec)));
        assert_eq!(*calls.borrow(), vec!["s-1".to_owned(), "late 45".to_owned()]);
    }

    #[test]
    fn test_mock_boots_only_when_not_ready() {
        let mut handshake = ReadyHandshake::new();
        handshake.accept_init(init(None));
        assert!(!handshake.boot_mock());
        assert!(!handshake.is_mock());

        let mut handshake = ReadyHandshake::new();
        assert!(handshake.boot_mock());
        assert!(handshake.is_mock());
        assert_eq!(handshake.context().map(|c| c.active_slots.len()), Some(4));
    }

    #[test]
    fn test_init_after_mock_leaves_mock_mode() {
        let mut handshake = ReadyHandshake::new();
        handshake.boot_mock();
        handshake.accept_init(init(None));

        assert!(!handshake.is_mock());
        assert_eq!(handshake.context().map(|c| c.session_id.as_str()), Some("s-1"));
    }
}
