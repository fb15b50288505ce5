//! Configuration constants for the Maribro lobby
//!
//! This module collects the fixed limits and default timings used by both
//! the host lobby and the in-frame SDK, so that both sides of the frame
//! boundary agree on the same numbers.

/// Lobby shape constants
pub mod lobby {
    /// Number of player slots in a session, always present
    pub const SLOT_COUNT: usize = 4;
    /// Minimum number of ready slots (avatar + controller) to start a run
    pub const MIN_ACTIVE_SLOTS: usize = 2;
    /// Controller index used for a slot without a claimed controller
    pub const UNASSIGNED_GAMEPAD: i32 = -1;
}

/// Host-side timing defaults, in milliseconds
pub mod host {
    /// Interval between controller polls while looking for claim presses
    pub const GAMEPAD_POLL_MS: u64 = 80;
    /// Window in which repeated presses from one controller are coalesced
    pub const PRESS_DEBOUNCE_MS: u64 = 250;
    /// Interval between timer pushes to the running game
    pub const TICK_MS: u64 = 150;
    /// Slack added to a game's duration before the hard timeout fires
    pub const TIMEOUT_SLACK_MS: u64 = 250;
    /// Interval between handshake retries
    pub const HANDSHAKE_RETRY_MS: u64 = 200;
    /// Number of handshake attempts before giving up
    pub const HANDSHAKE_ATTEMPTS: u32 = 10;
    /// Interval between game catalog refreshes
    pub const GAMES_REFRESH_MS: u64 = 2000;
    /// Analog button value above which a button counts as pressed
    pub const ANALOG_PRESS_THRESHOLD: f64 = 0.6;
}

/// Game catalog constants
pub mod game {
    /// Run duration used when a game does not declare one
    pub const DEFAULT_MAX_DURATION_SEC: u32 = 90;
    /// Shortest run duration a catalog entry may declare
    pub const MIN_DURATION_SEC: u32 = 5;
    /// Longest run duration a catalog entry may declare
    pub const MAX_DURATION_SEC: u32 = 300;
    /// Highest score a single slot can be credited with per run
    pub const MAX_SLOT_SCORE: f64 = 10.0;
    /// Creator bonus awarded when every vote is positive
    pub const MAX_CREATOR_BONUS: f64 = 10.0;
}

/// SDK (in-frame) constants
pub mod sdk {
    /// Version reported to the host in the `ready` acknowledgement
    pub const VERSION: &str = "0.1.0";
    /// How long an embedded game waits for `init` before booting mock mode
    pub const READY_FALLBACK_MS: u64 = 500;
    /// Duration assumed by mock mode and by an `init` without one
    pub const MOCK_DURATION_SEC: u32 = 30;
    /// Time remaining reported before any context is known
    pub const UNKNOWN_TIME_REMAINING_MS: f64 = 30_000.0;
    /// Minimum spacing between fallback bloops for one slot
    pub const BLOOP_THROTTLE_MS: u64 = 100;
}

/// Audio policy constants
pub mod audio {
    /// Master volume pushed by the host and assumed by the SDK
    pub const MASTER_VOLUME: f64 = 0.25;
    /// Shortest note the SDK will play
    pub const MIN_NOTE_MS: u32 = 20;
    /// Longest note the SDK will play
    pub const MAX_NOTE_MS: u32 = 800;
    /// Note length used when none is given
    pub const DEFAULT_NOTE_MS: u32 = 80;
    /// Note velocity used when none is given
    pub const DEFAULT_VELOCITY: f64 = 0.5;
}

/// Message protocol constants
pub mod protocol {
    /// Prefix carried by every cross-frame message type
    pub const PREFIX: &str = "maribro:";
}
