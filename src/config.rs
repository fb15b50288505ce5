//! Lobby configuration
//!
//! Tunable timings, host options and SDK options. Everything defaults to the
//! values in [`crate::constants`]; embedders may deserialize an override and
//! should validate it with [`garde::Validate`] before using it.

use garde::Validate;
use serde::{Deserialize, Serialize};
use web_time::Duration;

use crate::constants::{audio, host, sdk};

/// Timer periods used by the host lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Timings {
    /// Interval between controller polls
    #[garde(range(min = 10, max = 1000))]
    pub gamepad_poll_ms: u64,
    /// Window in which repeated presses from one controller are coalesced
    #[garde(range(max = 5000))]
    pub press_debounce_ms: u64,
    /// Interval between timer pushes to the running game
    #[garde(range(min = 10, max = 5000))]
    pub tick_ms: u64,
    /// Slack added to a game's duration before the hard timeout fires
    #[garde(range(max = 10_000))]
    pub timeout_slack_ms: u64,
    /// Interval between handshake retries
    #[garde(range(min = 10, max = 5000))]
    pub handshake_retry_ms: u64,
    /// Number of handshake attempts
    #[garde(range(min = 1, max = 100))]
    pub handshake_attempts: u32,
    /// Interval between game catalog refreshes
    #[garde(range(min = 100))]
    pub games_refresh_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            gamepad_poll_ms: host::GAMEPAD_POLL_MS,
            press_debounce_ms: host::PRESS_DEBOUNCE_MS,
            tick_ms: host::TICK_MS,
            timeout_slack_ms: host::TIMEOUT_SLACK_MS,
            handshake_retry_ms: host::HANDSHAKE_RETRY_MS,
            handshake_attempts: host::HANDSHAKE_ATTEMPTS,
            games_refresh_ms: host::GAMES_REFRESH_MS,
        }
    }
}

impl Timings {
    /// Controller poll period
    pub fn gamepad_poll(&self) -> Duration {
        Duration::from_millis(self.gamepad_poll_ms)
    }

    /// Press debounce window
    pub fn press_debounce(&self) -> Duration {
        Duration::from_millis(self.press_debounce_ms)
    }

    /// Tick period
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Hard timeout for a run of `max_duration_sec` seconds
    pub fn hard_timeout(&self, max_duration_sec: u32) -> Duration {
        Duration::from_secs(u64::from(max_duration_sec))
            + Duration::from_millis(self.timeout_slack_ms)
    }

    /// Handshake retry period
    pub fn handshake_retry(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_ms)
    }

    /// Catalog refresh period
    pub fn games_refresh(&self) -> Duration {
        Duration::from_millis(self.games_refresh_ms)
    }
}

/// Host lobby options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct LobbyOptions {
    /// Origin that frame messages must come from
    #[garde(length(min = 1))]
    pub origin: String,
    /// Master volume pushed with every audio config
    #[garde(range(min = 0.0, max = 1.0))]
    pub master_volume: f64,
    /// Whether audio starts enabled
    #[garde(skip)]
    pub audio_enabled: bool,
    /// Timer periods
    #[garde(dive)]
    pub timings: Timings,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_owned(),
            master_volume: audio::MASTER_VOLUME,
            audio_enabled: false,
            timings: Timings::default(),
        }
    }
}

impl LobbyOptions {
    /// Options for a lobby served from `origin`
    pub fn with_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }
}

/// In-frame SDK options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct SdkOptions {
    /// Origin that host messages must come from, and that results are posted to
    #[garde(length(min = 1))]
    pub origin: String,
    /// Whether the game was loaded inside the host's frame
    #[garde(skip)]
    pub embedded: bool,
    /// How long an embedded game waits for `init` before booting mock mode
    #[garde(range(max = 10_000))]
    pub ready_fallback_ms: u64,
}

impl Default for SdkOptions {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_owned(),
            embedded: true,
            ready_fallback_ms: sdk::READY_FALLBACK_MS,
        }
    }
}

impl SdkOptions {
    /// Options for a game embedded in a lobby served from `origin`
    pub fn embedded(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Options for a game opened on its own
    pub fn standalone(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            embedded: false,
            ..Self::default()
        }
    }

    /// Delay before mock mode boots when no `init` arrives
    pub fn ready_fallback(&self) -> Duration {
        if self.embedded {
            Duration::from_millis(self.ready_fallback_ms)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(LobbyOptions::default().validate().is_ok());
        assert!(Timings::default().validate().is_ok());
    }

    #[test]
    fn test_hard_timeout_adds_slack() {
        let timings = Timings::default();
        assert_eq!(timings.hard_timeout(60), Duration::from_millis(60_250));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let timings: Timings = serde_json::from_str(r#"{"tickMs": 100}"#).unwrap();
        assert_eq!(timings.tick_ms, 100);
        assert_eq!(timings.handshake_attempts, 10);
    }

    #[test]
    fn test_standalone_games_boot_mock_immediately() {
        assert_eq!(SdkOptions::embedded("x").ready_fallback(), Duration::from_millis(500));
        assert_eq!(SdkOptions::standalone("x").ready_fallback(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let mut options = LobbyOptions::default();
        options.master_volume = 2.0;
        assert!(options.validate().is_err());

        let mut options = LobbyOptions::default();
        options.origin = String::new();
        assert!(options.validate().is_err());

        let mut options = LobbyOptions::default();
        options.timings.handshake_attempts = 0;
        assert!(options.validate().is_err());
    }
}
