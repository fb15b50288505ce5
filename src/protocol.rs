//! Cross-frame message protocol
//!
//! Messages travel as `{ "type": "maribro:<kind>", "payload": { ... } }`
//! objects. Each direction is a closed enum: [`HostMessage`] flows from the
//! lobby into the game frame, [`GameMessage`] flows back. Incoming data is
//! checked for origin and shape by [`decode`] before anything acts on it;
//! anything that does not fit is rejected and ignored, never thrown.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{
    constants::{
        lobby::{SLOT_COUNT, UNASSIGNED_GAMEPAD},
        protocol::PREFIX,
        sdk::MOCK_DURATION_SEC,
    },
    slot::Slot,
};

/// A player as presented to a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Slot the player sits in
    pub slot: Slot,
    /// Avatar id, empty when none
    #[serde(default)]
    pub avatar_id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// CSS colour
    #[serde(default)]
    pub color: String,
}

fn unassigned_gamepads() -> [i32; SLOT_COUNT] {
    [UNASSIGNED_GAMEPAD; SLOT_COUNT]
}

fn mock_duration() -> u32 {
    MOCK_DURATION_SEC
}

/// Full run context sent during the handshake
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// Identifier of the lobby session
    #[serde(default)]
    pub session_id: String,
    /// Controller index per slot, `-1` where unclaimed
    #[serde(default = "unassigned_gamepads")]
    pub slot_to_gamepad_index: [i32; SLOT_COUNT],
    /// Players, ordered by slot
    #[serde(default)]
    pub players_by_slot: Vec<RosterEntry>,
    /// Slots taking part; derived by the game when absent
    #[serde(default)]
    pub active_slots: Option<Vec<Slot>>,
    /// Hard cap on run length
    #[serde(default = "mock_duration")]
    pub max_duration_sec: u32,
    /// Host clock at run start
    #[serde(default)]
    pub started_at_ms: f64,
}

/// Periodic timer push
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// Host clock
    pub now_ms: f64,
    /// Time left before the hard cap
    pub time_remaining_ms: f64,
}

/// Why the host ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The host ended it, by the end button or by starting another run
    Host,
    /// The hard timeout fired
    Timeout,
}

/// Host-initiated termination notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceEndPayload {
    /// Why the run ended
    pub reason: EndReason,
}

/// Audio policy push
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    /// Whether games may make sound
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Master gain, `0..=1`
    #[serde(default)]
    pub master_volume: Option<f64>,
}

/// Handshake acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    /// SDK version running in the frame
    pub sdk_version: String,
}

/// Run result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndPayload {
    /// Exactly one numeric score per slot
    pub scores_by_slot: [f64; SLOT_COUNT],
    /// Game clock at the end
    #[serde(default)]
    pub ended_at_ms: f64,
}

/// Messages posted by the host into the game frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "type", content = "payload")]
pub enum HostMessage {
    /// Handshake context
    #[serde(rename = "maribro:init")]
    Init(InitPayload),
    /// Timer push
    #[serde(rename = "maribro:tick")]
    Tick(TickPayload),
    /// Host-initiated termination
    #[serde(rename = "maribro:force_end")]
    ForceEnd(ForceEndPayload),
    /// Audio policy
    #[serde(rename = "maribro:audio_config")]
    AudioConfig(AudioConfig),
    /// Request to unlock audio after a user gesture
    #[serde(rename = "maribro:audio_arm")]
    #[from(skip)]
    AudioArm {},
}

/// Messages posted by the game frame to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "type", content = "payload")]
pub enum GameMessage {
    /// Handshake acknowledgement
    #[serde(rename = "maribro:ready")]
    Ready(ReadyPayload),
    /// Run result
    #[serde(rename = "maribro:game_end")]
    GameEnd(GameEndPayload),
}

/// A closed set of message kinds for one direction
pub trait Message: Serialize + DeserializeOwned {
    /// Every `type` string this direction understands
    const TYPES: &'static [&'static str];

    /// Converts the message to the JSON object posted across the boundary
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    fn to_message(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("default serializer cannot fail")
    }
}

impl Message for HostMessage {
    const TYPES: &'static [&'static str] = &[
        "maribro:init",
        "maribro:tick",
        "maribro:force_end",
        "maribro:audio_config",
        "maribro:audio_arm",
    ];
}

impl Message for GameMessage {
    const TYPES: &'static [&'static str] = &["maribro:ready", "maribro:game_end"];
}

/// Why an incoming message was ignored
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Posted from another origin
    #[error("message from foreign origin {0}")]
    ForeignOrigin(String),
    /// Not a protocol message at all (other libraries post too)
    #[error("not a maribro message")]
    NotAMessage,
    /// A protocol type this direction does not handle
    #[error("unknown message type {0}")]
    UnknownType(String),
    /// A known type whose payload has the wrong shape
    #[error("malformed {kind} payload: {reason}")]
    Malformed {
        /// The message type
        kind: String,
        /// What the decoder objected to
        reason: String,
    },
}

/// Validates and decodes a message posted across the frame boundary
///
/// # Errors
///
/// Returns a [`Rejection`] when the origin differs from `expected_origin`,
/// when the data is not a `maribro:` message, or when the payload does not
/// match its type.
pub fn decode<M: Message>(
    origin: &str,
    expected_origin: &str,
    data: &serde_json::Value,
) -> Result<M, Rejection> {
    if origin != expected_origin {
        return Err(Rejection::ForeignOrigin(origin.to_owned()));
    }

    let Some(kind) = data.get("type").and_then(serde_json::Value::as_str) else {
        return Err(Rejection::NotAMessage);
    };
    if !kind.starts_with(PREFIX) {
        return Err(Rejection::NotAMessage);
    }
    if !M::TYPES.contains(&kind) {
        return Err(Rejection::UnknownType(kind.to_owned()));
    }

    M::deserialize(data).map_err(|e| Rejection::Malformed {
        kind: kind.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGIN: &str = "http://localhost:8000";

    fn game(data: serde_json::Value) -> Result<GameMessage, Rejection> {
        decode(ORIGIN, ORIGIN, &data)
    }

    #[test]
    fn test_game_end_decodes() {
        let msg = game(json!({
            "type": "maribro:game_end",
            "payload": {"scoresBySlot": [3, 0, 1.5, 10], "endedAtMs": 1234.5}
        }));
        assert_eq!(
            msg,
            Ok(GameMessage::GameEnd(GameEndPayload {
                scores_by_slot: [3.0, 0.0, 1.5, 10.0],
                ended_at_ms: 1234.5,
            }))
        );
    }

    #[test]
    fn test_game_end_wrong_length_rejected() {
        for scores in [json!([1, 2, 3]), json!([1, 2, 3, 4, 5]), json!([])] {
            let msg = game(json!({"type": "maribro:game_end", "payload": {"scoresBySlot": scores}}));
            assert!(matches!(msg, Err(Rejection::Malformed { .. })));
        }
    }

    #[test]
    fn test_game_end_non_numeric_rejected() {
        for scores in [json!([1, "2", 3, 4]), json!([1, null, 3, 4]), json!("1,2,3,4")] {
            let msg = game(json!({"type": "maribro:game_end", "payload": {"scoresBySlot": scores}}));
            assert!(matches!(msg, Err(Rejection::Malformed { .. })));
        }
        let msg = game(json!({"type": "maribro:game_end"}));
        assert!(matches!(msg, Err(Rejection::Malformed { .. })));
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let data = json!({"type": "maribro:ready", "payload": {"sdkVersion": "0.1.0"}});
        assert_eq!(
            decode::<GameMessage>("http://evil.example", ORIGIN, &data),
            Err(Rejection::ForeignOrigin("http://evil.example".to_owned()))
        );
    }

    #[test]
    fn test_non_protocol_data_rejected() {
        assert_eq!(game(json!("hello")), Err(Rejection::NotAMessage));
        assert_eq!(game(json!({"type": 7})), Err(Rejection::NotAMessage));
        assert_eq!(game(json!({"type": "webpack:hmr"})), Err(Rejection::NotAMessage));
        assert_eq!(
            game(json!({"type": "maribro:init", "payload": {}})),
            Err(Rejection::UnknownType("maribro:init".to_owned()))
        );
    }

    #[test]
    fn test_host_messages_wire_shape() {
        let tick = HostMessage::from(TickPayload {
            now_ms: 1000.0,
            time_remaining_ms: 59_000.0,
        });
        assert_eq!(
            tick.to_message(),
            json!({"type": "maribro:tick", "payload": {"nowMs": 1000.0, "timeRemainingMs": 59000.0}})
        );

        let force_end = HostMessage::from(ForceEndPayload {
            reason: EndReason::Timeout,
        });
        assert_eq!(
            force_end.to_message(),
            json!({"type": "maribro:force_end", "payload": {"reason": "timeout"}})
        );

        assert_eq!(
            HostMessage::AudioArm {}.to_message(),
            json!({"type": "maribro:audio_arm", "payload": {}})
        );
    }

    #[test]
    fn test_init_defaults_are_lenient() {
        let msg: HostMessage = decode(
            ORIGIN,
            ORIGIN,
            &json!({"type": "maribro:init", "payload": {}}),
        )
        .unwrap();
        let HostMessage::Init(init) = msg else {
            panic!("expected init");
        };
        assert_eq!(init.slot_to_gamepad_index, [-1, -1, -1, -1]);
        assert_eq!(init.max_duration_sec, 30);
        assert!(init.active_slots.is_none());
        assert!(init.players_by_slot.is_empty());
    }

    #[test]
    fn test_audio_config_partial() {
        let msg: HostMessage = decode(
            ORIGIN,
            ORIGIN,
            &json!({"type": "maribro:audio_config", "payload": {"masterVolume": 0.5}}),
        )
        .unwrap();
        assert_eq!(
            msg,
            HostMessage::AudioConfig(AudioConfig {
                enabled: None,
                master_volume: Some(0.5),
            })
        );
    }
}
