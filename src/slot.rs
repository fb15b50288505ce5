//! Player slot indices
//!
//! A lobby always has exactly four player slots. [`Slot`] is a checked index
//! into them, so that out-of-range numbers coming from the store or from a
//! game are rejected at the edge instead of deep inside the lobby.

use std::{fmt::Display, str::FromStr};

use enum_map::{Enum, EnumArray};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::constants::lobby::SLOT_COUNT;

/// A player slot, `0..=3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u8);

/// Error returned for slot numbers outside `0..=3`
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The number does not name one of the four slots
    #[error("slot must be 0..3")]
    OutOfRange,
    /// The text is not a number
    #[error("slot must be a number")]
    NotANumber,
}

impl Slot {
    /// All four slots in order
    pub const ALL: [Slot; SLOT_COUNT] = [Slot(0), Slot(1), Slot(2), Slot(3)];

    /// Creates a slot from a number, if it is in range
    pub fn new(index: i64) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|i| usize::from(*i) < SLOT_COUNT)
            .map(Self)
    }

    /// Zero-based index of the slot
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// One-based number shown to players
    pub fn number(self) -> usize {
        self.index() + 1
    }
}

impl TryFrom<i64> for Slot {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(Error::OutOfRange)
    }
}

impl From<Slot> for usize {
    fn from(slot: Slot) -> Self {
        slot.index()
    }
}

impl Display for Slot {
    /// Formats the zero-based index
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Slot {
    type Err = Error;

    /// Parses a zero-based slot index
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a number or is out of range.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<i64>().map_err(|_| Error::NotANumber)?;
        Self::try_from(value)
    }
}

impl Serialize for Slot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D>(deserializer: D) -> Result<Slot, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Slot::try_from(value).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl Enum for Slot {
    const LENGTH: usize = SLOT_COUNT;

    /// # Panics
    ///
    /// Panics if the value is out of range for the enum.
    fn from_usize(value: usize) -> Self {
        assert!(value < SLOT_COUNT, "index out of range for Enum::from_usize");
        Self(value as u8)
    }

    fn into_usize(self) -> usize {
        self.index()
    }
}

impl<V> EnumArray<V> for Slot {
    type Array = [V; SLOT_COUNT];
}
