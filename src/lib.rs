//! # Maribro Lobby Library
//!
//! This library provides the core of the Maribro party-game lobby: a host
//! lobby that seats up to four players with their avatars and controllers,
//! runs one sandboxed game at a time and keeps a session scoreboard, and the
//! SDK that games use inside their frame to learn who is playing, read
//! controller input and report scores.
//!
//! Neither side performs IO. The host talks to its backing store through
//! [`store::SessionStore`], to the game frame through [`tunnel::GameFrame`]
//! and to time through [`scheduler::Scheduler`]; the embedder supplies the
//! real implementations and feeds events back in.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]

pub mod catalog;
pub mod config;
pub mod constants;
pub mod gamepad;
pub mod host;
pub mod protocol;
pub mod scheduler;
pub mod sdk;
pub mod session;
pub mod slot;
pub mod store;
pub mod tunnel;

pub use host::{Lobby, LobbyAlarm, Notice};
pub use sdk::{Sdk, SdkAlarm};
