//! simbridge: request/response bridge to a Simutrans simulation script.
//!
//! The script and the caller share two flat files. The caller writes one
//! JSON command into the command slot once it is empty, and the script
//! answers in the response slot with the same `id`. [`Bridge`] turns that
//! into an awaitable call with id matching, stale-response rejection, a
//! timeout and one-at-a-time serialization. [`SimClient`] adds typed
//! commands on top.

pub mod bridge;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod slot;

pub use bridge::protocol::{Command, Line, Player, Response, WayType};
pub use bridge::{Bridge, BridgeConfig, BridgeState};
pub use channel::{ChannelStorage, FileChannel, MemoryChannel};
pub use client::{ClientError, ErrorCategory, SimClient};
pub use config::{Config, ConfigError};
pub use error::BridgeError;
pub use lifecycle::Lifecycle;
pub use slot::{SlotContent, SlotKind};
