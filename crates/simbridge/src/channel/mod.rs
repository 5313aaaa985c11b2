//! Channel storage: raw primitives over the command and response slots.
//!
//! Implementations never retry. Every storage fault surfaces as an
//! `io::Error`; whether to retry is the bridge's decision.
//!
//! - **FileChannel**: the two shared files polled by the simulation script
//! - **MemoryChannel**: in-process slots with an event journal, for tests and
//!   for simulating the other side of the exchange

mod file;
mod memory;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;

use crate::slot::{SlotContent, SlotKind};

pub use file::FileChannel;
pub use memory::{ChannelEvent, ChannelOp, MemoryChannel};

#[async_trait]
pub trait ChannelStorage: Send + Sync {
    /// Replace the slot content. No partial content may ever be observable.
    async fn write(&self, slot: SlotKind, data: &[u8]) -> io::Result<()>;

    /// Current content. Zero length is a valid result meaning "empty".
    async fn read(&self, slot: SlotKind) -> io::Result<Bytes>;

    /// True if the content is zero length or the slot does not exist yet.
    async fn is_empty(&self, slot: SlotKind) -> io::Result<bool>;

    async fn content(&self, slot: SlotKind) -> io::Result<SlotContent> {
        self.read(slot).await.map(SlotContent::from_bytes)
    }
}
