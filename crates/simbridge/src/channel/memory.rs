//! In-process slots.
//!
//! Besides the [`ChannelStorage`] contract, `MemoryChannel` exposes the "other
//! side" of the exchange (`set`, `clear`) so tests can play the simulation,
//! keeps an ordered journal of every operation, and can inject I/O faults.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use super::ChannelStorage;
use crate::slot::SlotKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelOp {
    Write,
    Read,
    IsEmpty,
}

/// One journal entry. Timestamps are monotonic.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    EmptyCheck {
        slot: SlotKind,
        empty: bool,
        at: Instant,
    },
    Write {
        slot: SlotKind,
        data: Bytes,
        at: Instant,
    },
    Read {
        slot: SlotKind,
        len: usize,
        at: Instant,
    },
    /// Content changed by the simulated peer via `set` / `clear`.
    External {
        slot: SlotKind,
        data: Bytes,
        at: Instant,
    },
}

impl ChannelEvent {
    pub fn at(&self) -> Instant {
        match self {
            Self::EmptyCheck { at, .. }
            | Self::Write { at, .. }
            | Self::Read { at, .. }
            | Self::External { at, .. } => *at,
        }
    }

    pub fn slot(&self) -> SlotKind {
        match self {
            Self::EmptyCheck { slot, .. }
            | Self::Write { slot, .. }
            | Self::Read { slot, .. }
            | Self::External { slot, .. } => *slot,
        }
    }
}

#[derive(Default)]
struct Slots {
    command: Bytes,
    response: Bytes,
    journal: Vec<ChannelEvent>,
    faults: HashMap<(SlotKind, ChannelOp), io::ErrorKind>,
}

impl Slots {
    fn get_mut(&mut self, slot: SlotKind) -> &mut Bytes {
        match slot {
            SlotKind::Command => &mut self.command,
            SlotKind::Response => &mut self.response,
        }
    }

    fn check_fault(&self, slot: SlotKind, op: ChannelOp) -> io::Result<()> {
        match self.faults.get(&(slot, op)) {
            Some(kind) => Err(io::Error::new(
                *kind,
                format!("injected {:?} fault on {} slot", op, slot),
            )),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryChannel {
    slots: Mutex<Slots>,
    latency: Duration,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every storage operation, like a slow disk.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slot state is plain data; a panic mid-update cannot leave it torn.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Replace a slot's content from the simulation's side.
    pub fn set(&self, slot: SlotKind, data: impl Into<Bytes>) {
        let data = data.into();
        let mut slots = self.lock();
        *slots.get_mut(slot) = data.clone();
        slots.journal.push(ChannelEvent::External {
            slot,
            data,
            at: Instant::now(),
        });
    }

    /// Empty a slot from the simulation's side (e.g. command consumed).
    pub fn clear(&self, slot: SlotKind) {
        self.set(slot, Bytes::new());
    }

    /// Current content without journaling.
    pub fn get(&self, slot: SlotKind) -> Bytes {
        self.lock().get_mut(slot).clone()
    }

    pub fn inject_fault(&self, slot: SlotKind, op: ChannelOp, kind: io::ErrorKind) {
        self.lock().faults.insert((slot, op), kind);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn journal(&self) -> Vec<ChannelEvent> {
        self.lock().journal.clone()
    }

    /// Payloads written by the bridge, in order.
    pub fn writes(&self, slot: SlotKind) -> Vec<Bytes> {
        self.lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                ChannelEvent::Write { slot: s, data, .. } if *s == slot => Some(data.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChannelStorage for MemoryChannel {
    async fn write(&self, slot: SlotKind, data: &[u8]) -> io::Result<()> {
        self.simulate_latency().await;
        let mut slots = self.lock();
        slots.check_fault(slot, ChannelOp::Write)?;
        let data = Bytes::copy_from_slice(data);
        *slots.get_mut(slot) = data.clone();
        slots.journal.push(ChannelEvent::Write {
            slot,
            data,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn read(&self, slot: SlotKind) -> io::Result<Bytes> {
        self.simulate_latency().await;
        let mut slots = self.lock();
        slots.check_fault(slot, ChannelOp::Read)?;
        let data = slots.get_mut(slot).clone();
        slots.journal.push(ChannelEvent::Read {
            slot,
            len: data.len(),
            at: Instant::now(),
        });
        Ok(data)
    }

    async fn is_empty(&self, slot: SlotKind) -> io::Result<bool> {
        self.simulate_latency().await;
        let mut slots = self.lock();
        slots.check_fault(slot, ChannelOp::IsEmpty)?;
        let empty = slots.get_mut(slot).is_empty();
        slots.journal.push(ChannelEvent::EmptyCheck {
            slot,
            empty,
            at: Instant::now(),
        });
        Ok(empty)
    }
}
