//! File-slot request/response bridge to the simulation script.
//!
//! The script exposes no API beyond two files it polls: it consumes a command
//! from the *command slot* (then empties it) and writes its answer to the
//! *response slot*. This module turns that exchange into an awaitable call.
//!
//! # Exchange
//!
//! 1. Extract the command id (fail fast, nothing touched)
//! 2. Take the gate: one exchange in flight per bridge, callers queue in order
//! 3. Poll until the command slot is empty
//! 4. Replace the command slot content
//! 5. Poll the response slot until it holds a response with the same id, or
//!    the deadline passes; empty, unreadable and stale content is skipped
//!
//! # Modules
//!
//! - **protocol**: Command/Response tagged unions
//! - **codec**: id extraction and typed encode/decode

pub mod codec;
pub mod protocol;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelStorage, FileChannel};
use crate::error::BridgeError;
use crate::slot::{SlotContent, SlotKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SLOT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Response deadline, measured from the moment the command is written.
    pub timeout: Duration,
    pub slot_poll_interval: Duration,
    pub response_poll_interval: Duration,
    /// Bound on the wait for an empty command slot. `None` waits forever.
    pub slot_free_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            slot_poll_interval: DEFAULT_SLOT_POLL_INTERVAL,
            response_poll_interval: DEFAULT_RESPONSE_POLL_INTERVAL,
            slot_free_timeout: None,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_slot_poll_interval(mut self, interval: Duration) -> Self {
        self.slot_poll_interval = interval;
        self
    }

    pub fn with_response_poll_interval(mut self, interval: Duration) -> Self {
        self.response_poll_interval = interval;
        self
    }

    pub fn with_slot_free_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.slot_free_timeout = timeout;
        self
    }
}

/// Where the bridge is in its current (or most recent) exchange.
///
/// A terminal state stays published until the next exchange takes the gate,
/// so subscribers always get to see how an exchange ended. `Idle` means no
/// exchange has run yet, or the last one was abandoned mid-flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    #[default]
    Idle,
    AwaitingSlotFree,
    Writing,
    AwaitingResponse,
    Completed,
    TimedOut,
    Failed,
}

impl BridgeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

/// Publishes `Idle` if the exchange is abandoned (submit future dropped)
/// before a terminal state was reached.
struct AbandonGuard<'a> {
    state_tx: &'a watch::Sender<BridgeState>,
    settled: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.state_tx.send_replace(BridgeState::Idle);
        }
    }
}

pub struct Bridge {
    storage: Arc<dyn ChannelStorage>,
    config: BridgeConfig,
    /// Held for the whole exchange. tokio's mutex is FIFO, so queued callers
    /// are served in arrival order.
    gate: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<BridgeState>,
}

impl Bridge {
    pub fn new(storage: Arc<dyn ChannelStorage>, config: BridgeConfig) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Idle);
        Self {
            storage,
            config,
            gate: tokio::sync::Mutex::new(()),
            state_tx,
        }
    }

    /// Bridge over the script's input (command) and output (response) files.
    pub fn with_files(
        command_path: impl Into<PathBuf>,
        response_path: impl Into<PathBuf>,
        config: BridgeConfig,
    ) -> Self {
        Self::new(
            Arc::new(FileChannel::new(command_path, response_path)),
            config,
        )
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state_tx.subscribe()
    }

    /// Send `payload` and wait for the response carrying the same id, using
    /// the configured timeout. Returns the response bytes unchanged.
    pub async fn submit(&self, payload: &[u8]) -> Result<Bytes, BridgeError> {
        self.run(payload, self.config.timeout, None).await
    }

    pub async fn submit_with_timeout(
        &self,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Bytes, BridgeError> {
        self.run(payload, timeout, None).await
    }

    /// Like `submit_with_timeout`, but stops at the next poll once `cancel`
    /// fires. The gate is released and no slot is touched afterwards.
    pub async fn submit_cancellable(
        &self,
        payload: &[u8],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Bytes, BridgeError> {
        self.run(payload, timeout, Some(cancel)).await
    }

    async fn run(
        &self,
        payload: &[u8],
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError> {
        let id = match codec::extract_id(payload) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting command without correlation id");
                // No slot is touched, so the gate is only needed to keep this
                // from overwriting the state of an exchange in flight.
                if let Ok(_gate) = self.gate.try_lock() {
                    self.state_tx.send_replace(BridgeState::Failed);
                }
                return Err(e.into());
            }
        };

        let _gate = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(%id, "Cancelled while queued for the bridge");
                    return Err(BridgeError::Cancelled);
                }
                guard = self.gate.lock() => guard,
            },
            None => self.gate.lock().await,
        };
        let mut guard = AbandonGuard {
            state_tx: &self.state_tx,
            settled: false,
        };

        let result = self.exchange(&id, payload, timeout, cancel).await;

        let terminal = match &result {
            Ok(_) => BridgeState::Completed,
            Err(BridgeError::Timeout { .. }) => BridgeState::TimedOut,
            Err(_) => BridgeState::Failed,
        };
        self.transition(&id, terminal);
        guard.settled = true;

        result
    }

    fn transition(&self, id: &str, state: BridgeState) {
        tracing::debug!(%id, ?state, "Bridge state");
        self.state_tx.send_replace(state);
    }

    async fn exchange(
        &self,
        id: &str,
        payload: &[u8],
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError> {
        self.transition(id, BridgeState::AwaitingSlotFree);
        self.wait_for_free_slot(id, cancel).await?;

        check_cancelled(cancel)?;
        self.transition(id, BridgeState::Writing);
        self.storage
            .write(SlotKind::Command, payload)
            .await
            .map_err(|e| BridgeError::io(SlotKind::Command, e))?;
        tracing::debug!(%id, bytes = payload.len(), "Command written");

        self.transition(id, BridgeState::AwaitingResponse);
        self.await_response(id, timeout, cancel).await
    }

    async fn wait_for_free_slot(
        &self,
        id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), BridgeError> {
        let started = Instant::now();
        // A bound too large for the clock is no bound at all.
        let deadline = self
            .config
            .slot_free_timeout
            .and_then(|t| started.checked_add(t));
        let mut checks: u64 = 0;

        loop {
            check_cancelled(cancel)?;

            let empty = self
                .storage
                .is_empty(SlotKind::Command)
                .await
                .map_err(|e| BridgeError::io(SlotKind::Command, e))?;
            if empty {
                if checks > 0 {
                    tracing::debug!(
                        %id,
                        checks,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Command slot freed"
                    );
                }
                return Ok(());
            }

            checks += 1;
            if checks == 1 {
                tracing::debug!(%id, "Command slot occupied, waiting for the simulation to consume it");
            }

            let mut delay = self.config.slot_poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    let waited = now - started;
                    tracing::warn!(%id, waited_ms = waited.as_millis() as u64, "Command slot never freed");
                    return Err(BridgeError::SlotBusy { waited });
                }
                delay = delay.min(deadline - now);
            }

            pause(delay, cancel).await?;
        }
    }

    async fn await_response(
        &self,
        id: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, BridgeError> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut last_stale: Option<String> = None;
        let mut read_failures: u64 = 0;

        loop {
            check_cancelled(cancel)?;

            match self.storage.content(SlotKind::Response).await {
                Ok(SlotContent::Empty) => {
                    tracing::trace!(%id, "Response slot empty");
                }
                Ok(SlotContent::Occupied(bytes)) => match codec::extract_id(&bytes) {
                    Ok(found) if found == id => {
                        tracing::info!(
                            %id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            bytes = bytes.len(),
                            "Response received"
                        );
                        return Ok(bytes);
                    }
                    Ok(found) => {
                        // Left in place: the slot belongs to the simulation.
                        if last_stale.as_deref() != Some(found.as_str()) {
                            tracing::debug!(%id, stale_id = %found, "Ignoring stale response");
                            last_stale = Some(found);
                        }
                    }
                    Err(e) => {
                        tracing::trace!(%id, error = %e, "Response slot not decodable yet");
                    }
                },
                Err(e) => {
                    read_failures += 1;
                    if read_failures == 1 {
                        tracing::warn!(%id, error = %e, "Response slot read failed, retrying");
                    } else {
                        tracing::trace!(%id, error = %e, read_failures, "Response slot read failed");
                    }
                }
            }

            let mut delay = self.config.response_poll_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    let waited = now - started;
                    tracing::warn!(
                        %id,
                        waited_ms = waited.as_millis() as u64,
                        "Timed out waiting for response"
                    );
                    return Err(BridgeError::Timeout {
                        id: id.to_string(),
                        waited,
                    });
                }
                delay = delay.min(deadline - now);
            }

            pause(delay, cancel).await?;
        }
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), BridgeError> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(BridgeError::Cancelled),
        _ => Ok(()),
    }
}

/// Suspend for `delay`, waking early with `Cancelled` if the token fires.
async fn pause(delay: Duration, cancel: Option<&CancellationToken>) -> Result<(), BridgeError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(BridgeError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}
