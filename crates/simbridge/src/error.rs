//! Errors that cross the bridge boundary.
//!
//! Polling noise (empty, partial, stale or unreadable responses) never shows
//! up here; it is absorbed inside the response wait.

use std::time::Duration;

use crate::bridge::codec::CorrelationError;
use crate::slot::SlotKind;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Outgoing payload has no usable id. Nothing was written.
    #[error("cannot correlate command: {0}")]
    Correlation(#[from] CorrelationError),

    /// Storage fault while checking or writing the command slot.
    #[error("{slot} slot I/O failed: {source}")]
    Io {
        slot: SlotKind,
        #[source]
        source: std::io::Error,
    },

    #[error("no response for command {id} within {waited:?}")]
    Timeout { id: String, waited: Duration },

    /// Command slot stayed occupied past the configured slot-free timeout.
    #[error("command slot still occupied after {waited:?}")]
    SlotBusy { waited: Duration },

    #[error("command cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn io(slot: SlotKind, source: std::io::Error) -> Self {
        Self::Io { slot, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether resubmitting the same request at a higher layer may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::SlotBusy { .. })
    }
}
