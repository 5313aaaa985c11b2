//! Typed requests on top of the bridge.
//!
//! The bridge moves bytes; `SimClient` builds commands, decodes the answers
//! and turns `"error"` responses into errors.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::bridge::Bridge;
use crate::bridge::codec::{self, DecodeError};
use crate::bridge::protocol::{Command, Line, Player, Response, WayType};
use crate::error::BridgeError;

/// Coarse failure family, stable for mapping onto user-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CommandTimeout,
    FileAccessError,
    JsonParsingError,
    SimulationError,
    UnknownError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandTimeout => "command_timeout",
            Self::FileAccessError => "file_access_error",
            Self::JsonParsingError => "json_parsing_error",
            Self::SimulationError => "simulation_error",
            Self::UnknownError => "unknown_error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The script answered with an `"error"` response.
    #[error("simulation error: {0}")]
    Simulation(String),

    #[error("expected a {expected} response, got {got}")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Bridge(BridgeError::Timeout { .. } | BridgeError::SlotBusy { .. }) => {
                ErrorCategory::CommandTimeout
            }
            Self::Bridge(BridgeError::Io { .. }) => ErrorCategory::FileAccessError,
            Self::Bridge(BridgeError::Correlation(_)) | Self::Encode(_) | Self::Decode(_) => {
                ErrorCategory::JsonParsingError
            }
            Self::Simulation(_) => ErrorCategory::SimulationError,
            Self::Bridge(BridgeError::Cancelled) | Self::UnexpectedResponse { .. } => {
                ErrorCategory::UnknownError
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Bridge(BridgeError::Cancelled))
    }
}

#[derive(Clone)]
pub struct SimClient {
    bridge: Arc<Bridge>,
    cancel: Option<CancellationToken>,
}

impl SimClient {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            cancel: None,
        }
    }

    /// Requests stop polling once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub async fn request(&self, command: Command) -> Result<Response, ClientError> {
        let payload = codec::encode_command(&command).map_err(ClientError::Encode)?;
        let timeout = self.bridge.config().timeout;

        let bytes = match &self.cancel {
            Some(token) => {
                self.bridge
                    .submit_cancellable(&payload, timeout, token)
                    .await?
            }
            None => self.bridge.submit(&payload).await?,
        };

        match codec::decode_response(&bytes)? {
            Response::Error { id, description } => {
                tracing::warn!(%id, %description, "Simulation rejected command");
                Err(ClientError::Simulation(description))
            }
            response if response.kind() != command.kind() => Err(ClientError::UnexpectedResponse {
                expected: command.kind(),
                got: response.kind(),
            }),
            response => Ok(response),
        }
    }

    pub async fn players(&self) -> Result<Vec<Player>, ClientError> {
        match self.request(Command::player_list()).await? {
            Response::GetPlayerList { result, .. } => Ok(result),
            other => Err(ClientError::UnexpectedResponse {
                expected: "get_player_list",
                got: other.kind(),
            }),
        }
    }

    pub async fn lines(
        &self,
        player_index: u32,
        way_type: WayType,
    ) -> Result<Vec<Line>, ClientError> {
        match self.request(Command::lines(player_index, way_type)).await? {
            Response::GetLines { result, .. } => Ok(result),
            other => Err(ClientError::UnexpectedResponse {
                expected: "get_lines",
                got: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeConfig;
    use crate::channel::{ChannelStorage, MemoryChannel};
    use crate::slot::SlotKind;
    use std::time::Duration;

    fn client_with(channel: &Arc<MemoryChannel>) -> SimClient {
        let storage: Arc<dyn ChannelStorage> = channel.clone();
        let config = BridgeConfig::new()
            .with_timeout(Duration::from_secs(2))
            .with_slot_poll_interval(Duration::from_millis(10))
            .with_response_poll_interval(Duration::from_millis(10));
        SimClient::new(Arc::new(Bridge::new(storage, config)))
    }

    /// Answer the next command with `answer(id)`.
    fn respond_once(
        channel: &Arc<MemoryChannel>,
        answer: impl FnOnce(&str) -> String + Send + 'static,
    ) -> tokio::task::JoinHandle<serde_json::Value> {
        let channel = Arc::clone(channel);
        tokio::spawn(async move {
            loop {
                let cmd = channel.get(SlotKind::Command);
                if cmd.is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    continue;
                }
                channel.clear(SlotKind::Command);
                let id = codec::extract_id(&cmd).unwrap();
                channel.set(SlotKind::Response, answer(&id));
                return serde_json::from_slice(&cmd).unwrap();
            }
        })
    }

    #[tokio::test]
    async fn players_decodes_records() {
        let channel = Arc::new(MemoryChannel::new());
        let client = client_with(&channel);
        let peer = respond_once(&channel, |id| {
            format!(
                r#"{{"command":"get_player_list","id":"{}","result":[{{"index":0,"name":"Player 1"}},{{"index":3,"name":"Rivals"}}]}}"#,
                id
            )
        });

        let players = client.players().await.unwrap();
        let sent = peer.await.unwrap();

        assert_eq!(sent["command"], "get_player_list");
        assert_eq!(
            players,
            vec![
                Player {
                    index: 0,
                    name: "Player 1".to_string()
                },
                Player {
                    index: 3,
                    name: "Rivals".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn lines_sends_filter_arguments() {
        let channel = Arc::new(MemoryChannel::new());
        let client = client_with(&channel);
        let peer = respond_once(&channel, |id| {
            format!(
                r#"{{"command":"get_lines","id":"{}","result":[{{"id":12,"name":"Harbour shuttle"}}]}}"#,
                id
            )
        });

        let lines = client.lines(2, WayType::Water).await.unwrap();
        let sent = peer.await.unwrap();

        assert_eq!(sent["player_index"], 2);
        assert_eq!(sent["way_type"], "water");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id, 12);
    }

    #[tokio::test]
    async fn error_response_becomes_simulation_error() {
        let channel = Arc::new(MemoryChannel::new());
        let client = client_with(&channel);
        let _peer = respond_once(&channel, |id| {
            format!(
                r#"{{"command":"error","id":"{}","description":"invalid player index"}}"#,
                id
            )
        });

        let err = client.lines(99, WayType::Road).await.unwrap_err();

        match &err {
            ClientError::Simulation(description) => assert_eq!(description, "invalid player index"),
            other => panic!("expected Simulation, got {:?}", other),
        }
        assert_eq!(err.category(), ErrorCategory::SimulationError);
    }

    #[tokio::test]
    async fn mismatched_kind_is_unexpected() {
        let channel = Arc::new(MemoryChannel::new());
        let client = client_with(&channel);
        let _peer = respond_once(&channel, |id| {
            format!(r#"{{"command":"get_lines","id":"{}","result":[]}}"#, id)
        });

        let err = client.players().await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::UnexpectedResponse {
                expected: "get_player_list",
                got: "get_lines"
            }
        ));
        assert_eq!(err.category(), ErrorCategory::UnknownError);
    }

    #[tokio::test]
    async fn unknown_response_kind_is_a_parsing_error() {
        let channel = Arc::new(MemoryChannel::new());
        let client = client_with(&channel);
        let _peer = respond_once(&channel, |id| {
            format!(r#"{{"command":"get_depots","id":"{}","result":[]}}"#, id)
        });

        let err = client.players().await.unwrap_err();

        assert!(matches!(err, ClientError::Decode(DecodeError::UnknownKind(_))));
        assert_eq!(err.category(), ErrorCategory::JsonParsingError);
    }

    #[tokio::test]
    async fn cancelled_client_reports_cancellation() {
        let channel = Arc::new(MemoryChannel::new());
        let token = CancellationToken::new();
        token.cancel();
        let client = client_with(&channel).with_cancellation(token);

        let err = client.players().await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(channel.writes(SlotKind::Command).is_empty());
    }

    #[test]
    fn categories_map_bridge_failures() {
        let timeout = ClientError::from(BridgeError::Timeout {
            id: "x".to_string(),
            waited: Duration::from_secs(15),
        });
        assert_eq!(timeout.category(), ErrorCategory::CommandTimeout);

        let io = ClientError::from(BridgeError::io(
            SlotKind::Command,
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        ));
        assert_eq!(io.category(), ErrorCategory::FileAccessError);
        assert_eq!(io.category().as_str(), "file_access_error");

        insta::assert_json_snapshot!(
            [ErrorCategory::CommandTimeout, ErrorCategory::JsonParsingError],
            @r#"
        [
          "command_timeout",
          "json_parsing_error"
        ]
        "#
        );
    }
}
