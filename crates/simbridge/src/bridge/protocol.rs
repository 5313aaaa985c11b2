//! Wire protocol types for the simulation script.
//!
//! Both slots carry a single JSON object discriminated by `command`:
//! - **Command slot**: requests written by the bridge
//! - **Response slot**: results (or `"error"`) written by the script, echoing
//!   the request `id`

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Discriminators the script may write to the response slot.
pub const RESPONSE_KINDS: &[&str] = &["get_player_list", "get_lines", "error"];

/// Requests from bridge to simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    GetPlayerList {
        id: String,
    },

    /// Lines owned by a player, filtered by way type.
    GetLines {
        id: String,
        player_index: u32,
        way_type: WayType,
    },
}

fn new_command_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Command {
    pub fn player_list() -> Self {
        Self::GetPlayerList {
            id: new_command_id(),
        }
    }

    pub fn lines(player_index: u32, way_type: WayType) -> Self {
        Self::GetLines {
            id: new_command_id(),
            player_index,
            way_type,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::GetPlayerList { id } | Self::GetLines { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetPlayerList { .. } => "get_player_list",
            Self::GetLines { .. } => "get_lines",
        }
    }
}

/// Results from simulation to bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Response {
    GetPlayerList {
        id: String,
        result: Vec<Player>,
    },

    GetLines {
        id: String,
        result: Vec<Line>,
    },

    /// The script could not execute the request.
    Error {
        id: String,
        description: String,
    },
}

impl Response {
    pub fn id(&self) -> &str {
        match self {
            Self::GetPlayerList { id, .. } | Self::GetLines { id, .. } | Self::Error { id, .. } => {
                id
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetPlayerList { .. } => "get_player_list",
            Self::GetLines { .. } => "get_lines",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: i64,
    pub name: String,
}

/// Transport way a line runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WayType {
    Road,
    Rail,
    Water,
    Monorail,
    Maglev,
    Tram,
    /// Narrow gauge rail.
    Narrow,
    Air,
}

impl WayType {
    pub const ALL: [WayType; 8] = [
        Self::Road,
        Self::Rail,
        Self::Water,
        Self::Monorail,
        Self::Maglev,
        Self::Tram,
        Self::Narrow,
        Self::Air,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Rail => "rail",
            Self::Water => "water",
            Self::Monorail => "monorail",
            Self::Maglev => "maglev",
            Self::Tram => "tram",
            Self::Narrow => "narrow",
            Self::Air => "air",
        }
    }
}

impl std::fmt::Display for WayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown way type '{0}', expected one of: road, rail, water, monorail, maglev, tram, narrow, air")]
pub struct UnknownWayType(pub String);

impl FromStr for WayType {
    type Err = UnknownWayType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|way| way.as_str() == s)
            .ok_or_else(|| UnknownWayType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_player_list_serializes() {
        let cmd = Command::GetPlayerList {
            id: "abc-1".to_string(),
        };
        insta::assert_json_snapshot!(cmd, @r#"
        {
          "command": "get_player_list",
          "id": "abc-1"
        }
        "#);
    }

    #[test]
    fn get_lines_serializes() {
        let cmd = Command::GetLines {
            id: "abc-2".to_string(),
            player_index: 1,
            way_type: WayType::Narrow,
        };
        insta::assert_json_snapshot!(cmd, @r#"
        {
          "command": "get_lines",
          "id": "abc-2",
          "player_index": 1,
          "way_type": "narrow"
        }
        "#);
    }

    #[test]
    fn error_response_serializes() {
        let resp = Response::Error {
            id: "abc-3".to_string(),
            description: "player index out of range".to_string(),
        };
        insta::assert_json_snapshot!(resp, @r#"
        {
          "command": "error",
          "id": "abc-3",
          "description": "player index out of range"
        }
        "#);
    }

    #[test]
    fn player_list_response_deserializes() {
        let resp: Response = serde_json::from_str(
            r#"{"command":"get_player_list","id":"abc-1","result":[{"index":0,"name":"Player 1"}]}"#,
        )
        .unwrap();

        assert_eq!(
            resp,
            Response::GetPlayerList {
                id: "abc-1".to_string(),
                result: vec![Player {
                    index: 0,
                    name: "Player 1".to_string(),
                }],
            }
        );
        assert_eq!(resp.kind(), "get_player_list");
        assert!(!resp.is_error());
    }

    #[test]
    fn lines_response_ignores_extra_fields() {
        let resp: Response = serde_json::from_str(
            r#"{"command":"get_lines","id":"l","result":[{"id":7,"name":"Express","color":3}],"tick":99}"#,
        )
        .unwrap();

        match resp {
            Response::GetLines { id, result } => {
                assert_eq!(id, "l");
                assert_eq!(result.len(), 1);
                assert_eq!(result[0].id, 7);
                assert_eq!(result[0].name, "Express");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn constructors_stamp_unique_ids() {
        let a = Command::player_list();
        let b = Command::player_list();
        assert_ne!(a.id(), b.id());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());

        let lines = Command::lines(2, WayType::Tram);
        assert_eq!(lines.kind(), "get_lines");
    }

    #[test]
    fn way_type_parses_every_variant() {
        for way in WayType::ALL {
            assert_eq!(way.as_str().parse::<WayType>().unwrap(), way);
            assert_eq!(
                serde_json::to_string(&way).unwrap(),
                format!("\"{}\"", way)
            );
        }
        assert_eq!(
            "hovercraft".parse::<WayType>(),
            Err(UnknownWayType("hovercraft".to_string()))
        );
    }

    #[test]
    fn response_kinds_cover_every_variant() {
        let samples = [
            Response::GetPlayerList {
                id: String::new(),
                result: vec![],
            },
            Response::GetLines {
                id: String::new(),
                result: vec![],
            },
            Response::Error {
                id: String::new(),
                description: String::new(),
            },
        ];
        for resp in samples {
            assert!(RESPONSE_KINDS.contains(&resp.kind()));
        }
    }
}
