use serde::{Deserialize, Serialize};

use crate::common::UserEntry;
use crate::game::{Board, Symbol};

/// Everything a client may send. The `action` field of the JSON payload
/// selects the variant; an unrecognised action lands on `Unknown` instead of
/// failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    Login { name: String },
    Connect { target: String },
    Exchange { from: String, message: String },
    List,
    Poem { target: u32 },
    Time,
    PrivateMessage { to: String, message: String },
    Search { target: String },
    SetProfilePic { url: String },
    StartTtt { target: String },
    Move { row: i64, column: i64, from: Symbol },
    Disconnect,
    #[serde(other)]
    Unknown,
}

/// Everything the server may send: direct replies and pushed notifications
/// share one vocabulary, again tagged by `action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMsg {
    Login {
        status: LoginStatus,
    },
    Connect {
        status: ConnectStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    Exchange {
        from: String,
        message: String,
    },
    List {
        results: Vec<UserEntry>,
    },
    Poem {
        results: String,
    },
    Time {
        results: String,
    },
    PrivateMessageStatus {
        to: String,
        status: PmStatus,
        detail: String,
    },
    IncomingPrivateMessage {
        from: String,
        message: String,
    },
    Search {
        results: String,
    },
    SetProfilePicStatus {
        status: PfpStatus,
        detail: String,
    },
    OpenTtt {
        status: StartStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<Symbol>,
    },
    Update {
        status: TurnStatus,
        from: String,
        turn: String,
        row: i64,
        column: i64,
    },
    End {
        status: EndStatus,
        winner: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winning_symbol: Option<Symbol>,
        board: Board,
    },
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Ok,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectStatus {
    Success,
    #[serde(rename = "self")]
    SelfTarget,
    #[serde(rename = "no-user")]
    NoUser,
    /// Pushed to the other room members when someone joins their group.
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PmStatus {
    #[serde(rename = "sent")]
    Sent,
    #[serde(rename = "error_self_message")]
    SelfMessage,
    #[serde(rename = "error_user_offline")]
    UserOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PfpStatus {
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartStatus {
    Ok,
    #[serde(rename = "self")]
    SelfTarget,
    #[serde(rename = "no-user")]
    NoUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnStatus {
    #[serde(rename = "your turn")]
    YourTurn,
    #[serde(rename = "opponent turn")]
    OpponentTurn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndStatus {
    Win,
    Tie,
}

/// Errors raised while encoding or decoding protocol payloads.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            ProtocolError::Deserialization(msg) => write!(f, "deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ClientRequest {
    pub fn to_wire(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn from_wire(payload: &str) -> ProtocolResult<Self> {
        serde_json::from_str(payload).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

impl ServerMsg {
    pub fn to_wire(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn from_wire(payload: &str) -> ProtocolResult<Self> {
        serde_json::from_str(payload).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_matches_wire_shape() {
        let req = ClientRequest::from_wire(r#"{"action":"login","name":"alice"}"#).unwrap();
        assert!(matches!(req, ClientRequest::Login { ref name } if name == "alice"));
    }

    #[test]
    fn login_reply_uses_action_and_status_fields() {
        let json = ServerMsg::Login { status: LoginStatus::Ok }.to_wire().unwrap();
        assert_eq!(json, r#"{"action":"login","status":"ok"}"#);
        let json = ServerMsg::Login { status: LoginStatus::Duplicate }.to_wire().unwrap();
        assert_eq!(json, r#"{"action":"login","status":"duplicate"}"#);
    }

    #[test]
    fn connect_statuses_keep_their_literal_spellings() {
        let msg = ServerMsg::Connect { status: ConnectStatus::NoUser, from: None };
        assert_eq!(msg.to_wire().unwrap(), r#"{"action":"connect","status":"no-user"}"#);
        let msg = ServerMsg::Connect {
            status: ConnectStatus::Request,
            from: Some("bob".into()),
        };
        assert_eq!(
            msg.to_wire().unwrap(),
            r#"{"action":"connect","status":"request","from":"bob"}"#
        );
    }

    #[test]
    fn unknown_action_is_its_own_variant() {
        let req = ClientRequest::from_wire(r#"{"action":"frobnicate","x":1}"#).unwrap();
        assert!(matches!(req, ClientRequest::Unknown));
    }

    #[test]
    fn malformed_payload_is_a_deserialization_error() {
        assert!(ClientRequest::from_wire("{not json").is_err());
        // A missing required field is malformed too.
        assert!(ClientRequest::from_wire(r#"{"action":"login"}"#).is_err());
    }

    #[test]
    fn move_request_round_trips_typed_fields() {
        let req =
            ClientRequest::from_wire(r#"{"action":"move","row":1,"column":2,"from":"X"}"#).unwrap();
        match req {
            ClientRequest::Move { row, column, from } => {
                assert_eq!((row, column), (1, 2));
                assert_eq!(from, Symbol::X);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn end_payload_serializes_board_cells_as_symbol_or_null() {
        let mut board: Board = Default::default();
        board[0][0] = Some(Symbol::X);
        let msg = ServerMsg::End {
            status: EndStatus::Tie,
            winner: None,
            winning_symbol: None,
            board,
        };
        let json = msg.to_wire().unwrap();
        assert!(json.contains(r#""board":[["X",null,null]"#));
        assert!(json.contains(r#""winner":null"#));
    }

    #[test]
    fn turn_statuses_keep_their_spaces() {
        let msg = ServerMsg::Update {
            status: TurnStatus::YourTurn,
            from: "alice".into(),
            turn: "bob".into(),
            row: 0,
            column: 0,
        };
        assert!(msg.to_wire().unwrap().contains(r#""status":"your turn""#));
    }
}
