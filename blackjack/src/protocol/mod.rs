//! Framed message envelope and typed payloads for both directions.
//!
//! Every socket frame is one JSON object `{"type": <tag>, "data": <opaque>}`
//! with `data` omitted when a command carries nothing. Client frames decode
//! through an explicit dispatch table so unknown tags surface as
//! [`ProtocolError::UnknownCommand`] instead of a serde error.

pub mod dto;

pub use dto::{GameDto, HandDto, PlayerDto, PopUpDto, PopUpLevel, TableDto, UserStatsDto};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire tags for client-to-server commands.
pub mod tags {
    pub const PLACE_BET: &str = "place_bet";
    pub const HIT: &str = "hit";
    pub const STAND: &str = "stand";
    pub const JOIN_TABLE: &str = "join_table";
    pub const LEAVE_TABLE: &str = "leave_table";
    pub const CREATE_TABLE: &str = "create_table";
    pub const DELETE_TABLE: &str = "delete_table";
    pub const START_GAME: &str = "start_game";
    pub const DEAL_CARDS: &str = "deal_cards";
    pub const GET_STATE: &str = "get_state";
    pub const GET_STATS: &str = "get_stats";
    pub const TABLE_LIST: &str = "table_list";
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("command {0:?} is missing its value payload")]
    MissingValue(&'static str),
}

/// The wrapper for every message between server and client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The `{"value": "<string>"}` carrier used by value-bearing commands.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ValueMessage {
    pub value: String,
}

/// A decoded client command.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientCommand {
    PlaceBet { value: String },
    Hit,
    Stand,
    JoinTable { value: String },
    LeaveTable,
    CreateTable { value: String },
    DeleteTable { value: String },
    StartGame,
    DealCards,
    GetState,
    GetStats,
    TableList,
}

impl ClientCommand {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PlaceBet { .. } => tags::PLACE_BET,
            Self::Hit => tags::HIT,
            Self::Stand => tags::STAND,
            Self::JoinTable { .. } => tags::JOIN_TABLE,
            Self::LeaveTable => tags::LEAVE_TABLE,
            Self::CreateTable { .. } => tags::CREATE_TABLE,
            Self::DeleteTable { .. } => tags::DELETE_TABLE,
            Self::StartGame => tags::START_GAME,
            Self::DealCards => tags::DEAL_CARDS,
            Self::GetState => tags::GET_STATE,
            Self::GetStats => tags::GET_STATS,
            Self::TableList => tags::TABLE_LIST,
        }
    }

    /// Dispatch an envelope to the matching command, pulling the value
    /// carrier out where the tag requires one.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let value_of = |tag: &'static str| -> Result<String, ProtocolError> {
            let data = envelope
                .data
                .clone()
                .ok_or(ProtocolError::MissingValue(tag))?;
            let carrier: ValueMessage = serde_json::from_value(data)?;
            Ok(carrier.value)
        };

        match envelope.tag.as_str() {
            tags::PLACE_BET => Ok(Self::PlaceBet {
                value: value_of(tags::PLACE_BET)?,
            }),
            tags::HIT => Ok(Self::Hit),
            tags::STAND => Ok(Self::Stand),
            tags::JOIN_TABLE => Ok(Self::JoinTable {
                value: value_of(tags::JOIN_TABLE)?,
            }),
            tags::LEAVE_TABLE => Ok(Self::LeaveTable),
            tags::CREATE_TABLE => Ok(Self::CreateTable {
                value: value_of(tags::CREATE_TABLE)?,
            }),
            tags::DELETE_TABLE => Ok(Self::DeleteTable {
                value: value_of(tags::DELETE_TABLE)?,
            }),
            tags::START_GAME => Ok(Self::StartGame),
            tags::DEAL_CARDS => Ok(Self::DealCards),
            tags::GET_STATE => Ok(Self::GetState),
            tags::GET_STATS => Ok(Self::GetStats),
            tags::TABLE_LIST => Ok(Self::TableList),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// Decode a raw frame: envelope first, then the dispatch table.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(raw)?;
        Self::from_envelope(&envelope)
    }
}

/// Wrap a client command as an envelope.
pub fn package_client_message(tag: &str, value: Option<&str>) -> Envelope {
    Envelope {
        tag: tag.to_string(),
        data: value.map(|v| {
            serde_json::to_value(ValueMessage {
                value: v.to_string(),
            })
            .expect("value carrier serializes")
        }),
    }
}

/// A typed server-to-client message. Serializes straight to the envelope
/// form (`{"type": ..., "data": ...}`).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameDto),
    TableList(Vec<TableDto>),
    PopUp(PopUpDto),
    UserStats(UserStatsDto),
}

/// Wrap a server payload as an envelope.
pub fn package_server_message(msg: &ServerMessage) -> Result<Envelope, ProtocolError> {
    let encoded = serde_json::to_value(msg)?;
    Ok(serde_json::from_value(encoded)?)
}
