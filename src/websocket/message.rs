use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::events::{
    ChargingSession, EventData, MarketplaceTransaction, Notification, ParkingUpdate, RecordId,
    Reservation,
};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Authenticate { user_id: Option<String> },
    JoinRoom { room_id: Option<String> },
    LeaveRoom { room_id: Option<String> },
    Ping,
}

/// Why an inbound frame could not be turned into a [`ClientMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InboundError {
    #[error("Invalid message format")]
    Malformed,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Wire envelope: `{"type": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthenticateData {
    #[serde(rename = "userId", default)]
    user_id: Option<RecordId>,
}

#[derive(Debug, Default, Deserialize)]
struct RoomData {
    #[serde(rename = "roomId", default)]
    room_id: Option<RecordId>,
}

impl ClientMessage {
    /// Parse a text frame.
    ///
    /// The `type` tag is read first so an unrecognized type can be echoed
    /// back; the `data` payload is then decoded for that type only.
    pub fn parse(raw: &str) -> Result<Self, InboundError> {
        let envelope: Envelope = serde_json::from_str(raw).map_err(|_| InboundError::Malformed)?;

        match envelope.kind.as_str() {
            "authenticate" => {
                let data: AuthenticateData = decode_data(envelope.data)?;
                Ok(Self::Authenticate {
                    user_id: data.user_id.map(|id| id.to_string()),
                })
            }
            "join_room" => {
                let data: RoomData = decode_data(envelope.data)?;
                Ok(Self::JoinRoom {
                    room_id: data.room_id.map(|id| id.to_string()),
                })
            }
            "leave_room" => {
                let data: RoomData = decode_data(envelope.data)?;
                Ok(Self::LeaveRoom {
                    room_id: data.room_id.map(|id| id.to_string()),
                })
            }
            "ping" => Ok(Self::Ping),
            other => Err(InboundError::UnknownType(other.to_string())),
        }
    }

    /// Label used for metrics and spans
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::Ping => "ping",
        }
    }
}

fn decode_data<T: DeserializeOwned + Default>(data: Option<Value>) -> Result<T, InboundError> {
    match data {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|_| InboundError::Malformed),
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    #[serde(flatten)]
    pub event: ServerEvent,
    pub timestamp: DateTime<Utc>,
}

/// Every event a client can receive, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        message: String,
    },
    Authenticated {
        #[serde(rename = "userId")]
        user_id: String,
        /// Concurrent sessions of this user, including the new one
        sessions: usize,
    },
    JoinedRoom {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Error {
        message: String,
    },
    AuthError {
        message: String,
    },
    Pong,
    ParkingUpdate {
        data: EventData<ParkingUpdate>,
    },
    ReservationCreated {
        data: EventData<Reservation>,
    },
    ChargingSessionUpdate {
        data: EventData<ChargingSession>,
    },
    MarketplaceTransaction {
        data: EventData<MarketplaceTransaction>,
    },
    Notification {
        data: EventData<Notification>,
    },
}

impl ServerMessage {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn connected() -> Self {
        Self::new(ServerEvent::Connected {
            message: "WebSocket connection established".to_string(),
        })
    }

    pub fn authenticated(user_id: impl Into<String>, sessions: usize) -> Self {
        Self::new(ServerEvent::Authenticated {
            user_id: user_id.into(),
            sessions,
        })
    }

    pub fn joined_room(room_id: impl Into<String>) -> Self {
        Self::new(ServerEvent::JoinedRoom {
            room_id: room_id.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ServerEvent::Error {
            message: message.into(),
        })
    }

    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new(ServerEvent::AuthError {
            message: message.into(),
        })
    }

    pub fn pong() -> Self {
        Self::new(ServerEvent::Pong)
    }

    /// Wire name of the event, as found in its `type` field
    pub fn event_type(&self) -> &'static str {
        match self.event {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::JoinedRoom { .. } => "joined_room",
            ServerEvent::Error { .. } => "error",
            ServerEvent::AuthError { .. } => "auth_error",
            ServerEvent::Pong => "pong",
            ServerEvent::ParkingUpdate { .. } => "parking_update",
            ServerEvent::ReservationCreated { .. } => "reservation_created",
            ServerEvent::ChargingSessionUpdate { .. } => "charging_session_update",
            ServerEvent::MarketplaceTransaction { .. } => "marketplace_transaction",
            ServerEvent::Notification { .. } => "notification",
        }
    }
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the writer task
    Raw(ServerMessage),
    /// Encoded once per fan-out; each writer copies it into its own frame
    Preserialized(Arc<str>),
    /// Liveness probe, written as a WebSocket ping frame
    Probe,
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    /// JSON text for the frame, `None` for probes
    pub fn to_json(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message).map(Some),
            Self::Preserialized(json) => Ok(Some(json.to_string())),
            Self::Probe => Ok(None),
        }
    }
}
