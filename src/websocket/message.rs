use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::registry::UserSummary;

/// Events sent from client to server.
///
/// Wire form is `{"type": "<name>", "payload": {...}}`; field names are
/// camelCase. Events that carry nothing, like `stopTyping`, may omit the
/// payload or send it empty or null. A frame that does not parse into one
/// of these is dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    Login {
        id: String,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        user_id: String,
        user_name: String,
        message: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        user_id: String,
        user_name: String,
    },
    StopTyping,
    UpdateName {
        id: String,
        name: String,
    },
}

impl<'de> Deserialize<'de> for ClientEvent {
    /// Frames are decoded by hand rather than through serde's adjacent
    /// tagging so that payload-less events accept an omitted, null or
    /// empty payload alike.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        const EVENT_NAMES: &[&str] = &["login", "message", "typing", "stopTyping", "updateName"];

        #[derive(Deserialize)]
        struct Frame {
            #[serde(rename = "type")]
            name: String,
            #[serde(default)]
            payload: serde_json::Value,
        }

        #[derive(Deserialize)]
        struct IdName {
            id: String,
            name: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct MessagePayload {
            user_id: String,
            user_name: String,
            message: String,
            #[serde(default)]
            timestamp: Option<DateTime<Utc>>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TypingPayload {
            user_id: String,
            user_name: String,
        }

        let frame = Frame::deserialize(deserializer)?;
        match frame.name.as_str() {
            "login" => {
                let IdName { id, name } =
                    serde_json::from_value(frame.payload).map_err(de::Error::custom)?;
                Ok(Self::Login { id, name })
            }
            "message" => {
                let MessagePayload {
                    user_id,
                    user_name,
                    message,
                    timestamp,
                } = serde_json::from_value(frame.payload).map_err(de::Error::custom)?;
                Ok(Self::Message {
                    user_id,
                    user_name,
                    message,
                    timestamp,
                })
            }
            "typing" => {
                let TypingPayload { user_id, user_name } =
                    serde_json::from_value(frame.payload).map_err(de::Error::custom)?;
                Ok(Self::Typing { user_id, user_name })
            }
            // Carries nothing; whatever payload came along is ignored.
            "stopTyping" => Ok(Self::StopTyping),
            "updateName" => {
                let IdName { id, name } =
                    serde_json::from_value(frame.payload).map_err(de::Error::custom)?;
                Ok(Self::UpdateName { id, name })
            }
            other => Err(de::Error::unknown_variant(other, EVENT_NAMES)),
        }
    }
}

impl ClientEvent {
    /// Event name as it appears on the wire, for logs and counters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::StopTyping => "stopTyping",
            Self::UpdateName { .. } => "updateName",
        }
    }
}

/// Events sent from server to client.
///
/// Wire form is internally tagged: `{"type": "<name>", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    LoginSuccess {
        id: String,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: String,
        name: String,
        users: Vec<UserSummary>,
    },
    UsersList {
        #[serde(rename = "payload")]
        users: Vec<UserSummary>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        user_id: String,
        user_name: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        user_id: String,
        user_name: String,
    },
    StopTyping,
    #[serde(rename_all = "camelCase")]
    NameUpdated {
        user_id: String,
        old_name: String,
        name: String,
        users: Vec<UserSummary>,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: String,
        name: String,
        users: Vec<UserSummary>,
    },
}

impl ServerEvent {
    /// Event name as it appears on the wire, for logs and counters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginSuccess { .. } => "loginSuccess",
            Self::UserJoined { .. } => "userJoined",
            Self::UsersList { .. } => "usersList",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::StopTyping => "stopTyping",
            Self::NameUpdated { .. } => "nameUpdated",
            Self::UserLeft { .. } => "userLeft",
        }
    }
}

/// One item in a connection's outbound queue.
///
/// The send task turns these into WebSocket frames. `Shared` carries an
/// event encoded once and handed to every recipient of a fan-out, so a
/// broadcast serializes its payload a single time.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Event(ServerEvent),
    Shared(Arc<str>),
    /// Transport-level keepalive; never visible to the event protocol.
    Ping,
}

impl OutboundFrame {
    /// Encode an event once for fan-out to many recipients.
    pub fn shared(event: &ServerEvent) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(event)?;
        Ok(Self::Shared(Arc::from(json)))
    }
}
