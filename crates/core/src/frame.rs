//! Application-facing frames produced by the peer coordinator

use serde::Serialize;

use crate::protocol::UserNumber;

/// What a [`ChannelFrame`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// A user is present in the realm (`id` is the user)
    Join,
    /// A user left the realm (`id` is the user)
    Leave,
    /// A data response (`command` is the name, the single parameter the value)
    Data,
    /// An application command from `id`
    Message,
    /// The host was determined during negotiation
    IsHost,
    /// The previous host left and `id` took over
    IsNewHost,
    /// Negotiation finished; ordinary messages flow from here on
    Negotiated,
    /// The connection went offline
    Offline,
}

/// One queued event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFrame {
    pub kind: FrameKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

impl ChannelFrame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            id: None,
            command: None,
            parameters: Vec::new(),
        }
    }

    pub fn for_user(kind: FrameKind, user: UserNumber) -> Self {
        Self {
            id: Some(user),
            ..Self::new(kind)
        }
    }

    pub fn message(sender: UserNumber, command: String, parameters: Vec<String>) -> Self {
        Self {
            kind: FrameKind::Message,
            id: Some(sender),
            command: Some(command),
            parameters,
        }
    }

    pub fn data(name: String, value: String) -> Self {
        Self {
            kind: FrameKind::Data,
            id: None,
            command: Some(name),
            parameters: vec![value],
        }
    }
}
