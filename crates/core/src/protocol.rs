//! Relay wire protocol
//!
//! Every line starts with a single symbol character. Inbound lines are
//! `<symbol><number>[ <body>]`; outbound lines are rendered from
//! [`Outbound`] via `Display`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// User number assigned by the relay, unique per connection
pub type UserNumber = u32;

/// Realm number assigned by the relay
pub type RealmNumber = u32;

/// Whether a realm is top-level or a child of the current realm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealmType {
    Realm,
    ChildRealm,
}

impl RealmType {
    pub fn symbol(self) -> char {
        match self {
            RealmType::Realm => '^',
            RealmType::ChildRealm => '&',
        }
    }
}

/// Who an inbound message was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTarget {
    All,
    AllExceptSender,
    Me,
}

/// Connection status reported to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Online,
    Offline,
}

/// A parsed inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `#n`
    UserNumber(UserNumber),
    /// `^n` or `&n`
    RealmNumber(RealmNumber),
    /// `=a,b,c` (bare `=` for an empty realm)
    Snapshot(Vec<UserNumber>),
    /// `+n`
    UserJoined(UserNumber),
    /// `-n`
    UserLeft(UserNumber),
    /// `{n`
    ChildRealmCreated(RealmNumber),
    /// `}n`
    ChildRealmDestroyed(RealmNumber),
    /// `@n`, `!n` or `*n` followed by the body
    Message {
        sender: UserNumber,
        target: MessageTarget,
        body: String,
    },
    /// `<[realm,]name value`
    Data {
        realm: Option<RealmNumber>,
        name: String,
        value: String,
    },
}

impl Inbound {
    /// Parse one inbound line
    ///
    /// Returns `Ok(None)` for empty lines and unknown symbols, and an error
    /// when a known symbol carries a field that does not parse.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let (prefix, rest) = match line.split_once(' ') {
            Some((prefix, rest)) => (prefix, rest),
            None => (line, ""),
        };

        let mut chars = prefix.chars();
        let Some(symbol) = chars.next() else {
            return Ok(None);
        };
        let arg = chars.as_str();

        let inbound = match symbol {
            '#' => Inbound::UserNumber(parse_number(prefix, arg)?),
            '^' | '&' => Inbound::RealmNumber(parse_number(prefix, arg)?),
            '=' => Inbound::Snapshot(parse_number_list(prefix, arg)?),
            '+' => Inbound::UserJoined(parse_number(prefix, arg)?),
            '-' => Inbound::UserLeft(parse_number(prefix, arg)?),
            '{' => Inbound::ChildRealmCreated(parse_number(prefix, arg)?),
            '}' => Inbound::ChildRealmDestroyed(parse_number(prefix, arg)?),
            '@' | '!' | '*' => {
                let target = match symbol {
                    '@' => MessageTarget::Me,
                    '!' => MessageTarget::AllExceptSender,
                    _ => MessageTarget::All,
                };
                Inbound::Message {
                    sender: parse_number(prefix, arg)?,
                    target,
                    body: rest.to_string(),
                }
            }
            '<' => {
                let (realm, name) = match arg.split_once(',') {
                    Some((realm, name)) => (Some(parse_number(prefix, realm)?), name),
                    None => (None, arg),
                };
                Inbound::Data {
                    realm,
                    name: name.to_string(),
                    value: rest.to_string(),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(inbound))
    }
}

fn parse_number(prefix: &str, field: &str) -> Result<u32> {
    field
        .parse()
        .map_err(|_| Error::Protocol(format!("Invalid number in {:?}", prefix)))
}

fn parse_number_list(prefix: &str, field: &str) -> Result<Vec<u32>> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field.split(',').map(|n| parse_number(prefix, n)).collect()
}

/// An outbound request to the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    JoinRealm {
        realm: RealmNumber,
        kind: RealmType,
    },
    CreateRealm(RealmType),
    SendToUser {
        user: UserNumber,
        message: String,
    },
    SendToAllExceptMe(String),
    SendToAll(String),
    SendToRealm {
        realm: RealmNumber,
        message: String,
    },
    /// An empty value deletes the entry; a zero or absent duration never expires
    SaveData {
        name: String,
        value: String,
        duration_secs: Option<u32>,
    },
    LoadData {
        realm: Option<RealmNumber>,
        name: String,
    },
    /// Raw server command, meaning is server-defined
    Command(String),
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outbound::JoinRealm { realm, kind } => write!(f, "{}{}", kind.symbol(), realm),
            Outbound::CreateRealm(kind) => write!(f, "{}", kind.symbol()),
            Outbound::SendToUser { user, message } => write!(f, "@{} {}", user, message),
            Outbound::SendToAllExceptMe(message) => write!(f, "! {}", message),
            Outbound::SendToAll(message) => write!(f, "* {}", message),
            Outbound::SendToRealm { realm, message } => write!(f, ":{} {}", realm, message),
            Outbound::SaveData {
                name,
                value,
                duration_secs,
            } => {
                write!(f, ">{}", sanitize_name(name))?;
                if let Some(secs) = duration_secs.filter(|secs| *secs > 0) {
                    write!(f, ",{}", secs)?;
                }
                write!(f, " {}", value)
            }
            Outbound::LoadData { realm, name } => match realm {
                Some(realm) => write!(f, "<{},{}", realm, sanitize_name(name)),
                None => write!(f, "<{}", sanitize_name(name)),
            },
            Outbound::Command(command) => write!(f, "${}", command),
        }
    }
}

/// Replace the characters that delimit data names on the wire
pub fn sanitize_name(name: &str) -> String {
    name.replace([' ', ','], "_")
}
