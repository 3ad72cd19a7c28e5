//! Protocol dispatcher for a live relay connection
//!
//! The dispatcher owns the outbound [`LineSink`] and the connection identity
//! (user and realm numbers). Transport events are fed in one at a time with
//! [`Dispatcher::handle_event`]; each inbound line is parsed and routed to
//! the matching [`ChannelHandler`] callback.

use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::handler::{ChannelHandler, RelayClient};
use crate::protocol::{ChannelStatus, Inbound, Outbound, RealmNumber, UserNumber};

/// Ordered, line-preserving outbound half of a transport
pub trait LineSink {
    /// Queue one line for sending; the line carries no terminator
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Close the transport
    fn close(&mut self);
}

/// Lifecycle and data notifications from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Line(String),
    Error(String),
    Closed,
}

/// Connection state handed to handler callbacks
struct Link<S> {
    sink: Option<S>,
    online: bool,
    user_number: Option<UserNumber>,
    realm_number: Option<RealmNumber>,
}

impl<S: LineSink> RelayClient for Link<S> {
    fn user_number(&self) -> Option<UserNumber> {
        self.user_number
    }

    fn realm_number(&self) -> Option<RealmNumber> {
        self.realm_number
    }

    fn send(&mut self, request: Outbound) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::NotConnected)?;
        let line = request.to_string();
        trace!(line = %line, "Sending line");
        sink.send_line(&line)
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            info!("Disconnecting from relay");
            sink.close();
        }
        Ok(())
    }
}

/// Routes relay traffic for one connection to a handler
pub struct Dispatcher<H, S> {
    link: Link<S>,
    handler: H,
}

impl<H: ChannelHandler, S: LineSink> Dispatcher<H, S> {
    pub fn new(handler: H, sink: S) -> Self {
        Self {
            link: Link {
                sink: Some(sink),
                online: false,
                user_number: None,
                realm_number: None,
            },
            handler,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Outbound side, for requests issued by the embedding application
    pub fn client(&mut self) -> &mut dyn RelayClient {
        &mut self.link
    }

    pub fn user_number(&self) -> Option<UserNumber> {
        self.link.user_number
    }

    pub fn realm_number(&self) -> Option<RealmNumber> {
        self.link.realm_number
    }

    pub fn is_online(&self) -> bool {
        self.link.online
    }

    /// Process one transport notification
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Open => {
                info!("Relay connection open");
                self.link.online = true;
                self.handler
                    .channel_status(&mut self.link, ChannelStatus::Online)
            }
            TransportEvent::Line(line) => self.handle_line(&line),
            TransportEvent::Error(error) => {
                warn!(error = %error, "Relay connection error");
                self.go_offline()
            }
            TransportEvent::Closed => {
                info!("Relay connection closed");
                self.go_offline()
            }
        }
    }

    /// Parse one inbound line and invoke the matching callback
    ///
    /// Empty, unrecognized and malformed lines are dropped without error.
    pub fn handle_line(&mut self, line: &str) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        trace!(line = %line, "Received line");

        match Inbound::parse(line) {
            Ok(Some(inbound)) => self.dispatch(inbound),
            Ok(None) => {
                debug!(line = %line, "Ignoring unrecognized line");
                Ok(())
            }
            Err(e) => {
                debug!(line = %line, error = %e, "Ignoring malformed line");
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, inbound: Inbound) -> Result<()> {
        let client = &mut self.link;
        match inbound {
            Inbound::UserNumber(user) => {
                if let Some(existing) = client.user_number {
                    warn!(existing, user, "Ignoring user number reassignment");
                    return Ok(());
                }
                client.user_number = Some(user);
                debug!(user, "User number assigned");
                self.handler.assign_user_number(client, user)
            }
            Inbound::RealmNumber(realm) => {
                client.realm_number = Some(realm);
                debug!(realm, "Realm number assigned");
                self.handler.assign_realm_number(client, realm)
            }
            Inbound::Snapshot(users) => self.handler.users_joined(client, &users, true),
            Inbound::UserJoined(user) => self.handler.users_joined(client, &[user], false),
            Inbound::UserLeft(user) => self.handler.user_left(client, user),
            Inbound::ChildRealmCreated(realm) => self.handler.child_realm_created(client, realm),
            Inbound::ChildRealmDestroyed(realm) => {
                self.handler.child_realm_destroyed(client, realm)
            }
            Inbound::Message {
                sender,
                target,
                body,
            } => self.handler.handle_message(client, sender, target, &body),
            Inbound::Data { realm, name, value } => {
                let realm = realm.or(client.realm_number);
                self.handler.handle_data(client, realm, &name, &value)
            }
        }
    }

    fn go_offline(&mut self) -> Result<()> {
        if !self.link.online {
            return Ok(());
        }
        self.link.online = false;
        self.link.sink = None;
        self.handler
            .channel_status(&mut self.link, ChannelStatus::Offline)
    }
}
