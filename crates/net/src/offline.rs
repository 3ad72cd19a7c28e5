//! Offline relay simulator
//!
//! Plays a relay with exactly one connected user, so a handler can run
//! without a server. Every reply is delivered after an artificial ping
//! delay, through the same callbacks a live [`relay_core::Dispatcher`]
//! would invoke.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use relay_core::protocol::sanitize_name;
use relay_core::{
    ChannelHandler, ChannelStatus, MessageTarget, Outbound, RealmNumber, RealmType, RelayClient,
    UserNumber,
};

use crate::error::Result;
use crate::store::DataStore;

/// The only user the simulator ever assigns
pub const OFFLINE_USER_NUMBER: UserNumber = 1;

/// Default delay before each simulated reply
pub const DEFAULT_PING: Duration = Duration::from_millis(50);

/// Offline relay configuration
#[derive(Debug, Clone)]
pub struct OfflineOptions {
    /// Delay between a request and the simulated reply
    pub ping: Duration,
    /// Persist saved data here; `None` keeps it in memory
    pub data_path: Option<PathBuf>,
}

impl Default for OfflineOptions {
    fn default() -> Self {
        Self {
            ping: DEFAULT_PING,
            data_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Status(ChannelStatus),
    UserNumber(UserNumber),
    RealmNumber(RealmNumber),
    Snapshot,
    Message {
        target: MessageTarget,
        body: String,
    },
    Data {
        realm: Option<RealmNumber>,
        name: String,
        value: String,
    },
}

struct Scheduled {
    due: Instant,
    callback: Callback,
}

/// Simulated relay state handed to handler callbacks
struct SimLink {
    ping: Duration,
    store: DataStore,
    pending: VecDeque<Scheduled>,
    connected: bool,
    /// Realm the simulated relay has placed us in
    realm: Option<RealmNumber>,
    /// Identity as the client has been told it so far
    user_number: Option<UserNumber>,
    assigned_realm: Option<RealmNumber>,
}

impl SimLink {
    fn schedule(&mut self, callback: Callback) {
        trace!(?callback, "Scheduling callback");
        self.pending.push_back(Scheduled {
            due: Instant::now() + self.ping,
            callback,
        });
    }

    fn enter_realm(&mut self, realm: RealmNumber) {
        self.realm = Some(realm);
        self.schedule(Callback::RealmNumber(realm));
        self.schedule(Callback::Snapshot);
    }

    fn echo(&mut self, target: MessageTarget, body: String) {
        self.schedule(Callback::Message { target, body });
    }
}

fn next_realm(realm: RealmNumber) -> relay_core::Result<RealmNumber> {
    realm
        .checked_add(1)
        .ok_or_else(|| relay_core::Error::Protocol(format!("No realm after {}", realm)))
}

fn storage_error(e: crate::Error) -> relay_core::Error {
    relay_core::Error::Transport(e.to_string())
}

impl RelayClient for SimLink {
    fn user_number(&self) -> Option<UserNumber> {
        self.user_number
    }

    fn realm_number(&self) -> Option<RealmNumber> {
        self.assigned_realm
    }

    fn send(&mut self, request: Outbound) -> relay_core::Result<()> {
        if !self.connected {
            return Err(relay_core::Error::NotConnected);
        }
        trace!(line = %request, "Simulating request");

        match request {
            Outbound::JoinRealm { realm, kind } => {
                let realm = match kind {
                    RealmType::Realm => realm,
                    RealmType::ChildRealm => next_realm(realm)?,
                };
                self.enter_realm(realm);
            }
            Outbound::CreateRealm(_) => {
                let realm = match self.realm {
                    Some(realm) => next_realm(realm)?,
                    None => 0,
                };
                self.enter_realm(realm);
            }
            Outbound::SendToUser { user, message } => {
                if user == OFFLINE_USER_NUMBER {
                    self.echo(MessageTarget::Me, message);
                }
            }
            Outbound::SendToAllExceptMe(_) => {
                trace!("Nobody else to deliver to");
            }
            Outbound::SendToAll(message) => self.echo(MessageTarget::All, message),
            Outbound::SendToRealm { realm, message } => {
                if Some(realm) == self.realm {
                    self.echo(MessageTarget::All, message);
                }
            }
            Outbound::SaveData {
                name,
                value,
                duration_secs,
            } => {
                self.store
                    .save(self.realm, &sanitize_name(&name), &value, duration_secs)
                    .map_err(storage_error)?;
            }
            Outbound::LoadData { realm, name } => {
                let realm = realm.or(self.realm);
                let name = sanitize_name(&name);
                let value = self
                    .store
                    .load(realm, &name)
                    .map_err(storage_error)?
                    .unwrap_or_default();
                self.schedule(Callback::Data { realm, name, value });
            }
            Outbound::Command(command) => {
                debug!(command = %command, "Ignoring server command offline");
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) -> relay_core::Result<()> {
        if self.connected {
            info!("Disconnecting from offline relay");
            self.connected = false;
            self.schedule(Callback::Status(ChannelStatus::Offline));
        }
        Ok(())
    }
}

/// A relay stand-in that needs no network
pub struct OfflineRelay<H> {
    link: SimLink,
    handler: H,
}

impl<H: ChannelHandler> OfflineRelay<H> {
    /// Create a simulator, opening the configured data store
    pub fn new(handler: H, options: OfflineOptions) -> Result<Self> {
        let store = match &options.data_path {
            Some(path) => DataStore::open(path)?,
            None => DataStore::open_in_memory()?,
        };
        Ok(Self::with_store(handler, store, options.ping))
    }

    pub fn with_store(handler: H, store: DataStore, ping: Duration) -> Self {
        Self {
            link: SimLink {
                ping,
                store,
                pending: VecDeque::new(),
                connected: true,
                realm: None,
                user_number: None,
                assigned_realm: None,
            },
            handler,
        }
    }

    /// Simulate the connection opening
    pub fn start(&mut self) {
        info!(ping_ms = self.link.ping.as_millis() as u64, "Starting offline relay");
        self.link.schedule(Callback::Status(ChannelStatus::Online));
        self.link.schedule(Callback::UserNumber(OFFLINE_USER_NUMBER));
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Outbound interface for requests made outside a callback
    pub fn client(&mut self) -> &mut dyn RelayClient {
        &mut self.link
    }

    pub fn has_pending(&self) -> bool {
        !self.link.pending.is_empty()
    }

    /// Wait for the next reply to come due and deliver it
    ///
    /// Returns `false` when nothing is scheduled. Cancel safe: a reply is
    /// only removed from the queue once its delay has elapsed.
    pub async fn step(&mut self) -> relay_core::Result<bool> {
        let Some(due) = self.link.pending.front().map(|s| s.due) else {
            return Ok(false);
        };
        tokio::time::sleep_until(due).await;

        match self.link.pending.pop_front() {
            Some(scheduled) => {
                self.deliver(scheduled.callback)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deliver every scheduled reply now, including ones scheduled on the way
    pub fn deliver_pending(&mut self) -> relay_core::Result<()> {
        while let Some(scheduled) = self.link.pending.pop_front() {
            self.deliver(scheduled.callback)?;
        }
        Ok(())
    }

    fn deliver(&mut self, callback: Callback) -> relay_core::Result<()> {
        let client = &mut self.link;
        match callback {
            Callback::Status(status) => self.handler.channel_status(client, status),
            Callback::UserNumber(user) => {
                client.user_number = Some(user);
                self.handler.assign_user_number(client, user)
            }
            Callback::RealmNumber(realm) => {
                client.assigned_realm = Some(realm);
                self.handler.assign_realm_number(client, realm)
            }
            Callback::Snapshot => self.handler.users_joined(client, &[], true),
            Callback::Message { target, body } => {
                self.handler
                    .handle_message(client, OFFLINE_USER_NUMBER, target, &body)
            }
            Callback::Data { realm, name, value } => {
                self.handler.handle_data(client, realm, &name, &value)
            }
        }
    }
}
