//! Self-organizing host election for a realm of equal peers
//!
//! A [`PeerCoordinator`] joins a realm, optionally settles into a child realm
//! with room to spare, and then agrees with the other members on a single
//! host without any authority beyond the relay:
//!
//! - alone in the realm: this peer is host
//! - one other member: that member is host
//! - otherwise: ask everyone `WHO_IS_HOST` and accept the first `I_AM_HOST`
//!
//! When the host leaves, every survivor independently picks the smallest
//! remaining user number, so all peers converge without another round trip.
//!
//! Everything observable is queued as [`ChannelFrame`]s; the application
//! pulls them with [`PeerCoordinator::next_frame`].

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::frame::{ChannelFrame, FrameKind};
use crate::handler::{ChannelHandler, RelayClient};
use crate::protocol::{ChannelStatus, MessageTarget, RealmNumber, RealmType, UserNumber};

/// Ask a child realm's host for its population
pub const GET_REALM_INFO: &str = "GET_REALM_INFO";
/// Reply to [`GET_REALM_INFO`]: `REALM_INFO <realm> <members>`
pub const REALM_INFO: &str = "REALM_INFO";
/// Ask the realm who the host is
pub const WHO_IS_HOST: &str = "WHO_IS_HOST";
/// Reply to [`WHO_IS_HOST`], sent by the host only
pub const I_AM_HOST: &str = "I_AM_HOST";

/// Sharding policy: overflow the target realm into child realms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRealmPolicy {
    /// A child realm with fewer members than this can be joined
    pub capacity: usize,
}

/// Where a coordinator should end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmOptions {
    pub realm_number: RealmNumber,
    #[serde(default)]
    pub child_realm: Option<ChildRealmPolicy>,
}

impl RealmOptions {
    /// A single realm, never sharded
    pub fn flat(realm_number: RealmNumber) -> Self {
        Self {
            realm_number,
            child_realm: None,
        }
    }

    /// Use `realm_number` as a lobby and settle in child realms of `capacity`
    pub fn sharded(realm_number: RealmNumber, capacity: usize) -> Self {
        Self {
            realm_number,
            child_realm: Some(ChildRealmPolicy { capacity }),
        }
    }
}

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    AwaitingRealm,
    DeterminingChildRealm,
    DeterminingHost,
    Negotiated,
    Offline,
}

/// Realm membership tracker and host negotiator
#[derive(Debug)]
pub struct PeerCoordinator {
    options: RealmOptions,
    state: NegotiationState,
    started: bool,
    my_user_number: Option<UserNumber>,
    host_user_number: Option<UserNumber>,
    members: BTreeSet<UserNumber>,
    child_realms: BTreeSet<RealmNumber>,
    realm_responses: usize,
    realm_decided: bool,
    frames: VecDeque<ChannelFrame>,
}

impl PeerCoordinator {
    pub fn new(options: RealmOptions) -> Self {
        Self {
            options,
            state: NegotiationState::AwaitingRealm,
            started: false,
            my_user_number: None,
            host_user_number: None,
            members: BTreeSet::new(),
            child_realms: BTreeSet::new(),
            realm_responses: 0,
            realm_decided: false,
            frames: VecDeque::new(),
        }
    }

    pub fn options(&self) -> &RealmOptions {
        &self.options
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn host_user_number(&self) -> Option<UserNumber> {
        self.host_user_number
    }

    pub fn my_user_number(&self) -> Option<UserNumber> {
        self.my_user_number
    }

    pub fn am_i_host(&self) -> bool {
        self.my_user_number.is_some() && self.my_user_number == self.host_user_number
    }

    pub fn members(&self) -> &BTreeSet<UserNumber> {
        &self.members
    }

    pub fn child_realms(&self) -> &BTreeSet<RealmNumber> {
        &self.child_realms
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Take the oldest unprocessed frame, if any
    ///
    /// Fails with [`Error::NotStarted`] when the coordinator has never been
    /// attached to a connection.
    pub fn next_frame(&mut self) -> Result<Option<ChannelFrame>> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        Ok(self.frames.pop_front())
    }

    fn queue(&mut self, frame: ChannelFrame) {
        debug!(kind = ?frame.kind, id = ?frame.id, "Queueing frame");
        self.frames.push_back(frame);
    }

    /// Membership is only tracked in the realm this peer settles in, never
    /// in the lobby of a sharded realm
    fn in_target_realm(&self, client: &dyn RelayClient) -> bool {
        self.options.child_realm.is_none()
            || client.realm_number() != Some(self.options.realm_number)
    }

    fn begin_determine_realm(&mut self, client: &mut dyn RelayClient) -> Result<()> {
        self.state = NegotiationState::DeterminingChildRealm;
        self.realm_responses = 0;
        self.realm_decided = false;

        if self.child_realms.is_empty() {
            info!("No child realms yet, creating one");
            self.realm_decided = true;
            return client.create_realm(RealmType::ChildRealm);
        }

        debug!(children = self.child_realms.len(), "Polling child realms");
        for realm in &self.child_realms {
            client.send_to_realm(*realm, GET_REALM_INFO)?;
        }
        Ok(())
    }

    fn consider_realm(
        &mut self,
        client: &mut dyn RelayClient,
        realm: RealmNumber,
        population: usize,
    ) -> Result<()> {
        if self.state != NegotiationState::DeterminingChildRealm || self.realm_decided {
            debug!(realm, population, "Ignoring stale realm info");
            return Ok(());
        }
        let Some(policy) = self.options.child_realm else {
            return Ok(());
        };

        self.realm_responses += 1;
        if population < policy.capacity {
            info!(realm, population, "Joining child realm with room");
            self.realm_decided = true;
            client.join_realm(realm, RealmType::ChildRealm)
        } else if self.realm_responses >= self.child_realms.len() {
            info!("Every child realm is full, creating another");
            self.realm_decided = true;
            client.create_realm(RealmType::ChildRealm)
        } else {
            Ok(())
        }
    }

    fn begin_determine_host(&mut self, client: &mut dyn RelayClient) -> Result<()> {
        self.state = NegotiationState::DeterminingHost;

        let me = self.my_user_number;
        let other = self.members.iter().copied().find(|u| Some(*u) != me);
        match (me, other, self.members.len()) {
            (Some(me), _, 1) => {
                self.end_determine_host(me);
                Ok(())
            }
            (Some(_), Some(other), 2) => {
                self.end_determine_host(other);
                Ok(())
            }
            _ => {
                debug!(members = self.members.len(), "Asking who is host");
                client.send_to_all_except_me(WHO_IS_HOST)
            }
        }
    }

    fn end_determine_host(&mut self, host: UserNumber) {
        info!(host, me = ?self.my_user_number, "Host determined");
        self.host_user_number = Some(host);
        self.queue(ChannelFrame::for_user(FrameKind::IsHost, host));
        self.queue(ChannelFrame::new(FrameKind::Negotiated));
        self.state = NegotiationState::Negotiated;
    }
}

impl ChannelHandler for PeerCoordinator {
    fn channel_status(
        &mut self,
        client: &mut dyn RelayClient,
        status: ChannelStatus,
    ) -> Result<()> {
        self.started = true;
        if self.state == NegotiationState::Offline {
            return Ok(());
        }

        match status {
            ChannelStatus::Online => {
                info!(realm = self.options.realm_number, "Online, joining realm");
                client.join_realm(self.options.realm_number, RealmType::Realm)
            }
            ChannelStatus::Offline => {
                info!("Went offline");
                self.state = NegotiationState::Offline;
                self.queue(ChannelFrame::new(FrameKind::Offline));
                Ok(())
            }
        }
    }

    fn assign_user_number(
        &mut self,
        _client: &mut dyn RelayClient,
        user: UserNumber,
    ) -> Result<()> {
        self.my_user_number = Some(user);
        self.members.insert(user);
        Ok(())
    }

    fn assign_realm_number(
        &mut self,
        _client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        debug!(realm, state = ?self.state, "Now in realm");
        Ok(())
    }

    fn users_joined(
        &mut self,
        client: &mut dyn RelayClient,
        users: &[UserNumber],
        joined_before_you: bool,
    ) -> Result<()> {
        if self.state == NegotiationState::Offline {
            return Ok(());
        }
        let awaiting_snapshot = matches!(
            self.state,
            NegotiationState::AwaitingRealm | NegotiationState::DeterminingChildRealm
        );
        if joined_before_you && !awaiting_snapshot {
            debug!(state = ?self.state, "Ignoring stale membership snapshot");
            return Ok(());
        }

        if self.in_target_realm(client) {
            if joined_before_you {
                if let Some(me) = self.my_user_number {
                    self.queue(ChannelFrame::for_user(FrameKind::Join, me));
                }
            }
            for &user in users {
                if self.members.insert(user) {
                    self.queue(ChannelFrame::for_user(FrameKind::Join, user));
                }
            }
        }

        if !joined_before_you {
            return Ok(());
        }

        // The snapshot completes the picture of this realm and its children
        let in_lobby = client.realm_number() == Some(self.options.realm_number);
        if self.options.child_realm.is_some() && in_lobby {
            self.begin_determine_realm(client)
        } else {
            self.begin_determine_host(client)
        }
    }

    fn user_left(&mut self, client: &mut dyn RelayClient, user: UserNumber) -> Result<()> {
        if self.state == NegotiationState::Offline || !self.in_target_realm(client) {
            return Ok(());
        }
        if !self.members.remove(&user) {
            debug!(user, "Ignoring leave of unknown user");
            return Ok(());
        }

        self.queue(ChannelFrame::for_user(FrameKind::Leave, user));

        if self.host_user_number == Some(user) {
            self.host_user_number = self.members.first().copied();
            match self.host_user_number {
                Some(host) => {
                    info!(old_host = user, new_host = host, "Host left, re-elected");
                    self.queue(ChannelFrame::for_user(FrameKind::IsNewHost, host));
                }
                None => warn!(old_host = user, "Host left an empty realm"),
            }
        }
        Ok(())
    }

    fn child_realm_created(
        &mut self,
        _client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        self.child_realms.insert(realm);
        Ok(())
    }

    fn child_realm_destroyed(
        &mut self,
        _client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        self.child_realms.remove(&realm);
        Ok(())
    }

    fn handle_message(
        &mut self,
        client: &mut dyn RelayClient,
        sender: UserNumber,
        _target: MessageTarget,
        message: &str,
    ) -> Result<()> {
        if self.state == NegotiationState::Offline {
            return Ok(());
        }

        let mut parts = codec::decode(message).into_iter();
        let command = parts.next().unwrap_or_default();
        let parameters: Vec<String> = parts.collect();

        match command.as_str() {
            GET_REALM_INFO => {
                if let (true, Some(realm)) = (self.am_i_host(), client.realm_number()) {
                    let reply = codec::encode([
                        REALM_INFO.to_string(),
                        realm.to_string(),
                        self.members.len().to_string(),
                    ]);
                    client.send_to_user(sender, &reply)?;
                }
                Ok(())
            }
            REALM_INFO => {
                let realm = parameters.first().and_then(|p| p.parse().ok());
                let population = parameters.get(1).and_then(|p| p.parse().ok());
                match (realm, population) {
                    (Some(realm), Some(population)) => {
                        self.consider_realm(client, realm, population)
                    }
                    _ => {
                        debug!(sender, ?parameters, "Ignoring malformed realm info");
                        Ok(())
                    }
                }
            }
            WHO_IS_HOST => {
                if self.am_i_host() {
                    client.send_to_user(sender, I_AM_HOST)?;
                }
                Ok(())
            }
            I_AM_HOST => {
                if self.state != NegotiationState::DeterminingHost {
                    debug!(sender, "Ignoring stale host announcement");
                } else if !self.members.contains(&sender) {
                    debug!(sender, "Ignoring host announcement from non-member");
                } else {
                    self.end_determine_host(sender);
                }
                Ok(())
            }
            _ => {
                if self.state == NegotiationState::Negotiated {
                    self.queue(ChannelFrame::message(sender, command, parameters));
                } else {
                    debug!(sender, command = %command, "Dropping message before negotiation");
                }
                Ok(())
            }
        }
    }

    fn handle_data(
        &mut self,
        _client: &mut dyn RelayClient,
        _realm: Option<RealmNumber>,
        name: &str,
        value: &str,
    ) -> Result<()> {
        if self.state == NegotiationState::Negotiated {
            self.queue(ChannelFrame::data(name.to_string(), value.to_string()));
        }
        Ok(())
    }
}
