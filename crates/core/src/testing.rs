//! Test doubles shared by the unit tests in this crate

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::dispatcher::{Dispatcher, LineSink, TransportEvent};
use crate::error::{Error, Result};
use crate::frame::ChannelFrame;
use crate::handler::RelayClient;
use crate::peer::{PeerCoordinator, RealmOptions};
use crate::protocol::{Outbound, RealmNumber, UserNumber};

/// Line sink whose output stays readable after it moves into a dispatcher
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    lines: Rc<RefCell<Vec<String>>>,
    closed: Rc<Cell<bool>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn take_lines(&self) -> Vec<String> {
        self.lines.borrow_mut().drain(..).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl LineSink for RecordingSink {
    fn send_line(&mut self, line: &str) -> Result<()> {
        if self.closed.get() {
            return Err(Error::NotConnected);
        }
        self.lines.borrow_mut().push(line.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

/// Relay client with fixed identity that records every request
#[derive(Debug)]
pub struct RecordingClient {
    pub user: Option<UserNumber>,
    pub realm: Option<RealmNumber>,
    sent: Vec<Outbound>,
    connected: bool,
}

impl RecordingClient {
    pub fn new(user: Option<UserNumber>, realm: Option<RealmNumber>) -> Self {
        Self {
            user,
            realm,
            sent: Vec::new(),
            connected: true,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.sent.iter().map(ToString::to_string).collect()
    }

    pub fn take_lines(&mut self) -> Vec<String> {
        let lines = self.lines();
        self.sent.clear();
        lines
    }
}

impl RelayClient for RecordingClient {
    fn user_number(&self) -> Option<UserNumber> {
        self.user
    }

    fn realm_number(&self) -> Option<RealmNumber> {
        self.realm
    }

    fn send(&mut self, request: Outbound) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.sent.push(request);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

struct Peer {
    realm: Option<RealmNumber>,
    dispatcher: Dispatcher<PeerCoordinator, RecordingSink>,
    sink: RecordingSink,
    connected: bool,
}

/// Minimal in-process relay that forwards lines between coordinators
///
/// Only implements what host election and sharding need: joining and
/// creating realms, child realm notifications, and the four message scopes.
#[derive(Default)]
pub struct MiniRelay {
    peers: BTreeMap<UserNumber, Peer>,
    children: BTreeMap<RealmNumber, BTreeSet<RealmNumber>>,
    next_user: UserNumber,
    next_realm: RealmNumber,
}

impl MiniRelay {
    /// Connect a new peer and run the relay until it goes quiet
    pub fn connect(&mut self, options: RealmOptions) -> UserNumber {
        self.next_user += 1;
        let user = self.next_user;

        let sink = RecordingSink::default();
        let mut dispatcher = Dispatcher::new(PeerCoordinator::new(options), sink.clone());
        dispatcher.handle_event(TransportEvent::Open).unwrap();
        dispatcher.handle_line(&format!("#{}", user)).unwrap();

        self.peers.insert(
            user,
            Peer {
                realm: None,
                dispatcher,
                sink,
                connected: true,
            },
        );
        self.pump();
        user
    }

    pub fn disconnect(&mut self, user: UserNumber) {
        let realm = {
            let peer = self.peers.get_mut(&user).unwrap();
            peer.connected = false;
            peer.dispatcher.handle_event(TransportEvent::Closed).unwrap();
            peer.realm.take()
        };
        if let Some(realm) = realm {
            self.broadcast(realm, &format!("-{}", user), None);
        }
        self.pump();
    }

    pub fn coordinator(&self, user: UserNumber) -> &PeerCoordinator {
        self.peers[&user].dispatcher.handler()
    }

    pub fn realm_of(&self, user: UserNumber) -> Option<RealmNumber> {
        self.peers[&user].realm
    }

    /// Drain every queued frame for `user`
    pub fn frames(&mut self, user: UserNumber) -> Vec<ChannelFrame> {
        let coordinator = self.peers.get_mut(&user).unwrap().dispatcher.handler_mut();
        std::iter::from_fn(|| coordinator.next_frame().unwrap()).collect()
    }

    fn pump(&mut self) {
        loop {
            let outgoing: Vec<(UserNumber, String)> = self
                .peers
                .iter()
                .flat_map(|(user, peer)| {
                    peer.sink
                        .take_lines()
                        .into_iter()
                        .map(move |line| (*user, line))
                })
                .collect();
            if outgoing.is_empty() {
                return;
            }
            for (sender, line) in outgoing {
                self.route(sender, &line);
            }
        }
    }

    fn route(&mut self, sender: UserNumber, line: &str) {
        let (prefix, body) = line.split_once(' ').unwrap_or((line, ""));
        let symbol = prefix.chars().next().unwrap();
        let arg = &prefix[1..];

        match symbol {
            '^' | '&' => {
                let child = symbol == '&';
                let realm = if arg.is_empty() {
                    self.create_realm(sender, child)
                } else {
                    arg.parse().unwrap()
                };
                self.join(sender, realm, symbol);
            }
            '@' => {
                let target: UserNumber = arg.parse().unwrap();
                self.deliver(target, &format!("@{} {}", sender, body));
            }
            '!' => {
                if let Some(realm) = self.peers[&sender].realm {
                    self.broadcast(realm, &format!("!{} {}", sender, body), Some(sender));
                }
            }
            '*' => {
                if let Some(realm) = self.peers[&sender].realm {
                    self.broadcast(realm, &format!("*{} {}", sender, body), None);
                }
            }
            ':' => {
                let realm: RealmNumber = arg.parse().unwrap();
                self.broadcast(realm, &format!("*{} {}", sender, body), None);
            }
            _ => {}
        }
    }

    fn create_realm(&mut self, sender: UserNumber, child: bool) -> RealmNumber {
        self.next_realm += 1;
        let realm = 100 + self.next_realm;
        if child {
            if let Some(parent) = self.peers[&sender].realm {
                self.children.entry(parent).or_default().insert(realm);
                self.broadcast(parent, &format!("{{{}", realm), Some(sender));
            }
        }
        realm
    }

    fn join(&mut self, user: UserNumber, realm: RealmNumber, symbol: char) {
        if let Some(old) = self.peers.get_mut(&user).unwrap().realm.take() {
            self.broadcast(old, &format!("-{}", user), None);
        }

        let others: Vec<String> = self
            .members(realm)
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        let children: Vec<RealmNumber> = self
            .children
            .get(&realm)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default();

        self.broadcast(realm, &format!("+{}", user), None);
        self.peers.get_mut(&user).unwrap().realm = Some(realm);

        self.deliver(user, &format!("{}{}", symbol, realm));
        for child in children {
            self.deliver(user, &format!("{{{}", child));
        }
        self.deliver(user, &format!("={}", others.join(",")));
    }

    fn members(&self, realm: RealmNumber) -> Vec<UserNumber> {
        self.peers
            .iter()
            .filter(|(_, peer)| peer.connected && peer.realm == Some(realm))
            .map(|(user, _)| *user)
            .collect()
    }

    fn broadcast(&mut self, realm: RealmNumber, line: &str, except: Option<UserNumber>) {
        for user in self.members(realm) {
            if Some(user) != except {
                self.deliver(user, line);
            }
        }
    }

    fn deliver(&mut self, user: UserNumber, line: &str) {
        let peer = self.peers.get_mut(&user).unwrap();
        if peer.connected {
            peer.dispatcher.handle_line(line).unwrap();
        }
    }
}
