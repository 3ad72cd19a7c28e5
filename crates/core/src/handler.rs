//! Callback contract between a relay connection and its handler
//!
//! A [`RelayClient`] is whatever sits on the relay side of a connection: the
//! live [`Dispatcher`](crate::Dispatcher) or an offline simulator. It is
//! handed to every [`ChannelHandler`] callback so the handler can react by
//! sending requests of its own.

use crate::codec;
use crate::error::Result;
use crate::protocol::{
    ChannelStatus, MessageTarget, Outbound, RealmNumber, RealmType, UserNumber,
};

/// Outbound side of a relay connection plus its identity state
pub trait RelayClient {
    /// User number assigned by the relay, `None` until assigned
    fn user_number(&self) -> Option<UserNumber>;

    /// Realm the client currently sits in, `None` before the first join
    fn realm_number(&self) -> Option<RealmNumber>;

    /// Send one request to the relay
    fn send(&mut self, request: Outbound) -> Result<()>;

    /// Close the connection; no line is sent
    fn disconnect(&mut self) -> Result<()>;

    fn join_realm(&mut self, realm: RealmNumber, kind: RealmType) -> Result<()> {
        self.send(Outbound::JoinRealm { realm, kind })
    }

    fn create_realm(&mut self, kind: RealmType) -> Result<()> {
        self.send(Outbound::CreateRealm(kind))
    }

    fn send_to_user(&mut self, user: UserNumber, message: &str) -> Result<()> {
        self.send(Outbound::SendToUser {
            user,
            message: message.to_string(),
        })
    }

    fn send_to_all_except_me(&mut self, message: &str) -> Result<()> {
        self.send(Outbound::SendToAllExceptMe(message.to_string()))
    }

    fn send_to_all(&mut self, message: &str) -> Result<()> {
        self.send(Outbound::SendToAll(message.to_string()))
    }

    fn send_to_realm(&mut self, realm: RealmNumber, message: &str) -> Result<()> {
        self.send(Outbound::SendToRealm {
            realm,
            message: message.to_string(),
        })
    }

    /// Save data against the current realm; an empty value deletes it
    fn save_data(&mut self, name: &str, value: &str, duration_secs: Option<u32>) -> Result<()> {
        self.send(Outbound::SaveData {
            name: name.to_string(),
            value: value.to_string(),
            duration_secs,
        })
    }

    /// Ask for data from the current realm, or from `realm` when given
    fn load_data(&mut self, name: &str, realm: Option<RealmNumber>) -> Result<()> {
        self.send(Outbound::LoadData {
            realm,
            name: name.to_string(),
        })
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        self.send(Outbound::Command(command.to_string()))
    }
}

/// Callbacks invoked for relay traffic
///
/// Every callback is optional: the default bodies do nothing, so a handler
/// only implements what it cares about. Errors returned from a callback
/// propagate out of the dispatcher that invoked it.
pub trait ChannelHandler {
    fn channel_status(
        &mut self,
        _client: &mut dyn RelayClient,
        _status: ChannelStatus,
    ) -> Result<()> {
        Ok(())
    }

    /// Called once per connection; the handler is in no realm yet
    fn assign_user_number(
        &mut self,
        _client: &mut dyn RelayClient,
        _user: UserNumber,
    ) -> Result<()> {
        Ok(())
    }

    fn assign_realm_number(
        &mut self,
        _client: &mut dyn RelayClient,
        _realm: RealmNumber,
    ) -> Result<()> {
        Ok(())
    }

    /// `joined_before_you` marks the roster snapshot sent on entering a realm
    fn users_joined(
        &mut self,
        _client: &mut dyn RelayClient,
        _users: &[UserNumber],
        _joined_before_you: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn user_left(&mut self, _client: &mut dyn RelayClient, _user: UserNumber) -> Result<()> {
        Ok(())
    }

    fn child_realm_created(
        &mut self,
        _client: &mut dyn RelayClient,
        _realm: RealmNumber,
    ) -> Result<()> {
        Ok(())
    }

    fn child_realm_destroyed(
        &mut self,
        _client: &mut dyn RelayClient,
        _realm: RealmNumber,
    ) -> Result<()> {
        Ok(())
    }

    fn handle_message(
        &mut self,
        _client: &mut dyn RelayClient,
        _sender: UserNumber,
        _target: MessageTarget,
        _message: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn handle_data(
        &mut self,
        _client: &mut dyn RelayClient,
        _realm: Option<RealmNumber>,
        _name: &str,
        _value: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// A handler that works in decoded commands rather than raw message bodies
pub trait CommandHandler: ChannelHandler {
    fn handle_command(
        &mut self,
        client: &mut dyn RelayClient,
        sender: UserNumber,
        target: MessageTarget,
        command: &str,
        parameters: &[String],
    ) -> Result<()>;
}

/// Adapts a [`CommandHandler`] into a [`ChannelHandler`]
///
/// Message bodies are split with [`codec::decode`]; the first token is the
/// command. All other callbacks pass straight through.
#[derive(Debug, Default)]
pub struct Commands<H>(pub H);

impl<H> Commands<H> {
    pub fn into_inner(self) -> H {
        self.0
    }
}

impl<H: CommandHandler> ChannelHandler for Commands<H> {
    fn channel_status(
        &mut self,
        client: &mut dyn RelayClient,
        status: ChannelStatus,
    ) -> Result<()> {
        self.0.channel_status(client, status)
    }

    fn assign_user_number(&mut self, client: &mut dyn RelayClient, user: UserNumber) -> Result<()> {
        self.0.assign_user_number(client, user)
    }

    fn assign_realm_number(
        &mut self,
        client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        self.0.assign_realm_number(client, realm)
    }

    fn users_joined(
        &mut self,
        client: &mut dyn RelayClient,
        users: &[UserNumber],
        joined_before_you: bool,
    ) -> Result<()> {
        self.0.users_joined(client, users, joined_before_you)
    }

    fn user_left(&mut self, client: &mut dyn RelayClient, user: UserNumber) -> Result<()> {
        self.0.user_left(client, user)
    }

    fn child_realm_created(
        &mut self,
        client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        self.0.child_realm_created(client, realm)
    }

    fn child_realm_destroyed(
        &mut self,
        client: &mut dyn RelayClient,
        realm: RealmNumber,
    ) -> Result<()> {
        self.0.child_realm_destroyed(client, realm)
    }

    fn handle_message(
        &mut self,
        client: &mut dyn RelayClient,
        sender: UserNumber,
        target: MessageTarget,
        message: &str,
    ) -> Result<()> {
        let mut parts = codec::decode(message);
        if parts.is_empty() {
            return Ok(());
        }
        let command = parts.remove(0);
        self.0.handle_command(client, sender, target, &command, &parts)
    }

    fn handle_data(
        &mut self,
        client: &mut dyn RelayClient,
        realm: Option<RealmNumber>,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.0.handle_data(client, realm, name, value)
    }
}
