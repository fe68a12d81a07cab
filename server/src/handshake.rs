//! Server side of the authentication handshake
//!
//! One [`ServerHandshake`] runs per connection until the player is seated. The
//! caller holds the registry write guard across [`ServerHandshake::handle`], so
//! the capacity and name checks and the seating that follows are atomic with
//! respect to other connections racing for the same seat or name.

use crate::registry::{ConnId, Outbox, RegistryError, SessionRegistry};
use log::{error, info, warn};
use shared::{Action, AuthAction, HandshakeState, Message, ProtocolError, RejectReason};

/// What a handled message did to the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Waiting for the next client reply
    Continue,
    /// Seated under the given uuid
    Verified(String),
    /// Attempt rejected; the client may start over with `connect`
    Rejected(RejectReason),
}

pub struct ServerHandshake {
    conn: ConnId,
    password: String,
    state: HandshakeState,
}

impl ServerHandshake {
    pub fn new(conn: ConnId, password: impl Into<String>) -> Self {
        Self {
            conn,
            password: password.into(),
            state: HandshakeState::Idle,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn handle(
        &mut self,
        message: &Message,
        registry: &mut SessionRegistry,
        outbox: &Outbox,
    ) -> Result<HandshakeStep, ProtocolError> {
        let action = match message.action {
            Action::Auth(action) => action,
            Action::Game(_) => {
                return Err(ProtocolError::unexpected(
                    message.action,
                    "before the handshake completed",
                ))
            }
        };

        match (&self.state, action) {
            (HandshakeState::Idle, AuthAction::Connect) => {
                if !registry.is_accepting() {
                    return Ok(self.reject(RejectReason::FieldFull, outbox));
                }
                send(outbox, Message::auth(AuthAction::RequestPassword));
                self.state = HandshakeState::AwaitPassword;
                Ok(HandshakeStep::Continue)
            }
            (HandshakeState::AwaitPassword, AuthAction::ResponsePassword) => {
                // an empty password may arrive without parameters
                let password = message.parameters.as_deref().unwrap_or("");
                if password != self.password {
                    return Ok(self.reject(RejectReason::WrongPassword, outbox));
                }
                send(outbox, Message::auth(AuthAction::SuccessPassword));
                send(outbox, Message::auth(AuthAction::RequestName));
                self.state = HandshakeState::AwaitName;
                Ok(HandshakeStep::Continue)
            }
            (HandshakeState::AwaitName, AuthAction::ResponseName) => {
                let name = message.require_params()?.trim();
                if name.is_empty() {
                    return Err(ProtocolError::invalid(message.action, "name is empty"));
                }
                self.seat(name, registry, outbox)
            }
            (HandshakeState::Verified, _) => Err(ProtocolError::unexpected(
                message.action,
                "after the handshake completed",
            )),
            (state, _) => Err(ProtocolError::unexpected(
                message.action,
                format!("in handshake state {:?}", state),
            )),
        }
    }

    fn seat(
        &mut self,
        name: &str,
        registry: &mut SessionRegistry,
        outbox: &Outbox,
    ) -> Result<HandshakeStep, ProtocolError> {
        let assignment = match registry.seat(self.conn, name, outbox.clone()) {
            Ok(assignment) => assignment,
            Err(RegistryError::NameTaken(_)) => {
                return Ok(self.reject(RejectReason::NameTaken, outbox))
            }
            Err(RegistryError::CapacityExceeded | RegistryError::RoundInProgress) => {
                return Ok(self.reject(RejectReason::FieldFull, outbox))
            }
            Err(e @ RegistryError::UnknownPlayer(_)) => {
                error!("Seating connection {} failed: {}", self.conn, e);
                return Ok(self.reject(RejectReason::FieldFull, outbox));
            }
        };

        send(outbox, Message::auth(AuthAction::SuccessName));
        send(
            outbox,
            Message::with_params(AuthAction::Uuid, assignment.uuid.clone()),
        );
        send(outbox, Message::auth(AuthAction::Success));
        registry.welcome(&assignment)?;

        self.state = HandshakeState::Verified;
        info!("Connection {} verified as {}", self.conn, name);
        Ok(HandshakeStep::Verified(assignment.uuid))
    }

    fn reject(&mut self, reason: RejectReason, outbox: &Outbox) -> HandshakeStep {
        warn!("Connection {} rejected: {}", self.conn, reason);
        send(outbox, Message::auth(reason.action()));
        self.state = HandshakeState::Idle;
        HandshakeStep::Rejected(reason)
    }
}

fn send(outbox: &Outbox, message: Message) {
    if outbox.send(message).is_err() {
        error!("Outbound queue closed during handshake");
    }
}
