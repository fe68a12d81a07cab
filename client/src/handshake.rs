//! Client side of the authentication handshake
//!
//! The server drives the exchange; the client only answers prompts and tracks
//! how far it got so it can show a status line and retry after a rejection.

use log::{info, warn};
use shared::{Action, AuthAction, HandshakeState, Message, ProtocolError, RejectReason};

pub struct ClientHandshake {
    password: String,
    name: String,
    state: HandshakeState,
    uuid: Option<String>,
    status: String,
}

impl ClientHandshake {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            name: name.into(),
            state: HandshakeState::Idle,
            uuid: None,
            status: String::from("Not connected"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Uuid assigned by the server, once received
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Human readable progress, suitable for an on-screen status line
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Opens a new attempt. Also used to retry after a rejection.
    pub fn start(&mut self) -> Message {
        self.state = HandshakeState::AwaitPassword;
        self.uuid = None;
        self.status = String::from("Connecting...");
        Message::auth(AuthAction::Connect)
    }

    /// Handles one `auth` message from the server and returns the reply, if any.
    pub fn handle(&mut self, message: &Message) -> Result<Option<Message>, ProtocolError> {
        let action = match message.action {
            Action::Auth(action) => action,
            Action::Game(_) => {
                return Err(ProtocolError::unexpected(
                    message.action,
                    "before the handshake completed",
                ))
            }
        };

        if let Some(reason) = RejectReason::from_action(action) {
            if self.state.is_verified() {
                return Err(ProtocolError::unexpected(
                    message.action,
                    "after the handshake completed",
                ));
            }
            warn!("Handshake rejected: {}", reason);
            self.state = HandshakeState::Rejected(reason);
            self.uuid = None;
            self.status = format!("Rejected: {}", reason);
            return Ok(None);
        }

        match (&self.state, action) {
            (HandshakeState::AwaitPassword, AuthAction::RequestPassword) => {
                self.status = String::from("Sending password...");
                Ok(Some(Message::with_params(
                    AuthAction::ResponsePassword,
                    self.password.clone(),
                )))
            }
            (HandshakeState::AwaitPassword, AuthAction::SuccessPassword) => {
                self.state = HandshakeState::AwaitName;
                self.status = String::from("Password accepted");
                Ok(None)
            }
            (HandshakeState::AwaitName, AuthAction::RequestName) => {
                self.status = format!("Requesting name {}...", self.name);
                Ok(Some(Message::with_params(
                    AuthAction::ResponseName,
                    self.name.clone(),
                )))
            }
            (HandshakeState::AwaitName, AuthAction::SuccessName) => {
                self.state = HandshakeState::AwaitUuid;
                self.status = String::from("Name accepted");
                Ok(None)
            }
            (HandshakeState::AwaitUuid, AuthAction::Uuid) => {
                self.uuid = Some(message.require_params()?.to_string());
                Ok(None)
            }
            (HandshakeState::AwaitUuid, AuthAction::Success) => {
                if self.uuid.is_none() {
                    return Err(ProtocolError::unexpected(message.action, "before a uuid"));
                }
                self.state = HandshakeState::Verified;
                self.status = format!("Connected as {}", self.name);
                info!("Handshake complete, uuid {}", self.uuid.as_deref().unwrap_or(""));
                Ok(None)
            }
            (state, _) => Err(ProtocolError::unexpected(
                message.action,
                format!("in handshake state {:?}", state),
            )),
        }
    }

    /// Forgets the current attempt after the connection dropped
    pub fn reset(&mut self, status: impl Into<String>) {
        self.state = HandshakeState::Idle;
        self.uuid = None;
        self.status = status.into();
    }
}
