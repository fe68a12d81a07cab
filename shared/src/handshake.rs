//! Handshake vocabulary common to the server driver and the client responder.

use crate::message::AuthAction;
use thiserror::Error;

/// Progress of one connection through authentication.
///
/// The server drives `Idle -> AwaitPassword -> AwaitName -> Verified`; the
/// client additionally waits in `AwaitUuid` between `success_name` and `success`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitPassword,
    AwaitName,
    AwaitUuid,
    Verified,
    Rejected(RejectReason),
}

impl HandshakeState {
    pub fn is_verified(&self) -> bool {
        matches!(self, HandshakeState::Verified)
    }
}

/// Terminal rejection of a handshake attempt. The connection may retry with a
/// fresh `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("the field is full")]
    FieldFull,
    #[error("wrong password")]
    WrongPassword,
    #[error("name is already taken")]
    NameTaken,
}

impl RejectReason {
    /// The auth action announcing this rejection.
    pub fn action(self) -> AuthAction {
        match self {
            RejectReason::FieldFull => AuthAction::FieldFull,
            RejectReason::WrongPassword => AuthAction::WrongPassword,
            RejectReason::NameTaken => AuthAction::NameTaken,
        }
    }

    pub fn from_action(action: AuthAction) -> Option<Self> {
        match action {
            AuthAction::FieldFull => Some(RejectReason::FieldFull),
            AuthAction::WrongPassword => Some(RejectReason::WrongPassword),
            AuthAction::NameTaken => Some(RejectReason::NameTaken),
            _ => None,
        }
    }
}
