//! Typed message model for the `auth` and `game` channels.
//!
//! On the wire both the type and the action travel as snake_case strings; they
//! are parsed into exhaustive enums here so every dispatch site is a single
//! `match` and an unknown action is a protocol violation instead of a no-op.

use crate::get_timestamp;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Per-message protocol violation. The offending message is rejected, the
/// connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("undecodable message body: {0}")]
    Malformed(String),
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("unknown {kind} action `{action}`")]
    UnknownAction { kind: MessageType, action: String },
    #[error("action `{0}` requires parameters")]
    MissingParameters(Action),
    #[error("invalid parameters for `{action}`: {reason}")]
    InvalidParameters { action: Action, reason: String },
    #[error("action `{action}` not expected {context}")]
    Unexpected { action: Action, context: String },
}

impl ProtocolError {
    pub fn unexpected(action: Action, context: impl Into<String>) -> Self {
        Self::Unexpected {
            action,
            context: context.into(),
        }
    }

    pub fn invalid(action: Action, reason: impl fmt::Display) -> Self {
        Self::InvalidParameters {
            action,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Auth,
    Game,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Auth => "auth",
            MessageType::Game => "game",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(MessageType::Auth),
            "game" => Ok(MessageType::Game),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Generates an action enum with its wire names and the inverse parser.
macro_rules! wire_actions {
    ($name:ident, $kind:expr, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            fn parse(s: &str) -> Result<Self, ProtocolError> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ProtocolError::UnknownAction {
                        kind: $kind,
                        action: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_actions!(AuthAction, MessageType::Auth, {
    Connect => "connect",
    RequestPassword => "request_password",
    ResponsePassword => "response_password",
    SuccessPassword => "success_password",
    WrongPassword => "wrong_password",
    RequestName => "request_name",
    ResponseName => "response_name",
    NameTaken => "name_taken",
    SuccessName => "success_name",
    Uuid => "uuid",
    Success => "success",
    FieldFull => "field_full",
});

wire_actions!(GameAction, MessageType::Game, {
    NewPlayer => "new_player",
    PlayerDisconnected => "player_disconnected",
    Map => "map",
    Ready => "ready",
    SwitchReadyStatus => "switch_ready_status",
    GamePos => "game_pos",
    StartCountdown => "start_countdown",
    Movement => "movement",
    OtherMovement => "other_movement",
    StartSimulation => "start_simulation",
    Result => "result",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Auth(AuthAction),
    Game(GameAction),
}

impl Action {
    pub fn message_type(self) -> MessageType {
        match self {
            Action::Auth(_) => MessageType::Auth,
            Action::Game(_) => MessageType::Game,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Auth(a) => a.as_str(),
            Action::Game(a) => a.as_str(),
        }
    }

    /// Resolves a wire `(type, action)` pair.
    pub fn parse(kind: &str, action: &str) -> Result<Self, ProtocolError> {
        match kind.parse::<MessageType>()? {
            MessageType::Auth => AuthAction::parse(action).map(Action::Auth),
            MessageType::Game => GameAction::parse(action).map(Action::Game),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_type(), self.as_str())
    }
}

impl From<AuthAction> for Action {
    fn from(a: AuthAction) -> Self {
        Action::Auth(a)
    }
}

impl From<GameAction> for Action {
    fn from(a: GameAction) -> Self {
        Action::Game(a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Sender's clock at send time, milliseconds since the unix epoch.
    pub timestamp: u64,
    pub action: Action,
    pub parameters: Option<String>,
}

impl Message {
    pub fn new(action: impl Into<Action>, parameters: Option<String>) -> Self {
        Self {
            timestamp: get_timestamp(),
            action: action.into(),
            parameters,
        }
    }

    pub fn auth(action: AuthAction) -> Self {
        Self::new(action, None)
    }

    pub fn game(action: GameAction) -> Self {
        Self::new(action, None)
    }

    pub fn with_params(action: impl Into<Action>, parameters: impl Into<String>) -> Self {
        Self::new(action, Some(parameters.into()))
    }

    pub fn message_type(&self) -> MessageType {
        self.action.message_type()
    }

    /// Parameters of the message, or `MissingParameters` if the sender left them out.
    pub fn require_params(&self) -> Result<&str, ProtocolError> {
        self.parameters
            .as_deref()
            .ok_or(ProtocolError::MissingParameters(self.action))
    }

    /// Milliseconds between the embedded send timestamp and now.
    pub fn latency_ms(&self) -> i64 {
        get_timestamp() as i64 - self.timestamp as i64
    }
}
