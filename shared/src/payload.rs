//! Structured parameters carried inside `game` messages as JSON text.

use crate::message::{Action, GameAction, Message, ProtocolError};
use crate::{Role, Vec2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A seated player as announced to the other players (`new_player`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub uuid: String,
    pub name: String,
    pub seat: usize,
    pub role: Role,
    pub ready: bool,
}

/// The receiving player's own seat (`game_pos`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatAssignment {
    pub uuid: String,
    pub seat: usize,
    pub role: Role,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyStatus {
    pub uuid: String,
    pub ready: bool,
}

/// Another player's trajectory (`other_movement`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherMovement {
    pub uuid: String,
    pub trajectory: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub winner: Role,
    pub collision: bool,
    pub time_ms: f32,
    pub round: u32,
}

/// Builds a game message whose parameters are `payload` as JSON.
pub fn game_message<T: Serialize>(action: GameAction, payload: &T) -> Result<Message, ProtocolError> {
    let json = serde_json::to_string(payload).map_err(|e| ProtocolError::invalid(action.into(), e))?;
    Ok(Message::with_params(action, json))
}

/// Parses the JSON parameters of `message`.
pub fn parse<T: DeserializeOwned>(message: &Message) -> Result<T, ProtocolError> {
    let params = message.require_params()?;
    serde_json::from_str(params).map_err(|e| ProtocolError::invalid(message.action, e))
}

/// Ready flags travel as `"1"`/`"0"`; `true`/`false` are accepted as well.
pub fn parse_ready_flag(message: &Message) -> Result<bool, ProtocolError> {
    match message.require_params()?.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(ProtocolError::invalid(
            message.action,
            format!("expected 1 or 0, got `{}`", other),
        )),
    }
}

pub fn ready_message(ready: bool) -> Message {
    Message::with_params(GameAction::Ready, if ready { "1" } else { "0" })
}

/// Non-empty trajectory payload of a `movement` message.
pub fn parse_trajectory(message: &Message) -> Result<Vec<Vec2>, ProtocolError> {
    let trajectory: Vec<Vec2> = parse(message)?;
    if trajectory.is_empty() {
        return Err(ProtocolError::invalid(
            Action::Game(GameAction::Movement),
            "trajectory is empty",
        ));
    }
    Ok(trajectory)
}
