//! Protocol and simulation primitives shared by the catch server and its clients.
//!
//! Everything that must behave identically on both ends of a connection lives
//! here: the message model and its wire codec, the stream transport, the map
//! descriptor, the movement recorder and the replay simulation that decides the
//! winner of a round.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod codec;
pub mod handshake;
pub mod map;
pub mod message;
pub mod payload;
pub mod recorder;
pub mod replay;
pub mod transport;

pub use codec::{decode, encode, Decoded, FrameError};
pub use handshake::{HandshakeState, RejectReason};
pub use map::{MapDescriptor, MapError, WallRect};
pub use message::{Action, AuthAction, GameAction, Message, MessageType, ProtocolError};
pub use recorder::MovementRecorder;
pub use replay::{Outcome, ReplayPlayer, ReplaySimulation};
pub use transport::{MessageReader, MessageWriter, TransportError};

pub const PLAYER_RADIUS: f32 = 20.0;
pub const SERVER_TICK_RATE: u32 = 20;
pub const COUNTDOWN_TIME_MS: f32 = 3000.0;
pub const ACTION_TIME_MS: f32 = 10000.0;
pub const DEFAULT_PORT: u16 = 19560;

/// Milliseconds between two recorder samples for the given server tick rate.
pub fn tick_interval_ms(tick_rate: u32) -> f32 {
    1000.0 / tick_rate.max(1) as f32
}

/// Milliseconds since the unix epoch, used as the send timestamp of every message.
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(self, other: Vec2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Linear interpolation towards `other`, `t` in `[0, 1]`.
    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for [f32; 2] {
    fn from(v: Vec2) -> Self {
        [v.x, v.y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Catcher,
    Runner,
}

impl Role {
    pub fn is_opposite(self, other: Role) -> bool {
        self != other
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Catcher => write!(f, "catcher"),
            Role::Runner => write!(f, "runner"),
        }
    }
}

/// Two player circles of `radius` touch or overlap.
pub fn check_collision(a: Vec2, b: Vec2, radius: f32) -> bool {
    let reach = 2.0 * radius;
    a.distance_squared(b) <= reach * reach
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_tick_interval() {
        assert_approx_eq!(tick_interval_ms(20), 50.0, 1e-6);
        assert_approx_eq!(tick_interval_ms(60), 16.666_666, 1e-3);
        // zero tick rate is clamped instead of dividing by zero
        assert_approx_eq!(tick_interval_ms(0), 1000.0, 1e-6);
    }

    #[test]
    fn test_vec2_lerp() {
        let a = Vec2::new(0.0, 10.0);
        let b = Vec2::new(100.0, -10.0);
        let mid = a.lerp(b, 0.5);
        assert_approx_eq!(mid.x, 50.0, 1e-6);
        assert_approx_eq!(mid.y, 0.0, 1e-6);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn test_vec2_serializes_as_pair() {
        let json = serde_json::to_string(&Vec2::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");
        let parsed: Vec2 = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(parsed, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_collision_detection_no_collision() {
        assert!(!check_collision(
            Vec2::new(0.0, 0.0),
            Vec2::new(100.0, 100.0),
            PLAYER_RADIUS
        ));
    }

    #[test]
    fn test_collision_detection_exact_touch() {
        // centres exactly two radii apart count as a catch
        assert!(check_collision(
            Vec2::new(100.0, 100.0),
            Vec2::new(140.0, 100.0),
            PLAYER_RADIUS
        ));
        assert!(!check_collision(
            Vec2::new(100.0, 100.0),
            Vec2::new(140.5, 100.0),
            PLAYER_RADIUS
        ));
    }

    #[test]
    fn test_collision_is_symmetric() {
        let a = Vec2::new(10.0, 20.0);
        let b = Vec2::new(35.0, 40.0);
        assert_eq!(
            check_collision(a, b, PLAYER_RADIUS),
            check_collision(b, a, PLAYER_RADIUS)
        );
    }

    #[test]
    fn test_role_opposite() {
        assert!(Role::Catcher.is_opposite(Role::Runner));
        assert!(!Role::Runner.is_opposite(Role::Runner));
        assert_eq!(Role::Catcher.to_string(), "catcher");
    }
}
