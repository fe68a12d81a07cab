//! Parsed map descriptor.
//!
//! The map decides how many players a session seats and which role each seat
//! plays: seats `0..catcher_starts.len()` are catchers, the rest runners.

use crate::{Role, Vec2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse map: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid map: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct WallRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl From<[f32; 4]> for WallRect {
    fn from([left, top, width, height]: [f32; 4]) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

impl From<WallRect> for [f32; 4] {
    fn from(w: WallRect) -> Self {
        [w.left, w.top, w.width, w.height]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDescriptor {
    pub name: String,
    #[serde(rename = "rounds")]
    pub round_count: u32,
    /// Length of the action phase in milliseconds.
    #[serde(rename = "time")]
    pub time_limit_ms: u32,
    pub size: Vec2,
    #[serde(rename = "catcher_start_pos")]
    pub catcher_starts: Vec<Vec2>,
    #[serde(rename = "runner_start_pos")]
    pub runner_starts: Vec<Vec2>,
    #[serde(default, rename = "walls")]
    pub wall_rects: Vec<WallRect>,
}

impl MapDescriptor {
    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let map: MapDescriptor = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn validate(&self) -> Result<(), MapError> {
        if self.capacity() == 0 {
            return Err(MapError::Invalid("map defines no start positions"));
        }
        if self.time_limit_ms == 0 {
            return Err(MapError::Invalid("time limit must be positive"));
        }
        if self.round_count == 0 {
            return Err(MapError::Invalid("round count must be positive"));
        }
        Ok(())
    }

    /// Number of seats, one per start position.
    pub fn capacity(&self) -> usize {
        self.catcher_starts.len() + self.runner_starts.len()
    }

    pub fn role_for_seat(&self, seat: usize) -> Option<Role> {
        if seat < self.catcher_starts.len() {
            Some(Role::Catcher)
        } else if seat < self.capacity() {
            Some(Role::Runner)
        } else {
            None
        }
    }

    pub fn start_position(&self, seat: usize) -> Option<Vec2> {
        let catchers = self.catcher_starts.len();
        if seat < catchers {
            self.catcher_starts.get(seat).copied()
        } else {
            self.runner_starts.get(seat - catchers).copied()
        }
    }

    pub fn time_limit(&self) -> f32 {
        self.time_limit_ms as f32
    }
}

#[cfg(test)]
pub(crate) fn test_map(catchers: usize, runners: usize) -> MapDescriptor {
    MapDescriptor {
        name: "test".to_string(),
        round_count: 3,
        time_limit_ms: 10_000,
        size: Vec2::new(1000.0, 800.0),
        catcher_starts: (0..catchers)
            .map(|i| Vec2::new(100.0, 100.0 + 50.0 * i as f32))
            .collect(),
        runner_starts: (0..runners)
            .map(|i| Vec2::new(900.0, 100.0 + 50.0 * i as f32))
            .collect(),
        wall_rects: vec![],
    }
}
