//! Locally controlled body
//!
//! The recorder only ever reads a position from the body. A windowed client
//! would back this with its physics engine; the headless client wanders.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Vec2;

pub trait LocalBody {
    fn position(&self) -> Vec2;

    /// Moves the body by one frame unless movement is blocked.
    fn step(&mut self, dt_ms: f32, blocked: bool);

    /// Places the body at a start position.
    fn reset(&mut self, start: Vec2);
}

/// Walks towards random targets inside the map bounds
pub struct WanderingBody {
    position: Vec2,
    target: Vec2,
    bounds: Vec2,
    /// Pixels per millisecond
    speed: f32,
    rng: StdRng,
}

impl WanderingBody {
    pub const DEFAULT_SPEED: f32 = 0.2;

    pub fn new(start: Vec2, bounds: Vec2, seed: u64) -> Self {
        let mut body = Self {
            position: start,
            target: start,
            bounds,
            speed: Self::DEFAULT_SPEED,
            rng: StdRng::seed_from_u64(seed),
        };
        body.target = body.pick_target();
        body
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    fn pick_target(&mut self) -> Vec2 {
        Vec2::new(
            self.rng.gen_range(0.0..self.bounds.x.max(1.0)),
            self.rng.gen_range(0.0..self.bounds.y.max(1.0)),
        )
    }
}

impl LocalBody for WanderingBody {
    fn position(&self) -> Vec2 {
        self.position
    }

    fn step(&mut self, dt_ms: f32, blocked: bool) {
        if blocked {
            return;
        }
        let reach = self.speed * dt_ms;
        let distance = self.position.distance_squared(self.target).sqrt();
        if distance <= reach {
            self.position = self.target;
            self.target = self.pick_target();
        } else {
            self.position = self.position.lerp(self.target, reach / distance);
        }
    }

    fn reset(&mut self, start: Vec2) {
        self.position = start;
        self.target = self.pick_target();
    }
}
