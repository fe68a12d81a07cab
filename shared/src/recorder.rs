//! Fixed-rate sampling of the locally controlled player during the action phase.

use crate::Vec2;

/// Records one position per elapsed tick boundary.
///
/// At most one sample is taken per `update`: if a long frame crosses several
/// boundaries the trajectory simply falls behind and catches up on later
/// updates.
#[derive(Debug, Clone)]
pub struct MovementRecorder {
    tick_interval_ms: f32,
    max_samples: usize,
    elapsed_ms: f32,
    samples: Vec<Vec2>,
}

impl MovementRecorder {
    pub fn new(tick_interval_ms: f32, action_duration_ms: f32) -> Self {
        let max_samples = (action_duration_ms / tick_interval_ms).floor().max(0.0) as usize;
        Self {
            tick_interval_ms,
            max_samples,
            elapsed_ms: 0.0,
            samples: Vec::with_capacity(max_samples),
        }
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = 0.0;
        self.samples.clear();
    }

    /// Advances the action clock by `dt_ms` and samples `position` if a new tick
    /// boundary has been reached.
    pub fn update(&mut self, dt_ms: f32, position: Vec2) -> bool {
        self.elapsed_ms += dt_ms;
        if self.samples.len() >= self.max_samples {
            return false;
        }
        let next_boundary = self.tick_interval_ms * self.samples.len() as f32;
        if self.elapsed_ms >= next_boundary {
            self.samples.push(position);
            true
        } else {
            false
        }
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed_ms
    }

    pub fn recorded(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[Vec2] {
        &self.samples
    }

    pub fn take(&mut self) -> Vec<Vec2> {
        std::mem::take(&mut self.samples)
    }
}
