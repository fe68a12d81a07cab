//! Deterministic replay of recorded trajectories.
//!
//! After the action phase every seated player's trajectory is replayed on a
//! virtual clock. Positions between samples are linearly interpolated, and a
//! catcher touching a runner ends the round in the catcher's favour. If the
//! clock reaches the action duration first, the runners win.
//!
//! A collision evaluated on the same update that exhausts the clock still
//! counts: the collision check always takes precedence over the timeout.

use crate::map::MapDescriptor;
use crate::{check_collision, tick_interval_ms, Role, Vec2, PLAYER_RADIUS};

/// Smallest sample interval the replay accepts.
const MIN_TICK_INTERVAL_MS: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayPlayer {
    pub name: String,
    pub role: Role,
    pub trajectory: Vec<Vec2>,
}

impl ReplayPlayer {
    pub fn new(name: impl Into<String>, role: Role, trajectory: Vec<Vec2>) -> Self {
        Self {
            name: name.into(),
            role,
            trajectory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub winner: Role,
    pub collision: bool,
    /// Virtual time at which the round was decided.
    pub time_ms: f32,
}

#[derive(Debug, Clone)]
pub struct ReplaySimulation {
    players: Vec<ReplayPlayer>,
    tick_interval_ms: f32,
    duration_ms: f32,
    player_radius: f32,
    time_ms: f32,
    positions: Vec<Vec2>,
    paused: bool,
    outcome: Option<Outcome>,
}

impl ReplaySimulation {
    pub fn new(players: Vec<ReplayPlayer>, map: &MapDescriptor, tick_rate: u32) -> Self {
        Self::with_duration(players, tick_interval_ms(tick_rate), map.time_limit())
    }

    pub fn with_duration(players: Vec<ReplayPlayer>, tick_interval_ms: f32, duration_ms: f32) -> Self {
        let mut sim = Self {
            positions: Vec::with_capacity(players.len()),
            players,
            tick_interval_ms: tick_interval_ms.max(MIN_TICK_INTERVAL_MS),
            duration_ms: duration_ms.max(0.0),
            player_radius: PLAYER_RADIUS,
            time_ms: 0.0,
            paused: true,
            outcome: None,
        };
        sim.positions = sim.positions_at(0.0);
        sim
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.player_radius = radius;
        self
    }

    pub fn start(&mut self) {
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.paused = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn players(&self) -> &[ReplayPlayer] {
        &self.players
    }

    pub fn time_ms(&self) -> f32 {
        self.time_ms
    }

    pub fn duration_ms(&self) -> f32 {
        self.duration_ms
    }

    /// Interpolated positions at the current virtual time, in player order.
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn collision_detected(&self) -> bool {
        self.outcome.map(|o| o.collision).unwrap_or(false)
    }

    fn shortest_trajectory(&self) -> usize {
        self.players
            .iter()
            .map(|p| p.trajectory.len())
            .min()
            .unwrap_or(0)
    }

    /// Positions of every player at virtual time `t_ms`.
    ///
    /// Past the end of the shortest trajectory every player holds at the last
    /// sample index all trajectories share.
    pub fn positions_at(&self, t_ms: f32) -> Vec<Vec2> {
        let len = self.shortest_trajectory();
        if len == 0 {
            return vec![Vec2::ZERO; self.players.len()];
        }

        let t = t_ms.max(0.0);
        let tick = (t / self.tick_interval_ms).floor() as usize;
        if tick.saturating_add(1) >= len {
            return self
                .players
                .iter()
                .map(|p| p.trajectory[len - 1])
                .collect();
        }

        let progress = (t % self.tick_interval_ms) / self.tick_interval_ms;
        self.players
            .iter()
            .map(|p| p.trajectory[tick].lerp(p.trajectory[tick + 1], progress))
            .collect()
    }

    /// Whether any catcher/runner pair touches at `positions`.
    pub fn catch_between(&self, positions: &[Vec2]) -> bool {
        for i in 0..self.players.len() {
            for j in (i + 1)..self.players.len() {
                if !self.players[i].role.is_opposite(self.players[j].role) {
                    continue;
                }
                if check_collision(positions[i], positions[j], self.player_radius) {
                    return true;
                }
            }
        }
        false
    }

    /// Moves the virtual clock to `t_ms` without judging the round.
    pub fn seek(&mut self, t_ms: f32) {
        self.time_ms = t_ms.clamp(0.0, self.duration_ms);
        self.positions = self.positions_at(self.time_ms);
    }

    /// Advances the virtual clock by `dt_ms` and judges the round.
    ///
    /// Returns the outcome once decided; a decided or paused simulation does
    /// not move.
    pub fn advance(&mut self, dt_ms: f32) -> Option<Outcome> {
        if self.paused || self.outcome.is_some() {
            return self.outcome;
        }

        self.time_ms = (self.time_ms + dt_ms).min(self.duration_ms);
        self.positions = self.positions_at(self.time_ms);

        if self.catch_between(&self.positions) {
            self.outcome = Some(Outcome {
                winner: Role::Catcher,
                collision: true,
                time_ms: self.time_ms,
            });
        } else if self.time_ms >= self.duration_ms {
            self.outcome = Some(Outcome {
                winner: Role::Runner,
                collision: false,
                time_ms: self.time_ms,
            });
        }

        if self.outcome.is_some() {
            self.paused = true;
        }
        self.outcome
    }

    /// Replays the whole round in fixed `step_ms` increments.
    pub fn run_to_end(&mut self, step_ms: f32) -> Outcome {
        let step = if step_ms > 0.0 { step_ms } else { self.tick_interval_ms };
        self.start();
        loop {
            let before = self.time_ms;
            if let Some(outcome) = self.advance(step) {
                return outcome;
            }
            if self.time_ms <= before {
                // step is lost in f32 precision at this clock value
                self.time_ms = self.duration_ms;
                if let Some(outcome) = self.advance(0.0) {
                    return outcome;
                }
            }
        }
    }
}
