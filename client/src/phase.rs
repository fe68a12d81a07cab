//! Per-round game phase state machine
//!
//! `Preparing -> Countdown -> Action -> AfterAction -> Simulation -> Results`,
//! strictly in that order. [`GamePhaseMachine::restart`] is the only way back
//! to `Preparing`.

use log::{debug, info};
use shared::{
    tick_interval_ms, MapDescriptor, MovementRecorder, Outcome, ReplayPlayer, ReplaySimulation,
    Vec2,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Preparing,
    Countdown,
    Action,
    AfterAction,
    Simulation,
    Results,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Preparing => "preparing",
            SessionPhase::Countdown => "countdown",
            SessionPhase::Action => "action",
            SessionPhase::AfterAction => "after action",
            SessionPhase::Simulation => "simulation",
            SessionPhase::Results => "results",
        };
        f.write_str(name)
    }
}

/// Side effects the driver has to carry out after an update
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    ActionStarted,
    /// The action phase ended; send this trajectory to the server
    SubmitTrajectory(Vec<Vec2>),
    SimulationStarted,
    Finished(Outcome),
}

pub struct GamePhaseMachine {
    phase: SessionPhase,
    countdown_ms: f32,
    countdown_remaining_ms: f32,
    action_duration_ms: f32,
    tick_interval_ms: f32,
    recorder: MovementRecorder,
    trajectory: Vec<Vec2>,
    simulation: Option<ReplaySimulation>,
    outcome: Option<Outcome>,
}

impl GamePhaseMachine {
    pub fn new(countdown_ms: f32, action_duration_ms: f32, tick_interval_ms: f32) -> Self {
        Self {
            phase: SessionPhase::Preparing,
            countdown_ms,
            countdown_remaining_ms: countdown_ms,
            action_duration_ms,
            tick_interval_ms,
            recorder: MovementRecorder::new(tick_interval_ms, action_duration_ms),
            trajectory: Vec::new(),
            simulation: None,
            outcome: None,
        }
    }

    pub fn for_map(map: &MapDescriptor, tick_rate: u32, countdown_ms: f32) -> Self {
        Self::new(countdown_ms, map.time_limit(), tick_interval_ms(tick_rate))
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Movement is only allowed during the action phase.
    pub fn movement_blocked(&self) -> bool {
        self.phase != SessionPhase::Action
    }

    pub fn countdown_remaining_ms(&self) -> f32 {
        self.countdown_remaining_ms.max(0.0)
    }

    pub fn recorder(&self) -> &MovementRecorder {
        &self.recorder
    }

    /// The local trajectory submitted at the end of the action phase
    pub fn trajectory(&self) -> &[Vec2] {
        &self.trajectory
    }

    pub fn simulation(&self) -> Option<&ReplaySimulation> {
        self.simulation.as_ref()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Leaves `Preparing` for `Countdown`. Returns `false` in any other phase.
    pub fn start_countdown(&mut self) -> bool {
        if self.phase != SessionPhase::Preparing {
            return false;
        }
        self.countdown_remaining_ms = self.countdown_ms;
        self.enter(SessionPhase::Countdown);
        true
    }

    /// Hands every seated player's trajectory to the replay. Only valid in
    /// `AfterAction`.
    pub fn begin_simulation(&mut self, players: Vec<ReplayPlayer>) -> Option<PhaseEvent> {
        if self.phase != SessionPhase::AfterAction {
            return None;
        }
        let mut simulation =
            ReplaySimulation::with_duration(players, self.tick_interval_ms, self.action_duration_ms);
        simulation.start();
        self.simulation = Some(simulation);
        self.enter(SessionPhase::Simulation);
        Some(PhaseEvent::SimulationStarted)
    }

    /// Starts a new round from `Results`.
    pub fn restart(&mut self) -> bool {
        if self.phase != SessionPhase::Results {
            return false;
        }
        self.recorder.reset();
        self.trajectory.clear();
        self.simulation = None;
        self.outcome = None;
        self.countdown_remaining_ms = self.countdown_ms;
        self.enter(SessionPhase::Preparing);
        true
    }

    /// Advances the current phase by `dt_ms`; `position` is the local body's
    /// position this frame.
    pub fn update(&mut self, dt_ms: f32, position: Vec2) -> Option<PhaseEvent> {
        match self.phase {
            SessionPhase::Preparing | SessionPhase::AfterAction | SessionPhase::Results => None,
            SessionPhase::Countdown => {
                self.countdown_remaining_ms -= dt_ms;
                if self.countdown_remaining_ms > 0.0 {
                    return None;
                }
                self.recorder.reset();
                self.enter(SessionPhase::Action);
                Some(PhaseEvent::ActionStarted)
            }
            SessionPhase::Action => {
                self.recorder.update(dt_ms, position);
                if self.recorder.elapsed_ms() < self.action_duration_ms {
                    return None;
                }
                self.trajectory = self.recorder.take();
                debug!("Recorded {} samples", self.trajectory.len());
                self.enter(SessionPhase::AfterAction);
                Some(PhaseEvent::SubmitTrajectory(self.trajectory.clone()))
            }
            SessionPhase::Simulation => {
                let outcome = self.simulation.as_mut()?.advance(dt_ms)?;
                self.outcome = Some(outcome);
                self.enter(SessionPhase::Results);
                Some(PhaseEvent::Finished(outcome))
            }
        }
    }

    fn enter(&mut self, phase: SessionPhase) {
        info!("Phase {} -> {}", self.phase, phase);
        self.phase = phase;
    }
}
