//! Seated players, round bookkeeping and event fan-out for one session
//!
//! The registry is the only owner of player identities on the server. Every
//! connection worker reaches it through a single `RwLock` write guard, so each
//! read-modify-write below (capacity and name check plus seating, the ready
//! check, the trajectory-complete check) runs as one critical section.
//!
//! Outbound messages are never written to sockets from here. Each player owns
//! an unbounded outbox drained by its connection's writer task, so a slow peer
//! cannot hold up delivery to the others.

use log::{error, info, warn};
use shared::payload::{
    game_message, parse_ready_flag, parse_trajectory, OtherMovement, PlayerInfo, ReadyStatus,
    RoundResult, SeatAssignment,
};
use shared::{
    Action, GameAction, MapDescriptor, Message, Outcome, ProtocolError, ReplayPlayer,
    ReplaySimulation, Role, Vec2,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound queue of one connection.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// Server-local handle of an accepted connection.
pub type ConnId = u32;

/// Virtual step used when the server replays a finished round.
pub const REPLAY_STEP_MS: f32 = 10.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("every seat is taken")]
    CapacityExceeded,
    #[error("a round is in progress")]
    RoundInProgress,
    #[error("name `{0}` is already seated")]
    NameTaken(String),
    #[error("no seated player with uuid `{0}`")]
    UnknownPlayer(String),
}

/// A player holding a seat
#[derive(Debug)]
pub struct SeatedPlayer {
    pub conn: ConnId,
    pub uuid: String,
    pub name: String,
    pub seat: usize,
    pub role: Role,
    pub ready: bool,
    /// Trajectory submitted for the running round, if any
    pub trajectory: Option<Vec<Vec2>>,
    outbox: Outbox,
}

impl SeatedPlayer {
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            seat: self.seat,
            role: self.role,
            ready: self.ready,
        }
    }

    fn send(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            error!("Outbound queue of {} ({}) is closed", self.name, self.uuid);
        }
    }
}

/// Whether the session is waiting for players or playing a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Seats filling up and ready flags toggling
    Lobby,
    /// Countdown broadcast; trajectories are being collected
    Running,
}

/// Authoritative roster of one session
///
/// Seats are keyed by index so iteration always runs in seat order and the
/// lowest free seat is found by a linear scan over `0..capacity`.
pub struct SessionRegistry {
    map: MapDescriptor,
    tick_rate: u32,
    seats: BTreeMap<usize, SeatedPlayer>,
    next_conn_id: ConnId,
    round: u32,
    round_state: RoundState,
}

impl SessionRegistry {
    pub fn new(map: MapDescriptor, tick_rate: u32) -> Self {
        Self {
            map,
            tick_rate,
            seats: BTreeMap::new(),
            next_conn_id: 1,
            round: 1,
            round_state: RoundState::Lobby,
        }
    }

    /// Hands out a fresh handle for an accepted connection
    pub fn register_connection(&mut self) -> ConnId {
        let conn = self.next_conn_id;
        self.next_conn_id += 1;
        conn
    }

    pub fn map(&self) -> &MapDescriptor {
        &self.map
    }

    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.capacity()
    }

    /// A seat is free and no round is being played. Seats vacated mid-round
    /// stay closed until the round ends.
    pub fn is_accepting(&self) -> bool {
        self.round_state == RoundState::Lobby && !self.is_full()
    }

    /// Current round number, starting at 1
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn round_state(&self) -> RoundState {
        self.round_state
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.seats.values().any(|p| p.name == name)
    }

    pub fn player(&self, uuid: &str) -> Option<&SeatedPlayer> {
        self.seats.values().find(|p| p.uuid == uuid)
    }

    fn player_mut(&mut self, uuid: &str) -> Option<&mut SeatedPlayer> {
        self.seats.values_mut().find(|p| p.uuid == uuid)
    }

    pub fn players(&self) -> impl Iterator<Item = &SeatedPlayer> {
        self.seats.values()
    }

    /// Seats a verified connection in the lowest free seat and gives it a
    /// fresh uuid. Nothing is sent yet; see [`SessionRegistry::welcome`].
    pub fn seat(
        &mut self,
        conn: ConnId,
        name: &str,
        outbox: Outbox,
    ) -> Result<SeatAssignment, RegistryError> {
        if self.round_state == RoundState::Running {
            return Err(RegistryError::RoundInProgress);
        }
        if self.is_name_taken(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        let seat = (0..self.capacity())
            .find(|s| !self.seats.contains_key(s))
            .ok_or(RegistryError::CapacityExceeded)?;
        let (role, position) = match (self.map.role_for_seat(seat), self.map.start_position(seat)) {
            (Some(role), Some(position)) => (role, position),
            _ => return Err(RegistryError::CapacityExceeded),
        };

        let uuid = Uuid::new_v4().to_string();
        info!(
            "Seated {} as {} in seat {} (uuid {})",
            name, role, seat, uuid
        );
        self.seats.insert(
            seat,
            SeatedPlayer {
                conn,
                uuid: uuid.clone(),
                name: name.to_string(),
                seat,
                role,
                ready: false,
                trajectory: None,
                outbox,
            },
        );

        Ok(SeatAssignment {
            uuid,
            seat,
            role,
            position,
        })
    }

    /// Sends a freshly seated player the map, its own seat and every other
    /// seated player, then announces it to everyone else.
    pub fn welcome(&self, assignment: &SeatAssignment) -> Result<(), ProtocolError> {
        let newcomer = self
            .player(&assignment.uuid)
            .ok_or_else(|| ProtocolError::unexpected(GameAction::Map.into(), "for an unseated player"))?;

        let map_json = self
            .map
            .to_json()
            .map_err(|e| ProtocolError::invalid(GameAction::Map.into(), e))?;
        newcomer.send(Message::with_params(GameAction::Map, map_json));
        newcomer.send(game_message(GameAction::GamePos, assignment)?);

        for other in self.seats.values().filter(|p| p.conn != newcomer.conn) {
            newcomer.send(game_message(GameAction::NewPlayer, &other.info())?);
        }

        let announcement = game_message(GameAction::NewPlayer, &newcomer.info())?;
        self.broadcast_except(newcomer.conn, &announcement);
        Ok(())
    }

    /// Removes a player and announces the departure to the remaining ones.
    pub fn remove(&mut self, uuid: &str) -> Result<SeatedPlayer, RegistryError> {
        let seat = self
            .seats
            .values()
            .find(|p| p.uuid == uuid)
            .map(|p| p.seat)
            .ok_or_else(|| RegistryError::UnknownPlayer(uuid.to_string()))?;
        let player = self
            .seats
            .remove(&seat)
            .ok_or_else(|| RegistryError::UnknownPlayer(uuid.to_string()))?;
        info!("{} left seat {}", player.name, player.seat);

        self.broadcast(&Message::with_params(
            GameAction::PlayerDisconnected,
            player.uuid.clone(),
        ));

        if self.seats.is_empty() {
            self.reset_round();
        } else {
            self.evaluate_simulation_trigger();
        }
        Ok(player)
    }

    pub fn broadcast(&self, message: &Message) {
        for player in self.seats.values() {
            player.send(message.clone());
        }
    }

    pub fn broadcast_except(&self, exclude: ConnId, message: &Message) {
        for player in self.seats.values().filter(|p| p.conn != exclude) {
            player.send(message.clone());
        }
    }

    /// Dispatches a game message from a seated player.
    pub fn handle_game(&mut self, uuid: &str, message: &Message) -> Result<(), ProtocolError> {
        let action = match message.action {
            Action::Game(action) => action,
            other => return Err(ProtocolError::unexpected(other, "after the handshake completed")),
        };
        if self.player(uuid).is_none() {
            return Err(ProtocolError::unexpected(message.action, "from an unseated connection"));
        }

        match action {
            GameAction::Ready => self.handle_ready(uuid, message),
            GameAction::Movement => self.handle_movement(uuid, message),
            GameAction::NewPlayer
            | GameAction::PlayerDisconnected
            | GameAction::Map
            | GameAction::SwitchReadyStatus
            | GameAction::GamePos
            | GameAction::StartCountdown
            | GameAction::OtherMovement
            | GameAction::StartSimulation
            | GameAction::Result => Err(ProtocolError::unexpected(message.action, "from a client")),
        }
    }

    fn handle_ready(&mut self, uuid: &str, message: &Message) -> Result<(), ProtocolError> {
        let ready = parse_ready_flag(message)?;
        let conn = match self.player_mut(uuid) {
            Some(player) => {
                player.ready = ready;
                player.conn
            }
            None => return Err(ProtocolError::unexpected(message.action, "from an unseated connection")),
        };

        let status = ReadyStatus {
            uuid: uuid.to_string(),
            ready,
        };
        self.broadcast_except(conn, &game_message(GameAction::SwitchReadyStatus, &status)?);
        self.evaluate_countdown_trigger();
        Ok(())
    }

    /// Starts the countdown once every seat is taken and every player is
    /// ready. Latched until the round ends.
    fn evaluate_countdown_trigger(&mut self) {
        if self.round_state != RoundState::Lobby {
            return;
        }
        if self.seats.len() != self.capacity() || !self.seats.values().all(|p| p.ready) {
            return;
        }
        self.round_state = RoundState::Running;
        info!("All {} players ready, starting round {}", self.seats.len(), self.round);
        self.broadcast(&Message::game(GameAction::StartCountdown));
    }

    fn handle_movement(&mut self, uuid: &str, message: &Message) -> Result<(), ProtocolError> {
        if self.round_state != RoundState::Running {
            return Err(ProtocolError::unexpected(message.action, "before the round started"));
        }
        let trajectory = parse_trajectory(message)?;
        let conn = match self.player_mut(uuid) {
            Some(player) if player.trajectory.is_some() => {
                return Err(ProtocolError::unexpected(message.action, "twice in one round"));
            }
            Some(player) => {
                player.trajectory = Some(trajectory.clone());
                player.conn
            }
            None => return Err(ProtocolError::unexpected(message.action, "from an unseated connection")),
        };

        let movement = OtherMovement {
            uuid: uuid.to_string(),
            trajectory,
        };
        self.broadcast_except(conn, &game_message(GameAction::OtherMovement, &movement)?);
        self.evaluate_simulation_trigger();
        Ok(())
    }

    /// Replays the round once every seated player has submitted a trajectory.
    fn evaluate_simulation_trigger(&mut self) -> Option<Outcome> {
        if self.round_state != RoundState::Running || self.seats.is_empty() {
            return None;
        }
        if !self.seats.values().all(|p| p.trajectory.is_some()) {
            return None;
        }
        self.finish_round()
    }

    fn finish_round(&mut self) -> Option<Outcome> {
        let players = self
            .seats
            .values()
            .map(|p| {
                ReplayPlayer::new(
                    p.name.clone(),
                    p.role,
                    p.trajectory.clone().unwrap_or_default(),
                )
            })
            .collect();
        let mut simulation = ReplaySimulation::new(players, &self.map, self.tick_rate);

        self.broadcast(&Message::game(GameAction::StartSimulation));
        let outcome = simulation.run_to_end(REPLAY_STEP_MS);
        info!(
            "Round {} won by {} (collision: {}, {:.0} ms)",
            self.round, outcome.winner, outcome.collision, outcome.time_ms
        );

        let result = RoundResult {
            winner: outcome.winner,
            collision: outcome.collision,
            time_ms: outcome.time_ms,
            round: self.round,
        };
        match game_message(GameAction::Result, &result) {
            Ok(message) => self.broadcast(&message),
            Err(e) => warn!("Failed to build round result: {}", e),
        }

        self.round = self.round % self.map.round_count.max(1) + 1;
        self.reset_round();
        Some(outcome)
    }

    fn reset_round(&mut self) {
        self.round_state = RoundState::Lobby;
        for player in self.seats.values_mut() {
            player.ready = false;
            player.trajectory = None;
        }
    }
}
