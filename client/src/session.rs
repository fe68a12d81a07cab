//! Client-side mirror of the session registry
//!
//! The network receive task feeds every decoded message into
//! [`ClientSession::handle`]; the main tick drains the resulting
//! [`SessionEvent`]s. Both sides reach the session through one
//! `Arc<RwLock<ClientSession>>`.

use crate::handshake::ClientHandshake;
use log::{debug, info};
use shared::payload::{parse, OtherMovement, PlayerInfo, ReadyStatus, RoundResult, SeatAssignment};
use shared::{
    Action, GameAction, HandshakeState, MapDescriptor, Message, ProtocolError, RejectReason,
    ReplayPlayer, Role, Vec2,
};
use std::collections::{HashMap, VecDeque};

/// Another seated player as last announced by the server
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub uuid: String,
    pub name: String,
    pub seat: usize,
    pub role: Role,
    pub ready: bool,
    pub trajectory: Option<Vec<Vec2>>,
}

impl From<PlayerInfo> for RemotePlayer {
    fn from(info: PlayerInfo) -> Self {
        Self {
            uuid: info.uuid,
            name: info.name,
            seat: info.seat,
            role: info.role,
            ready: info.ready,
            trajectory: None,
        }
    }
}

/// Something the main tick should react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake finished; map and own seat are known
    Seated,
    Rejected(RejectReason),
    PlayerJoined(String),
    PlayerLeft(String),
    CountdownStarted,
    TrajectoryReceived(String),
    SimulationAnnounced,
    RoundFinished(RoundResult),
}

pub struct ClientSession {
    handshake: ClientHandshake,
    map: Option<MapDescriptor>,
    seat: Option<SeatAssignment>,
    remote: HashMap<String, RemotePlayer>,
    events: VecDeque<SessionEvent>,
}

impl ClientSession {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handshake: ClientHandshake::new(name, password),
            map: None,
            seat: None,
            remote: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    pub fn handshake(&self) -> &ClientHandshake {
        &self.handshake
    }

    pub fn status(&self) -> &str {
        self.handshake.status()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.handshake.set_status(status);
    }

    pub fn map(&self) -> Option<&MapDescriptor> {
        self.map.as_ref()
    }

    pub fn seat(&self) -> Option<&SeatAssignment> {
        self.seat.as_ref()
    }

    pub fn remote_players(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.remote.values()
    }

    pub fn remote_player(&self, uuid: &str) -> Option<&RemotePlayer> {
        self.remote.get(uuid)
    }

    /// Builds the `connect` message for a fresh attempt, clearing the mirror.
    pub fn connect(&mut self) -> Message {
        self.clear();
        self.handshake.start()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Handles one message from the server, returning replies to send back.
    pub fn handle(&mut self, message: &Message) -> Result<Vec<Message>, ProtocolError> {
        if !self.handshake.state().is_verified() {
            let reply = self.handshake.handle(message)?;
            match self.handshake.state() {
                HandshakeState::Rejected(reason) => {
                    let reason = *reason;
                    self.clear();
                    self.events.push_back(SessionEvent::Rejected(reason));
                }
                HandshakeState::Verified => info!("{}", self.handshake.status()),
                _ => {}
            }
            return Ok(reply.into_iter().collect());
        }

        let action = match message.action {
            Action::Game(action) => action,
            Action::Auth(_) => {
                return Err(ProtocolError::unexpected(
                    message.action,
                    "after the handshake completed",
                ))
            }
        };

        match action {
            GameAction::Map => {
                let map = MapDescriptor::from_json(message.require_params()?)
                    .map_err(|e| ProtocolError::invalid(message.action, e))?;
                debug!("Map `{}` with {} seats", map.name, map.capacity());
                self.map = Some(map);
                self.notify_if_seated();
            }
            GameAction::GamePos => {
                let seat: SeatAssignment = parse(message)?;
                info!("Seat {} as {}", seat.seat, seat.role);
                self.seat = Some(seat);
                self.notify_if_seated();
            }
            GameAction::NewPlayer => {
                let info: PlayerInfo = parse(message)?;
                if self.own_uuid() != Some(info.uuid.as_str()) {
                    info!("{} joined as {}", info.name, info.role);
                    let uuid = info.uuid.clone();
                    self.remote.insert(uuid.clone(), info.into());
                    self.events.push_back(SessionEvent::PlayerJoined(uuid));
                }
            }
            GameAction::PlayerDisconnected => {
                let uuid = message.require_params()?.to_string();
                if let Some(player) = self.remote.remove(&uuid) {
                    info!("{} left", player.name);
                    self.events.push_back(SessionEvent::PlayerLeft(uuid));
                }
            }
            GameAction::SwitchReadyStatus => {
                let status: ReadyStatus = parse(message)?;
                match self.remote.get_mut(&status.uuid) {
                    Some(player) => player.ready = status.ready,
                    None => {
                        return Err(ProtocolError::invalid(
                            message.action,
                            format!("unknown player {}", status.uuid),
                        ))
                    }
                }
            }
            GameAction::StartCountdown => self.events.push_back(SessionEvent::CountdownStarted),
            GameAction::OtherMovement => {
                let movement: OtherMovement = parse(message)?;
                match self.remote.get_mut(&movement.uuid) {
                    Some(player) => {
                        debug!(
                            "Trajectory of {} with {} samples",
                            player.name,
                            movement.trajectory.len()
                        );
                        player.trajectory = Some(movement.trajectory);
                        self.events
                            .push_back(SessionEvent::TrajectoryReceived(movement.uuid));
                    }
                    None => {
                        return Err(ProtocolError::invalid(
                            message.action,
                            format!("unknown player {}", movement.uuid),
                        ))
                    }
                }
            }
            GameAction::StartSimulation => self.events.push_back(SessionEvent::SimulationAnnounced),
            GameAction::Result => {
                let result: RoundResult = parse(message)?;
                self.events.push_back(SessionEvent::RoundFinished(result));
            }
            GameAction::Ready | GameAction::Movement => {
                return Err(ProtocolError::unexpected(message.action, "from the server"))
            }
        }
        Ok(Vec::new())
    }

    fn own_uuid(&self) -> Option<&str> {
        self.handshake.uuid()
    }

    fn notify_if_seated(&mut self) {
        if self.map.is_some() && self.seat.is_some() {
            self.events.push_back(SessionEvent::Seated);
        }
    }

    pub fn all_trajectories_received(&self) -> bool {
        self.remote.values().all(|p| p.trajectory.is_some())
    }

    /// Every seated player in seat order with `own_trajectory` for this client,
    /// or `None` while a remote trajectory is still missing.
    pub fn replay_players(&self, own_trajectory: &[Vec2]) -> Option<Vec<ReplayPlayer>> {
        let seat = self.seat.as_ref()?;
        let mut entries: Vec<(usize, ReplayPlayer)> = Vec::with_capacity(self.remote.len() + 1);
        entries.push((
            seat.seat,
            ReplayPlayer::new(self.handshake.name(), seat.role, own_trajectory.to_vec()),
        ));
        for player in self.remote.values() {
            let trajectory = player.trajectory.clone()?;
            entries.push((
                player.seat,
                ReplayPlayer::new(player.name.clone(), player.role, trajectory),
            ));
        }
        entries.sort_by_key(|(seat, _)| *seat);
        Some(entries.into_iter().map(|(_, player)| player).collect())
    }

    /// Clears ready flags and trajectories for the next round
    pub fn reset_round(&mut self) {
        for player in self.remote.values_mut() {
            player.ready = false;
            player.trajectory = None;
        }
    }

    pub fn on_disconnect(&mut self) {
        self.clear();
        self.handshake.reset("Disconnected from server");
    }

    fn clear(&mut self) {
        self.map = None;
        self.seat = None;
        self.remote.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::payload::game_message;
    use shared::AuthAction;

    const MAP_JSON: &str = r#"{"name":"duel","rounds":1,"time":500,"size":[400,400],
        "catcher_start_pos":[[10,10]],"runner_start_pos":[[300,300]]}"#;

    fn seated_session() -> ClientSession {
        let mut session = ClientSession::new("me", "");
        session.connect();
        for message in [
            Message::auth(AuthAction::SuccessPassword),
            Message::auth(AuthAction::SuccessName),
            Message::with_params(AuthAction::Uuid, "me-uuid"),
            Message::auth(AuthAction::Success),
            Message::with_params(GameAction::Map, MAP_JSON),
            game_message(
                GameAction::GamePos,
                &SeatAssignment {
                    uuid: "me-uuid".to_string(),
                    seat: 1,
                    role: Role::Runner,
                    position: Vec2::new(300.0, 300.0),
                },
            )
            .unwrap(),
        ] {
            session.handle(&message).unwrap();
        }
        session
    }

    fn new_player(uuid: &str, seat: usize, role: Role) -> Message {
        game_message(
            GameAction::NewPlayer,
            &PlayerInfo {
                uuid: uuid.to_string(),
                name: format!("player-{}", seat),
                seat,
                role,
                ready: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_seated_after_map_and_position() {
        let mut session = seated_session();
        assert_eq!(session.take_events(), vec![SessionEvent::Seated]);
        assert_eq!(session.map().unwrap().name, "duel");
        assert_eq!(session.seat().unwrap().role, Role::Runner);
    }

    #[test]
    fn test_handshake_replies_are_returned() {
        let mut session = ClientSession::new("me", "pw");
        session.connect();
        let replies = session
            .handle(&Message::auth(AuthAction::RequestPassword))
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].parameters.as_deref(), Some("pw"));
    }

    #[test]
    fn test_roster_mirrors_join_ready_and_leave() {
        let mut session = seated_session();
        session.take_events();

        session.handle(&new_player("c-uuid", 0, Role::Catcher)).unwrap();
        // our own announcement is not mirrored
        session.handle(&new_player("me-uuid", 1, Role::Runner)).unwrap();
        assert_eq!(session.remote_players().count(), 1);

        let toggle = game_message(
            GameAction::SwitchReadyStatus,
            &ReadyStatus {
                uuid: "c-uuid".to_string(),
                ready: true,
            },
        )
        .unwrap();
        session.handle(&toggle).unwrap();
        assert!(session.remote_player("c-uuid").unwrap().ready);

        session
            .handle(&Message::with_params(GameAction::PlayerDisconnected, "c-uuid"))
            .unwrap();
        assert_eq!(session.remote_players().count(), 0);
        assert_eq!(
            session.take_events(),
            vec![
                SessionEvent::PlayerJoined("c-uuid".to_string()),
                SessionEvent::PlayerLeft("c-uuid".to_string()),
            ]
        );
    }

    #[test]
    fn test_replay_players_wait_for_every_trajectory() {
        let mut session = seated_session();
        session.handle(&new_player("c-uuid", 0, Role::Catcher)).unwrap();
        let own = vec![Vec2::new(300.0, 300.0); 3];
        assert!(session.replay_players(&own).is_none());
        assert!(!session.all_trajectories_received());

        let movement = game_message(
            GameAction::OtherMovement,
            &OtherMovement {
                uuid: "c-uuid".to_string(),
                trajectory: vec![Vec2::new(10.0, 10.0); 3],
            },
        )
        .unwrap();
        session.handle(&movement).unwrap();
        assert!(session.all_trajectories_received());

        let players = session.replay_players(&own).unwrap();
        assert_eq!(players.len(), 2);
        // seat order: the catcher in seat 0 comes first
        assert_eq!(players[0].role, Role::Catcher);
        assert_eq!(players[1].name, "me");

        session.reset_round();
        assert!(session.replay_players(&own).is_none());
    }

    #[test]
    fn test_rejection_clears_mirror() {
        let mut session = ClientSession::new("me", "");
        session.connect();
        session.handle(&Message::auth(AuthAction::NameTaken)).unwrap();
        assert_eq!(
            session.take_events(),
            vec![SessionEvent::Rejected(RejectReason::NameTaken)]
        );
        assert!(session.map().is_none());
        assert!(session.status().contains("taken"));
    }

    #[test]
    fn test_client_actions_from_server_are_violations() {
        let mut session = seated_session();
        assert!(session.handle(&Message::game(GameAction::Movement)).is_err());
        assert!(session.handle(&Message::auth(AuthAction::Uuid)).is_err());
        let unknown = game_message(
            GameAction::OtherMovement,
            &OtherMovement {
                uuid: "ghost".to_string(),
                trajectory: vec![Vec2::ZERO],
            },
        )
        .unwrap();
        assert!(session.handle(&unknown).is_err());
    }

    #[test]
    fn test_result_and_disconnect() {
        let mut session = seated_session();
        session.take_events();
        let result = RoundResult {
            winner: Role::Runner,
            collision: false,
            time_ms: 500.0,
            round: 1,
        };
        session
            .handle(&game_message(GameAction::Result, &result).unwrap())
            .unwrap();
        assert_eq!(session.take_events(), vec![SessionEvent::RoundFinished(result)]);

        session.on_disconnect();
        assert!(session.seat().is_none());
        assert_eq!(session.handshake().state(), &HandshakeState::Idle);
        assert_eq!(session.status(), "Disconnected from server");
    }
}
