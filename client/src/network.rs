//! Connection establishment and the headless client loop

use crate::body::{LocalBody, WanderingBody};
use crate::phase::{GamePhaseMachine, PhaseEvent, SessionPhase};
use crate::session::{ClientSession, SessionEvent};
use log::{debug, error, info, warn};
use shared::payload::{ready_message, RoundResult};
use shared::transport::split_tcp;
use shared::{
    GameAction, Message, RejectReason, TransportError, Vec2, COUNTDOWN_TIME_MS,
    DEFAULT_PORT, SERVER_TICK_RATE,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

const FRAME: Duration = Duration::from_millis(16);
const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Why a connection could not be established. The handshake never started.
#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error("invalid server address `{0}`")]
    InvalidAddress(String),
    #[error("could not resolve `{0}`")]
    Dns(String),
    #[error("connection to {0} refused")]
    Refused(String),
    #[error("connection to {0} timed out")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connect(#[from] ConnectFailure),
    #[error("handshake rejected: {0}")]
    Rejected(RejectReason),
    #[error("disconnected from server")]
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the server
    pub server: String,
    pub password: String,
    pub name: String,
    pub connect_timeout: Duration,
    /// How often `connect` is re-issued after `field_full`
    pub retries: u32,
    /// Number of round results to wait for before leaving
    pub rounds: u32,
    pub countdown_ms: f32,
    pub tick_rate: u32,
    /// Seed for the wandering body
    pub seed: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: format!("localhost:{}", DEFAULT_PORT),
            password: String::new(),
            name: String::from("player"),
            connect_timeout: Duration::from_secs(5),
            retries: 0,
            rounds: 1,
            countdown_ms: COUNTDOWN_TIME_MS,
            tick_rate: SERVER_TICK_RATE,
            seed: 0,
        }
    }
}

/// Resolves `addr` and connects within `limit`, mapping every failure to a
/// distinct [`ConnectFailure`].
pub async fn connect(addr: &str, limit: Duration) -> Result<TcpStream, ConnectFailure> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConnectFailure::InvalidAddress(addr.to_string()))?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(ConnectFailure::InvalidAddress(addr.to_string()));
    }

    let resolved: Vec<SocketAddr> = match timeout(limit, tokio::net::lookup_host(addr)).await {
        Err(_) => return Err(ConnectFailure::Timeout(addr.to_string())),
        Ok(Err(_)) => return Err(ConnectFailure::Dns(addr.to_string())),
        Ok(Ok(addrs)) => addrs.collect(),
    };
    if resolved.is_empty() {
        return Err(ConnectFailure::Dns(addr.to_string()));
    }

    match timeout(limit, TcpStream::connect(&resolved[..])).await {
        Err(_) => Err(ConnectFailure::Timeout(addr.to_string())),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err(ConnectFailure::Refused(addr.to_string()))
        }
        Ok(Err(e)) => Err(ConnectFailure::Io(e)),
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
            Ok(stream)
        }
    }
}

/// Headless client: connects, plays `config.rounds` rounds and returns the
/// server's results.
pub struct Client {
    config: ClientConfig,
    session: Arc<RwLock<ClientSession>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let session = ClientSession::new(config.name.clone(), config.password.clone());
        Self {
            config,
            session: Arc::new(RwLock::new(session)),
        }
    }

    pub fn session(&self) -> Arc<RwLock<ClientSession>> {
        Arc::clone(&self.session)
    }

    pub async fn run(&mut self) -> Result<Vec<RoundResult>, ClientError> {
        info!("Connecting to {}", self.config.server);
        let stream = match connect(&self.config.server, self.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.session.write().await.set_status(e.to_string());
                return Err(e.into());
            }
        };

        let (mut reader, mut writer) = split_tcp(stream);
        let (outbox, mut outbound) = mpsc::unbounded_channel::<Message>();

        let writer_task = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                if let Err(e) = writer.send(&message).await {
                    error!("Failed to send {}: {}", message.action, e);
                    break;
                }
            }
            writer.close().await;
        });

        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();
        let reader_task = {
            let session = Arc::clone(&self.session);
            let outbox = outbox.clone();
            tokio::spawn(async move {
                loop {
                    let batch = match reader.receive().await {
                        Ok(batch) => batch,
                        Err(TransportError::Disconnect) => break,
                        Err(e) => {
                            error!("Dropping connection: {}", e);
                            break;
                        }
                    };
                    let mut guard = session.write().await;
                    for decoded in batch {
                        let message = match decoded {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Rejected message from server: {}", e);
                                continue;
                            }
                        };
                        match guard.handle(&message) {
                            Ok(replies) => {
                                for reply in replies {
                                    queue(&outbox, reply);
                                }
                            }
                            Err(e) => warn!("Rejected {} from server: {}", message.action, e),
                        }
                    }
                }
                session.write().await.on_disconnect();
                if closed_tx.send(()).is_err() {
                    debug!("Frame loop already finished");
                }
            })
        };

        let connect_message = self.session.write().await.connect();
        queue(&outbox, connect_message);

        let result = self.play(&outbox, &mut closed_rx).await;

        drop(outbox);
        reader_task.abort();
        if let Err(e) = writer_task.await {
            error!("Writer task panicked: {}", e);
        }
        result
    }

    async fn play(
        &mut self,
        outbox: &mpsc::UnboundedSender<Message>,
        closed: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<Vec<RoundResult>, ClientError> {
        let mut frame = interval(FRAME);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        let mut retries_left = self.config.retries;
        let mut machine: Option<GamePhaseMachine> = None;
        let mut body = WanderingBody::new(Vec2::ZERO, Vec2::new(1.0, 1.0), self.config.seed);
        let mut pending_result: Option<RoundResult> = None;
        let mut results = Vec::new();

        loop {
            tokio::select! {
                _ = closed.recv() => {
                    warn!("Connection to server lost");
                    return Err(ClientError::Disconnected);
                }
                _ = frame.tick() => {}
            }
            let now = Instant::now();
            let dt_ms = (now - last_frame).as_secs_f32() * 1000.0;
            last_frame = now;

            let mut session = self.session.write().await;
            for event in session.take_events() {
                match event {
                    SessionEvent::Rejected(reason) => {
                        if reason == RejectReason::FieldFull && retries_left > 0 {
                            retries_left -= 1;
                            info!("Field full, retrying ({} left)", retries_left);
                            drop(session);
                            sleep(RETRY_DELAY).await;
                            session = self.session.write().await;
                            queue(outbox, session.connect());
                        } else {
                            return Err(ClientError::Rejected(reason));
                        }
                    }
                    SessionEvent::Seated => {
                        if let (Some(map), Some(seat)) = (session.map(), session.seat()) {
                            machine = Some(GamePhaseMachine::for_map(
                                map,
                                self.config.tick_rate,
                                self.config.countdown_ms,
                            ));
                            body = WanderingBody::new(seat.position, map.size, self.config.seed);
                            queue(outbox, ready_message(true));
                        }
                    }
                    SessionEvent::CountdownStarted => {
                        if let Some(machine) = machine.as_mut() {
                            machine.start_countdown();
                        }
                    }
                    SessionEvent::RoundFinished(result) => pending_result = Some(result),
                    SessionEvent::SimulationAnnounced => debug!("Server started the simulation"),
                    SessionEvent::PlayerJoined(_)
                    | SessionEvent::PlayerLeft(_)
                    | SessionEvent::TrajectoryReceived(_) => {}
                }
            }

            let machine = match machine.as_mut() {
                Some(machine) => machine,
                None => continue,
            };

            body.step(dt_ms, machine.movement_blocked());
            match machine.update(dt_ms, body.position()) {
                Some(PhaseEvent::SubmitTrajectory(trajectory)) => {
                    match serde_json::to_string(&trajectory) {
                        Ok(json) => {
                            queue(outbox, Message::with_params(GameAction::Movement, json));
                        }
                        Err(e) => error!("Failed to encode trajectory: {}", e),
                    }
                }
                Some(PhaseEvent::Finished(outcome)) => {
                    info!("Local replay: {} won (collision: {})", outcome.winner, outcome.collision)
                }
                Some(PhaseEvent::ActionStarted) | Some(PhaseEvent::SimulationStarted) | None => {}
            }

            if machine.phase() == SessionPhase::AfterAction {
                if let Some(players) = session.replay_players(machine.trajectory()) {
                    machine.begin_simulation(players);
                }
            }

            if machine.phase() == SessionPhase::Results {
                if let Some(result) = pending_result.take() {
                    info!(
                        "Round {}: {} won (collision: {}, {:.0} ms)",
                        result.round, result.winner, result.collision, result.time_ms
                    );
                    results.push(result);
                    if results.len() >= self.config.rounds as usize {
                        return Ok(results);
                    }
                    session.reset_round();
                    machine.restart();
                    if let Some(start) = session.seat().map(|s| s.position) {
                        body.reset(start);
                    }
                    queue(outbox, ready_message(true));
                }
            }
        }
    }
}

fn queue(outbox: &mpsc::UnboundedSender<Message>, message: Message) {
    if outbox.send(message).is_err() {
        error!("Outbound queue closed");
    }
}
