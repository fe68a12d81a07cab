//! Server network layer: TCP accept loop and one worker per connection

use crate::config::ServerConfig;
use crate::handshake::{HandshakeStep, ServerHandshake};
use crate::registry::SessionRegistry;
use log::{error, info, warn};
use shared::transport::split_tcp;
use shared::{MapDescriptor, Message, TransportError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};

/// Accepts connections and hands each one to its own worker task
pub struct Server {
    listener: TcpListener,
    registry: Arc<RwLock<SessionRegistry>>,
    password: Arc<str>,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        map: MapDescriptor,
        tick_rate: u32,
    ) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(config.address()).await?;
        info!(
            "Server listening on {} with map `{}` ({} seats)",
            listener.local_addr()?,
            map.name,
            map.capacity()
        );

        Ok(Server {
            listener,
            registry: Arc::new(RwLock::new(SessionRegistry::new(map, tick_rate))),
            password: Arc::from(config.password.as_str()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Runs the accept loop until the listener fails
    pub async fn run(self) -> Result<(), io::Error> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!("Accepted connection from {}", addr);
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let registry = Arc::clone(&self.registry);
            let password = Arc::clone(&self.password);
            tokio::spawn(async move {
                handle_connection(stream, addr, registry, password).await;
            });
        }
    }
}

/// Runs the handshake and then the game dispatch loop for one connection
///
/// Outgoing messages go through an unbounded outbox drained by a dedicated
/// writer task. On disconnect the player is removed from the registry, which
/// announces the departure to everyone left.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<RwLock<SessionRegistry>>,
    password: Arc<str>,
) {
    let conn = registry.write().await.register_connection();
    let (mut reader, mut writer) = split_tcp(stream);
    let (outbox, mut outbound) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = writer.send(&message).await {
                error!("Failed to send {} to {}: {}", message.action, addr, e);
                break;
            }
        }
        writer.close().await;
    });

    let mut handshake = ServerHandshake::new(conn, &*password);
    let mut uuid: Option<String> = None;

    loop {
        let batch = match reader.receive().await {
            Ok(batch) => batch,
            Err(TransportError::Disconnect) => {
                info!("Connection {} from {} closed", conn, addr);
                break;
            }
            Err(e) => {
                error!("Dropping connection {} from {}: {}", conn, addr, e);
                break;
            }
        };

        let mut session = registry.write().await;
        for decoded in batch {
            let message = match decoded {
                Ok(message) => message,
                Err(e) => {
                    warn!("Rejected message from {}: {}", addr, e);
                    continue;
                }
            };

            let result = match &uuid {
                Some(id) => session.handle_game(id, &message).map(|_| None),
                None => handshake
                    .handle(&message, &mut session, &outbox)
                    .map(|step| match step {
                        HandshakeStep::Verified(id) => Some(id),
                        HandshakeStep::Continue | HandshakeStep::Rejected(_) => None,
                    }),
            };
            match result {
                Ok(Some(id)) => uuid = Some(id),
                Ok(None) => {}
                Err(e) => warn!("Rejected {} from {}: {}", message.action, addr, e),
            }
        }
    }

    if let Some(id) = uuid {
        if let Err(e) = registry.write().await.remove(&id) {
            warn!("Cleanup of connection {} failed: {}", conn, e);
        }
    }

    drop(outbox);
    if let Err(e) = writer_task.await {
        error!("Writer task for {} panicked: {}", addr, e);
    }
}
