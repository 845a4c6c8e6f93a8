//! Client connection driver.
//!
//! One task owns the socket, the session, and the avatar. Reconnection lives
//! in the same loop: a failed or dropped connection consults the
//! [`ReconnectPolicy`] and sleeps (racing shutdown) before the next attempt,
//! so there is never more than one attempt in flight.

use crate::avatar::LocalAvatar;
use crate::reconnect::{
    ReconnectDecision, ReconnectPolicy, MAX_RECONNECT_ATTEMPTS, RECONNECT_INTERVAL,
};
use crate::session::{SessionConfig, SessionCore, SessionEvent};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, MonsterId, ProtocolError, ServerMessage};
use std::future::{self, Future};
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientSink = SplitSink<ClientStream, Message>;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed after {attempts} attempt(s)")]
    ConnectionFailed { attempts: u32 },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// Socket open, waiting for the assigned id
    Connected,
    Registered,
    Reconnecting { attempt: u32 },
    /// The reconnect budget ran out
    Failed,
    /// Shut down on request
    Closed,
}

/// Requests from the embedding game
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Chat(String),
    Damage {
        target: MonsterId,
        damage: u32,
        max_hp: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub session: SessionConfig,
    /// How often the avatar and remote entities are advanced
    pub frame_interval: Duration,
    pub max_reconnects: u32,
    pub reconnect_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            session: SessionConfig::default(),
            frame_interval: Duration::from_millis(16),
            max_reconnects: MAX_RECONNECT_ATTEMPTS,
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

enum ConnectionEnd {
    Shutdown,
    Lost,
}

pub struct Client<A: LocalAvatar> {
    config: ClientConfig,
    session: SessionCore,
    avatar: A,
    policy: ReconnectPolicy,
    state: SessionState,
    commands_tx: mpsc::UnboundedSender<ClientCommand>,
    commands_rx: mpsc::UnboundedReceiver<ClientCommand>,
    events_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl<A: LocalAvatar> Client<A> {
    pub fn new(config: ClientConfig, avatar: A) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            session: SessionCore::new(config.session.clone()),
            policy: ReconnectPolicy::new(config.max_reconnects, config.reconnect_interval),
            config,
            avatar,
            state: SessionState::Connecting,
            commands_tx,
            commands_rx,
            events_tx: None,
        }
    }

    /// Handle for sending chat and damage reports while the client runs.
    pub fn commands(&self) -> mpsc::UnboundedSender<ClientCommand> {
        self.commands_tx.clone()
    }

    /// Receives every [`SessionEvent`] from now on. Replaces any earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = Some(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &SessionCore {
        &self.session
    }

    pub fn avatar(&self) -> &A {
        &self.avatar
    }

    pub fn avatar_mut(&mut self) -> &mut A {
        &mut self.avatar
    }

    pub async fn run(&mut self) -> Result<(), SessionError> {
        self.run_until(future::pending()).await
    }

    /// Connects, reconnecting as the policy allows, until `shutdown` resolves
    /// or the reconnect budget is spent.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.state = SessionState::Connecting;
            info!("Connecting to {}", self.config.server_url);

            let connected = tokio::select! {
                result = tokio_tungstenite::connect_async(self.config.server_url.as_str()) => result,
                _ = shutdown.as_mut() => {
                    self.state = SessionState::Closed;
                    return Ok(());
                }
            };

            match connected {
                Ok((ws, _)) => {
                    info!("Connected to {}", self.config.server_url);
                    self.policy.reset();
                    self.state = SessionState::Connected;
                    self.session.on_open();

                    match self.drive(ws, &mut shutdown).await {
                        ConnectionEnd::Shutdown => {
                            self.state = SessionState::Closed;
                            return Ok(());
                        }
                        ConnectionEnd::Lost => warn!("Connection to {} lost", self.config.server_url),
                    }
                }
                Err(e) => warn!(
                    "Failed to connect to {}: {}",
                    self.config.server_url,
                    SessionError::from(e)
                ),
            }

            match self.policy.next() {
                ReconnectDecision::Retry { attempt, delay } => {
                    self.state = SessionState::Reconnecting { attempt };
                    info!(
                        "Attempting to reconnect ({}/{}) in {:?}",
                        attempt,
                        self.policy.max_attempts(),
                        delay
                    );
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = shutdown.as_mut() => {
                            self.state = SessionState::Closed;
                            return Ok(());
                        }
                    }
                }
                ReconnectDecision::GiveUp { attempts } => {
                    self.state = SessionState::Failed;
                    error!("Max reconnect attempts reached, connection failed");
                    return Err(SessionError::ConnectionFailed { attempts });
                }
            }
        }
    }

    /// Runs one open connection until it drops or shutdown is requested.
    async fn drive<F>(&mut self, ws: ClientStream, shutdown: &mut Pin<&mut F>) -> ConnectionEnd
    where
        F: Future<Output = ()>,
    {
        let (mut sink, mut stream) = ws.split();

        let mut frame_ticker = interval(self.config.frame_interval);
        frame_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut update_ticker = interval(self.session.config().update_interval);
        update_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame = Instant::now();

        loop {
            let outgoing: Vec<ClientMessage> = tokio::select! {
                _ = shutdown.as_mut() => {
                    info!("Closing connection");
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }

                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => self.on_text(&text),
                        Some(Ok(Message::Close(frame))) => {
                            info!("Server closed the connection: {:?}", frame);
                            return ConnectionEnd::Lost;
                        }
                        Some(Ok(_)) => Vec::new(),
                        Some(Err(e)) => {
                            warn!("{}", SessionError::from(e));
                            return ConnectionEnd::Lost;
                        }
                        None => return ConnectionEnd::Lost,
                    }
                }

                _ = frame_ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_frame);
                    last_frame = now;

                    self.avatar.advance(dt);
                    self.session.reconciler_mut().advance(dt);
                    Vec::new()
                }

                _ = update_ticker.tick() => {
                    self.session.tick(self.avatar.state()).into_iter().collect()
                }

                Some(command) = self.commands_rx.recv() => {
                    self.on_command(command).into_iter().collect()
                }
            };

            for message in &outgoing {
                if let Err(e) = send_message(&mut sink, message).await {
                    warn!("Failed to send {}: {}", message.kind(), e);
                    return ConnectionEnd::Lost;
                }
            }

            self.forward_events();
        }
    }

    fn on_text(&mut self, text: &str) -> Vec<ClientMessage> {
        let message = match shared::decode::<ServerMessage>(text) {
            Ok(message) => message,
            Err(ProtocolError::Empty) => return Vec::new(),
            Err(e) => {
                warn!("Ignoring unreadable server message: {}", e);
                return Vec::new();
            }
        };

        debug!("Received {}", message.kind());
        let replies = self.session.handle(message, self.avatar.state());
        if self.state == SessionState::Connected && self.session.is_registered() {
            self.state = SessionState::Registered;
        }
        replies
    }

    fn on_command(&mut self, command: ClientCommand) -> Option<ClientMessage> {
        let message = match &command {
            ClientCommand::Chat(text) => self.session.send_chat(text, self.avatar.state()),
            ClientCommand::Damage {
                target,
                damage,
                max_hp,
            } => self
                .session
                .report_damage(*target, *damage, *max_hp, self.avatar.state()),
        };

        if message.is_none() {
            debug!("Dropping {:?}: not registered yet", command);
        }
        message
    }

    fn forward_events(&mut self) {
        for event in self.session.drain_events() {
            match &event {
                SessionEvent::Registered(id) => info!("Registered as {}", id),
                SessionEvent::Chat(chat) => {
                    let name = self
                        .session
                        .reconciler()
                        .get(&chat.player_id)
                        .map(|e| e.name().to_string())
                        .unwrap_or_else(|| chat.player_id.to_string());
                    info!("[{}] {}", name, chat.message);
                }
                SessionEvent::MonsterDamage(hit) => {
                    debug!("Monster {} took {} damage", hit.target_id, hit.damage)
                }
                SessionEvent::MonsterUpdate(monster) => {
                    debug!("Monster {} at {}/{} hp", monster.id, monster.hp, monster.max_hp)
                }
                SessionEvent::ServerError(_) => {}
            }

            if let Some(tx) = &self.events_tx {
                if tx.send(event).is_err() {
                    self.events_tx = None;
                }
            }
        }
    }
}

async fn send_message(sink: &mut ClientSink, message: &ClientMessage) -> Result<(), SessionError> {
    let text = shared::encode(message)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
