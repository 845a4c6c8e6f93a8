//! WebSocket transport and the relay event loop
//!
//! Each accepted socket gets two tasks: a reader that forwards frames to the
//! event loop as [`ServerEvent`]s, and a writer that drains the connection's
//! outbound queue. The event loop is the only owner of the [`Relay`]; timers
//! (heartbeat, inactivity, housekeeping) are just more branches of the same
//! `select!`, so no handler ever runs concurrently with another.

use crate::config::RelayConfig;
use crate::registry::Outbound;
use crate::relay::Relay;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::PlayerId;
use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Events sent from connection tasks to the event loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        id: PlayerId,
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<Outbound>,
    },
    Frame {
        id: PlayerId,
        text: String,
    },
    /// A frame that could not be read as text
    Invalid {
        id: PlayerId,
        reason: String,
    },
    Pong {
        id: PlayerId,
    },
    Closed {
        id: PlayerId,
    },
}

/// Transport limits applied during the WebSocket handshake.
pub fn websocket_config(max_payload_bytes: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_payload_bytes);
    config.max_frame_size = Some(max_payload_bytes);
    config
}

/// Relay server bound to a TCP listener
pub struct Server {
    listener: TcpListener,
    relay: Relay,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub async fn bind(addr: &str, config: RelayConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Relay listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            relay: Relay::new(config),
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop forever.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(future::pending()).await
    }

    /// Runs the event loop until `shutdown` resolves, then closes every
    /// connection.
    pub async fn run_until<F>(mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let config = self.relay.config().clone();
        let ws_config = websocket_config(config.max_payload_bytes);

        let mut heartbeat = ticker(config.heartbeat_interval);
        let mut inactivity = ticker(config.inactivity_sweep_interval);
        let mut housekeeping = ticker(config.sweep_interval());

        tokio::pin!(shutdown);

        info!(
            "Relay started (capacity {}, heartbeat {:?}, broadcast interval {:?})",
            config.max_connections, config.heartbeat_interval, config.broadcast_interval
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Relay shutting down");
                    self.relay.close_all("Server shutting down");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let events = self.events_tx.clone();
                            tokio::spawn(accept_connection(stream, addr, events, ws_config));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }

                _ = heartbeat.tick() => {
                    let evicted = self.relay.heartbeat();
                    debug!(
                        "Heartbeat: {} connection(s), {} evicted",
                        self.relay.registry().len(),
                        evicted
                    );
                }

                _ = inactivity.tick() => {
                    let evicted = self.relay.sweep_inactive(Instant::now());
                    if evicted > 0 {
                        info!("Evicted {} inactive connection(s)", evicted);
                    }
                }

                _ = housekeeping.tick() => {
                    self.relay.sweep(Instant::now());
                }
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: ServerEvent) {
        let now = Instant::now();
        match event {
            ServerEvent::Connected { id, addr, outbox } => {
                self.relay.connect(id, Some(addr), Box::new(outbox), now);
            }
            ServerEvent::Frame { id, text } => self.relay.handle_frame(&id, &text, now),
            ServerEvent::Invalid { id, reason } => self.relay.handle_invalid(&id, &reason, now),
            ServerEvent::Pong { id } => self.relay.handle_pong(&id, now),
            ServerEvent::Closed { id } => {
                self.relay.disconnect(&id);
            }
        }
    }
}

/// Interval whose first tick is one full period away.
fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn accept_connection(
    stream: TcpStream,
    addr: SocketAddr,
    events: mpsc::UnboundedSender<ServerEvent>,
    config: WebSocketConfig,
) {
    let ws = match tokio_tungstenite::accept_async_with_config(stream, Some(config)).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let id = PlayerId::generate();
    let (outbox, outbound_rx) = mpsc::unbounded_channel();
    if events.send(ServerEvent::Connected { id, addr, outbox }).is_err() {
        return;
    }

    let (sink, stream) = ws.split();
    tokio::spawn(write_loop(id, sink, outbound_rx));
    read_loop(id, stream, events).await;
}

/// Forwards inbound frames until the socket closes or errors.
async fn read_loop(id: PlayerId, mut stream: WsStream, events: mpsc::UnboundedSender<ServerEvent>) {
    while let Some(result) = stream.next().await {
        let event = match result {
            Ok(Message::Text(text)) => ServerEvent::Frame { id, text },
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => ServerEvent::Frame { id, text },
                Err(_) => ServerEvent::Invalid {
                    id,
                    reason: "binary frame is not valid UTF-8".to_string(),
                },
            },
            // a client-initiated ping proves liveness just as well
            Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => ServerEvent::Pong { id },
            Ok(Message::Close(_)) => break,
            Ok(Message::Frame(_)) => continue,
            Err(e) => {
                debug!("Read error on {}: {}", id, e);
                break;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }

    let _ = events.send(ServerEvent::Closed { id });
}

/// Drains the outbound queue. Ends when the relay drops the queue or after a
/// close frame has been written.
async fn write_loop(id: PlayerId, mut sink: WsSink, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(frame) = outbound.recv().await {
        let closing = matches!(frame, Outbound::Close(_));
        let message = match frame {
            Outbound::Text(text) => Message::Text(text),
            Outbound::Ping => Message::Ping(Vec::new()),
            Outbound::Close(reason) => Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: reason.into(),
            })),
        };

        if let Err(e) = sink.send(message).await {
            debug!("Write error on {}: {}", id, e);
            break;
        }
        if closing {
            break;
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ServerMessage;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    #[test]
    fn test_websocket_config_limits_payload() {
        let config = websocket_config(65536);
        assert_eq!(config.max_message_size, Some(65536));
        assert_eq!(config.max_frame_size, Some(65536));
    }

    #[tokio::test]
    async fn test_server_assigns_id_on_connect() {
        let server = assert_ok!(Server::bind("127.0.0.1:0", RelayConfig::default()).await);
        let addr = assert_ok!(server.local_addr());
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        let first = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for player_id")
            .unwrap()
            .unwrap();

        match first {
            Message::Text(text) => {
                let message: ServerMessage = assert_ok!(shared::decode(&text));
                assert!(matches!(message, ServerMessage::PlayerId(_)));
            }
            other => panic!("Unexpected frame: {:?}", other),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let server = assert_ok!(Server::bind("127.0.0.1:0", RelayConfig::default()).await);
        let addr = assert_ok!(server.local_addr());
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        // player_id
        timeout(Duration::from_secs(2), ws.next()).await.unwrap();

        stop_tx.send(()).unwrap();
        assert!(timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().is_ok());
    }
}
