//! WebSocket upgrade handler

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::Config;
use crate::game::{Session, SessionRegistry};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::world::WorldGeometry;
use crate::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

/// Replies addressed to a single connection (pongs, errors)
const DIRECT_CHANNEL_CAPACITY: usize = 16;

/// Keepalive pings per idle timeout window
const PINGS_PER_IDLE_WINDOW: u32 = 3;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    let limits = ConnectionLimits::from_config(&state.config);
    serve_connection(state.sessions.clone(), ws_sink, ws_stream, limits).await;
}

/// Liveness and flood limits applied to every connection
#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    /// Close connections that deliver no frame for this long
    idle_timeout: Option<Duration>,
    /// Max inbound text messages per second
    input_rate_limit: u32,
}

impl ConnectionLimits {
    fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            input_rate_limit: config.input_rate_limit,
        }
    }

    /// Server ping interval. A live client answers each ping with a pong,
    /// which resets the idle timer even while it sends no input.
    fn keepalive_period(&self) -> Option<Duration> {
        self.idle_timeout
            .map(|limit| (limit / PINGS_PER_IDLE_WINDOW).max(Duration::from_millis(1)))
    }
}

/// Register a player for the connection, greet it, pump messages until either
/// side goes away, then unregister it.
async fn serve_connection<S, St>(
    sessions: Arc<SessionRegistry>,
    mut ws_sink: S,
    ws_stream: St,
    limits: ConnectionLimits,
) where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let Session {
        player,
        roster,
        events,
    } = sessions.connect();
    let player_id = player.id;

    info!(player_id = %player_id, "New WebSocket connection");

    for msg in greeting(sessions.world(), player_id, roster) {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            error!(player_id = %player_id, error = %e, "Failed to send greeting");
            sessions.disconnect(player_id);
            return;
        }
    }

    run_session(player_id, &sessions, ws_sink, ws_stream, events, limits).await;

    // Cleanup on disconnect
    sessions.disconnect(player_id);

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// First two messages on every connection. Geometry goes out before the
/// roster so the client never sees a car in a world it hasn't loaded.
fn greeting(
    world: &WorldGeometry,
    self_id: Uuid,
    roster: BTreeMap<Uuid, PlayerInfo>,
) -> [ServerMsg; 2] {
    [
        ServerMsg::WorldGeometry {
            kind: world.config().kind,
            seed: world.config().seed,
            obstacles: world.obstacles().to_vec(),
        },
        ServerMsg::Join { self_id, roster },
    ]
}

/// Run the WebSocket session with read/write split
async fn run_session<S, St>(
    player_id: Uuid,
    sessions: &Arc<SessionRegistry>,
    ws_sink: S,
    mut ws_stream: St,
    events: broadcast::Receiver<ServerMsg>,
    limits: ConnectionLimits,
) where
    S: Sink<Message, Error = axum::Error> + Unpin + Send + 'static,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_CHANNEL_CAPACITY);
    let rate_limiter = ConnectionRateLimiter::new(limits.input_rate_limit);

    // Spawn writer task: shared events + direct replies + keepalive -> WebSocket
    let mut writer_handle = tokio::spawn(write_loop(
        player_id,
        ws_sink,
        events,
        direct_rx,
        limits.keepalive_period(),
    ));

    // Reader loop: WebSocket -> session registry
    loop {
        let next = tokio::select! {
            next = next_frame(&mut ws_stream, limits.idle_timeout) => next,
            _ = &mut writer_handle => {
                debug!(player_id = %player_id, "Writer finished, closing connection");
                break;
            }
        };

        let result = match next {
            Frame::Received(result) => result,
            Frame::Closed => break,
            Frame::Idle => {
                info!(player_id = %player_id, "Connection idle, closing");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                handle_text(player_id, sessions, &rate_limiter, &direct_tx, &text);
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

enum Frame {
    Received(Result<Message, axum::Error>),
    Closed,
    Idle,
}

/// Wait for the next inbound frame, giving up after `idle_timeout`
async fn next_frame<St>(stream: &mut St, idle_timeout: Option<Duration>) -> Frame
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Frame::Idle,
        },
        None => stream.next().await,
    };
    next.map_or(Frame::Closed, Frame::Received)
}

/// Decode one text frame and apply it. Frames over the rate limit are
/// dropped before decoding.
fn handle_text(
    player_id: Uuid,
    sessions: &SessionRegistry,
    rate_limiter: &ConnectionRateLimiter,
    direct_tx: &mpsc::Sender<ServerMsg>,
    text: &str,
) {
    if !rate_limiter.check() {
        warn!(player_id = %player_id, "Rate limited input message");
        return;
    }

    let msg = match serde_json::from_str::<ClientMsg>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(player_id = %player_id, error = %e, "Failed to parse client message");
            let _ = direct_tx.try_send(ServerMsg::Error {
                code: "bad_message".to_string(),
                message: e.to_string(),
            });
            return;
        }
    };

    if let ClientMsg::Ping { t } = msg {
        let _ = direct_tx.try_send(ServerMsg::Pong { t });
        return;
    }

    if let Some(command) = msg.command() {
        sessions.set_command(player_id, command);
    }
}

async fn write_loop<S>(
    player_id: Uuid,
    mut ws_sink: S,
    mut events: broadcast::Receiver<ServerMsg>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    keepalive: Option<Duration>,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut keepalive = keepalive.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let msg = tokio::select! {
            biased;
            Some(msg) = direct_rx.recv() => msg,
            event = events.recv() => match event {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        player_id = %player_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                    // Positions recover with the next state update. A skipped
                    // join's colour is not resent.
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(player_id = %player_id, "Event channel closed");
                    break;
                }
            },
            _ = next_keepalive(&mut keepalive) => {
                if let Err(e) = ws_sink.send(Message::Ping(Vec::new())).await {
                    debug!(player_id = %player_id, error = %e, "Keepalive ping failed");
                    break;
                }
                continue;
            }
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Resolves on the next keepalive tick, never when keepalive is off
async fn next_keepalive(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Errors while writing a message to a socket
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Socket write failed: {0}")]
    Socket(#[from] axum::Error),
}

/// Send a message over WebSocket
async fn send_msg<S>(sink: &mut S, msg: &ServerMsg) -> Result<(), SendError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
