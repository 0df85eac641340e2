//! Connection handlers for Huddle server.
//!
//! This module handles the connection lifecycle: the authenticated upgrade,
//! the per-connection event loop and teardown.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use huddle_core::auth::bearer_token;
use huddle_core::{
    authenticate, outbound_queue, AuthError, Authenticator, Coordinator, Identity, MemoryStore,
    RoomStore,
};
use huddle_protocol::{codec, ClientEvent, ConnectionId, Encoded, ServerEvent, WireFormat};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The session coordinator.
    pub coordinator: Coordinator,
    /// Handshake authenticator.
    pub auth: Arc<dyn Authenticator>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state with an in-memory store seeded from the config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(MemoryStore::with_rooms(config.seed_rooms()));
        let auth = Arc::new(config.token_table());
        Self::with_parts(config, store, auth)
    }

    /// Create app state around an existing store and authenticator.
    #[must_use]
    pub fn with_parts(
        config: Config,
        store: Arc<dyn RoomStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            coordinator: Coordinator::with_config(store, config.coordinator_config()),
            auth,
            config,
        }
    }
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config))).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.coordinator.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connection_count,
        "rooms": stats.room_count,
    }))
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Bearer token. Takes precedence over the `Authorization` header.
    pub token: Option<String>,
    /// Wire format, `json` or `msgpack`.
    pub format: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Authentication runs here, before the upgrade, so a rejected credential
/// never reaches the coordinator.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.coordinator.registry().len() >= state.config.limits.max_connections {
        warn!("Connection refused, server at capacity");
        metrics::record_rejection("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server at capacity").into_response();
    }

    let format = match params.format.as_deref() {
        None => state.config.transport.default_format,
        Some(name) => match name.parse::<WireFormat>() {
            Ok(format) => format,
            Err(e) => {
                metrics::record_rejection("format");
                return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
            }
        },
    };

    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);
    let token = params.token.as_deref().or(header_token);

    let identity = match authenticate(state.auth.as_ref(), token).await {
        Ok(identity) => identity,
        Err(AuthError::InvalidToken) => {
            metrics::record_rejection("auth");
            return (StatusCode::UNAUTHORIZED, "Invalid credential").into_response();
        }
        Err(e) => {
            error!(error = %e, "Authentication backend failed");
            metrics::record_error("auth_backend");
            return (StatusCode::SERVICE_UNAVAILABLE, "Authentication unavailable")
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, state, identity, format))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    format: WireFormat,
) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let coordinator = &state.coordinator;
    let (outbound, mut inbox) = outbound_queue();
    let connection_id = coordinator.connect(identity, outbound);

    debug!(connection = %connection_id, ?format, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let max_message_size = state.config.limits.max_message_size;

    // Read buffer for partial MessagePack frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    'session: loop {
        tokio::select! {
            biased;

            // Events queued for this connection by the coordinator
            Some(event) = inbox.recv() => {
                if send_event(&mut sender, &event, format).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_message_size {
                            close_oversized(&mut sender, &connection_id, text.len()).await;
                            break;
                        }
                        match codec::decode_json::<ClientEvent>(&text) {
                            Ok(event) => dispatch(coordinator, &connection_id, event, text.len()).await,
                            Err(e) => reject_malformed(coordinator, &connection_id, &e),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if data.len() > max_message_size {
                            close_oversized(&mut sender, &connection_id, data.len()).await;
                            break;
                        }
                        read_buffer.extend_from_slice(&data);

                        loop {
                            if let Some(length) = codec::frame_len(&read_buffer) {
                                if length > max_message_size {
                                    close_oversized(&mut sender, &connection_id, length).await;
                                    break 'session;
                                }
                            }
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    dispatch(coordinator, &connection_id, event, data.len()).await;
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    reject_malformed(coordinator, &connection_id, &e);
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    coordinator.disconnect(&connection_id).await;
    metrics::set_active_rooms(coordinator.stats().room_count);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Hand one decoded event to the coordinator.
async fn dispatch(
    coordinator: &Coordinator,
    connection_id: &ConnectionId,
    event: ClientEvent,
    bytes: usize,
) {
    let start = Instant::now();
    metrics::record_event(event.name(), bytes, "inbound");

    coordinator.handle(connection_id, event).await;

    metrics::record_handle_time(start.elapsed().as_secs_f64());
    metrics::set_active_rooms(coordinator.stats().room_count);
}

fn reject_malformed(
    coordinator: &Coordinator,
    connection_id: &ConnectionId,
    error: &huddle_protocol::ProtocolError,
) {
    debug!(connection = %connection_id, error = %error, "Malformed event");
    metrics::record_error("decode");
    coordinator
        .registry()
        .send(connection_id, Arc::new(ServerEvent::error("Malformed event")));
}

async fn close_oversized(
    sender: &mut SplitSink<WebSocket, Message>,
    connection_id: &ConnectionId,
    size: usize,
) {
    warn!(connection = %connection_id, size, "Oversized message, closing connection");
    metrics::record_error("oversized");

    let frame = CloseFrame {
        code: close_code::SIZE,
        reason: "Message too large".into(),
    };
    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
        debug!(connection = %connection_id, error = %e, "Failed to send close frame");
    }
}

/// Encode and send one event.
///
/// An event that cannot be encoded is logged and skipped; only a failed
/// socket write is returned as an error.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
    format: WireFormat,
) -> Result<()> {
    let encoded = match codec::encode(event, format) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(event = event.name(), error = %e, "Failed to encode event");
            metrics::record_error("encode");
            return Ok(());
        }
    };

    metrics::record_event(event.name(), encoded.len(), "outbound");
    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
