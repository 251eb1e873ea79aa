//! # Tuner WebSocket Handler
//!
//! Streams microphone audio in and pitch readings out over `/ws/tuner`.
//! Each connection is one actix actor owning one [`TunerSession`].
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Server sends `{"type":"hello",...}` before anything else
//! 2. **Audio Streaming**: Client sends binary frames of 16-bit LE mono PCM at 44.1kHz
//! 3. **Results**: Server answers every binary frame with exactly one `pitch` message
//! 4. **Errors**: Transport failures are reported with an `error` message, then the connection closes
//!
//! A binary message split into continuation frames is reassembled first and
//! answered once, as if it had arrived in a single frame.
//!
//! ## Ordering:
//! The actor handles one inbound frame at a time and analyses it inline, so
//! results leave in the order their chunks arrived. Separate connections run
//! on separate actors and never wait on each other.

use crate::audio::session::{FrameSink, SinkError, TunerHandler, TunerSession};
use crate::config::AppConfig;
use crate::state::AppState;

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::web::{Bytes, BytesMut};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Endpoint path clients connect to.
pub const TUNER_WS_PATH: &str = "/ws/tuner";

/// Close reason sent when a client sends a text frame.
const TEXT_NOT_SUPPORTED: &str = "Text messages not supported";

/// WebSocket actor for one tuner connection.
pub struct TunerWebSocket {
    /// Lifecycle and message framing for this connection
    session: TunerSession,

    /// Shared counters and the session registry
    app_state: web::Data<AppState>,

    /// Last time the client showed signs of life
    last_heartbeat: Instant,

    /// Fragments of a binary message still waiting for its last frame
    partial_message: Option<BytesMut>,

    /// Largest accepted message, whole or reassembled
    max_message_bytes: usize,

    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl TunerWebSocket {
    pub fn new(session_id: String, app_state: web::Data<AppState>, config: &AppConfig) -> Self {
        Self {
            session: TunerSession::new(session_id),
            app_state,
            last_heartbeat: Instant::now(),
            partial_message: None,
            max_message_bytes: config.tuner.max_frame_bytes,
            heartbeat_interval: Duration::from_secs(config.tuner.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.tuner.client_timeout_secs),
        }
    }

    /// Ping the client periodically and drop it once it goes quiet.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let client_timeout = self.client_timeout;

        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > client_timeout {
                warn!(
                    session_id = %act.session.session_id(),
                    "Tuner client heartbeat timed out, closing connection"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Report a transport failure to the client and end the session.
    fn fail_transport(&mut self, reason: &str, ctx: &mut ws::WebsocketContext<Self>) {
        self.app_state.record_transport_error();
        self.partial_message = None;
        self.session.on_transport_error(reason, &mut ContextSink::new(ctx));
        ctx.stop();
    }

    /// Close with 1003; only binary audio is accepted.
    fn reject_text(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        warn!(session_id = %self.session.session_id(), "Rejecting text frame");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Unsupported,
            description: Some(TEXT_NOT_SUPPORTED.to_string()),
        }));
        ctx.stop();
    }

    /// Collect one continuation frame; a finished binary message is analysed.
    fn handle_fragment(&mut self, item: Item, ctx: &mut ws::WebsocketContext<Self>) {
        let (data, is_last) = match item {
            Item::FirstText(_) => {
                self.reject_text(ctx);
                return;
            }
            Item::FirstBinary(data) => {
                self.partial_message = Some(BytesMut::new());
                (data, false)
            }
            Item::Continue(data) => (data, false),
            Item::Last(data) => (data, true),
        };

        let Some(buffer) = self.partial_message.as_mut() else {
            debug!(
                session_id = %self.session.session_id(),
                "Ignoring continuation frame without a started message"
            );
            return;
        };

        if buffer.len() + data.len() > self.max_message_bytes {
            let reason = format!(
                "Fragmented message exceeds {} bytes",
                self.max_message_bytes
            );
            self.fail_transport(&reason, ctx);
            return;
        }
        buffer.extend_from_slice(&data);

        if is_last {
            let message: Bytes = self
                .partial_message
                .take()
                .map(BytesMut::freeze)
                .unwrap_or_default();
            self.handle_chunk(&message, ctx);
        }
    }

    /// Analyse one binary message and send its result.
    fn handle_chunk(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let result = self.session.on_binary_chunk(data, &mut ContextSink::new(ctx));
        match result {
            Ok(Some(reading)) => self.app_state.record_chunk(reading.is_detected()),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    session_id = %self.session.session_id(),
                    error = %err,
                    "Could not deliver pitch result, closing connection"
                );
                ctx.stop();
            }
        }
    }
}

/// [`FrameSink`] over the actor's WebSocket context.
struct ContextSink<'a> {
    ctx: &'a mut ws::WebsocketContext<TunerWebSocket>,
}

impl<'a> ContextSink<'a> {
    fn new(ctx: &'a mut ws::WebsocketContext<TunerWebSocket>) -> Self {
        Self { ctx }
    }
}

impl FrameSink for ContextSink<'_> {
    fn send_text(&mut self, text: String) -> Result<(), SinkError> {
        if !self.is_open() {
            return Err(SinkError::Closed);
        }
        self.ctx.text(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        matches!(self.ctx.state(), ActorState::Started | ActorState::Running)
    }
}

impl Actor for TunerWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Runs before any inbound frame is handled, so the greeting always goes first.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.app_state.record_session_opened();

        let greeting = self.session.on_open(&mut ContextSink::new(ctx));
        if let Err(err) = greeting {
            warn!(
                session_id = %self.session.session_id(),
                error = %err,
                "Could not send greeting, closing connection"
            );
            ctx.stop();
            return;
        }

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let session_id = self.session.session_id().to_string();
        if let Some(info) = self.app_state.sessions.get(&session_id) {
            let connected_secs = (chrono::Utc::now() - info.connected_at).num_seconds();
            info!(
                session_id = %session_id,
                peer = ?info.peer_addr,
                phase = self.session.phase().as_str(),
                connected_secs,
                "Tuner WebSocket disconnected"
            );
        }

        self.session.on_close();
        self.app_state.sessions.remove(&session_id);
    }
}

/// Handle incoming WebSocket frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TunerWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                self.handle_chunk(&data, ctx);
            }
            Ok(ws::Message::Text(_)) => self.reject_text(ctx),
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session.session_id(), ?reason, "Tuner client closed connection");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => {
                self.last_heartbeat = Instant::now();
                self.handle_fragment(item, ctx);
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => self.fail_transport(&err.to_string(), ctx),
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Reserves a slot in the session registry, then upgrades the connection and
/// hands it to a [`TunerWebSocket`] actor. A full registry answers 503 and no
/// session is created.
pub async fn tuner_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let peer_addr = req.peer_addr();

    let session_id = app_state.sessions.register(peer_addr).map_err(|err| {
        warn!(peer = ?peer_addr, error = %err, "Refusing tuner connection");
        err
    })?;

    info!(session_id = %session_id, peer = ?peer_addr, "New tuner WebSocket connection");

    let config = app_state.get_config();
    let websocket = TunerWebSocket::new(session_id.clone(), app_state.clone(), &config);

    ws::WsResponseBuilder::new(websocket, &req, stream)
        .frame_size(config.tuner.max_frame_bytes)
        .start()
        .map_err(|err| {
            app_state.sessions.remove(&session_id);
            err
        })
}
