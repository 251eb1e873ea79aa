//! # Tuner Session Management
//!
//! One [`TunerSession`] exists per client connection. It carries no analysis
//! state between chunks; it only routes lifecycle events to the pipeline and
//! frames the results for the client.
//!
//! ## Session Lifecycle:
//! 1. **Opening**: Connection established, greeting not yet sent
//! 2. **Active**: Greeting sent, binary chunks are analysed in arrival order
//! 3. **Erroring**: Transport reported a failure, best-effort error message
//! 4. **Closed**: Terminal, further events are ignored
//!
//! ## Transport Independence:
//! Sessions write through the [`FrameSink`] trait, so the same state machine
//! drives the actix WebSocket actor and in-memory sinks in tests.

use crate::audio::{analyze_chunk, TunerReading};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Greeting sent when a connection opens.
pub const HELLO_MESSAGE: &str = "Tuner WS connected";

/// Outbound messages, serialized as JSON text frames.
///
/// ## Wire Shapes:
/// ```json
/// {"type":"hello","message":"Tuner WS connected"}
/// {"type":"pitch","frequency":440.1,"note":"A4","cents":0.4}
/// {"type":"error","message":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TunerMessage {
    Hello { message: String },
    Pitch { frequency: f64, note: String, cents: f64 },
    Error { message: String },
}

impl TunerMessage {
    pub fn hello() -> Self {
        TunerMessage::Hello {
            message: HELLO_MESSAGE.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, SinkError> {
        serde_json::to_string(self).map_err(|e| SinkError::Encode(e.to_string()))
    }
}

impl From<&TunerReading> for TunerMessage {
    fn from(reading: &TunerReading) -> Self {
        TunerMessage::Pitch {
            frequency: reading.frequency,
            note: reading.note.note.clone(),
            cents: reading.note.cents,
        }
    }
}

/// Failure to hand a frame to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The connection is no longer writable
    Closed,
    /// The message could not be serialized
    Encode(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed => write!(f, "connection closed"),
            SinkError::Encode(msg) => write!(f, "encode failed: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

/// Outgoing half of a client connection.
pub trait FrameSink {
    /// Queue a UTF-8 text frame.
    fn send_text(&mut self, text: String) -> Result<(), SinkError>;

    /// Whether the connection still accepts frames.
    fn is_open(&self) -> bool;
}

/// Events a connection delivers to its session.
pub trait TunerHandler {
    fn on_open(&mut self, sink: &mut dyn FrameSink) -> Result<(), SinkError>;

    /// Analyse one chunk and send its result. Returns `Ok(None)` when the
    /// session is not accepting chunks.
    fn on_binary_chunk(
        &mut self,
        chunk: &[u8],
        sink: &mut dyn FrameSink,
    ) -> Result<Option<TunerReading>, SinkError>;

    /// Report a transport failure to the client. Never fails.
    fn on_transport_error(&mut self, reason: &str, sink: &mut dyn FrameSink);

    fn on_close(&mut self);
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Opening,
    Active,
    Erroring,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Opening => "opening",
            SessionPhase::Active => "active",
            SessionPhase::Erroring => "erroring",
            SessionPhase::Closed => "closed",
        }
    }
}

/// Message-routing context for one connection.
#[derive(Debug)]
pub struct TunerSession {
    session_id: String,
    phase: SessionPhase,
    chunks_processed: u64,
    pitches_detected: u64,
}

impl TunerSession {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Opening,
            chunks_processed: 0,
            pitches_detected: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn chunks_processed(&self) -> u64 {
        self.chunks_processed
    }

    pub fn pitches_detected(&self) -> u64 {
        self.pitches_detected
    }

    fn send(&self, sink: &mut dyn FrameSink, message: &TunerMessage) -> Result<(), SinkError> {
        let json = message.to_json()?;
        sink.send_text(json)
    }
}

impl TunerHandler for TunerSession {
    fn on_open(&mut self, sink: &mut dyn FrameSink) -> Result<(), SinkError> {
        if self.phase != SessionPhase::Opening {
            return Ok(());
        }
        self.send(sink, &TunerMessage::hello())?;
        self.phase = SessionPhase::Active;
        info!(session_id = %self.session_id, "Tuner session active");
        Ok(())
    }

    fn on_binary_chunk(
        &mut self,
        chunk: &[u8],
        sink: &mut dyn FrameSink,
    ) -> Result<Option<TunerReading>, SinkError> {
        if self.phase != SessionPhase::Active {
            debug!(
                session_id = %self.session_id,
                phase = self.phase.as_str(),
                bytes = chunk.len(),
                "Dropping chunk outside active phase"
            );
            return Ok(None);
        }

        let reading = analyze_chunk(chunk);
        self.chunks_processed += 1;
        if reading.is_detected() {
            self.pitches_detected += 1;
        }

        debug!(
            session_id = %self.session_id,
            bytes = chunk.len(),
            frequency = reading.frequency,
            note = %reading.note.note,
            cents = reading.note.cents,
            "Chunk analysed"
        );

        self.send(sink, &TunerMessage::from(&reading))?;
        Ok(Some(reading))
    }

    fn on_transport_error(&mut self, reason: &str, sink: &mut dyn FrameSink) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Erroring;
        warn!(session_id = %self.session_id, reason = %reason, "Tuner transport error");

        if !sink.is_open() {
            return;
        }
        let message = TunerMessage::Error {
            message: reason.to_string(),
        };
        if let Err(err) = self.send(sink, &message) {
            debug!(session_id = %self.session_id, error = %err, "Error report not delivered");
        }
    }

    fn on_close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Closed;
        info!(
            session_id = %self.session_id,
            chunks = self.chunks_processed,
            detected = self.pitches_detected,
            "Tuner session closed"
        );
    }
}

/// Bookkeeping entry for a connected client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub peer_addr: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Snapshot of the registry for the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub oldest_connected_at: Option<DateTime<Utc>>,
}

/// Concurrency-safe set of open tuner sessions.
///
/// ## Thread Safety:
/// Actix runs each connection on whichever worker thread accepted it, so the
/// map lives behind `Arc<RwLock<...>>` and clones share the same registry.
/// Only bookkeeping lives here; sessions never share analysis data.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionInfo>>>,
    max_sessions: Arc<RwLock<usize>>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions: Arc::new(RwLock::new(max_sessions)),
        }
    }

    /// Reserve a slot for a new connection and return its session ID.
    ///
    /// Fails with [`AppError::SessionLimit`] when the registry is full.
    pub fn register(&self, peer_addr: Option<SocketAddr>) -> Result<String, AppError> {
        let max_sessions = self.max_sessions();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        if sessions.len() >= max_sessions {
            return Err(AppError::SessionLimit(format!(
                "Maximum concurrent tuner sessions ({}) reached",
                max_sessions
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        sessions.insert(
            session_id.clone(),
            SessionInfo {
                session_id: session_id.clone(),
                peer_addr: peer_addr.map(|addr| addr.to_string()),
                connected_at: Utc::now(),
            },
        );

        Ok(session_id)
    }

    /// Release a session's slot. Returns whether it was registered.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id).is_some()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }

    pub fn max_sessions(&self) -> usize {
        *self.max_sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change capacity for future registrations; open sessions are kept.
    pub fn set_max_sessions(&self, max_sessions: usize) {
        *self.max_sessions.write().unwrap_or_else(PoisonError::into_inner) = max_sessions;
    }

    pub fn summary(&self) -> RegistrySummary {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        RegistrySummary {
            active_sessions: sessions.len(),
            max_sessions: self.max_sessions(),
            oldest_connected_at: sessions.values().map(|info| info.connected_at).min(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm_sine;
    use serde_json::Value;

    /// In-memory sink recording every frame it accepts.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<String>,
        closed: bool,
        reject_sends: bool,
    }

    impl FrameSink for RecordingSink {
        fn send_text(&mut self, text: String) -> Result<(), SinkError> {
            if self.closed || self.reject_sends {
                return Err(SinkError::Closed);
            }
            self.frames.push(text);
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed
        }
    }

    impl RecordingSink {
        fn messages(&self) -> Vec<Value> {
            self.frames
                .iter()
                .map(|frame| serde_json::from_str(frame).unwrap())
                .collect()
        }
    }

    fn active_session(sink: &mut RecordingSink) -> TunerSession {
        let mut session = TunerSession::new("test-session".to_string());
        session.on_open(sink).unwrap();
        session
    }

    #[test]
    fn test_message_wire_shapes() {
        let hello = serde_json::to_value(TunerMessage::hello()).unwrap();
        assert_eq!(hello, serde_json::json!({"type": "hello", "message": "Tuner WS connected"}));

        let pitch = serde_json::to_value(TunerMessage::Pitch {
            frequency: 0.0,
            note: "--".to_string(),
            cents: 0.0,
        })
        .unwrap();
        assert_eq!(pitch, serde_json::json!({"type": "pitch", "frequency": 0.0, "note": "--", "cents": 0.0}));

        let error = serde_json::to_value(TunerMessage::Error { message: "boom".to_string() }).unwrap();
        assert_eq!(error, serde_json::json!({"type": "error", "message": "boom"}));
    }

    #[test]
    fn test_open_sends_hello_and_activates() {
        let mut sink = RecordingSink::default();
        let session = active_session(&mut sink);

        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(sink.messages(), vec![serde_json::json!({"type": "hello", "message": HELLO_MESSAGE})]);
    }

    #[test]
    fn test_hello_precedes_first_pitch() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);
        session.on_binary_chunk(&pcm_sine(440.0, 0.3, 2048), &mut sink).unwrap();

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["type"], "hello");
        assert_eq!(messages[1]["type"], "pitch");
    }

    #[test]
    fn test_chunk_before_open_is_ignored() {
        let mut sink = RecordingSink::default();
        let mut session = TunerSession::new("early".to_string());

        let result = session.on_binary_chunk(&pcm_sine(440.0, 0.3, 2048), &mut sink).unwrap();
        assert!(result.is_none());
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_results_follow_arrival_order() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);

        let chunks = [
            pcm_sine(440.0, 0.3, 2048),
            vec![0u8; 4096],
            pcm_sine(82.4, 0.3, 2048),
            vec![0x11u8; 100],
        ];
        for chunk in &chunks {
            session.on_binary_chunk(chunk, &mut sink).unwrap();
        }

        let notes: Vec<String> = sink.messages()[1..]
            .iter()
            .map(|m| m["note"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(notes, vec!["A4", "--", "E2", "--"]);
        assert_eq!(session.chunks_processed(), 4);
        assert_eq!(session.pitches_detected(), 2);
    }

    #[test]
    fn test_pitch_message_for_a4() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);
        let reading = session
            .on_binary_chunk(&pcm_sine(440.0, 0.3, 2048), &mut sink)
            .unwrap()
            .unwrap();

        assert!((reading.frequency - 440.0).abs() < 2.0);
        let message = &sink.messages()[1];
        assert_eq!(message["note"], "A4");
        assert!(message["cents"].as_f64().unwrap().abs() < 10.0);
    }

    #[test]
    fn test_transport_error_is_reported() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);
        session.on_transport_error("frame too large", &mut sink);

        assert_eq!(session.phase(), SessionPhase::Erroring);
        assert_eq!(
            sink.messages().last().unwrap(),
            &serde_json::json!({"type": "error", "message": "frame too large"})
        );
    }

    #[test]
    fn test_transport_error_send_failure_is_swallowed() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);

        sink.reject_sends = true;
        session.on_transport_error("reset by peer", &mut sink);
        assert_eq!(sink.frames.len(), 1);

        sink.closed = true;
        session.on_transport_error("reset by peer", &mut sink);
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn test_failed_result_send_surfaces_to_caller() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);
        sink.closed = true;

        let result = session.on_binary_chunk(&pcm_sine(440.0, 0.3, 2048), &mut sink);
        assert_eq!(result.unwrap_err(), SinkError::Closed);
    }

    #[test]
    fn test_closed_session_ignores_events() {
        let mut sink = RecordingSink::default();
        let mut session = active_session(&mut sink);
        session.on_close();
        assert_eq!(session.phase(), SessionPhase::Closed);

        assert!(session.on_binary_chunk(&pcm_sine(440.0, 0.3, 2048), &mut sink).unwrap().is_none());
        session.on_transport_error("late", &mut sink);
        session.on_open(&mut sink).unwrap();

        assert_eq!(sink.frames.len(), 1);
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[test]
    fn test_registry_enforces_capacity() {
        let registry = SessionRegistry::new(2);
        let first = registry.register(None).unwrap();
        let _second = registry.register(Some("127.0.0.1:5000".parse().unwrap())).unwrap();

        assert!(matches!(registry.register(None), Err(AppError::SessionLimit(_))));
        assert_eq!(registry.active_count(), 2);

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first));
        assert!(registry.register(None).is_ok());
    }

    #[test]
    fn test_registry_is_shared_between_clones() {
        let registry = SessionRegistry::new(4);
        let clone = registry.clone();
        let id = clone.register(Some("10.0.0.2:4000".parse().unwrap())).unwrap();

        let info = registry.get(&id).unwrap();
        assert_eq!(info.peer_addr.as_deref(), Some("10.0.0.2:4000"));
        assert_eq!(registry.summary().active_sessions, 1);
        assert_eq!(registry.summary().max_sessions, 4);
    }

    #[test]
    fn test_registry_concurrent_registration() {
        let registry = SessionRegistry::new(16);
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(None).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 16);
        assert_eq!(registry.active_count(), 16);
    }
}
