//! Turn orchestration: one question in, answer/documents/chunks out.
//!
//! `Turn` is the state machine shared by both consumption modes:
//!
//! ```text
//! Start ──opened──▶ Streaming ──exhausted──▶ Done
//!   │                   │
//!   └──────error────────┴──────error───────▶ Failed
//! ```
//!
//! `stream_turn` pushes deltas as they are discovered; `run_turn` only hands
//! back the final state. Neither ever returns an error: a failure becomes a
//! closing answer fragment and everything gathered before it is kept.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{AgentConnection, EventStream, InvokeRequest};
use crate::error::{AgentError, describe_failure};
use crate::events::{Classified, RawEvent, classify};
use crate::session::SessionState;

/// Lifecycle of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    Streaming,
    Done,
    Failed,
}

/// Caller-visible event emitted while a turn streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Newly arrived answer text.
    AnswerDelta(String),
    /// Document references seen for the first time this turn.
    Documents(Vec<String>),
    /// Retrieved chunks seen for the first time this turn.
    RetrievedChunks(Vec<String>),
}

impl TurnEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnswerDelta(_) => "answer_delta",
            Self::Documents(_) => "documents",
            Self::RetrievedChunks(_) => "retrieved_chunks",
        }
    }
}

/// Boxed stream of turn events. Finite and not restartable; dropping it
/// closes the underlying event source.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send>>;

/// State of one turn. The only writer of its `SessionState`.
#[derive(Debug)]
pub struct Turn {
    state: SessionState,
    phase: TurnPhase,
}

impl Default for Turn {
    fn default() -> Self {
        Self::new()
    }
}

impl Turn {
    pub fn new() -> Self {
        Self {
            state: SessionState::new(),
            phase: TurnPhase::Start,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The event source is open.
    pub fn opened(&mut self) {
        if self.phase == TurnPhase::Start {
            self.phase = TurnPhase::Streaming;
        }
    }

    /// Fold one raw event and return the deltas it produced, answer first.
    pub fn apply(&mut self, event: RawEvent) -> Vec<TurnEvent> {
        match classify(event) {
            Classified::TextFragment(text) => {
                self.state.fold_text(text.clone());
                vec![TurnEvent::AnswerDelta(text)]
            }
            Classified::TracePayload(payload) => {
                let discovered = self.state.fold_trace(&payload);
                let mut out = Vec::with_capacity(2);
                if !discovered.documents.is_empty() {
                    out.push(TurnEvent::Documents(discovered.documents));
                }
                if !discovered.chunks.is_empty() {
                    out.push(TurnEvent::RetrievedChunks(discovered.chunks));
                }
                out
            }
            Classified::Unrecognized => {
                debug!("Dropping unrecognized agent event");
                Vec::new()
            }
        }
    }

    /// Record a failure as the closing answer fragment and return its delta.
    pub fn fail(&mut self, error: &AgentError) -> TurnEvent {
        let description = describe_failure(error);
        let fragment = if self.state.answer().trim().is_empty() {
            description
        } else {
            format!("\n\n{description}")
        };
        self.state.fold_text(fragment.clone());
        self.phase = TurnPhase::Failed;
        TurnEvent::AnswerDelta(fragment)
    }

    /// The event source is exhausted.
    pub fn finish(&mut self) {
        if self.phase != TurnPhase::Failed {
            self.phase = TurnPhase::Done;
        }
    }

    pub fn into_state(self) -> SessionState {
        self.state
    }
}

async fn open(
    connection: &dyn AgentConnection,
    request: InvokeRequest,
    turn: &mut Turn,
) -> Result<EventStream, TurnEvent> {
    let session_id = request.session_id.clone();
    match connection.invoke(request).await {
        Ok(events) => {
            turn.opened();
            Ok(events)
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Failed to open agent event stream");
            Err(turn.fail(&e))
        }
    }
}

fn log_outcome(session_id: &str, turn: &Turn) {
    let state = turn.state();
    info!(
        session_id = %session_id,
        phase = ?turn.phase(),
        answer_chars = state.answer().chars().count(),
        documents = state.documents().len(),
        chunks = state.chunks().len(),
        "Turn finished"
    );
}

/// Streaming mode: emit deltas as soon as each event has been folded.
pub fn stream_turn(connection: Arc<dyn AgentConnection>, request: InvokeRequest) -> TurnStream {
    Box::pin(async_stream::stream! {
        let session_id = request.session_id.clone();
        let mut turn = Turn::new();

        match open(&*connection, request, &mut turn).await {
            Err(failure) => yield failure,
            Ok(mut events) => {
                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            for delta in turn.apply(event) {
                                yield delta;
                            }
                        }
                        Err(e) => {
                            warn!(session_id = %session_id, error = %e, "Agent event stream failed");
                            yield turn.fail(&e);
                            break;
                        }
                    }
                }
                turn.finish();
            }
        }

        log_outcome(&session_id, &turn);
    })
}

/// Batch mode: drain the event source and return only the final state.
pub async fn run_turn(connection: &dyn AgentConnection, request: InvokeRequest) -> SessionState {
    let session_id = request.session_id.clone();
    let mut turn = Turn::new();

    if let Ok(mut events) = open(connection, request, &mut turn).await {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    turn.apply(event);
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Agent event stream failed");
                    turn.fail(&e);
                    break;
                }
            }
        }
        turn.finish();
    }

    log_outcome(&session_id, &turn);
    turn.into_state()
}
