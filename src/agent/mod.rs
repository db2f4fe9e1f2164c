//! Agent runtime boundary and turn orchestration.
//!
//! - `AgentRuntime` hands out connections; `AgentConnection` opens one event
//!   source per question
//! - `turn` drives a single question through classify → mine → accumulate
//! - `replay` is an offline runtime that plays back recorded exchanges

pub mod replay;
pub mod turn;

pub use replay::ReplayRuntime;
pub use turn::{Turn, TurnEvent, TurnPhase, TurnStream, run_turn, stream_turn};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::events::RawEvent;

/// Parameters for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
    pub input_text: String,
    pub enable_trace: bool,
}

/// Lazy, finite stream of raw events for one invocation.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, AgentError>> + Send>>;

/// An open handle to the agent runtime. Reused across questions by its owner.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Open the event source for one question.
    async fn invoke(&self, request: InvokeRequest) -> Result<EventStream, AgentError>;
}

/// Factory for connections. Each batch worker calls `connect` at most once
/// per successful connection and keeps the result to itself.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runtime name, for logging.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<Arc<dyn AgentConnection>, AgentError>;
}
