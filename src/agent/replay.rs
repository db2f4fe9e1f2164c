//! Replay runtime: serves recorded agent exchanges from a JSON Lines file.
//!
//! Each non-blank line holds one exchange:
//!
//! ```json
//! {"input": "What is X?", "events": [{"chunk": {"bytes": "SGk="}}, {"trace": {}}], "error": null}
//! ```
//!
//! `error`, when present, fails the stream after the recorded events.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{AgentConnection, AgentRuntime, EventStream, InvokeRequest};
use crate::error::{AgentError, ReplayError};
use crate::events::RawEvent;

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub input: String,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Recording {
    pub fn new(input: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            input: input.into(),
            events,
            error: None,
        }
    }

    /// Fail the stream with `reason` once the recorded events are exhausted.
    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self
    }
}

/// Offline runtime that answers from recordings keyed by input text.
#[derive(Debug, Clone, Default)]
pub struct ReplayRuntime {
    recordings: Arc<HashMap<String, Recording>>,
}

impl ReplayRuntime {
    pub fn from_recordings(recordings: impl IntoIterator<Item = Recording>) -> Self {
        let recordings = recordings
            .into_iter()
            .map(|r| (r.input.clone(), r))
            .collect();
        Self {
            recordings: Arc::new(recordings),
        }
    }

    /// Parse a transcript. Duplicate inputs are rejected.
    pub fn parse(contents: &str) -> Result<Self, ReplayError> {
        let mut recordings = HashMap::new();
        for (idx, line) in contents.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let recording: Recording =
                serde_json::from_str(line).map_err(|source| ReplayError::Json {
                    line: line_no,
                    source,
                })?;
            if recordings.contains_key(&recording.input) {
                return Err(ReplayError::DuplicateInput {
                    line: line_no,
                    input: recording.input,
                });
            }
            recordings.insert(recording.input.clone(), recording);
        }
        Ok(Self {
            recordings: Arc::new(recordings),
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let runtime = Self::parse(&contents)?;
        info!(
            path = %path.display(),
            recordings = runtime.len(),
            "Loaded replay transcript"
        );
        Ok(runtime)
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    /// Recorded inputs, sorted.
    pub fn inputs(&self) -> Vec<&str> {
        let mut inputs: Vec<&str> = self.recordings.keys().map(String::as_str).collect();
        inputs.sort_unstable();
        inputs
    }
}

#[async_trait]
impl AgentRuntime for ReplayRuntime {
    fn name(&self) -> &str {
        "replay"
    }

    async fn connect(&self) -> Result<Arc<dyn AgentConnection>, AgentError> {
        Ok(Arc::new(ReplayConnection {
            recordings: Arc::clone(&self.recordings),
        }))
    }
}

/// Connection handed out by [`ReplayRuntime`].
struct ReplayConnection {
    recordings: Arc<HashMap<String, Recording>>,
}

#[async_trait]
impl AgentConnection for ReplayConnection {
    async fn invoke(&self, request: InvokeRequest) -> Result<EventStream, AgentError> {
        let recording = self.recordings.get(&request.input_text).ok_or_else(|| {
            AgentError::connection(format!(
                "no recorded response for input '{}'",
                request.input_text
            ))
        })?;
        debug!(
            session_id = %request.session_id,
            events = recording.events.len(),
            "Replaying recorded exchange"
        );

        // Without tracing the runtime only sends answer chunks.
        let mut items: Vec<Result<RawEvent, AgentError>> = recording
            .events
            .iter()
            .filter(|e| request.enable_trace || e.trace.is_none())
            .cloned()
            .map(Ok)
            .collect();
        if let Some(reason) = &recording.error {
            items.push(Err(AgentError::stream(reason.clone())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}
