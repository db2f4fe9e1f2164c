//! Error types for tracemine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by the agent runtime while opening or draining an event source.
///
/// None of these escape a turn: the orchestrator turns them into answer text
/// via [`describe_failure`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// The event source could not be opened.
    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    /// The agent service rejected the invocation.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The event source failed after it was opened.
    #[error("Event stream failed: {reason}")]
    Stream { reason: String },
}

impl AgentError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    pub fn stream(reason: impl Into<String>) -> Self {
        Self::Stream {
            reason: reason.into(),
        }
    }
}

/// Render an agent failure as the text that lands in the answer channel.
pub fn describe_failure(error: &AgentError) -> String {
    match error {
        AgentError::Service { .. } => format!("ClientError: {error}"),
        other => format!("Error: {other}"),
    }
}

/// Errors loading recorded transcripts.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transcript at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate recording for input at line {line}: {input}")]
    DuplicateInput { line: usize, input: String },
}

/// Result type alias for tracemine.
pub type Result<T> = std::result::Result<T, Error>;
