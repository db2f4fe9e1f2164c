//! Configuration types.

use crate::agent::InvokeRequest;
use crate::error::ConfigError;

const AGENT_ID_VAR: &str = "TRACEMINE_AGENT_ID";
const AGENT_ALIAS_ID_VAR: &str = "TRACEMINE_AGENT_ALIAS_ID";
const ENABLE_TRACE_VAR: &str = "TRACEMINE_ENABLE_TRACE";
const MAX_WORKERS_VAR: &str = "TRACEMINE_MAX_WORKERS";

/// Which agent to invoke, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Agent identifier on the runtime.
    pub agent_id: String,
    /// Alias (deployed version) of the agent.
    pub agent_alias_id: String,
    /// Ask the runtime to interleave trace payloads with answer chunks.
    /// Without traces no documents or chunks are ever discovered.
    pub enable_trace: bool,
}

impl AgentConfig {
    pub fn new(agent_id: impl Into<String>, agent_alias_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_alias_id: agent_alias_id.into(),
            enable_trace: true,
        }
    }

    /// Load from `TRACEMINE_AGENT_ID`, `TRACEMINE_AGENT_ALIAS_ID` and
    /// `TRACEMINE_ENABLE_TRACE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`AgentConfig::from_env`], but unset ids fall back to the given
    /// defaults. Invalid values are still errors.
    pub fn from_env_or(agent_id: &str, agent_alias_id: &str) -> Result<Self, ConfigError> {
        Self::from_lookup_or(|key| std::env::var(key).ok(), agent_id, agent_alias_id)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            agent_id: required(&lookup, AGENT_ID_VAR)?,
            agent_alias_id: required(&lookup, AGENT_ALIAS_ID_VAR)?,
            enable_trace: trace_flag(&lookup)?,
        })
    }

    fn from_lookup_or(
        lookup: impl Fn(&str) -> Option<String>,
        agent_id: &str,
        agent_alias_id: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            agent_id: optional(&lookup, AGENT_ID_VAR).unwrap_or_else(|| agent_id.to_string()),
            agent_alias_id: optional(&lookup, AGENT_ALIAS_ID_VAR)
                .unwrap_or_else(|| agent_alias_id.to_string()),
            enable_trace: trace_flag(&lookup)?,
        })
    }

    /// Build the invocation for one question in the given session.
    pub fn request(
        &self,
        session_id: impl Into<String>,
        input_text: impl Into<String>,
    ) -> InvokeRequest {
        InvokeRequest {
            agent_id: self.agent_id.clone(),
            agent_alias_id: self.agent_alias_id.clone(),
            session_id: session_id.into(),
            input_text: input_text.into(),
            enable_trace: self.enable_trace,
        }
    }
}

/// Worker pool settings for batch answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of concurrent workers, each owning one connection.
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_workers: 10 }
    }
}

impl BatchConfig {
    /// Load from `TRACEMINE_MAX_WORKERS`, falling back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match lookup(MAX_WORKERS_VAR) {
            Some(raw) => Ok(Self {
                max_workers: parse_workers(&raw)?,
            }),
            None => Ok(Self::default()),
        }
    }
}

/// Parse a worker count; zero is rejected.
pub fn parse_workers(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: MAX_WORKERS_VAR.to_string(),
            message: "must be at least 1".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key: MAX_WORKERS_VAR.to_string(),
            message: e.to_string(),
        }),
    }
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn trace_flag(lookup: &impl Fn(&str) -> Option<String>) -> Result<bool, ConfigError> {
    match lookup(ENABLE_TRACE_VAR) {
        Some(raw) => parse_bool(ENABLE_TRACE_VAR, &raw),
        None => Ok(true),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
