//! Batch pool member.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::agent::AgentRuntime;
use crate::batch::{AnswerRecord, QuestionAnswerer};
use crate::config::AgentConfig;
use crate::error::{AgentError, describe_failure};

/// Answer recorded for a question whose worker gave up on it.
pub(crate) const STOPPED_BEFORE_ANSWERING: &str = "Error: worker stopped before answering";

/// A question waiting for a worker, tagged with its input position.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub index: usize,
    pub question: String,
}

/// Owns at most one connection, created on first use and kept for every
/// later question this worker picks up. Never shared with other workers.
pub(crate) struct Worker {
    id: usize,
    runtime: Arc<dyn AgentRuntime>,
    agent: Arc<AgentConfig>,
    answerer: Option<QuestionAnswerer>,
}

impl Worker {
    pub fn new(id: usize, runtime: Arc<dyn AgentRuntime>, agent: Arc<AgentConfig>) -> Self {
        Self {
            id,
            runtime,
            agent,
            answerer: None,
        }
    }

    /// Connect on first use. A failed connect is not cached, so the next
    /// question retries it.
    async fn answerer(&mut self) -> Result<&QuestionAnswerer, AgentError> {
        let answerer = match self.answerer.take() {
            Some(existing) => existing,
            None => {
                let connection = self.runtime.connect().await?;
                debug!(worker = self.id, runtime = self.runtime.name(), "Worker connected");
                QuestionAnswerer::new(connection, Arc::clone(&self.agent))
            }
        };
        Ok(self.answerer.insert(answerer))
    }

    async fn answer(&mut self, job: &Job) -> AnswerRecord {
        let id = self.id;
        match self.answerer().await {
            Ok(answerer) => answerer.answer_question(&job.question).await,
            Err(e) => {
                warn!(worker = id, index = job.index, error = %e, "Worker could not connect");
                AnswerRecord::failed(describe_failure(&e))
            }
        }
    }

    /// Pull jobs until the queue is drained or the collector goes away.
    pub async fn run(
        mut self,
        queue: Arc<Mutex<mpsc::Receiver<Job>>>,
        results: mpsc::UnboundedSender<(usize, AnswerRecord)>,
    ) {
        loop {
            let next = queue.lock().await.recv().await;
            let Some(job) = next else {
                break;
            };

            debug!(worker = self.id, index = job.index, "Answering question");
            let record = match AssertUnwindSafe(self.answer(&job)).catch_unwind().await {
                Ok(record) => record,
                Err(_) => {
                    warn!(worker = self.id, index = job.index, "Question panicked; reconnecting");
                    self.answerer = None;
                    AnswerRecord::failed(STOPPED_BEFORE_ANSWERING)
                }
            };
            if results.send((job.index, record)).is_err() {
                break;
            }
        }
        debug!(worker = self.id, "Worker finished");
    }
}
