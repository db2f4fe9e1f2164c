//! Batch answering: many independent questions over a bounded worker pool.
//!
//! - `QuestionAnswerer`: one connection, one question at a time
//! - `worker`: a pool member that lazily connects and keeps its connection
//! - `BatchRunner`: fans questions out and puts answers back in input order

mod worker;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{AgentConnection, AgentRuntime, TurnEvent, run_turn};
use crate::config::{AgentConfig, BatchConfig};
use crate::session::{SessionState, join_flat};

use worker::{Job, Worker};

/// Final answer to one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    pub answer: String,
    pub documents: Vec<String>,
    pub chunks: Vec<String>,
}

impl AnswerRecord {
    /// Take the accumulated state; the answer is trimmed.
    pub fn from_state(state: SessionState) -> Self {
        let (answer, documents, chunks) = state.into_parts();
        Self {
            answer: answer.trim().to_string(),
            documents,
            chunks,
        }
    }

    /// Rebuild the record from a turn's streamed deltas; the answer is trimmed.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a TurnEvent>) -> Self {
        let mut record = Self::default();
        for event in events {
            match event {
                TurnEvent::AnswerDelta(text) => record.answer.push_str(text),
                TurnEvent::Documents(documents) => record.documents.extend_from_slice(documents),
                TurnEvent::RetrievedChunks(chunks) => record.chunks.extend_from_slice(chunks),
            }
        }
        record.answer = record.answer.trim().to_string();
        record
    }

    /// A record whose answer is only an error description.
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            answer: description.into(),
            documents: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn documents_flat(&self) -> String {
        join_flat(&self.documents)
    }

    pub fn chunks_flat(&self) -> String {
        join_flat(&self.chunks)
    }
}

/// Answers questions over one connection, each in a fresh session.
pub struct QuestionAnswerer {
    connection: Arc<dyn AgentConnection>,
    agent: Arc<AgentConfig>,
}

impl QuestionAnswerer {
    pub fn new(connection: Arc<dyn AgentConnection>, agent: Arc<AgentConfig>) -> Self {
        Self { connection, agent }
    }

    /// Ask one question and wait for the whole answer. Never fails: agent
    /// errors come back as the answer text.
    pub async fn answer_question(&self, question: &str) -> AnswerRecord {
        let session_id = Uuid::new_v4().to_string();
        let request = self.agent.request(session_id, question);
        AnswerRecord::from_state(run_turn(&*self.connection, request).await)
    }
}

/// Output slot for one input question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchRow {
    /// Position of the question in the input.
    pub index: usize,
    pub question: String,
    /// `None` for blank questions, which are never sent.
    pub answer: Option<AnswerRecord>,
}

/// Tabular form of a row: documents and chunks flattened to one cell each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRow {
    pub index: usize,
    pub question: String,
    pub answer: String,
    pub retrieved_documents: String,
    pub retrieved_chunks: String,
}

impl BatchRow {
    pub fn to_flat(&self) -> FlatRow {
        let (answer, retrieved_documents, retrieved_chunks) = match &self.answer {
            Some(record) => (
                record.answer.clone(),
                record.documents_flat(),
                record.chunks_flat(),
            ),
            None => (String::new(), String::new(), String::new()),
        };
        FlatRow {
            index: self.index,
            question: self.question.clone(),
            answer,
            retrieved_documents,
            retrieved_chunks,
        }
    }
}

/// Runs a list of questions through a pool of workers.
pub struct BatchRunner {
    runtime: Arc<dyn AgentRuntime>,
    agent: Arc<AgentConfig>,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(runtime: Arc<dyn AgentRuntime>, agent: AgentConfig, config: BatchConfig) -> Self {
        Self {
            runtime,
            agent: Arc::new(agent),
            config,
        }
    }

    /// Answer every non-blank question. Rows come back in input order no
    /// matter which worker finished first; one row failing never stops the rest.
    pub async fn run(&self, questions: &[String]) -> Vec<BatchRow> {
        let jobs: Vec<Job> = questions
            .iter()
            .enumerate()
            .filter_map(|(index, q)| {
                let question = q.trim();
                (!question.is_empty()).then(|| Job {
                    index,
                    question: question.to_string(),
                })
            })
            .collect();
        let total = jobs.len();
        let workers = self.config.max_workers.max(1).min(total);

        info!(
            runtime = self.runtime.name(),
            questions = questions.len(),
            pending = total,
            workers,
            "Starting batch"
        );

        let (job_tx, job_rx) = mpsc::channel(total.max(1));
        for job in jobs {
            // Capacity covers every job and the receiver is still alive.
            let _ = job_tx.send(job).await;
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker::new(id, Arc::clone(&self.runtime), Arc::clone(&self.agent));
            pool.spawn(worker.run(Arc::clone(&queue), result_tx.clone()));
        }
        drop(result_tx);

        let mut slots: Vec<Option<AnswerRecord>> = vec![None; questions.len()];
        let mut completed = 0;
        while let Some((index, record)) = result_rx.recv().await {
            slots[index] = Some(record);
            completed += 1;
            info!(completed, total, "Question answered");
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Batch worker stopped abnormally");
            }
        }

        questions
            .iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (question, slot))| {
                let question = question.trim().to_string();
                let answer = match slot {
                    Some(record) => Some(record),
                    None if question.is_empty() => None,
                    None => Some(AnswerRecord::failed(worker::STOPPED_BEFORE_ANSWERING)),
                };
                BatchRow {
                    index,
                    question,
                    answer,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_state_trims_answer() {
        let mut state = SessionState::new();
        state.fold_text("\n  Hello ");
        let record = AnswerRecord::from_state(state);
        assert_eq!(record.answer, "Hello");
    }

    #[test]
    fn from_events_matches_folded_state() {
        let events = vec![
            TurnEvent::AnswerDelta("\n Hel".into()),
            TurnEvent::Documents(vec!["s3://b/1.pdf".into()]),
            TurnEvent::AnswerDelta("lo  ".into()),
            TurnEvent::RetrievedChunks(vec!["chunk".into()]),
            TurnEvent::Documents(vec!["s3://b/2.pdf".into()]),
        ];
        let record = AnswerRecord::from_events(&events);
        assert_eq!(record.answer, "Hello");
        assert_eq!(record.documents, ["s3://b/1.pdf", "s3://b/2.pdf"]);
        assert_eq!(record.chunks, ["chunk"]);
    }

    #[test]
    fn flat_row_joins_with_pipes() {
        let row = BatchRow {
            index: 2,
            question: "q".into(),
            answer: Some(AnswerRecord {
                answer: "a".into(),
                documents: vec!["s3://b/1.pdf".into(), "s3://b/2.pdf".into()],
                chunks: vec!["chunk".into()],
            }),
        };
        let flat = row.to_flat();
        assert_eq!(flat.retrieved_documents, "s3://b/1.pdf | s3://b/2.pdf");
        assert_eq!(flat.retrieved_chunks, "chunk");
        assert_eq!(flat.index, 2);
    }

    #[test]
    fn skipped_row_flattens_empty() {
        let row = BatchRow {
            index: 0,
            question: String::new(),
            answer: None,
        };
        assert_eq!(row.to_flat().answer, "");
    }
}
