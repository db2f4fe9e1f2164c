//! Integration tests for the batch worker pool.
//!
//! Stub runtimes count connections and fail or panic on chosen questions, so
//! the tests can check row order, per-worker connection reuse and isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use serde_json::json;
use tokio::time::timeout;

use tracemine::agent::{AgentConnection, AgentRuntime, EventStream, InvokeRequest};
use tracemine::batch::{AnswerRecord, BatchRunner, QuestionAnswerer};
use tracemine::config::{AgentConfig, BatchConfig};
use tracemine::error::AgentError;
use tracemine::events::RawEvent;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Echoes the question back and cites one document per question.
struct EchoConnection {
    fail_on: Option<String>,
    panic_on: Option<String>,
}

#[async_trait]
impl AgentConnection for EchoConnection {
    async fn invoke(&self, request: InvokeRequest) -> Result<EventStream, AgentError> {
        if self.fail_on.as_deref() == Some(request.input_text.as_str()) {
            return Err(AgentError::Service {
                code: "ValidationException".into(),
                message: "agent rejected the request".into(),
            });
        }
        if self.panic_on.as_deref() == Some(request.input_text.as_str()) {
            panic!("connection blew up");
        }
        // Stagger completion so workers finish out of input order.
        let n: u64 = request
            .input_text
            .rsplit(' ')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n * 5))).await;

        let slug = request.input_text.replace(' ', "-");
        let events = vec![
            Ok(RawEvent::chunk(format!("  answer to {} ", request.input_text))),
            Ok(RawEvent::trace(json!({
                "retrievedReferences": [
                    {"location": {"s3Location": {"uri": format!("s3://kb/{slug}.pdf")}}},
                    {"location": {"s3Location": {"uri": "s3://kb/shared.pdf"}}}
                ]
            }))),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

struct CountingRuntime {
    connects: AtomicUsize,
    refuse_first: bool,
    fail_on: Option<String>,
    panic_on: Option<String>,
}

impl CountingRuntime {
    fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            refuse_first: false,
            fail_on: None,
            panic_on: None,
        }
    }
}

#[async_trait]
impl AgentRuntime for CountingRuntime {
    fn name(&self) -> &str {
        "counting"
    }

    async fn connect(&self) -> Result<Arc<dyn AgentConnection>, AgentError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_first && attempt == 0 {
            return Err(AgentError::connection("credentials not ready"));
        }
        Ok(Arc::new(EchoConnection {
            fail_on: self.fail_on.clone(),
            panic_on: self.panic_on.clone(),
        }))
    }
}

fn questions(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("question {i}")).collect()
}

fn runner(runtime: Arc<CountingRuntime>, workers: usize) -> BatchRunner {
    BatchRunner::new(
        runtime,
        AgentConfig::new("AGENT", "ALIAS"),
        BatchConfig {
            max_workers: workers,
        },
    )
}

fn answer(record: &Option<AnswerRecord>) -> &str {
    record.as_ref().map(|r| r.answer.as_str()).unwrap_or("")
}

#[tokio::test]
async fn rows_come_back_in_input_order() {
    let runtime = Arc::new(CountingRuntime::new());
    let rows = timeout(TEST_TIMEOUT, runner(runtime, 4).run(&questions(8)))
        .await
        .expect("batch timed out");

    assert_eq!(rows.len(), 8);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.index, i);
        assert_eq!(answer(&row.answer), format!("answer to question {}", i + 1));
        let record = row.answer.as_ref().unwrap();
        assert_eq!(
            record.documents,
            vec![
                format!("s3://kb/question-{}.pdf", i + 1),
                "s3://kb/shared.pdf".to_string()
            ]
        );
    }
}

#[tokio::test]
async fn one_failing_question_does_not_abort_the_batch() {
    let runtime = Arc::new(CountingRuntime {
        fail_on: Some("question 3".into()),
        ..CountingRuntime::new()
    });
    let rows = timeout(TEST_TIMEOUT, runner(runtime, 3).run(&questions(5)))
        .await
        .expect("batch timed out");

    for i in [0, 1, 3, 4] {
        assert_eq!(answer(&rows[i].answer), format!("answer to question {}", i + 1));
    }
    let failed = rows[2].answer.as_ref().unwrap();
    assert!(failed.answer.starts_with("ClientError:"));
    assert!(failed.answer.contains("agent rejected the request"));
    assert!(failed.documents.is_empty());
}

#[tokio::test]
async fn panicking_worker_only_loses_its_own_row() {
    let runtime = Arc::new(CountingRuntime {
        panic_on: Some("question 2".into()),
        ..CountingRuntime::new()
    });
    let rows = timeout(TEST_TIMEOUT, runner(runtime, 2).run(&questions(5)))
        .await
        .expect("batch timed out");

    assert!(answer(&rows[1].answer).starts_with("Error:"));
    for i in [0, 2, 3, 4] {
        assert_eq!(answer(&rows[i].answer), format!("answer to question {}", i + 1));
    }
}

#[tokio::test]
async fn single_worker_keeps_going_after_a_panic() {
    let runtime = Arc::new(CountingRuntime {
        panic_on: Some("question 2".into()),
        ..CountingRuntime::new()
    });
    let rows = timeout(TEST_TIMEOUT, runner(Arc::clone(&runtime), 1).run(&questions(4)))
        .await
        .expect("batch timed out");

    assert_eq!(answer(&rows[0].answer), "answer to question 1");
    assert_eq!(answer(&rows[1].answer), "Error: worker stopped before answering");
    assert_eq!(answer(&rows[2].answer), "answer to question 3");
    assert_eq!(answer(&rows[3].answer), "answer to question 4");
    // The connection that panicked is replaced, not reused.
    assert_eq!(runtime.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn each_worker_connects_once() {
    let runtime = Arc::new(CountingRuntime::new());
    timeout(TEST_TIMEOUT, runner(Arc::clone(&runtime), 3).run(&questions(9)))
        .await
        .expect("batch timed out");
    assert!(runtime.connects.load(Ordering::SeqCst) <= 3);

    let single = Arc::new(CountingRuntime::new());
    timeout(TEST_TIMEOUT, runner(Arc::clone(&single), 1).run(&questions(6)))
        .await
        .expect("batch timed out");
    assert_eq!(single.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_connect_is_retried_on_next_question() {
    let runtime = Arc::new(CountingRuntime {
        refuse_first: true,
        ..CountingRuntime::new()
    });
    let rows = timeout(TEST_TIMEOUT, runner(Arc::clone(&runtime), 1).run(&questions(3)))
        .await
        .expect("batch timed out");

    assert_eq!(
        answer(&rows[0].answer),
        "Error: Connection failed: credentials not ready"
    );
    assert_eq!(answer(&rows[1].answer), "answer to question 2");
    assert_eq!(answer(&rows[2].answer), "answer to question 3");
    assert_eq!(runtime.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn blank_questions_are_skipped() {
    let runtime = Arc::new(CountingRuntime::new());
    let input = vec![
        "  question 1 ".to_string(),
        "   ".to_string(),
        String::new(),
        "question 4".to_string(),
    ];
    let rows = timeout(TEST_TIMEOUT, runner(Arc::clone(&runtime), 4).run(&input))
        .await
        .expect("batch timed out");

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].question, "question 1");
    assert_eq!(answer(&rows[0].answer), "answer to question 1");
    assert_eq!(rows[1].answer, None);
    assert_eq!(rows[2].answer, None);
    assert_eq!(answer(&rows[3].answer), "answer to question 4");
    assert!(runtime.connects.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn empty_batch_spawns_nothing() {
    let runtime = Arc::new(CountingRuntime::new());
    let rows = timeout(TEST_TIMEOUT, runner(Arc::clone(&runtime), 4).run(&[]))
        .await
        .expect("batch timed out");
    assert!(rows.is_empty());
    assert_eq!(runtime.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn answer_question_uses_fresh_sessions() {
    struct SessionRecorder {
        sessions: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentConnection for SessionRecorder {
        async fn invoke(&self, request: InvokeRequest) -> Result<EventStream, AgentError> {
            assert_eq!(request.agent_id, "AGENT");
            assert!(request.enable_trace);
            self.sessions.lock().unwrap().push(request.session_id);
            Ok(Box::pin(stream::iter(vec![Ok(RawEvent::chunk("ok"))])))
        }
    }

    let connection = Arc::new(SessionRecorder {
        sessions: std::sync::Mutex::new(Vec::new()),
    });
    let answerer = QuestionAnswerer::new(
        connection.clone(),
        Arc::new(AgentConfig::new("AGENT", "ALIAS")),
    );

    let first = timeout(TEST_TIMEOUT, answerer.answer_question("a"))
        .await
        .expect("answer timed out");
    timeout(TEST_TIMEOUT, answerer.answer_question("b"))
        .await
        .expect("answer timed out");

    assert_eq!(first.answer, "ok");
    let sessions = connection.sessions.lock().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_ne!(sessions[0], sessions[1]);
}
