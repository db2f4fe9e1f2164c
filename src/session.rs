//! Per-turn accumulation of answer text, documents and retrieved chunks.
//!
//! A `SessionState` belongs to exactly one turn (interactive) or one question
//! (batch) and is dropped when it ends. It is only ever mutated through
//! `fold_text` and `fold_trace`, from a single task.

use std::collections::HashSet;

use serde::Serialize;

use crate::trace::{TraceNode, mine};

/// Separator used when documents or chunks are flattened into one cell.
pub const FLAT_SEPARATOR: &str = " | ";

/// Join values for flat/tabular storage.
pub fn join_flat(values: &[String]) -> String {
    values.join(FLAT_SEPARATOR)
}

/// Insertion-ordered set of non-blank strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl OrderedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` unless it is blank or already present.
    /// Returns whether it was added.
    pub fn insert(&mut self, value: &str) -> bool {
        if value.trim().is_empty() || self.seen.contains(value) {
            return false;
        }
        self.seen.insert(value.to_string());
        self.items.push(value.to_string());
        true
    }

    pub fn contains(&self, value: &str) -> bool {
        self.seen.contains(value)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

/// Items first seen in the latest trace payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discovered {
    pub documents: Vec<String>,
    pub chunks: Vec<String>,
}

impl Discovered {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.chunks.is_empty()
    }
}

/// Accumulated results of one turn.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    answer_text: Vec<String>,
    documents: OrderedSet,
    chunks: OrderedSet,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an answer fragment as-is, with no separator.
    pub fn fold_text(&mut self, fragment: impl Into<String>) {
        self.answer_text.push(fragment.into());
    }

    /// Mine a trace payload and merge its candidates.
    ///
    /// Returns only the documents and chunks this state had not seen before,
    /// in first-seen order; the full union stays in the state.
    pub fn fold_trace(&mut self, payload: &TraceNode) -> Discovered {
        let mined = mine(payload);

        let documents = mined
            .documents
            .into_iter()
            .filter(|d| self.documents.insert(d))
            .collect();
        let chunks = mined
            .chunks
            .into_iter()
            .filter(|c| self.chunks.insert(c))
            .collect();

        Discovered { documents, chunks }
    }

    /// The answer assembled so far.
    pub fn answer(&self) -> String {
        self.answer_text.concat()
    }

    pub fn fragments(&self) -> &[String] {
        &self.answer_text
    }

    pub fn documents(&self) -> &[String] {
        self.documents.as_slice()
    }

    pub fn chunks(&self) -> &[String] {
        self.chunks.as_slice()
    }

    pub fn documents_flat(&self) -> String {
        join_flat(self.documents())
    }

    pub fn chunks_flat(&self) -> String {
        join_flat(self.chunks())
    }

    /// Consume the state into `(answer, documents, chunks)`.
    pub fn into_parts(self) -> (String, Vec<String>, Vec<String>) {
        (
            self.answer_text.concat(),
            self.documents.into_vec(),
            self.chunks.into_vec(),
        )
    }
}
