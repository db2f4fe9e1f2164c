//! Heuristic extraction of document references and content chunks.
//!
//! Every text leaf of a trace is judged against two independent rules, both
//! keyed on the innermost enclosing map key:
//! - document reference: the key names a locator field and the value looks like
//!   a locator (URI scheme, known file extension, or a path ending in a file name)
//! - content chunk: the key names a text field and the whitespace-collapsed value
//!   is long enough, is not itself a locator, and is not trace-type noise
//!
//! The token lists are tuned to the agent runtime's retrieval trace schema and
//! match by substring, so `"s3Location"` and `"documentPath"` both qualify.

use tracing::debug;

use crate::session::OrderedSet;
use crate::trace::node::TraceNode;

/// Key tokens marking a field that may hold a document locator.
const DOCUMENT_KEY_TOKENS: &[&str] = &[
    "uri",
    "url",
    "path",
    "file",
    "source",
    "location",
    "document",
    "reference",
];

/// Key tokens marking a field that may hold passage text.
const CONTENT_KEY_TOKENS: &[&str] = &["text", "content", "snippet", "chunk", "passage", "excerpt"];

const LOCATOR_PREFIXES: &[&str] = &["s3://", "http://", "https://", "file://", "arn:aws:s3:::"];

const LOCATOR_SUFFIXES: &[&str] = &[
    ".pdf", ".doc", ".docx", ".txt", ".md", ".csv", ".xlsx", ".json", ".html", ".ppt", ".pptx",
];

/// Trace-type names that show up under `text`-like keys but carry no passage.
const NOISE_VALUES: &[&str] = &["orchestrationtrace", "preprocessingtrace", "postprocessingtrace"];

/// Minimum collapsed length, in characters, of a content chunk.
pub const MIN_CHUNK_CHARS: usize = 40;

/// Whether a value has the shape of a URI or file path.
pub fn looks_like_locator(value: &str) -> bool {
    let lowered = value.to_lowercase();
    if LOCATOR_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return true;
    }
    if LOCATOR_SUFFIXES.iter().any(|s| lowered.ends_with(s)) {
        return true;
    }
    match value.rsplit_once('/') {
        Some((_, last_segment)) => last_segment.contains('.'),
        None => false,
    }
}

fn key_matches(parent_key: &str, tokens: &[&str]) -> bool {
    let lowered = parent_key.to_lowercase();
    tokens.iter().any(|t| lowered.contains(t))
}

/// Collapse every whitespace run to one space and trim the ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Document-reference rule.
pub fn is_document_reference(value: &str, parent_key: &str) -> bool {
    key_matches(parent_key, DOCUMENT_KEY_TOKENS) && looks_like_locator(value)
}

/// Content-chunk rule. Returns the collapsed chunk text when the value qualifies.
pub fn chunk_candidate(value: &str, parent_key: &str) -> Option<String> {
    if !key_matches(parent_key, CONTENT_KEY_TOKENS) {
        return None;
    }
    let cleaned = collapse_whitespace(value);
    if cleaned.chars().count() < MIN_CHUNK_CHARS || looks_like_locator(&cleaned) {
        return None;
    }
    let lowered = cleaned.to_lowercase();
    if NOISE_VALUES.contains(&lowered.as_str()) {
        return None;
    }
    Some(cleaned)
}

/// Outcome of judging one `(value, parent_key)` pair against both rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateClass {
    pub document: bool,
    /// Collapsed chunk text, if the value is a content chunk.
    pub chunk: Option<String>,
}

/// Apply both rules to one text leaf. Pure: the same pair always yields the
/// same class, whatever else the payload contains.
pub fn classify_candidate(value: &str, parent_key: &str) -> CandidateClass {
    CandidateClass {
        document: is_document_reference(value, parent_key),
        chunk: chunk_candidate(value, parent_key),
    }
}

/// Candidates found in one trace payload, deduplicated in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinedCandidates {
    pub documents: Vec<String>,
    pub chunks: Vec<String>,
}

impl MinedCandidates {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.chunks.is_empty()
    }
}

#[derive(Default)]
struct Collector {
    documents: OrderedSet,
    chunks: OrderedSet,
}

/// Walk one trace payload depth-first and collect its candidates.
///
/// The root sits under the empty key. List elements inherit their container's
/// key. Anything that is not a map, list or text is skipped; this never fails.
pub fn mine(root: &TraceNode) -> MinedCandidates {
    let mut collector = Collector::default();
    walk(root, "", &mut collector);

    let mined = MinedCandidates {
        documents: collector.documents.into_vec(),
        chunks: collector.chunks.into_vec(),
    };
    debug!(
        documents = mined.documents.len(),
        chunks = mined.chunks.len(),
        "Mined trace payload"
    );
    mined
}

fn walk(node: &TraceNode, parent_key: &str, out: &mut Collector) {
    match node {
        TraceNode::Map(entries) => {
            for (key, child) in entries {
                walk(child, key, out);
            }
        }
        TraceNode::List(items) => {
            for item in items {
                walk(item, parent_key, out);
            }
        }
        TraceNode::Text(value) => {
            let class = classify_candidate(value, parent_key);
            if class.document {
                out.documents.insert(value);
            }
            if let Some(chunk) = class.chunk {
                out.chunks.insert(&chunk);
            }
        }
        TraceNode::Other => {}
    }
}
