//! Trace mining: pulls document references and retrieved passages out of
//! agent execution traces.
//!
//! - `node` holds the `TraceNode` tree a trace payload is parsed into
//! - `miner` holds the classification rules and the depth-first walk

pub mod miner;
pub mod node;

pub use miner::{CandidateClass, MinedCandidates, classify_candidate, mine};
pub use node::TraceNode;
