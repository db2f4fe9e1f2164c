//! tracemine: separates an agent runtime's event stream into answer text,
//! consulted documents and retrieved chunks.

pub mod agent;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod trace;
