//! Retrieval for Harbor.
//!
//! Backends:
//! - `chroma` — Chroma vector store over its REST API
//! - `memory` — keyword-scored in-memory store (development, tests)
//!
//! The [`RetrievalGateway`] sits in front of whichever backend is configured
//! and turns every failure into an empty result.

pub mod chroma;
pub mod gateway;
pub mod in_memory;

pub use chroma::{ChromaApi, ChromaStore};
pub use gateway::RetrievalGateway;
pub use in_memory::InMemoryStore;
