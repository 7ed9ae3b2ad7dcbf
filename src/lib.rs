//! Retrieval-augmented chat over page-tagged documents.
//!
//! The pipeline turns extracted page text into overlapping word-aligned
//! chunks with page attribution, embeds them into a vector index and
//! grounds chat answers in the most relevant chunks.

pub mod chat;
pub mod config;
pub mod ingest;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod text;
pub mod util;
