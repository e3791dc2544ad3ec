//! Monday Bot: servidor de preguntas sobre un índice de documentos con
//! embeddings, y constructor offline de ese índice.

pub mod api;
pub mod app_state;
pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod rag;
pub mod streaming;
pub mod vector_store;
