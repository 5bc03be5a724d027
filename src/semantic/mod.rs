//! Semantic search over listings.
//!
//! # Architecture
//!
//! - `document`: Flattens listings into embeddable text plus metadata
//! - `embeddings`: `Embedder` trait with local fastembed and OpenAI backends
//! - `index`: In-memory vector index with cosine similarity search
//! - `storage`: Binary file I/O for the vectors.bin embedding cache
//! - `service`: Index construction and the queryable `ListingIndex`
//! - `self_query`: Model-extracted metadata filters ahead of similarity search

pub mod document;
pub mod embeddings;
mod index;
pub mod self_query;
mod service;
mod storage;

pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel, OpenAiEmbeddings};
pub use self_query::{QueryConstructor, SelfQueryRetriever};
pub use service::{IndexBuilder, ListingIndex, ListingMatch, SearchOptions, SemanticSearchError};
pub use storage::VectorStorage;

/// Default local embedding model
pub const DEFAULT_MODEL: &str = "bge-small-en-v1.5";
