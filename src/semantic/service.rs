//! Index construction and similarity search over listings.
//!
//! `IndexBuilder` runs once at startup:
//! - Flattens every listing into an `IndexedDocument`
//! - Reuses cached embeddings when the cache still matches, otherwise embeds
//!   the whole collection in one batch and rewrites the cache
//!
//! The resulting `ListingIndex` is read-only and shared across requests.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::listings::Listing;
use crate::llm::LlmError;
use crate::recommend::ListingSearch;
use crate::semantic::document::{build_documents, IndexedDocument};
use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("cannot build an index from an empty listing collection")]
    EmptyCollection,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Query construction failed: {0}")]
    QueryConstruction(#[from] LlmError),
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingMatch {
    pub position: usize,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of matches returned
    pub top_k: usize,
    pub min_score: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: None,
        }
    }
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    storage: Option<VectorStorage>,
    options: SearchOptions,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            storage: None,
            options: SearchOptions::default(),
        }
    }

    /// Persist embeddings to (and reuse them from) `storage`.
    pub fn with_storage(mut self, storage: VectorStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the searchable index, one document per listing in input order.
    pub fn build(self, listings: &[Listing]) -> Result<ListingIndex, SemanticSearchError> {
        if listings.is_empty() {
            return Err(SemanticSearchError::EmptyCollection);
        }

        let documents = build_documents(listings);
        let model_id = self.embedder.model_id_hash();

        let index = match self.load_cached(&documents, &model_id) {
            Some(index) => {
                log::info!("reused {} cached listing embeddings", index.len());
                index
            }
            None => {
                let index = self.embed_documents(&documents)?;
                if let Some(storage) = &self.storage {
                    match storage.save(&index, &model_id) {
                        Ok(()) => log::info!("saved embeddings to {}", storage.path().display()),
                        Err(e) => log::warn!(
                            "could not write embedding cache {}: {}",
                            storage.path().display(),
                            e
                        ),
                    }
                }
                index
            }
        };

        log::info!(
            "indexed {} listings with '{}' ({} dimensions)",
            documents.len(),
            self.embedder.model_name(),
            index.dimensions()
        );

        Ok(ListingIndex {
            documents,
            index,
            embedder: self.embedder,
            options: self.options,
        })
    }

    fn embed_documents(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<VectorIndex, SemanticSearchError> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        if embeddings.len() != documents.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            ))
            .into());
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        let mut index = VectorIndex::with_capacity(dimensions, documents.len());
        for (document, embedding) in documents.iter().zip(embeddings) {
            index.insert(document.position, document.content_hash, embedding)?;
        }

        Ok(index)
    }

    /// Cached index, if it covers exactly these documents.
    fn load_cached(
        &self,
        documents: &[IndexedDocument],
        model_id: &[u8; 32],
    ) -> Option<VectorIndex> {
        let storage = self.storage.as_ref()?;
        if !storage.exists() {
            log::info!("no embedding cache at {}", storage.path().display());
            return None;
        }

        let index = match storage.load(model_id) {
            Ok(index) => index,
            Err(VectorStorageError::ModelMismatch) => {
                log::warn!("embedding model changed, re-embedding listings");
                return None;
            }
            Err(e) => {
                log::warn!("ignoring unreadable embedding cache: {}", e);
                return None;
            }
        };

        let matches = index.len() == documents.len()
            && documents.iter().all(|document| {
                index
                    .get(document.position)
                    .map(|entry| entry.content_hash == document.content_hash)
                    .unwrap_or(false)
            });

        if matches {
            Some(index)
        } else {
            log::info!("listings changed since the cache was written, re-embedding");
            None
        }
    }
}

/// Queryable handle over the embedded listings.
pub struct ListingIndex {
    documents: Vec<IndexedDocument>,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    options: SearchOptions,
}

impl ListingIndex {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    /// Rank listings by similarity to `query`, optionally restricted to
    /// `candidates` (row positions).
    pub fn search_filtered(
        &self,
        query: &str,
        candidates: Option<&[usize]>,
    ) -> Result<Vec<ListingMatch>, SemanticSearchError> {
        let query_embedding = self.embedder.embed(query)?;

        let results = self.index.search(
            &query_embedding,
            candidates,
            self.options.min_score,
            self.options.top_k,
        )?;

        log::debug!("query {:?} matched {} listings", query, results.len());

        Ok(results
            .into_iter()
            .filter_map(|result| {
                self.documents.get(result.position).map(|document| ListingMatch {
                    position: document.position,
                    text: document.text.clone(),
                    metadata: document.metadata.clone(),
                    score: result.score,
                })
            })
            .collect())
    }
}

impl ListingSearch for ListingIndex {
    fn search(&self, query: &str) -> Result<Vec<ListingMatch>, SemanticSearchError> {
        self.search_filtered(query, None)
    }
}
