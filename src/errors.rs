use crate::{llm::LlmError, semantic::SemanticSearchError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("search error: {0}")]
    Search(#[from] SemanticSearchError),

    #[error("generation error: {0}")]
    Generation(#[from] LlmError),
}
