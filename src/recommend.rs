//! Retrieve-then-rewrite recommendation flow.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm::{ChatMessage, ChatModel, LlmError};
use crate::semantic::{ListingMatch, SemanticSearchError};

pub const NO_RESULTS_MESSAGE: &str =
    "No similar listings found. Please try again with a different preference.";

const REWRITE_INSTRUCTIONS: &str = "You are a creative real estate assistant. Given the following listing details and a buyer's preference, generate a personalized listing description that highlights the aspects of the property aligning with the buyer's preferences, while preserving all factual details about the property. Do not modify any factual information.";

/// Semantic lookup over the indexed listings.
pub trait ListingSearch: Send + Sync {
    /// Ranked matches, best first. An empty vector is a normal outcome.
    fn search(&self, query: &str) -> Result<Vec<ListingMatch>, SemanticSearchError>;
}

/// Rewrites a listing to foreground what the buyer asked for.
pub trait Rewriter: Send + Sync {
    fn rewrite(&self, listing: &str, preference: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// The matched listing text, verbatim
    pub listing: String,
    /// Personalized description; empty when nothing matched
    pub description: String,
}

impl RecommendationResult {
    pub fn no_results() -> Self {
        Self {
            listing: NO_RESULTS_MESSAGE.to_string(),
            description: String::new(),
        }
    }
}

/// [`Rewriter`] backed by a chat model and a fixed prompt.
pub struct PromptRewriter {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl PromptRewriter {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }
}

/// The rewrite conversation for one listing/preference pair.
pub fn rewrite_messages(listing: &str, preference: &str) -> [ChatMessage; 2] {
    [
        ChatMessage::system(REWRITE_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Listing:\n{listing}\n\nBuyer Preference:\n{preference}\n\nPersonalized Description:"
        )),
    ]
}

impl Rewriter for PromptRewriter {
    fn rewrite(&self, listing: &str, preference: &str) -> Result<String, LlmError> {
        self.model
            .complete(&rewrite_messages(listing, preference), self.temperature)
    }
}

/// Owns the search handle and rewriter for the life of the process.
pub struct RecommendationService {
    search: Arc<dyn ListingSearch>,
    rewriter: Arc<dyn Rewriter>,
}

impl RecommendationService {
    pub fn new(search: Arc<dyn ListingSearch>, rewriter: Arc<dyn Rewriter>) -> Self {
        Self { search, rewriter }
    }

    /// Find the closest listing to `preference` and personalize it.
    ///
    /// The preference is passed to search unchanged, empty included. When
    /// nothing matches, the rewriter is not called.
    pub fn recommend(&self, preference: &str) -> Result<RecommendationResult, AppError> {
        let matches = self.search.search(preference)?;

        let Some(closest) = matches.into_iter().next() else {
            log::info!("no listing matched the preference");
            return Ok(RecommendationResult::no_results());
        };

        log::info!(
            "closest listing is row {} (score {:.3})",
            closest.position,
            closest.score
        );

        let description = self.rewriter.rewrite(&closest.text, preference)?;

        Ok(RecommendationResult {
            listing: closest.text,
            description,
        })
    }
}
