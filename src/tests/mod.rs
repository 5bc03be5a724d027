//! Shared fixtures: sample listings and stand-ins for the external services.


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::listings::Listing;
use crate::llm::{ChatMessage, ChatModel, LlmError};
use crate::semantic::{Embedder, EmbeddingError};

pub fn listing(
    neighborhood: &str,
    price: i64,
    bedrooms: u32,
    bathrooms: f64,
    house_size: u32,
    description: &str,
    neighborhood_description: &str,
) -> Listing {
    Listing {
        neighborhood: neighborhood.to_string(),
        price,
        bedrooms,
        bathrooms,
        house_size,
        description: description.to_string(),
        neighborhood_description: neighborhood_description.to_string(),
    }
}

pub fn sample_listings() -> Vec<Listing> {
    vec![
        listing(
            "Lakeview",
            450000,
            3,
            2.5,
            1800,
            "Cozy lakeside home with a private dock",
            "Quiet and scenic, with water views",
        ),
        listing(
            "Downtown",
            720000,
            2,
            2.0,
            1100,
            "Modern loft with exposed brick",
            "Lively and walkable, close to nightlife",
        ),
        listing(
            "Hillcrest",
            610000,
            4,
            3.0,
            2600,
            "Spacious family home with a large backyard and garden",
            "Good schools and several parks",
        ),
    ]
}

const VOCABULARY: [&str; 13] = [
    "lake", "water", "quiet", "dock", "loft", "brick", "nightlife", "family", "school", "park",
    "garden", "backyard", "home",
];

/// Deterministic bag-of-keywords embedder.
///
/// One dimension per vocabulary word plus a small constant so every
/// non-empty text has a non-zero vector. Empty text embeds to nothing.
#[derive(Default)]
pub struct KeywordEmbedder {
    batch_calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![];
        }

        let text = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect();
        vector.push(0.01);
        vector
    }
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(Self::vectorize(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Chat model that replays canned replies in order, repeating the last one.
pub struct ScriptedChat {
    replies: Vec<String>,
    calls: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: replies.into_iter().map(String::from).collect(),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn last_messages(&self) -> Option<Vec<ChatMessage>> {
        self.calls.lock().unwrap().last().map(|(m, _)| m.clone())
    }
}

impl ChatModel for ScriptedChat {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        let mut calls = self.calls.lock().unwrap();
        let n = calls.len();
        calls.push((messages.to_vec(), temperature));

        self.replies
            .get(n.min(self.replies.len().saturating_sub(1)))
            .cloned()
            .ok_or_else(|| LlmError::MalformedResponse("no scripted reply".to_string()))
    }
}

/// Chat model that always fails like an exhausted quota.
pub struct FailingChat;

impl ChatModel for FailingChat {
    fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String, LlmError> {
        Err(LlmError::Api {
            status: 429,
            body: "quota exceeded".to_string(),
        })
    }
}
