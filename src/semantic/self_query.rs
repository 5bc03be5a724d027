//! Self-query retrieval.
//!
//! A chat model turns the buyer's free text into a structured query: a short
//! semantic search string plus metadata comparisons ("at least 3 bedrooms",
//! "under 500000"). Listings failing the comparisons are excluded before the
//! similarity search runs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{ChatMessage, ChatModel, LlmError};
use crate::recommend::ListingSearch;
use crate::semantic::service::{ListingIndex, ListingMatch, SemanticSearchError};

pub const DOCUMENT_CONTENT_DESCRIPTION: &str = "Real Estate Listings: Each listing contains information about the property, including neighborhood, price, number of bedrooms and bathrooms, house size, description, and neighborhood description.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Integer,
    Float,
}

impl AttributeType {
    fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
        }
    }
}

/// A filterable metadata field as described to the model.
#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: AttributeType,
}

pub const LISTING_ATTRIBUTES: [AttributeInfo; 7] = [
    AttributeInfo {
        name: "Neighborhood",
        description: "The neighborhood where the property is located.",
        kind: AttributeType::String,
    },
    AttributeInfo {
        name: "Price",
        description: "The price of the property.",
        kind: AttributeType::Integer,
    },
    AttributeInfo {
        name: "Bedrooms",
        description: "The number of bedrooms in the property.",
        kind: AttributeType::Integer,
    },
    AttributeInfo {
        name: "Bathrooms",
        description: "The number of bathrooms in the property.",
        kind: AttributeType::Float,
    },
    AttributeInfo {
        name: "House Size",
        description: "The size of the house in square feet.",
        kind: AttributeType::Integer,
    },
    AttributeInfo {
        name: "Description",
        description: "A description of the property.",
        kind: AttributeType::String,
    },
    AttributeInfo {
        name: "Neighborhood Description",
        description: "A description of the neighborhood.",
        kind: AttributeType::String,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub attribute: String,
    pub comparator: Comparator,
    pub value: Value,
}

impl Comparison {
    /// Whether a listing's metadata satisfies this comparison.
    ///
    /// Numbers compare numerically; strings compare case-insensitively.
    /// Mismatched types never match.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        let Some(actual) = metadata.get(&self.attribute) else {
            return false;
        };

        match (actual, &self.value) {
            (Value::Number(a), expected) => {
                let (Some(a), Some(b)) = (a.as_f64(), as_number(expected)) else {
                    return false;
                };
                match self.comparator {
                    Comparator::Eq => a == b,
                    Comparator::Ne => a != b,
                    Comparator::Gt => a > b,
                    Comparator::Gte => a >= b,
                    Comparator::Lt => a < b,
                    Comparator::Lte => a <= b,
                    Comparator::Contains => false,
                }
            }
            (Value::String(a), Value::String(b)) => {
                let a = a.to_lowercase();
                let b = b.to_lowercase();
                match self.comparator {
                    Comparator::Eq => a == b,
                    Comparator::Ne => a != b,
                    Comparator::Contains => a.contains(&b),
                    Comparator::Gt => a > b,
                    Comparator::Gte => a >= b,
                    Comparator::Lt => a < b,
                    Comparator::Lte => a <= b,
                }
            }
            _ => false,
        }
    }
}

/// Models sometimes quote numbers.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filter: Vec<Comparison>,
}

impl StructuredQuery {
    /// Parse the model's reply, tolerating a fenced code block or prose
    /// around the JSON object.
    pub fn parse(reply: &str) -> Result<Self, LlmError> {
        let start = reply.find('{');
        let end = reply.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => {
                return Err(LlmError::MalformedResponse(format!(
                    "no JSON object in structured query reply: {reply:?}"
                )))
            }
        };

        let mut parsed: StructuredQuery = serde_json::from_str(json)
            .map_err(|e| LlmError::MalformedResponse(format!("structured query: {e}")))?;

        parsed.filter.retain(|comparison| {
            let known = LISTING_ATTRIBUTES
                .iter()
                .any(|attr| attr.name == comparison.attribute);
            if !known {
                log::warn!(
                    "dropping comparison on unknown attribute '{}'",
                    comparison.attribute
                );
            }
            known
        });

        Ok(parsed)
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.filter.iter().all(|comparison| comparison.matches(metadata))
    }
}

/// Builds a [`StructuredQuery`] from a buyer preference with a chat model.
pub struct QueryConstructor {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl QueryConstructor {
    pub fn new(model: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    pub fn construct(&self, preference: &str) -> Result<StructuredQuery, LlmError> {
        let messages = [
            ChatMessage::system(construction_instructions()),
            ChatMessage::user(format!("User Query:\n{preference}")),
        ];

        let reply = self.model.complete(&messages, self.temperature)?;
        let structured = StructuredQuery::parse(&reply)?;

        log::debug!(
            "structured query: {:?} with {} comparisons",
            structured.query,
            structured.filter.len()
        );

        Ok(structured)
    }
}

fn construction_instructions() -> String {
    let attributes = LISTING_ATTRIBUTES
        .iter()
        .map(|attr| {
            format!(
                "- \"{}\" ({}): {}",
                attr.name,
                attr.kind.as_str(),
                attr.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Your goal is to structure the user's query to match the request schema below.\n\n\
         Data source: {DOCUMENT_CONTENT_DESCRIPTION}\n\n\
         Filterable attributes:\n{attributes}\n\n\
         Respond with a single JSON object and nothing else:\n\
         {{\"query\": string, \"filter\": [{{\"attribute\": string, \"comparator\": one of \
         \"eq\", \"ne\", \"gt\", \"gte\", \"lt\", \"lte\", \"contains\", \"value\": string or number}}]}}\n\n\
         \"query\" holds the text to compare to listing contents, without any conditions \
         already expressed in \"filter\". Use only the attributes listed above. \
         If there are no conditions, use an empty \"filter\" list."
    )
}

/// [`ListingSearch`] that filters on model-extracted conditions before
/// ranking by similarity.
pub struct SelfQueryRetriever {
    index: Arc<ListingIndex>,
    constructor: QueryConstructor,
}

impl SelfQueryRetriever {
    pub fn new(index: Arc<ListingIndex>, constructor: QueryConstructor) -> Self {
        Self { index, constructor }
    }
}

impl ListingSearch for SelfQueryRetriever {
    fn search(&self, preference: &str) -> Result<Vec<ListingMatch>, SemanticSearchError> {
        let structured = self.constructor.construct(preference)?;

        let candidates: Vec<usize> = self
            .index
            .documents()
            .iter()
            .filter(|document| structured.matches(&document.metadata))
            .map(|document| document.position)
            .collect();

        if candidates.is_empty() {
            log::info!("no listing satisfies the extracted conditions");
            return Ok(vec![]);
        }

        let query = if structured.query.trim().is_empty() {
            preference
        } else {
            structured.query.as_str()
        };

        self.index.search_filtered(query, Some(&candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::document::listing_metadata;
    use crate::semantic::IndexBuilder;
    use crate::tests::{sample_listings, KeywordEmbedder, ScriptedChat};
    use serde_json::json;

    fn comparison(attribute: &str, comparator: Comparator, value: Value) -> Comparison {
        Comparison {
            attribute: attribute.to_string(),
            comparator,
            value,
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed = StructuredQuery::parse(
            r#"{"query": "quiet", "filter": [{"attribute": "Bedrooms", "comparator": "gte", "value": 3}]}"#,
        )
        .unwrap();

        assert_eq!(parsed.query, "quiet");
        assert_eq!(
            parsed.filter,
            vec![comparison("Bedrooms", Comparator::Gte, json!(3))]
        );
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"query\": \"near water\", \"filter\": []}\n```";
        let parsed = StructuredQuery::parse(reply).unwrap();
        assert_eq!(parsed.query, "near water");
        assert!(parsed.filter.is_empty());
    }

    #[test]
    fn test_parse_drops_unknown_attributes() {
        let parsed = StructuredQuery::parse(
            r#"{"query": "", "filter": [{"attribute": "Pool", "comparator": "eq", "value": "yes"},
                                      {"attribute": "Price", "comparator": "lt", "value": 500000}]}"#,
        )
        .unwrap();

        assert_eq!(parsed.filter.len(), 1);
        assert_eq!(parsed.filter[0].attribute, "Price");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result = StructuredQuery::parse("I could not understand the request.");
        assert!(matches!(result, Err(LlmError::MalformedResponse(_))));
    }

    #[test]
    fn test_numeric_comparisons() {
        let metadata = listing_metadata(&sample_listings()[0]);

        assert!(comparison("Price", Comparator::Lt, json!(500000)).matches(&metadata));
        assert!(comparison("Bedrooms", Comparator::Gte, json!(3)).matches(&metadata));
        assert!(!comparison("Bedrooms", Comparator::Gt, json!(3)).matches(&metadata));
        assert!(comparison("Bathrooms", Comparator::Eq, json!(2.5)).matches(&metadata));
        assert!(comparison("Price", Comparator::Lte, json!("450,000")).matches(&metadata));
    }

    #[test]
    fn test_string_comparisons_ignore_case() {
        let metadata = listing_metadata(&sample_listings()[0]);

        assert!(comparison("Neighborhood", Comparator::Eq, json!("lakeview")).matches(&metadata));
        assert!(comparison("Description", Comparator::Contains, json!("DOCK")).matches(&metadata));
        assert!(comparison("Neighborhood", Comparator::Ne, json!("Downtown")).matches(&metadata));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let metadata = listing_metadata(&sample_listings()[0]);
        assert!(!comparison("Neighborhood", Comparator::Gt, json!(3)).matches(&metadata));
        assert!(!comparison("Price", Comparator::Eq, json!("cheap")).matches(&metadata));
    }

    #[test]
    fn test_prompt_lists_every_attribute() {
        let instructions = construction_instructions();
        for attr in LISTING_ATTRIBUTES.iter() {
            assert!(instructions.contains(attr.name));
        }
        assert!(instructions.contains(DOCUMENT_CONTENT_DESCRIPTION));
    }

    #[test]
    fn test_retriever_applies_filter() {
        let index = Arc::new(
            IndexBuilder::new(Arc::new(KeywordEmbedder::default()))
                .build(&sample_listings())
                .unwrap(),
        );
        let chat = Arc::new(ScriptedChat::new(vec![
            r#"{"query": "home", "filter": [{"attribute": "Bedrooms", "comparator": "gte", "value": 4}]}"#,
        ]));
        let retriever = SelfQueryRetriever::new(index, QueryConstructor::new(chat.clone(), 0.2));

        let matches = retriever.search("a home with at least four bedrooms").unwrap();

        assert!(!matches.is_empty());
        assert!(matches.iter().all(|m| m.metadata["Bedrooms"].as_u64().unwrap() >= 4));
        assert_eq!(chat.temperatures(), vec![0.2]);
    }

    #[test]
    fn test_retriever_no_candidates_returns_empty() {
        let index = Arc::new(
            IndexBuilder::new(Arc::new(KeywordEmbedder::default()))
                .build(&sample_listings())
                .unwrap(),
        );
        let chat = Arc::new(ScriptedChat::new(vec![
            r#"{"query": "castle", "filter": [{"attribute": "Price", "comparator": "lt", "value": 10}]}"#,
        ]));
        let retriever = SelfQueryRetriever::new(index, QueryConstructor::new(chat, 0.2));

        assert!(retriever.search("a castle for ten dollars").unwrap().is_empty());
    }

    #[test]
    fn test_retriever_blank_query_falls_back_to_preference() {
        let index = Arc::new(
            IndexBuilder::new(Arc::new(KeywordEmbedder::default()))
                .build(&sample_listings())
                .unwrap(),
        );
        let chat = Arc::new(ScriptedChat::new(vec![r#"{"query": "", "filter": []}"#]));
        let retriever = SelfQueryRetriever::new(index, QueryConstructor::new(chat, 0.2));

        let matches = retriever.search("lake water").unwrap();
        assert_eq!(matches[0].metadata["Neighborhood"], "Lakeview");
    }
}
