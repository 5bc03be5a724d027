//! Listing flattening for embedding input.
//!
//! Each listing becomes one `IndexedDocument`:
//! 1. A labeled seven-line text blob in fixed field order
//! 2. A metadata object keyed by the CSV column names
//! 3. A content hash of the text for cache validation

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::listings::{Listing, CSV_HEADERS};

/// A listing prepared for the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedDocument {
    /// Row position of the source listing
    pub position: usize,
    pub text: String,
    pub metadata: Map<String, Value>,
    #[serde(skip)]
    pub content_hash: u64,
}

impl IndexedDocument {
    pub fn from_listing(position: usize, listing: &Listing) -> Self {
        let text = flatten_listing(listing);
        let content_hash = content_hash(&text);

        Self {
            position,
            text,
            metadata: listing_metadata(listing),
            content_hash,
        }
    }
}

/// Build one document per listing, preserving input order.
pub fn build_documents(listings: &[Listing]) -> Vec<IndexedDocument> {
    listings
        .iter()
        .enumerate()
        .map(|(position, listing)| IndexedDocument::from_listing(position, listing))
        .collect()
}

/// Concatenate every field into the labeled multi-line form that gets embedded
/// and later handed back verbatim as the matched listing.
pub fn flatten_listing(listing: &Listing) -> String {
    let values = [
        listing.neighborhood.clone(),
        listing.price.to_string(),
        listing.bedrooms.to_string(),
        listing.bathrooms_display(),
        listing.house_size.to_string(),
        listing.description.clone(),
        listing.neighborhood_description.clone(),
    ];

    CSV_HEADERS
        .iter()
        .zip(values.iter())
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The listing's fields as a name -> value mapping.
pub fn listing_metadata(listing: &Listing) -> Map<String, Value> {
    let mut metadata = Map::with_capacity(CSV_HEADERS.len());
    metadata.insert(
        "Neighborhood".to_string(),
        Value::String(listing.neighborhood.clone()),
    );
    metadata.insert("Price".to_string(), Value::from(listing.price));
    metadata.insert("Bedrooms".to_string(), Value::from(listing.bedrooms));
    metadata.insert(
        "Bathrooms".to_string(),
        Number::from_f64(listing.bathrooms)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    metadata.insert("House Size".to_string(), Value::from(listing.house_size));
    metadata.insert(
        "Description".to_string(),
        Value::String(listing.description.clone()),
    );
    metadata.insert(
        "Neighborhood Description".to_string(),
        Value::String(listing.neighborhood_description.clone()),
    );
    metadata
}

/// Compute a hash of the flattened text for change detection.
/// Used to decide whether a cached embedding still belongs to its row.
pub fn content_hash(text: &str) -> u64 {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
