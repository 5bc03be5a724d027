use serde::{Deserialize, Serialize};
use std::{path::Path, time::Instant};

/// Columns every listings file must carry, in flattening order.
pub const CSV_HEADERS: [&str; 7] = [
    "Neighborhood",
    "Price",
    "Bedrooms",
    "Bathrooms",
    "House Size",
    "Description",
    "Neighborhood Description",
];

/// One row of the listings table. Identity is the row position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "Neighborhood")]
    pub neighborhood: String,
    #[serde(rename = "Price")]
    pub price: i64,
    #[serde(rename = "Bedrooms")]
    pub bedrooms: u32,
    #[serde(rename = "Bathrooms")]
    pub bathrooms: f64,
    /// Square feet
    #[serde(rename = "House Size")]
    pub house_size: u32,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Neighborhood Description")]
    pub neighborhood_description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("could not open listings file {path}: {source}")]
    Open {
        path: String,
        source: csv::Error,
    },

    #[error("listings file is missing required column '{0}'")]
    MissingColumn(String),

    #[error("malformed listing at row {row}: {source}")]
    MalformedRow { row: usize, source: csv::Error },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl Listing {
    /// Bathrooms as a decimal that always keeps a fractional digit (`2.0`, `2.5`).
    pub fn bathrooms_display(&self) -> String {
        if self.bathrooms.is_finite() && self.bathrooms.fract() == 0.0 {
            format!("{:.1}", self.bathrooms)
        } else {
            self.bathrooms.to_string()
        }
    }
}

/// Load every listing from a CSV file with a header row.
///
/// Fails on the first missing column or unparsable row; there is no
/// skip-bad-row policy.
pub fn load_listings<P: AsRef<Path>>(path: P) -> Result<Vec<Listing>, ListingError> {
    let path = path.as_ref();
    let now = Instant::now();

    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|source| ListingError::Open {
            path: path.display().to_string(),
            source,
        })?;

    let listings = read_listings(reader)?;

    log::debug!(
        "took {}ms to read {} listings from {}",
        now.elapsed().as_micros() as f64 / 1000.0,
        listings.len(),
        path.display()
    );

    Ok(listings)
}

/// Parse listings from any reader. Split out so tests can feed strings.
pub fn read_listings<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<Listing>, ListingError> {
    let headers = reader.headers()?.clone();
    for required in CSV_HEADERS {
        if !headers.iter().any(|h| h == required) {
            return Err(ListingError::MissingColumn(required.to_string()));
        }
    }

    let mut listings = vec![];
    for (row, record) in reader.deserialize::<Listing>().enumerate() {
        let listing = record.map_err(|source| ListingError::MalformedRow { row, source })?;
        listings.push(listing);
    }

    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Neighborhood,Price,Bedrooms,Bathrooms,House Size,Description,Neighborhood Description";

    fn parse(data: &str) -> Result<Vec<Listing>, ListingError> {
        read_listings(csv::Reader::from_reader(data.as_bytes()))
    }

    #[test]
    fn test_reads_rows_in_order() {
        let data = format!(
            "{HEADER}\n\
             Lakeview,450000,3,2.5,1800,Cozy lakeside home,Quiet and scenic\n\
             Downtown,720000,2,2,1100,\"Loft, exposed brick\",Walkable and lively\n"
        );

        let listings = parse(&data).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].neighborhood, "Lakeview");
        assert_eq!(listings[0].price, 450000);
        assert_eq!(listings[0].bedrooms, 3);
        assert_eq!(listings[0].bathrooms, 2.5);
        assert_eq!(listings[0].house_size, 1800);
        assert_eq!(listings[1].description, "Loft, exposed brick");
    }

    #[test]
    fn test_extra_columns_ignored() {
        let data = "Id,Neighborhood,Price,Bedrooms,Bathrooms,House Size,Description,Neighborhood Description\n\
                    7,Lakeview,450000,3,2.5,1800,Cozy lakeside home,Quiet and scenic\n";

        let listings = parse(data).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].neighborhood, "Lakeview");
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let data = "Neighborhood,Price,Bedrooms,Bathrooms,Description,Neighborhood Description\n\
                    Lakeview,450000,3,2.5,Cozy lakeside home,Quiet and scenic\n";

        let err = parse(data).unwrap_err();
        assert!(matches!(err, ListingError::MissingColumn(ref c) if c == "House Size"));
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let data = format!("{HEADER}\nLakeview,cheap,3,2.5,1800,Cozy,Quiet\n");

        let err = parse(&data).unwrap_err();
        assert!(matches!(err, ListingError::MalformedRow { row: 0, .. }));
    }

    #[test]
    fn test_header_only_loads_empty() {
        let listings = parse(&format!("{HEADER}\n")).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("listings.csv");
        std::fs::write(
            &path,
            format!("{HEADER}\nLakeview,450000,3,2.5,1800,Cozy lakeside home,Quiet and scenic\n"),
        )
        .unwrap();

        let listings = load_listings(&path).unwrap();
        assert_eq!(listings.len(), 1);
    }

    #[test]
    fn test_bundled_listings_load() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/real_estate_listings.csv");

        let listings = load_listings(path).unwrap();
        assert_eq!(listings.len(), 10);
        assert_eq!(listings[0].neighborhood, "Lakeview");
        assert!(listings.iter().all(|l| !l.description.is_empty()));
    }

    #[test]
    fn test_missing_file() {
        let result = load_listings("/nonexistent/listings.csv");
        assert!(matches!(result, Err(ListingError::Open { .. })));
    }

    #[test]
    fn test_bathrooms_display() {
        let mut listing = parse(&format!("{HEADER}\nA,1,1,2,1,d,n\n")).unwrap().remove(0);
        assert_eq!(listing.bathrooms_display(), "2.0");

        listing.bathrooms = 1.5;
        assert_eq!(listing.bathrooms_display(), "1.5");
    }
}
