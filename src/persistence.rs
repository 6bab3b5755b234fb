//! CSV persistence for scraped product records.
//!
//! The header row is always written, even for an empty batch, and each
//! save overwrites the destination.

use crate::crawler::ProductRecord;
use crate::error::{AssistantError, Result};
use std::fs::{self, File};
use std::path::Path;

/// Column names, in file order.
pub const CSV_HEADER: [&str; 6] = [
    "product_id",
    "product_title",
    "rating",
    "total_reviews",
    "price",
    "top_reviews",
];

/// Write `records` to `path` as UTF-8 CSV with a header row.
pub fn persist(records: &[ProductRecord], path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| AssistantError::io(parent, e))?;
        }
    }

    let file = File::create(path).map_err(|e| AssistantError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    writer.write_record(CSV_HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| AssistantError::io(path, e))?;

    log::info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read records previously written by [`persist`].
pub fn load_records(path: &Path) -> Result<Vec<ProductRecord>> {
    let file = File::open(path).map_err(|e| AssistantError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?;
    if headers.iter().ne(CSV_HEADER) {
        return Err(AssistantError::Csv(format!(
            "Unexpected header in {}: {:?}",
            path.display(),
            headers
        )));
    }

    reader
        .deserialize()
        .map(|row| row.map_err(AssistantError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{NO_REVIEWS, NOT_AVAILABLE};
    use tempfile::TempDir;

    fn record(id: &str, reviews: &str) -> ProductRecord {
        ProductRecord {
            product_id: id.to_string(),
            title: "Phone X (Black, 128 GB)".to_string(),
            rating: "4.4".to_string(),
            total_reviews: "1,234".to_string(),
            price: "₹19,999".to_string(),
            top_reviews: reviews.to_string(),
        }
    }

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("product_reviews.csv");

        let mut sparse = record(NOT_AVAILABLE, NO_REVIEWS);
        sparse.rating = NOT_AVAILABLE.to_string();
        sparse.price = NOT_AVAILABLE.to_string();
        let original = vec![
            record("MOBX1", "Great \"battery\", lasts long || Camera, okay"),
            sparse,
        ];

        persist(&original, &path).unwrap();
        let loaded = load_records(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_header_always_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");

        persist(&[], &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "product_id,product_title,rating,total_reviews,price,top_reviews\n"
        );
        assert!(load_records(&path).unwrap().is_empty());
    }

    #[test]
    fn test_persist_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        persist(&[record("A", NO_REVIEWS), record("B", NO_REVIEWS)], &path).unwrap();
        persist(&[record("C", NO_REVIEWS)], &path).unwrap();

        let loaded = load_records(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].product_id, "C");
    }

    #[test]
    fn test_load_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();

        assert!(load_records(&path).is_err());
    }

    #[test]
    fn test_load_nonexistent() {
        assert!(load_records(Path::new("/nonexistent/products.csv")).is_err());
    }
}
