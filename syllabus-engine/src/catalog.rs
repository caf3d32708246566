// ---------------------------------------------------------------------------
// Catalog loading: CSV or JSON course records
// ---------------------------------------------------------------------------
//
// CSV files are read with headers; either the short field names (`title`,
// `organization`, ...) or the public dataset's `course_*` column names work.
// JSON files hold an array of the same records. Rows that fail to decode are
// skipped and counted rather than failing the whole load.
// ---------------------------------------------------------------------------

use std::io::Read;
use std::path::Path;

use crate::error::EngineError;
use crate::types::CatalogItem;

/// Columns a CSV catalog must carry, each with its accepted spellings.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
	("title", &["title", "course_title"]),
	("organization", &["organization", "course_organization"]),
	(
		"certificate_type",
		&["certificate_type", "course_Certificate_type", "course_certificate_type"],
	),
	("rating", &["rating", "course_rating"]),
	("difficulty", &["difficulty", "course_difficulty"]),
	("enrollment", &["enrollment", "course_students_enrolled"]),
];

#[derive(Debug, Clone)]
pub struct CatalogLoad {
	pub items: Vec<CatalogItem>,
	/// Rows dropped because they could not be decoded or had no title.
	pub skipped_rows: usize,
}

/// Load a catalog file. `.json` files are read as a JSON array; anything else
/// as CSV.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<CatalogLoad, EngineError> {
	let path = path.as_ref();
	let is_json = path
		.extension()
		.and_then(|e| e.to_str())
		.is_some_and(|e| e.eq_ignore_ascii_case("json"));

	let load = if is_json {
		let data = std::fs::read(path)?;
		read_json(&data)?
	} else {
		let file = std::fs::File::open(path)?;
		read_csv(file)?
	};

	tracing::info!(
		path = %path.display(),
		items = load.items.len(),
		skipped = load.skipped_rows,
		"Catalog loaded"
	);
	Ok(load)
}

/// Read CSV records from any reader.
pub fn read_csv<R: Read>(reader: R) -> Result<CatalogLoad, EngineError> {
	let mut reader = csv::ReaderBuilder::new()
		.trim(csv::Trim::All)
		.from_reader(reader);

	let headers = reader
		.headers()
		.map_err(|e| EngineError::Catalog(format!("Failed to read headers: {}", e)))?
		.clone();

	let missing: Vec<&str> = REQUIRED_COLUMNS
		.iter()
		.filter(|(_, spellings)| !headers.iter().any(|h| spellings.contains(&h)))
		.map(|(name, _)| *name)
		.collect();
	if !missing.is_empty() {
		return Err(EngineError::Catalog(format!(
			"missing columns: {}",
			missing.join(", ")
		)));
	}

	let mut items = Vec::new();
	let mut skipped_rows = 0;
	// Line 1 is the header.
	for (row, result) in reader.deserialize::<CatalogItem>().enumerate() {
		match result {
			Ok(item) => keep_or_skip(item, &mut items, &mut skipped_rows),
			Err(e) => {
				tracing::warn!(line = row + 2, "Skipping catalog row: {}", e);
				skipped_rows += 1;
			}
		}
	}

	finish(items, skipped_rows)
}

/// Read a JSON array of records. Elements that do not decode are skipped.
pub fn read_json(data: &[u8]) -> Result<CatalogLoad, EngineError> {
	let values: Vec<serde_json::Value> = serde_json::from_slice(data)
		.map_err(|e| EngineError::Catalog(format!("expected a JSON array of courses: {}", e)))?;

	let mut items = Vec::new();
	let mut skipped_rows = 0;
	for (idx, value) in values.into_iter().enumerate() {
		match serde_json::from_value::<CatalogItem>(value) {
			Ok(item) => keep_or_skip(item, &mut items, &mut skipped_rows),
			Err(e) => {
				tracing::warn!(index = idx, "Skipping catalog entry: {}", e);
				skipped_rows += 1;
			}
		}
	}

	finish(items, skipped_rows)
}

fn keep_or_skip(mut item: CatalogItem, items: &mut Vec<CatalogItem>, skipped: &mut usize) {
	item.title = item.title.trim().to_string();
	if item.title.is_empty() {
		*skipped += 1;
		return;
	}
	item.organization = item.organization.trim().to_string();
	item.certificate_type = item.certificate_type.trim().to_string();
	item.difficulty = item.difficulty.trim().to_string();
	items.push(item);
}

fn finish(items: Vec<CatalogItem>, skipped_rows: usize) -> Result<CatalogLoad, EngineError> {
	if items.is_empty() {
		return Err(EngineError::EmptyCatalog);
	}
	if skipped_rows > 0 {
		tracing::warn!(skipped = skipped_rows, "Catalog rows skipped");
	}
	Ok(CatalogLoad {
		items,
		skipped_rows,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	const DATASET_CSV: &str = "\
,course_title,course_organization,course_Certificate_type,course_rating,course_difficulty,course_students_enrolled
134,Machine Learning,Stanford University,COURSE,4.9,Mixed,3.2M
743,Python for Everybody,University of Michigan,SPECIALIZATION,4.8,Beginner,1.5M
";

	#[test]
	fn reads_dataset_columns() {
		let load = read_csv(DATASET_CSV.as_bytes()).unwrap();
		assert_eq!(load.items.len(), 2);
		assert_eq!(load.skipped_rows, 0);
		assert_eq!(load.items[0].title, "Machine Learning");
		assert_eq!(load.items[1].enrollment, "1.5M");
		assert!((load.items[1].rating - 4.8).abs() < 1e-12);
	}

	#[test]
	fn reads_short_column_names() {
		let csv = "title,organization,certificate_type,rating,difficulty,enrollment\n\
			Cryptography,Stanford University,COURSE,4.0,Advanced,n/a\n";
		let load = read_csv(csv.as_bytes()).unwrap();
		assert_eq!(load.items[0].difficulty, "Advanced");
	}

	#[test]
	fn bad_rows_are_skipped_and_counted() {
		let csv = "title,organization,certificate_type,rating,difficulty,enrollment\n\
			Good,Org,COURSE,4.5,Beginner,10k\n\
			Bad Rating,Org,COURSE,not-a-number,Beginner,10k\n\
			,Org,COURSE,4.1,Beginner,10k\n";
		let load = read_csv(csv.as_bytes()).unwrap();
		assert_eq!(load.items.len(), 1);
		assert_eq!(load.skipped_rows, 2);
	}

	#[test]
	fn missing_columns_are_reported() {
		let csv = "title,rating\nSolo,4.0\n";
		let err = read_csv(csv.as_bytes()).unwrap_err();
		let msg = err.to_string();
		assert!(msg.contains("organization"));
		assert!(msg.contains("enrollment"));
		assert!(!msg.contains("title,"));
	}

	#[test]
	fn header_only_is_empty_catalog() {
		let csv = "title,organization,certificate_type,rating,difficulty,enrollment\n";
		assert!(matches!(read_csv(csv.as_bytes()), Err(EngineError::EmptyCatalog)));
	}

	#[test]
	fn reads_json_array() {
		let json = br#"[
			{"title": "Deep Learning", "organization": "deeplearning.ai",
			 "certificate_type": "SPECIALIZATION", "rating": 4.8,
			 "difficulty": "Intermediate", "enrollment": "690k"},
			{"title": "Broken"}
		]"#;
		let load = read_json(json).unwrap();
		assert_eq!(load.items.len(), 1);
		assert_eq!(load.skipped_rows, 1);
	}

	#[test]
	fn load_dispatches_on_extension() {
		let dir = tempfile::tempdir().unwrap();
		let csv_path = dir.path().join("courses.csv");
		std::fs::write(&csv_path, DATASET_CSV).unwrap();
		assert_eq!(load_catalog(&csv_path).unwrap().items.len(), 2);

		let json_path = dir.path().join("courses.JSON");
		std::fs::write(
			&json_path,
			r#"[{"course_title": "A", "course_organization": "O",
				"course_Certificate_type": "COURSE", "course_rating": 4.0,
				"course_difficulty": "Beginner", "course_students_enrolled": "1k"}]"#,
		)
		.unwrap();
		assert_eq!(load_catalog(&json_path).unwrap().items.len(), 1);
	}

	#[test]
	fn missing_file_is_io_error() {
		let err = load_catalog("/nonexistent/courses.csv").unwrap_err();
		assert_eq!(err.code(), "IO_ERROR");
	}
}
