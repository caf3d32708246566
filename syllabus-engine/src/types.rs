use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EngineError;

/// Smallest and largest number of results a request may ask for.
pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 50;
pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_RATING_BIAS: f64 = 0.1;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One course record as loaded from the catalog. Immutable after load.
///
/// Aliases accept the column names of the public Coursera course dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
	#[serde(alias = "course_title")]
	pub title: String,
	#[serde(alias = "course_organization")]
	pub organization: String,
	#[serde(alias = "course_Certificate_type", alias = "course_certificate_type")]
	pub certificate_type: String,
	#[serde(alias = "course_rating")]
	pub rating: f64,
	#[serde(alias = "course_difficulty")]
	pub difficulty: String,
	/// Raw enrollment string with an optional magnitude suffix, e.g. "1.2M".
	#[serde(alias = "course_students_enrolled")]
	pub enrollment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
	Beginner,
	Intermediate,
	Advanced,
	Mixed,
}

impl Difficulty {
	pub const ALL: [Difficulty; 4] = [
		Difficulty::Beginner,
		Difficulty::Intermediate,
		Difficulty::Advanced,
		Difficulty::Mixed,
	];

	/// Case-insensitive parse of a difficulty label.
	pub fn parse(label: &str) -> Option<Self> {
		let label = label.trim();
		Self::ALL
			.into_iter()
			.find(|d| d.as_str().eq_ignore_ascii_case(label))
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Beginner => "Beginner",
			Self::Intermediate => "Intermediate",
			Self::Advanced => "Advanced",
			Self::Mixed => "Mixed",
		}
	}

	/// Position on the ordinal difficulty scale.
	pub fn ordinal(&self) -> f64 {
		match self {
			Self::Beginner => 1.0,
			Self::Intermediate => 2.0,
			Self::Mixed => 2.5,
			Self::Advanced => 3.0,
		}
	}
}

impl fmt::Display for Difficulty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_limit() -> i64 {
	DEFAULT_LIMIT
}

fn default_rating_bias() -> f64 {
	DEFAULT_RATING_BIAS
}

fn default_true() -> bool {
	true
}

/// A caller's stated preferences, as received on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceRequest {
	#[serde(default)]
	pub preferred_difficulty: Option<String>,
	#[serde(default, deserialize_with = "null_to_default")]
	pub liked_courses: Vec<String>,
	#[serde(default, deserialize_with = "null_to_default")]
	pub preferred_organizations: Vec<String>,
	#[serde(default = "default_limit")]
	pub limit: i64,
	#[serde(default = "default_rating_bias")]
	pub rating_bias: f64,
	/// Titles to drop from the results.
	#[serde(default, deserialize_with = "null_to_default")]
	pub exclude_courses: Vec<String>,
	/// Drop items whose title exactly matches a liked title.
	#[serde(default = "default_true")]
	pub exclude_liked: bool,
}

impl Default for PreferenceRequest {
	fn default() -> Self {
		Self {
			preferred_difficulty: None,
			liked_courses: Vec::new(),
			preferred_organizations: Vec::new(),
			limit: DEFAULT_LIMIT,
			rating_bias: DEFAULT_RATING_BIAS,
			exclude_courses: Vec::new(),
			exclude_liked: true,
		}
	}
}

/// A request that passed validation. Blank list entries are dropped and
/// `limit` is already clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
	pub difficulty: Option<Difficulty>,
	pub liked_courses: Vec<String>,
	pub preferred_organizations: Vec<String>,
	pub limit: usize,
	pub rating_bias: f64,
	pub exclude_courses: Vec<String>,
	pub exclude_liked: bool,
}

impl Preferences {
	/// True when the request carries no distinguishing input at all.
	pub fn is_empty(&self) -> bool {
		self.difficulty.is_none()
			&& self.liked_courses.is_empty()
			&& self.preferred_organizations.is_empty()
	}
}

/// Clamp a requested result count into `[MIN_LIMIT, MAX_LIMIT]`.
pub fn clamp_limit(limit: i64) -> usize {
	limit.clamp(MIN_LIMIT as i64, MAX_LIMIT as i64) as usize
}

fn non_blank(values: &[String]) -> Vec<String> {
	values
		.iter()
		.map(|v| v.trim())
		.filter(|v| !v.is_empty())
		.map(str::to_string)
		.collect()
}

impl PreferenceRequest {
	/// Validate the request. With `strict_limit`, an out-of-range limit is
	/// rejected instead of clamped.
	pub fn validate(&self, strict_limit: bool) -> Result<Preferences, EngineError> {
		let difficulty = match self.preferred_difficulty.as_deref().map(str::trim) {
			None | Some("") => None,
			Some(label) => Some(Difficulty::parse(label).ok_or_else(|| {
				EngineError::Validation(format!(
					"invalid difficulty '{}': must be one of Beginner, Intermediate, Advanced, Mixed",
					label
				))
			})?),
		};

		if !self.rating_bias.is_finite() || !(0.0..=1.0).contains(&self.rating_bias) {
			return Err(EngineError::Validation(format!(
				"rating_bias must be within [0, 1], got {}",
				self.rating_bias
			)));
		}

		let in_range = (MIN_LIMIT as i64..=MAX_LIMIT as i64).contains(&self.limit);
		if strict_limit && !in_range {
			return Err(EngineError::Validation(format!(
				"limit must be within [{}, {}], got {}",
				MIN_LIMIT, MAX_LIMIT, self.limit
			)));
		}

		Ok(Preferences {
			difficulty,
			liked_courses: non_blank(&self.liked_courses),
			preferred_organizations: non_blank(&self.preferred_organizations),
			limit: clamp_limit(self.limit),
			rating_bias: self.rating_bias,
			exclude_courses: non_blank(&self.exclude_courses),
			exclude_liked: self.exclude_liked,
		})
	}
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One ranked, explained course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
	pub title: String,
	pub organization: String,
	pub certificate_type: String,
	pub rating: f64,
	pub difficulty: String,
	pub enrollment: String,
	pub similarity_score: f64,
	pub cluster: usize,
	pub explanation: String,
}

/// Training-quality diagnostics. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
	pub silhouette_score: f64,
	pub intra_cluster_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationCount {
	pub organization: String,
	pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterQuality {
	/// Average pairwise cosine similarity of this cluster's members.
	pub intra_cluster_similarity: f64,
	/// Silhouette score of the whole clustering.
	pub silhouette_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
	pub cluster_id: usize,
	pub size: usize,
	pub avg_rating: f64,
	pub difficulty_distribution: BTreeMap<String, usize>,
	pub top_organizations: Vec<OrganizationCount>,
	/// Member titles ordered by distance to the centroid, closest first.
	pub representative_items: Vec<String>,
	pub quality: ClusterQuality,
}

/// Point-in-time copy of the serving counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServingStatsSnapshot {
	pub requests: u64,
	pub unmatched_titles: u64,
	pub unknown_organizations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
	pub model_loaded: bool,
	pub item_count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub k: Option<usize>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub trained_at: Option<String>,
	pub stats: ServingStatsSnapshot,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn difficulty_parse_is_case_insensitive() {
		assert_eq!(Difficulty::parse("advanced"), Some(Difficulty::Advanced));
		assert_eq!(Difficulty::parse(" Mixed "), Some(Difficulty::Mixed));
		assert_eq!(Difficulty::parse("Expert"), None);
	}

	#[test]
	fn ordinal_scale_orders_levels() {
		assert!(Difficulty::Beginner.ordinal() < Difficulty::Intermediate.ordinal());
		assert!(Difficulty::Intermediate.ordinal() < Difficulty::Mixed.ordinal());
		assert!(Difficulty::Mixed.ordinal() < Difficulty::Advanced.ordinal());
	}

	#[test]
	fn request_defaults_from_empty_json() {
		let req: PreferenceRequest = serde_json::from_str("{}").unwrap();
		assert_eq!(req.limit, 10);
		assert!((req.rating_bias - 0.1).abs() < 1e-12);
		assert!(req.liked_courses.is_empty());
		assert!(req.exclude_liked);
	}

	#[test]
	fn request_accepts_null_lists() {
		let req: PreferenceRequest =
			serde_json::from_str(r#"{"liked_courses": null, "preferred_organizations": null}"#)
				.unwrap();
		assert!(req.liked_courses.is_empty());
		assert!(req.preferred_organizations.is_empty());
	}

	#[test]
	fn limit_is_clamped_silently() {
		let mut req = PreferenceRequest {
			limit: 100,
			..Default::default()
		};
		assert_eq!(req.validate(false).unwrap().limit, 50);
		req.limit = 0;
		assert_eq!(req.validate(false).unwrap().limit, 1);
		req.limit = -7;
		assert_eq!(req.validate(false).unwrap().limit, 1);
	}

	#[test]
	fn strict_limit_rejects_out_of_range() {
		let req = PreferenceRequest {
			limit: 51,
			..Default::default()
		};
		assert!(matches!(req.validate(true), Err(EngineError::Validation(_))));
	}

	#[test]
	fn invalid_difficulty_is_validation_error() {
		let req = PreferenceRequest {
			preferred_difficulty: Some("Expert".into()),
			..Default::default()
		};
		let err = req.validate(false).unwrap_err();
		assert_eq!(err.code(), "VALIDATION_ERROR");
	}

	#[test]
	fn rating_bias_out_of_range_rejected() {
		for bias in [-0.1, 1.5, f64::NAN] {
			let req = PreferenceRequest {
				rating_bias: bias,
				..Default::default()
			};
			assert!(req.validate(false).is_err(), "bias {bias} accepted");
		}
	}

	#[test]
	fn blank_entries_are_dropped() {
		let req = PreferenceRequest {
			preferred_difficulty: Some("  ".into()),
			liked_courses: vec!["".into(), " Python ".into()],
			..Default::default()
		};
		let prefs = req.validate(false).unwrap();
		assert_eq!(prefs.difficulty, None);
		assert_eq!(prefs.liked_courses, vec!["Python".to_string()]);
		assert!(!prefs.is_empty());
	}

	#[test]
	fn catalog_item_reads_dataset_column_names() {
		let json = r#"{
			"course_title": "Machine Learning",
			"course_organization": "Stanford University",
			"course_Certificate_type": "COURSE",
			"course_rating": 4.9,
			"course_difficulty": "Mixed",
			"course_students_enrolled": "3.2M"
		}"#;
		let item: CatalogItem = serde_json::from_str(json).unwrap();
		assert_eq!(item.title, "Machine Learning");
		assert_eq!(item.certificate_type, "COURSE");
		assert_eq!(item.enrollment, "3.2M");
	}
}
