// ---------------------------------------------------------------------------
// FeatureBuilder: catalog records to fixed-length numeric vectors
// ---------------------------------------------------------------------------
//
// Vector layout, fixed at fit time:
//
//   [ one-hot organization | one-hot certificate type | TF-IDF title |
//     rating (min-max) | enrollment (min-max) | difficulty (ordinal) ]
//
// Fitting learns the category vocabularies (first-seen order), the title
// vocabulary with IDF weights, and min/max statistics. `transform` only reads
// that state, so one fitted builder serves catalog rows and preference
// profiles alike, from any number of threads.
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::text::TfIdfVectorizer;
use crate::types::{CatalogItem, Difficulty};

/// Ordinal used for unknown difficulty labels and for profiles that state no
/// difficulty.
pub const NEUTRAL_DIFFICULTY: f64 = 2.0;

static ENROLLMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(\d+(?:\.\d+)?|\.\d+)\s*([KM]?)").expect("enrollment pattern is valid")
});

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureConfig {
	/// Upper bound on the TF-IDF title vocabulary.
	pub max_title_features: usize,
}

impl Default for FeatureConfig {
	fn default() -> Self {
		Self {
			max_title_features: 50,
		}
	}
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Recovered fallbacks seen while transforming records. None of these are
/// errors; they are counted so operators can spot a drifting catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDiagnostics {
	pub unseen_organizations: usize,
	pub unseen_certificate_types: usize,
	pub unparsable_enrollments: usize,
}

impl FeatureDiagnostics {
	pub fn merge(&mut self, other: &FeatureDiagnostics) {
		self.unseen_organizations += other.unseen_organizations;
		self.unseen_certificate_types += other.unseen_certificate_types;
		self.unparsable_enrollments += other.unparsable_enrollments;
	}
}

// ---------------------------------------------------------------------------
// Enrollment parsing
// ---------------------------------------------------------------------------

/// Parse an enrollment string such as "1.2M", "350k" or "12,500" into a count.
///
/// Takes the first number in the string and an optional K (thousand) or M
/// (million) suffix. Returns `None` when no number can be read.
pub fn parse_enrollment(raw: &str) -> Option<f64> {
	let normalized = raw.trim().to_uppercase().replace(',', "");
	let caps = ENROLLMENT_PATTERN.captures(&normalized)?;
	let number: f64 = caps.get(1)?.as_str().parse().ok()?;
	let multiplier = match caps.get(2).map(|m| m.as_str()) {
		Some("M") => 1_000_000.0,
		Some("K") => 1_000.0,
		_ => 1.0,
	};
	let value = number * multiplier;
	value.is_finite().then_some(value)
}

// ---------------------------------------------------------------------------
// Scaling
// ---------------------------------------------------------------------------

/// Min-max statistics captured at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
	pub min: f64,
	pub max: f64,
}

impl MinMax {
	fn fit(values: impl IntoIterator<Item = f64>) -> Self {
		let mut min = f64::INFINITY;
		let mut max = f64::NEG_INFINITY;
		for v in values {
			min = min.min(v);
			max = max.max(v);
		}
		if !min.is_finite() || !max.is_finite() {
			return Self { min: 0.0, max: 0.0 };
		}
		Self { min, max }
	}

	/// Map `value` into [0, 1]. A zero range maps everything to 0.
	pub fn apply(&self, value: f64) -> f64 {
		let range = self.max - self.min;
		if range <= 0.0 || !value.is_finite() {
			return 0.0;
		}
		((value - self.min) / range).clamp(0.0, 1.0)
	}

	fn is_valid(&self) -> bool {
		self.min.is_finite() && self.max.is_finite() && self.min <= self.max
	}
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Slot positions inside a feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLayout {
	pub organization: Range<usize>,
	pub certificate_type: Range<usize>,
	pub title: Range<usize>,
	pub rating: usize,
	pub enrollment: usize,
	pub difficulty: usize,
	pub dim: usize,
}

// ---------------------------------------------------------------------------
// FeatureBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBuilder {
	organizations: Vec<String>,
	certificate_types: Vec<String>,
	title_tfidf: TfIdfVectorizer,
	rating_scale: MinMax,
	enrollment_scale: MinMax,
	ordinal_map: BTreeMap<String, f64>,
}

fn first_seen<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
	let mut seen: Vec<String> = Vec::new();
	for v in values {
		if !seen.iter().any(|s| s == v) {
			seen.push(v.to_string());
		}
	}
	seen
}

fn clean_rating(rating: f64) -> f64 {
	if rating.is_finite() {
		rating
	} else {
		0.0
	}
}

impl FeatureBuilder {
	/// Learn the transform from the full catalog.
	///
	/// Returns the builder plus the diagnostics gathered while reading the
	/// training records.
	pub fn fit(
		catalog: &[CatalogItem],
		config: &FeatureConfig,
	) -> Result<(Self, FeatureDiagnostics), EngineError> {
		if catalog.is_empty() {
			return Err(EngineError::EmptyCatalog);
		}

		let mut diagnostics = FeatureDiagnostics::default();
		let enrollments: Vec<f64> = catalog
			.iter()
			.map(|item| match parse_enrollment(&item.enrollment) {
				Some(v) => v,
				None => {
					diagnostics.unparsable_enrollments += 1;
					tracing::debug!(title = %item.title, raw = %item.enrollment, "Unparsable enrollment, using 0");
					0.0
				}
			})
			.collect();

		if diagnostics.unparsable_enrollments > 0 {
			tracing::warn!(
				count = diagnostics.unparsable_enrollments,
				"Enrollment strings could not be parsed; defaulted to 0"
			);
		}

		let titles: Vec<&str> = catalog.iter().map(|i| i.title.as_str()).collect();
		let ordinal_map = Difficulty::ALL
			.iter()
			.map(|d| (d.as_str().to_string(), d.ordinal()))
			.collect();

		let builder = Self {
			organizations: first_seen(catalog.iter().map(|i| i.organization.as_str())),
			certificate_types: first_seen(catalog.iter().map(|i| i.certificate_type.as_str())),
			title_tfidf: TfIdfVectorizer::fit(&titles, config.max_title_features),
			rating_scale: MinMax::fit(catalog.iter().map(|i| clean_rating(i.rating))),
			enrollment_scale: MinMax::fit(enrollments),
			ordinal_map,
		};

		tracing::info!(
			organizations = builder.organizations.len(),
			certificate_types = builder.certificate_types.len(),
			title_terms = builder.title_tfidf.dim(),
			dim = builder.dim(),
			"Feature space fitted"
		);

		Ok((builder, diagnostics))
	}

	pub fn layout(&self) -> FeatureLayout {
		let orgs = self.organizations.len();
		let certs = self.certificate_types.len();
		let terms = self.title_tfidf.dim();
		let title_end = orgs + certs + terms;
		FeatureLayout {
			organization: 0..orgs,
			certificate_type: orgs..orgs + certs,
			title: orgs + certs..title_end,
			rating: title_end,
			enrollment: title_end + 1,
			difficulty: title_end + 2,
			dim: title_end + 3,
		}
	}

	pub fn dim(&self) -> usize {
		self.organizations.len() + self.certificate_types.len() + self.title_tfidf.dim() + 3
	}

	pub fn organizations(&self) -> &[String] {
		&self.organizations
	}

	pub fn certificate_types(&self) -> &[String] {
		&self.certificate_types
	}

	pub fn ordinal_map(&self) -> &BTreeMap<String, f64> {
		&self.ordinal_map
	}

	/// Vector slot for an organization, matched exactly first and then
	/// case-insensitively.
	pub fn organization_slot(&self, organization: &str) -> Option<usize> {
		let organization = organization.trim();
		self.organizations
			.iter()
			.position(|o| o == organization)
			.or_else(|| {
				self.organizations
					.iter()
					.position(|o| o.eq_ignore_ascii_case(organization))
			})
	}

	/// Ordinal value of a difficulty label; unknown labels get the neutral 2.0.
	pub fn difficulty_ordinal(&self, label: &str) -> f64 {
		let key = Difficulty::parse(label).map(|d| d.as_str()).unwrap_or(label);
		self.ordinal_map
			.get(key)
			.copied()
			.unwrap_or(NEUTRAL_DIFFICULTY)
	}

	pub fn normalized_rating(&self, rating: f64) -> f64 {
		self.rating_scale.apply(clean_rating(rating))
	}

	pub fn normalized_enrollment(&self, enrollment: f64) -> f64 {
		self.enrollment_scale.apply(enrollment)
	}

	/// Map one record into the fitted feature space.
	pub fn transform(&self, item: &CatalogItem) -> Vec<f64> {
		let mut scratch = FeatureDiagnostics::default();
		self.transform_recording(item, &mut scratch)
	}

	/// Like [`transform`](Self::transform), counting recovered fallbacks
	/// into `diagnostics`.
	pub fn transform_recording(
		&self,
		item: &CatalogItem,
		diagnostics: &mut FeatureDiagnostics,
	) -> Vec<f64> {
		let layout = self.layout();
		let mut vector = vec![0.0; layout.dim];

		match self.organizations.iter().position(|o| *o == item.organization) {
			Some(idx) => vector[layout.organization.start + idx] = 1.0,
			None => {
				tracing::warn!(organization = %item.organization, title = %item.title, "Unseen organization, one-hot slice left at 0");
				diagnostics.unseen_organizations += 1;
			}
		}

		match self
			.certificate_types
			.iter()
			.position(|c| *c == item.certificate_type)
		{
			Some(idx) => vector[layout.certificate_type.start + idx] = 1.0,
			None => {
				tracing::warn!(certificate_type = %item.certificate_type, title = %item.title, "Unseen certificate type, one-hot slice left at 0");
				diagnostics.unseen_certificate_types += 1;
			}
		}

		let title = self.title_tfidf.transform(&item.title);
		vector[layout.title.clone()].copy_from_slice(&title);

		let enrollment = parse_enrollment(&item.enrollment).unwrap_or_else(|| {
			diagnostics.unparsable_enrollments += 1;
			0.0
		});

		vector[layout.rating] = self.normalized_rating(item.rating);
		vector[layout.enrollment] = self.normalized_enrollment(enrollment);
		vector[layout.difficulty] = self.difficulty_ordinal(&item.difficulty);

		vector
	}

	/// Transform every record, returning the matrix and the summed diagnostics.
	pub fn transform_all(&self, catalog: &[CatalogItem]) -> (Vec<Vec<f64>>, FeatureDiagnostics) {
		let mut diagnostics = FeatureDiagnostics::default();
		let matrix = catalog
			.iter()
			.map(|item| self.transform_recording(item, &mut diagnostics))
			.collect();
		(matrix, diagnostics)
	}

	/// Sanity-check state restored from disk.
	pub fn check(&self) -> Result<(), String> {
		if !self.title_tfidf.is_consistent() {
			return Err("title vocabulary is unsorted or does not match its IDF weights".into());
		}
		if !self.rating_scale.is_valid() || !self.enrollment_scale.is_valid() {
			return Err("normalization statistics are not finite".into());
		}
		if self.ordinal_map.values().any(|v| !v.is_finite()) {
			return Err("ordinal map contains a non-finite value".into());
		}
		if first_seen(self.organizations.iter().map(String::as_str)).len() != self.organizations.len()
			|| first_seen(self.certificate_types.iter().map(String::as_str)).len()
				!= self.certificate_types.len()
		{
			return Err("category vocabulary contains duplicates".into());
		}
		Ok(())
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
