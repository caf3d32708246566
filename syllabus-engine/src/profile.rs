// ---------------------------------------------------------------------------
// ProfileBuilder: preferences to a vector in the catalog feature space
// ---------------------------------------------------------------------------
//
// 1. Content: liked titles are matched against the catalog (exact,
//    case-insensitive; otherwise the best token-coverage match above the
//    threshold) and the matched rows are averaged.
// 2. Overlay: the difficulty slot takes the preferred level's ordinal, or the
//    neutral 2.0; preferred organizations switch on their one-hot slots.
// 3. Cold start: with no liked titles, organizations or difficulty the
//    profile is the corpus centroid.
// ---------------------------------------------------------------------------

use std::collections::BTreeSet;

use crate::cosine::mean_vector;
use crate::features::{FeatureBuilder, NEUTRAL_DIFFICULTY};
use crate::text::{token_coverage, token_overlap_score};
use crate::types::{CatalogItem, Preferences};

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileConfig {
	/// Minimum share of a liked title's tokens that a catalog title must
	/// contain to count as a fuzzy match.
	pub title_match_threshold: f64,
}

impl Default for ProfileConfig {
	fn default() -> Self {
		Self {
			title_match_threshold: 0.6,
		}
	}
}

/// A preference statement mapped into feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
	pub vector: Vec<f64>,
	/// Scoring weight for the rating and enrollment boosts; not part of the
	/// vector.
	pub rating_bias: f64,
	pub cold_start: bool,
}

/// What happened while building a profile. Nothing here is an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDiagnostics {
	/// Catalog indices whose rows formed the content component.
	pub matched_items: Vec<usize>,
	pub unmatched_titles: Vec<String>,
	pub unknown_organizations: Vec<String>,
}

/// Borrowed view over a trained model's catalog, feature matrix and fitted
/// transform.
pub struct ProfileBuilder<'a> {
	catalog: &'a [CatalogItem],
	matrix: &'a [Vec<f64>],
	features: &'a FeatureBuilder,
	corpus_centroid: &'a [f64],
	config: ProfileConfig,
}

impl<'a> ProfileBuilder<'a> {
	pub fn new(
		catalog: &'a [CatalogItem],
		matrix: &'a [Vec<f64>],
		features: &'a FeatureBuilder,
		corpus_centroid: &'a [f64],
	) -> Self {
		Self {
			catalog,
			matrix,
			features,
			corpus_centroid,
			config: ProfileConfig::default(),
		}
	}

	pub fn with_config(mut self, config: ProfileConfig) -> Self {
		self.config = config;
		self
	}

	/// Catalog indices matching one liked title. Exact case-insensitive
	/// matches win and return every item with that title; otherwise the single
	/// best fuzzy match, if any clears the threshold.
	pub fn match_title(&self, liked: &str) -> Vec<usize> {
		let wanted = liked.trim().to_lowercase();
		let exact: Vec<usize> = self
			.catalog
			.iter()
			.enumerate()
			.filter(|(_, item)| item.title.to_lowercase() == wanted)
			.map(|(i, _)| i)
			.collect();
		if !exact.is_empty() {
			return exact;
		}

		let mut best: Option<(usize, f64, f64)> = None;
		for (i, item) in self.catalog.iter().enumerate() {
			let coverage = token_coverage(liked, &item.title);
			if coverage < self.config.title_match_threshold {
				continue;
			}
			let jaccard = token_overlap_score(liked, &item.title);
			let better = match best {
				None => true,
				Some((_, c, j)) => coverage > c || (coverage == c && jaccard > j),
			};
			if better {
				best = Some((i, coverage, jaccard));
			}
		}
		best.map(|(i, _, _)| vec![i]).unwrap_or_default()
	}

	pub fn build(&self, prefs: &Preferences) -> (Profile, ProfileDiagnostics) {
		let mut diagnostics = ProfileDiagnostics::default();

		if prefs.is_empty() {
			tracing::debug!("Cold-start profile: using corpus centroid");
			return (
				Profile {
					vector: self.corpus_centroid.to_vec(),
					rating_bias: prefs.rating_bias,
					cold_start: true,
				},
				diagnostics,
			);
		}

		let layout = self.features.layout();

		let mut matched: BTreeSet<usize> = BTreeSet::new();
		for liked in &prefs.liked_courses {
			let hits = self.match_title(liked);
			if hits.is_empty() {
				tracing::warn!(title = %liked, "Liked course matched no catalog title");
				diagnostics.unmatched_titles.push(liked.clone());
			}
			matched.extend(hits);
		}
		diagnostics.matched_items = matched.iter().copied().collect();

		let mut vector = mean_vector(
			matched.iter().map(|&i| self.matrix[i].as_slice()),
			layout.dim,
		)
		.unwrap_or_else(|| vec![0.0; layout.dim]);

		vector[layout.difficulty] = match prefs.difficulty {
			Some(d) => self.features.difficulty_ordinal(d.as_str()),
			None => NEUTRAL_DIFFICULTY,
		};

		for org in &prefs.preferred_organizations {
			match self.features.organization_slot(org) {
				Some(slot) => vector[layout.organization.start + slot] = 1.0,
				None => {
					tracing::warn!(organization = %org, "Preferred organization not in catalog");
					diagnostics.unknown_organizations.push(org.clone());
				}
			}
		}

		tracing::debug!(
			matched = diagnostics.matched_items.len(),
			unmatched = diagnostics.unmatched_titles.len(),
			difficulty = ?prefs.difficulty,
			organizations = prefs.preferred_organizations.len(),
			"Profile built"
		);

		(
			Profile {
				vector,
				rating_bias: prefs.rating_bias,
				cold_start: false,
			},
			diagnostics,
		)
	}
}

/// Mean of every catalog row; the cold-start profile.
pub fn corpus_centroid(matrix: &[Vec<f64>], dim: usize) -> Vec<f64> {
	mean_vector(matrix.iter().map(Vec::as_slice), dim).unwrap_or_else(|| vec![0.0; dim])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
