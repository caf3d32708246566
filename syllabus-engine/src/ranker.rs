// ---------------------------------------------------------------------------
// Ranker: score, order and explain every catalog item for one profile
// ---------------------------------------------------------------------------
//
// Per item:
//   base      = cosine(profile, item)
//   × 1.2       when the profile's predicted cluster is the item's cluster
//   + bias × 0.05 × normalized rating
//   + bias × 0.03 × normalized enrollment
// clamped to [0, 1]. A full linear scan; no index is kept.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;

use crate::cluster::ClusterModel;
use crate::cosine::{compute_magnitude, cosine_similarity_with_magnitude};
use crate::features::{parse_enrollment, FeatureBuilder};
use crate::profile::Profile;
use crate::types::{CatalogItem, Difficulty, Preferences, Recommendation};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CLUSTER_BOOST: f64 = 1.2;
pub const RATING_WEIGHT: f64 = 0.05;
pub const ENROLLMENT_WEIGHT: f64 = 0.03;

/// Rating at or above which a boosted item is called highly rated.
pub const HIGH_RATING: f64 = 4.5;
/// Enrollment at or above which a boosted item is called popular.
pub const POPULAR_ENROLLMENT: f64 = 1_000_000.0;

const SAME_CLUSTER: &str = "Same cluster as your preferences";
const HIGHLY_RATED: &str = "Highly rated course";
const POPULAR: &str = "Popular course (1M+ enrollments)";
const FALLBACK: &str = "Similar content and features";

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score of one item with the outcome of every boost step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
	pub score: f64,
	pub base: f64,
	pub cluster_boost: bool,
	pub rating_boost: f64,
	pub enrollment_boost: f64,
}

/// Combine the signals for one item. `rating` and `enrollment` are already
/// normalized to [0, 1].
pub fn compute_score(
	base: f64,
	same_cluster: bool,
	rating: f64,
	enrollment: f64,
	rating_bias: f64,
) -> ScoreBreakdown {
	let mut score = base;
	if same_cluster {
		score *= CLUSTER_BOOST;
	}
	let rating_boost = rating_bias * RATING_WEIGHT * rating;
	let enrollment_boost = rating_bias * ENROLLMENT_WEIGHT * enrollment;
	score += rating_boost + enrollment_boost;

	let score = if score.is_finite() {
		score.clamp(0.0, 1.0)
	} else {
		0.0
	};

	ScoreBreakdown {
		score,
		base,
		cluster_boost: same_cluster,
		rating_boost,
		enrollment_boost,
	}
}

/// One scored catalog row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedItem {
	pub index: usize,
	pub cluster: usize,
	pub breakdown: ScoreBreakdown,
}

// ---------------------------------------------------------------------------
// Ranker
// ---------------------------------------------------------------------------

/// Borrowed view over a trained model for ranking.
pub struct Ranker<'a> {
	catalog: &'a [CatalogItem],
	matrix: &'a [Vec<f64>],
	magnitudes: &'a [f64],
	clusters: &'a ClusterModel,
	features: &'a FeatureBuilder,
}

impl<'a> Ranker<'a> {
	pub fn new(
		catalog: &'a [CatalogItem],
		matrix: &'a [Vec<f64>],
		magnitudes: &'a [f64],
		clusters: &'a ClusterModel,
		features: &'a FeatureBuilder,
	) -> Self {
		Self {
			catalog,
			matrix,
			magnitudes,
			clusters,
			features,
		}
	}

	/// Score every item and sort: score descending, then rating descending,
	/// then title ascending.
	pub fn score_all(&self, profile: &Profile) -> Vec<RankedItem> {
		let layout = self.features.layout();
		let profile_magnitude = compute_magnitude(&profile.vector);
		let predicted = self.clusters.predict(&profile.vector);

		let mut ranked: Vec<RankedItem> = self
			.matrix
			.iter()
			.zip(self.magnitudes)
			.enumerate()
			.map(|(index, (row, &magnitude))| {
				let cluster = self.clusters.cluster_of(index).unwrap_or(usize::MAX);
				let base = cosine_similarity_with_magnitude(
					&profile.vector,
					row,
					profile_magnitude,
					magnitude,
				);
				RankedItem {
					index,
					cluster,
					breakdown: compute_score(
						base,
						cluster == predicted,
						row[layout.rating],
						row[layout.enrollment],
						profile.rating_bias,
					),
				}
			})
			.collect();

		ranked.sort_by(|a, b| self.compare(a, b));
		ranked
	}

	fn compare(&self, a: &RankedItem, b: &RankedItem) -> Ordering {
		let (ia, ib) = (&self.catalog[a.index], &self.catalog[b.index]);
		b.breakdown
			.score
			.total_cmp(&a.breakdown.score)
			.then_with(|| ib.rating.total_cmp(&ia.rating))
			.then_with(|| ia.title.cmp(&ib.title))
	}

	/// Rank, drop excluded titles, truncate to the limit and explain.
	pub fn rank(&self, profile: &Profile, prefs: &Preferences) -> Vec<Recommendation> {
		let excluded: Vec<String> = prefs
			.exclude_courses
			.iter()
			.chain(prefs.liked_courses.iter().filter(|_| prefs.exclude_liked))
			.map(|t| t.to_lowercase())
			.collect();

		self.score_all(profile)
			.into_iter()
			.filter(|r| {
				let title = self.catalog[r.index].title.to_lowercase();
				!excluded.contains(&title)
			})
			.take(prefs.limit)
			.map(|r| {
				let item = &self.catalog[r.index];
				Recommendation {
					title: item.title.clone(),
					organization: item.organization.clone(),
					certificate_type: item.certificate_type.clone(),
					rating: item.rating,
					difficulty: item.difficulty.clone(),
					enrollment: item.enrollment.clone(),
					similarity_score: r.breakdown.score,
					cluster: r.cluster,
					explanation: explain(item, &r.breakdown, prefs),
				}
			})
			.collect()
	}
}

// ---------------------------------------------------------------------------
// Explanation
// ---------------------------------------------------------------------------

/// Build the explanation from boost outcomes and item attributes.
pub fn explain(item: &CatalogItem, breakdown: &ScoreBreakdown, prefs: &Preferences) -> String {
	let mut parts: Vec<String> = Vec::new();

	if breakdown.cluster_boost {
		parts.push(SAME_CLUSTER.to_string());
	}
	if let Some(wanted) = prefs.difficulty {
		if Difficulty::parse(&item.difficulty) == Some(wanted) {
			parts.push(format!("Matches your {} difficulty preference", wanted));
		}
	}
	if prefs
		.preferred_organizations
		.iter()
		.any(|o| o.eq_ignore_ascii_case(item.organization.trim()))
	{
		parts.push(format!("From preferred organization: {}", item.organization));
	}
	if breakdown.rating_boost > 0.0 && item.rating >= HIGH_RATING {
		parts.push(HIGHLY_RATED.to_string());
	}
	if breakdown.enrollment_boost > 0.0
		&& parse_enrollment(&item.enrollment).is_some_and(|e| e >= POPULAR_ENROLLMENT)
	{
		parts.push(POPULAR.to_string());
	}

	if parts.is_empty() {
		FALLBACK.to_string()
	} else {
		parts.join("; ")
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cluster::ClusterConfig;
	use crate::features::FeatureConfig;
	use crate::profile::{corpus_centroid, ProfileBuilder};
	use crate::types::PreferenceRequest;

	fn item(title: &str, org: &str, rating: f64, difficulty: &str, enrollment: &str) -> CatalogItem {
		CatalogItem {
			title: title.to_string(),
			organization: org.to_string(),
			certificate_type: "COURSE".to_string(),
			rating,
			difficulty: difficulty.to_string(),
			enrollment: enrollment.to_string(),
		}
	}

	struct Trained {
		catalog: Vec<CatalogItem>,
		matrix: Vec<Vec<f64>>,
		magnitudes: Vec<f64>,
		clusters: ClusterModel,
		features: FeatureBuilder,
		centroid: Vec<f64>,
	}

	impl Trained {
		fn new(catalog: Vec<CatalogItem>, cluster: ClusterConfig) -> Self {
			let (features, _) = FeatureBuilder::fit(&catalog, &FeatureConfig::default()).unwrap();
			let (matrix, _) = features.transform_all(&catalog);
			let magnitudes = matrix.iter().map(|r| compute_magnitude(r)).collect();
			let clusters = ClusterModel::fit(&matrix, &cluster).unwrap().model;
			let centroid = corpus_centroid(&matrix, features.dim());
			Self {
				catalog,
				matrix,
				magnitudes,
				clusters,
				features,
				centroid,
			}
		}

		fn recommend(&self, req: PreferenceRequest) -> Vec<Recommendation> {
			let prefs = req.validate(false).unwrap();
			let (profile, _) =
				ProfileBuilder::new(&self.catalog, &self.matrix, &self.features, &self.centroid)
					.build(&prefs);
			Ranker::new(
				&self.catalog,
				&self.matrix,
				&self.magnitudes,
				&self.clusters,
				&self.features,
			)
			.rank(&profile, &prefs)
		}
	}

	fn scenario() -> Trained {
		Trained::new(
			vec![
				item("Advanced Algorithms", "X", 4.8, "Advanced", "50k"),
				item("Cooking Basics", "Y", 3.0, "Beginner", "50k"),
				item("Advanced Compilers", "X", 4.5, "Advanced", "50k"),
			],
			ClusterConfig::default(),
		)
	}

	fn catalog() -> Vec<CatalogItem> {
		vec![
			item("Machine Learning", "Stanford University", 4.9, "Mixed", "3.2M"),
			item("Deep Learning", "deeplearning.ai", 4.8, "Intermediate", "690k"),
			item("Python for Everybody", "University of Michigan", 4.8, "Beginner", "1.5M"),
			item("Python Data Structures", "University of Michigan", 4.9, "Beginner", "420k"),
			item("Financial Markets", "Yale University", 4.8, "Beginner", "830k"),
			item("Cryptography", "Stanford University", 4.6, "Advanced", "88k"),
			item("Algorithms, Part I", "Princeton University", 4.9, "Intermediate", "350k"),
			item("The Science of Well-Being", "Yale University", 4.9, "Mixed", "2.5M"),
		]
	}

	// -- compute_score ---------------------------------------------------------

	#[test]
	fn score_combines_boosts() {
		let b = compute_score(0.5, true, 1.0, 1.0, 1.0);
		assert!((b.score - (0.6 + 0.05 + 0.03)).abs() < 1e-12);
		assert!(b.cluster_boost);

		let plain = compute_score(0.5, false, 0.0, 0.0, 0.0);
		assert!((plain.score - 0.5).abs() < 1e-12);
		assert_eq!(plain.rating_boost, 0.0);
	}

	#[test]
	fn score_is_clamped() {
		assert_eq!(compute_score(0.95, true, 1.0, 1.0, 1.0).score, 1.0);
		assert_eq!(compute_score(-0.8, true, 0.0, 0.0, 0.5).score, 0.0);
		assert_eq!(compute_score(f64::NAN, false, 0.0, 0.0, 0.0).score, 0.0);
	}

	// -- Scenario ----------------------------------------------------------------

	#[test]
	fn three_item_scenario() {
		let t = scenario();
		let a = t.clusters.assignments();
		assert_eq!(t.clusters.k(), 2);
		assert_eq!(a[0], a[2]);
		assert_ne!(a[0], a[1]);

		let recs = t.recommend(PreferenceRequest {
			preferred_difficulty: Some("Advanced".into()),
			limit: 2,
			..Default::default()
		});
		let titles: Vec<&str> = recs.iter().map(|r| r.title.as_str()).collect();
		assert_eq!(titles, vec!["Advanced Algorithms", "Advanced Compilers"]);
		for r in &recs {
			assert!(r.explanation.contains(SAME_CLUSTER), "{}", r.explanation);
			assert!(r.explanation.contains("Matches your Advanced difficulty preference"));
		}
	}

	// -- Properties --------------------------------------------------------------

	#[test]
	fn scores_are_bounded_and_sorted() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let recs = t.recommend(PreferenceRequest {
			liked_courses: vec!["Machine Learning".into()],
			rating_bias: 1.0,
			limit: 50,
			..Default::default()
		});
		assert!(!recs.is_empty());
		for pair in recs.windows(2) {
			assert!(pair[0].similarity_score >= pair[1].similarity_score);
		}
		for r in &recs {
			assert!((0.0..=1.0).contains(&r.similarity_score));
		}
	}

	#[test]
	fn limit_bounds_result_count() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let recs = t.recommend(PreferenceRequest {
			limit: 3,
			..Default::default()
		});
		assert_eq!(recs.len(), 3);

		let all = t.recommend(PreferenceRequest {
			limit: 500,
			..Default::default()
		});
		assert_eq!(all.len(), t.catalog.len());
	}

	#[test]
	fn same_cluster_iff_boost_fired() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let prefs = PreferenceRequest {
			liked_courses: vec!["Python for Everybody".into()],
			limit: 50,
			exclude_liked: false,
			..Default::default()
		}
		.validate(false)
		.unwrap();
		let (profile, _) = ProfileBuilder::new(&t.catalog, &t.matrix, &t.features, &t.centroid)
			.build(&prefs);
		let predicted = t.clusters.predict(&profile.vector);
		let recs = Ranker::new(&t.catalog, &t.matrix, &t.magnitudes, &t.clusters, &t.features)
			.rank(&profile, &prefs);
		for r in &recs {
			assert_eq!(r.explanation.contains(SAME_CLUSTER), r.cluster == predicted);
		}
	}

	#[test]
	fn liked_titles_are_excluded_by_default() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let recs = t.recommend(PreferenceRequest {
			liked_courses: vec!["deep learning".into()],
			limit: 50,
			..Default::default()
		});
		assert!(recs.iter().all(|r| r.title != "Deep Learning"));
		assert_eq!(recs.len(), t.catalog.len() - 1);

		let kept = t.recommend(PreferenceRequest {
			liked_courses: vec!["Deep Learning".into()],
			exclude_liked: false,
			limit: 1,
			..Default::default()
		});
		assert_eq!(kept[0].title, "Deep Learning");
	}

	#[test]
	fn exclude_courses_applies_before_limit() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let first = t.recommend(PreferenceRequest {
			limit: 1,
			..Default::default()
		});
		let next = t.recommend(PreferenceRequest {
			limit: 1,
			exclude_courses: vec![first[0].title.clone()],
			..Default::default()
		});
		assert_eq!(next.len(), 1);
		assert_ne!(next[0].title, first[0].title);
	}

	#[test]
	fn cold_start_returns_limit_explained_items() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let req = PreferenceRequest {
			limit: 3,
			..Default::default()
		};
		let first = t.recommend(req.clone());
		assert_eq!(first.len(), 3);
		for r in &first {
			assert!(!r.explanation.is_empty());
		}
		assert_eq!(first, t.recommend(req));
	}

	#[test]
	fn ranking_is_deterministic() {
		let t = Trained::new(catalog(), ClusterConfig::default());
		let req = PreferenceRequest {
			preferred_organizations: vec!["Yale University".into()],
			..Default::default()
		};
		assert_eq!(t.recommend(req.clone()), t.recommend(req));
	}

	// -- Explanations ------------------------------------------------------------

	fn prefs(req: PreferenceRequest) -> Preferences {
		req.validate(false).unwrap()
	}

	#[test]
	fn explanation_lists_parts_in_order() {
		let it = item("Machine Learning", "Stanford University", 4.9, "Mixed", "3.2M");
		let p = prefs(PreferenceRequest {
			preferred_difficulty: Some("mixed".into()),
			preferred_organizations: vec!["stanford university".into()],
			..Default::default()
		});
		let b = compute_score(0.5, true, 1.0, 1.0, 0.1);
		assert_eq!(
			explain(&it, &b, &p),
			"Same cluster as your preferences; Matches your Mixed difficulty preference; \
			 From preferred organization: Stanford University; Highly rated course; \
			 Popular course (1M+ enrollments)"
		);
	}

	#[test]
	fn explanation_skips_tags_when_boost_did_not_fire() {
		let it = item("Machine Learning", "Stanford University", 4.9, "Mixed", "3.2M");
		let p = prefs(PreferenceRequest {
			rating_bias: 0.0,
			..Default::default()
		});
		let b = compute_score(0.5, false, 1.0, 1.0, 0.0);
		assert_eq!(explain(&it, &b, &p), FALLBACK);
	}

	#[test]
	fn explanation_thresholds() {
		let it = item("Niche Topic", "Org", 4.4, "Beginner", "999k");
		let p = prefs(PreferenceRequest::default());
		let b = compute_score(0.5, false, 0.9, 0.9, 0.1);
		assert_eq!(explain(&it, &b, &p), FALLBACK);
	}
}
