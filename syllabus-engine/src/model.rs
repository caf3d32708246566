// ---------------------------------------------------------------------------
// Trained model, model handle, serving engine
// ---------------------------------------------------------------------------
//
// `TrainedModel` bundles the catalog, the fitted FeatureBuilder, the
// ClusterModel and the derived feature matrix. It is immutable once built
// and is passed explicitly to every profile/rank call.
//
// `ModelHandle` holds the current model behind `RwLock<Option<Arc<_>>>`.
// Readers clone the `Arc` and drop the lock before computing; retraining or
// reloading swaps in a new `Arc`, and the old model is freed when the last
// in-flight request lets go of it.
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{self, LoadedArtifact, ModelMetrics};
use crate::catalog::load_catalog;
use crate::cluster::{ClusterConfig, ClusterModel, InertiaPoint};
use crate::cosine::{compute_magnitude, squared_distance};
use crate::error::EngineError;
use crate::features::{FeatureBuilder, FeatureConfig};
use crate::profile::{corpus_centroid, ProfileBuilder, ProfileConfig, ProfileDiagnostics};
use crate::ranker::Ranker;
use crate::types::{
	CatalogItem, ClusterInfo, ClusterQuality, Health, OrganizationCount, PreferenceRequest,
	Preferences, QualityMetrics, Recommendation, ServingStatsSnapshot,
};

const TOP_ORGANIZATIONS: usize = 5;
const REPRESENTATIVE_ITEMS: usize = 10;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainConfig {
	pub features: FeatureConfig,
	pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServeConfig {
	/// Reject out-of-range limits instead of clamping them.
	pub strict_limit: bool,
	pub profile: ProfileConfig,
}

/// What a training run saw and decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
	pub seed: u64,
	pub min_k: usize,
	pub max_k: usize,
	pub fixed_k: Option<usize>,
	pub chosen_k: usize,
	pub inertia_curve: Vec<InertiaPoint>,
	pub unparsable_enrollments: usize,
	pub skipped_rows: usize,
}

// ---------------------------------------------------------------------------
// TrainedModel
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TrainedModel {
	trained_at: DateTime<Utc>,
	catalog: Vec<CatalogItem>,
	features: FeatureBuilder,
	clusters: ClusterModel,
	training: TrainingReport,
	matrix: Vec<Vec<f64>>,
	magnitudes: Vec<f64>,
	corpus_centroid: Vec<f64>,
}

impl TrainedModel {
	/// Fit features and clusters on `catalog`. Nothing is written to disk.
	pub fn train(catalog: Vec<CatalogItem>, config: &TrainConfig) -> Result<Self, EngineError> {
		let (features, diagnostics) = FeatureBuilder::fit(&catalog, &config.features)?;
		let (matrix, _) = features.transform_all(&catalog);
		let fit = ClusterModel::fit(&matrix, &config.cluster)?;

		let training = TrainingReport {
			seed: config.cluster.seed,
			min_k: config.cluster.min_k,
			max_k: config.cluster.max_k,
			fixed_k: config.cluster.fixed_k,
			chosen_k: fit.model.k(),
			inertia_curve: fit.inertia_curve,
			unparsable_enrollments: diagnostics.unparsable_enrollments,
			skipped_rows: 0,
		};

		Ok(Self::assemble(Utc::now(), catalog, features, fit.model, training, matrix))
	}

	/// Load a catalog file and train on it.
	pub fn train_file(path: impl AsRef<Path>, config: &TrainConfig) -> Result<Self, EngineError> {
		let load = load_catalog(path)?;
		let mut model = Self::train(load.items, config)?;
		model.training.skipped_rows = load.skipped_rows;
		Ok(model)
	}

	/// Restore from an artifact, recomputing the feature matrix.
	pub fn from_artifact(artifact: LoadedArtifact) -> Self {
		let (matrix, diagnostics) = artifact.features.transform_all(&artifact.catalog);
		if diagnostics.unseen_organizations > 0 || diagnostics.unseen_certificate_types > 0 {
			tracing::warn!(
				organizations = diagnostics.unseen_organizations,
				certificate_types = diagnostics.unseen_certificate_types,
				"Artifact catalog has categories outside its own vocabulary"
			);
		}
		Self::assemble(
			artifact.trained_at,
			artifact.catalog,
			artifact.features,
			artifact.clusters,
			artifact.training,
			matrix,
		)
	}

	pub fn load(dir: impl AsRef<Path>) -> Result<Self, EngineError> {
		Ok(Self::from_artifact(artifact::load_from_directory(dir)?))
	}

	pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), EngineError> {
		artifact::save_to_directory(dir, self)?;
		Ok(())
	}

	fn assemble(
		trained_at: DateTime<Utc>,
		catalog: Vec<CatalogItem>,
		features: FeatureBuilder,
		clusters: ClusterModel,
		training: TrainingReport,
		matrix: Vec<Vec<f64>>,
	) -> Self {
		let magnitudes = matrix.iter().map(|row| compute_magnitude(row)).collect();
		let corpus_centroid = corpus_centroid(&matrix, features.dim());
		Self {
			trained_at,
			catalog,
			features,
			clusters,
			training,
			matrix,
			magnitudes,
			corpus_centroid,
		}
	}

	// -- Accessors -------------------------------------------------------------

	pub fn trained_at(&self) -> DateTime<Utc> {
		self.trained_at
	}

	pub fn catalog(&self) -> &[CatalogItem] {
		&self.catalog
	}

	pub fn features(&self) -> &FeatureBuilder {
		&self.features
	}

	pub fn clusters(&self) -> &ClusterModel {
		&self.clusters
	}

	pub fn training(&self) -> &TrainingReport {
		&self.training
	}

	pub fn matrix(&self) -> &[Vec<f64>] {
		&self.matrix
	}

	pub fn item_count(&self) -> usize {
		self.catalog.len()
	}

	pub fn quality(&self) -> QualityMetrics {
		self.clusters.quality()
	}

	pub fn metrics(&self) -> ModelMetrics {
		let quality = self.quality();
		ModelMetrics {
			k: self.clusters.k(),
			silhouette_score: quality.silhouette_score,
			intra_cluster_similarity: quality.intra_cluster_similarity,
			n_samples: self.catalog.len(),
			n_features: self.features.dim(),
			inertia_curve: self.training.inertia_curve.clone(),
		}
	}

	// -- Queries ---------------------------------------------------------------

	pub fn profile_builder(&self, config: &ProfileConfig) -> ProfileBuilder<'_> {
		ProfileBuilder::new(
			&self.catalog,
			&self.matrix,
			&self.features,
			&self.corpus_centroid,
		)
		.with_config(config.clone())
	}

	pub fn ranker(&self) -> Ranker<'_> {
		Ranker::new(
			&self.catalog,
			&self.matrix,
			&self.magnitudes,
			&self.clusters,
			&self.features,
		)
	}

	/// Build the profile and rank the catalog against it.
	pub fn recommend(
		&self,
		prefs: &Preferences,
		config: &ProfileConfig,
	) -> (Vec<Recommendation>, ProfileDiagnostics) {
		let (profile, diagnostics) = self.profile_builder(config).build(prefs);
		(self.ranker().rank(&profile, prefs), diagnostics)
	}

	pub fn cluster_info(&self, cluster_id: usize) -> Result<ClusterInfo, EngineError> {
		let k = self.clusters.k();
		if cluster_id >= k {
			return Err(EngineError::NotFound(format!(
				"cluster {} (model has {} clusters)",
				cluster_id, k
			)));
		}

		let members: Vec<usize> = self.clusters.members(cluster_id).collect();
		let size = members.len();

		let avg_rating = if size == 0 {
			0.0
		} else {
			members.iter().map(|&i| self.catalog[i].rating).sum::<f64>() / size as f64
		};

		let mut difficulty_distribution: BTreeMap<String, usize> = BTreeMap::new();
		let mut org_counts: HashMap<&str, usize> = HashMap::new();
		for &i in &members {
			let item = &self.catalog[i];
			*difficulty_distribution
				.entry(item.difficulty.clone())
				.or_insert(0) += 1;
			*org_counts.entry(item.organization.as_str()).or_insert(0) += 1;
		}

		let mut top_organizations: Vec<OrganizationCount> = org_counts
			.into_iter()
			.map(|(organization, count)| OrganizationCount {
				organization: organization.to_string(),
				count,
			})
			.collect();
		top_organizations.sort_by(|a, b| {
			b.count
				.cmp(&a.count)
				.then_with(|| a.organization.cmp(&b.organization))
		});
		top_organizations.truncate(TOP_ORGANIZATIONS);

		let centroid = &self.clusters.centroids()[cluster_id];
		let mut by_distance: Vec<(f64, usize)> = members
			.iter()
			.map(|&i| (squared_distance(&self.matrix[i], centroid), i))
			.collect();
		by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
		let representative_items = by_distance
			.into_iter()
			.take(REPRESENTATIVE_ITEMS)
			.map(|(_, i)| self.catalog[i].title.clone())
			.collect();

		Ok(ClusterInfo {
			cluster_id,
			size,
			avg_rating,
			difficulty_distribution,
			top_organizations,
			representative_items,
			quality: ClusterQuality {
				intra_cluster_similarity: self
					.clusters
					.cluster_similarity()
					.get(cluster_id)
					.copied()
					.unwrap_or(0.0),
				silhouette_score: self.quality().silhouette_score,
			},
		})
	}
}

// ---------------------------------------------------------------------------
// ModelHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ModelHandle {
	current: RwLock<Option<Arc<TrainedModel>>>,
}

impl ModelHandle {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_model(model: TrainedModel) -> Self {
		Self {
			current: RwLock::new(Some(Arc::new(model))),
		}
	}

	/// The loaded model, if any. The lock is released before this returns.
	pub fn current(&self) -> Option<Arc<TrainedModel>> {
		let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
		guard.clone()
	}

	/// Swap in a new model and hand back the previous one.
	pub fn replace(&self, model: Arc<TrainedModel>) -> Option<Arc<TrainedModel>> {
		let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
		guard.replace(model)
	}
}

// ---------------------------------------------------------------------------
// Serving stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ServingStats {
	requests: AtomicU64,
	unmatched_titles: AtomicU64,
	unknown_organizations: AtomicU64,
}

impl ServingStats {
	fn record(&self, diagnostics: &ProfileDiagnostics) {
		self.requests.fetch_add(1, Ordering::Relaxed);
		self.unmatched_titles
			.fetch_add(diagnostics.unmatched_titles.len() as u64, Ordering::Relaxed);
		self.unknown_organizations
			.fetch_add(diagnostics.unknown_organizations.len() as u64, Ordering::Relaxed);
	}

	pub fn snapshot(&self) -> ServingStatsSnapshot {
		ServingStatsSnapshot {
			requests: self.requests.load(Ordering::Relaxed),
			unmatched_titles: self.unmatched_titles.load(Ordering::Relaxed),
			unknown_organizations: self.unknown_organizations.load(Ordering::Relaxed),
		}
	}
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Request-facing facade over the model handle. Every method takes `&self`;
/// an `Engine` can be shared across threads.
#[derive(Debug, Default)]
pub struct Engine {
	handle: ModelHandle,
	config: ServeConfig,
	stats: ServingStats,
}

impl Engine {
	pub fn new(config: ServeConfig) -> Self {
		Self {
			handle: ModelHandle::new(),
			config,
			stats: ServingStats::default(),
		}
	}

	pub fn with_model(model: TrainedModel, config: ServeConfig) -> Self {
		Self {
			handle: ModelHandle::with_model(model),
			config,
			stats: ServingStats::default(),
		}
	}

	fn model(&self) -> Result<Arc<TrainedModel>, EngineError> {
		self.handle.current().ok_or(EngineError::ModelNotTrained)
	}

	pub fn recommend(&self, request: &PreferenceRequest) -> Result<Vec<Recommendation>, EngineError> {
		let prefs = request.validate(self.config.strict_limit)?;
		let model = self.model()?;
		let (recommendations, diagnostics) = model.recommend(&prefs, &self.config.profile);
		self.stats.record(&diagnostics);
		tracing::debug!(
			returned = recommendations.len(),
			limit = prefs.limit,
			"Recommendations served"
		);
		Ok(recommendations)
	}

	pub fn cluster_info(&self, cluster_id: usize) -> Result<ClusterInfo, EngineError> {
		self.model()?.cluster_info(cluster_id)
	}

	pub fn metrics(&self) -> Result<ModelMetrics, EngineError> {
		Ok(self.model()?.metrics())
	}

	pub fn health(&self) -> Health {
		let model = self.handle.current();
		Health {
			model_loaded: model.is_some(),
			item_count: model.as_ref().map_or(0, |m| m.item_count()),
			k: model.as_ref().map(|m| m.clusters().k()),
			trained_at: model
				.as_ref()
				.map(|m| m.trained_at().to_rfc3339_opts(SecondsFormat::Secs, true)),
			stats: self.stats.snapshot(),
		}
	}

	/// Train on a catalog file, optionally persist to `model_dir`, then swap
	/// the new model in. A failed run leaves the current model untouched.
	pub fn train_and_swap(
		&self,
		catalog_path: impl AsRef<Path>,
		model_dir: Option<&Path>,
		config: &TrainConfig,
	) -> Result<Arc<TrainedModel>, EngineError> {
		let model = TrainedModel::train_file(catalog_path, config)?;
		if let Some(dir) = model_dir {
			model.save(dir)?;
		}
		Ok(self.install(model))
	}

	/// Load the artifact in `dir` and swap it in.
	pub fn reload(&self, dir: impl AsRef<Path>) -> Result<Arc<TrainedModel>, EngineError> {
		let model = TrainedModel::load(dir)?;
		Ok(self.install(model))
	}

	pub fn install(&self, model: TrainedModel) -> Arc<TrainedModel> {
		let model = Arc::new(model);
		let previous = self.handle.replace(Arc::clone(&model));
		tracing::info!(
			items = model.item_count(),
			k = model.clusters().k(),
			replaced = previous.is_some(),
			"Model installed"
		);
		model
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
