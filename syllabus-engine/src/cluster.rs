// ---------------------------------------------------------------------------
// ClusterModel: seeded k-means with automatic k selection
// ---------------------------------------------------------------------------
//
// Training sweeps a range of candidate k values, runs k-means++ with several
// seeded restarts for each, and picks k at the knee of the inertia curve:
// the candidate farthest from the straight line joining the curve's
// endpoints, after scaling both axes to [0, 1]. Ties go to the smaller k.
//
// State is plain indexed arrays: item index -> cluster id -> centroid.
// ---------------------------------------------------------------------------

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cosine::{cosine_similarity, euclidean_distance, mean_vector, squared_distance};
use crate::error::EngineError;
use crate::types::QualityMetrics;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
	pub seed: u64,
	pub min_k: usize,
	pub max_k: usize,
	/// Skip the sweep and train with exactly this many clusters.
	pub fixed_k: Option<usize>,
	/// Restarts per candidate k; the lowest-inertia run wins.
	pub n_init: usize,
	pub max_iter: usize,
	/// Stop iterating once no centroid moves more than this (squared distance).
	pub tolerance: f64,
}

impl Default for ClusterConfig {
	fn default() -> Self {
		Self {
			seed: 42,
			min_k: 2,
			max_k: 15,
			fixed_k: None,
			n_init: 10,
			max_iter: 300,
			tolerance: 1e-6,
		}
	}
}

/// Inertia of the best run for one candidate k.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertiaPoint {
	pub k: usize,
	pub inertia: f64,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
	centroids: Vec<Vec<f64>>,
	assignments: Vec<usize>,
	quality: QualityMetrics,
	/// Mean pairwise cosine similarity per cluster (0 for singletons).
	cluster_similarity: Vec<f64>,
}

/// Output of [`ClusterModel::fit`].
#[derive(Debug, Clone)]
pub struct ClusterFit {
	pub model: ClusterModel,
	pub inertia_curve: Vec<InertiaPoint>,
}

struct KMeansRun {
	centroids: Vec<Vec<f64>>,
	assignments: Vec<usize>,
	inertia: f64,
}

impl ClusterModel {
	/// Train on a feature matrix (one row per catalog item).
	pub fn fit(matrix: &[Vec<f64>], config: &ClusterConfig) -> Result<ClusterFit, EngineError> {
		let n = matrix.len();
		if n == 0 {
			return Err(EngineError::EmptyCatalog);
		}
		let dim = matrix[0].len();
		if matrix.iter().any(|row| row.len() != dim) {
			return Err(EngineError::Validation(
				"feature rows have inconsistent dimensions".into(),
			));
		}

		let candidates = candidate_ks(n, config)?;
		tracing::info!(
			items = n,
			dim,
			candidates = ?candidates,
			"Training cluster model"
		);

		let mut runs: Vec<(usize, KMeansRun)> = Vec::with_capacity(candidates.len());
		let mut last_err = None;
		for &k in &candidates {
			match best_of_restarts(matrix, k, config) {
				Ok(run) => {
					tracing::debug!(k, inertia = run.inertia, "Candidate evaluated");
					runs.push((k, run));
				}
				Err(e) => {
					tracing::warn!(k, "Skipping candidate k: {}", e);
					last_err = Some(e);
				}
			}
		}

		if runs.is_empty() {
			return Err(last_err.unwrap_or(EngineError::DegenerateCluster { cluster: 0, k: 0 }));
		}

		let inertia_curve: Vec<InertiaPoint> = runs
			.iter()
			.map(|(k, run)| InertiaPoint {
				k: *k,
				inertia: run.inertia,
			})
			.collect();
		let chosen = knee_index(&inertia_curve);
		let (k, run) = runs.swap_remove(chosen);

		let model = Self::from_run(matrix, run);
		tracing::info!(
			k,
			silhouette = model.quality.silhouette_score,
			intra_similarity = model.quality.intra_cluster_similarity,
			"Cluster model trained"
		);

		Ok(ClusterFit {
			model,
			inertia_curve,
		})
	}

	fn from_run(matrix: &[Vec<f64>], run: KMeansRun) -> Self {
		let k = run.centroids.len();
		let silhouette_score = silhouette(matrix, &run.assignments, k);
		let cluster_similarity = per_cluster_similarity(matrix, &run.assignments, k);
		let intra_cluster_similarity = mean_of_populated(&cluster_similarity, &run.assignments);
		Self {
			centroids: run.centroids,
			assignments: run.assignments,
			quality: QualityMetrics {
				silhouette_score,
				intra_cluster_similarity,
			},
			cluster_similarity,
		}
	}

	/// Rebuild a model from persisted parts, checking that the pieces agree
	/// with each other and with the expected matrix shape.
	pub fn from_parts(
		centroids: Vec<Vec<f64>>,
		assignments: Vec<usize>,
		quality: QualityMetrics,
		cluster_similarity: Vec<f64>,
		n_items: usize,
		dim: usize,
	) -> Result<Self, String> {
		let k = centroids.len();
		if k == 0 {
			return Err("model has no centroids".into());
		}
		if let Some(bad) = centroids.iter().position(|c| c.len() != dim) {
			return Err(format!(
				"centroid {} has {} dimensions, expected {}",
				bad,
				centroids[bad].len(),
				dim
			));
		}
		if assignments.len() != n_items {
			return Err(format!(
				"{} cluster assignments for {} catalog items",
				assignments.len(),
				n_items
			));
		}
		if let Some(bad) = assignments.iter().find(|&&c| c >= k) {
			return Err(format!("assignment to cluster {} but k is {}", bad, k));
		}
		if cluster_similarity.len() != k {
			return Err("per-cluster similarity does not match k".into());
		}
		Ok(Self {
			centroids,
			assignments,
			quality,
			cluster_similarity,
		})
	}

	pub fn k(&self) -> usize {
		self.centroids.len()
	}

	pub fn centroids(&self) -> &[Vec<f64>] {
		&self.centroids
	}

	pub fn assignments(&self) -> &[usize] {
		&self.assignments
	}

	pub fn cluster_of(&self, item: usize) -> Option<usize> {
		self.assignments.get(item).copied()
	}

	pub fn quality(&self) -> QualityMetrics {
		self.quality
	}

	pub fn cluster_similarity(&self) -> &[f64] {
		&self.cluster_similarity
	}

	/// Item indices in `cluster`, ascending.
	pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
		self.assignments
			.iter()
			.enumerate()
			.filter(move |(_, &c)| c == cluster)
			.map(|(i, _)| i)
	}

	/// Nearest centroid by Euclidean distance; the lowest index wins ties.
	pub fn predict(&self, vector: &[f64]) -> usize {
		nearest(&self.centroids, vector).0
	}
}

// ---------------------------------------------------------------------------
// Candidate k
// ---------------------------------------------------------------------------

fn candidate_ks(n: usize, config: &ClusterConfig) -> Result<Vec<usize>, EngineError> {
	if let Some(k) = config.fixed_k {
		if k == 0 || k > n {
			return Err(EngineError::Validation(format!(
				"k must be within [1, {}], got {}",
				n, k
			)));
		}
		return Ok(vec![k]);
	}

	let min_k = config.min_k.max(1);
	let max_k = config.max_k.min(n.saturating_sub(1));
	if min_k > max_k {
		// Too few items to sweep; one cluster is the only safe partition.
		tracing::warn!(items = n, min_k, "Catalog too small for a k sweep, using k=1");
		return Ok(vec![1]);
	}
	Ok((min_k..=max_k).collect())
}

/// Pick the knee of the inertia curve. Fewer than three points, or a flat
/// curve, fall back to the first candidate.
pub fn knee_index(curve: &[InertiaPoint]) -> usize {
	if curve.len() < 3 {
		return 0;
	}
	let k_first = curve[0].k as f64;
	let k_last = curve[curve.len() - 1].k as f64;
	let (lo, hi) = curve.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
		(lo.min(p.inertia), hi.max(p.inertia))
	});
	if k_last <= k_first || hi - lo <= 0.0 {
		return 0;
	}

	let points: Vec<(f64, f64)> = curve
		.iter()
		.map(|p| ((p.k as f64 - k_first) / (k_last - k_first), (p.inertia - lo) / (hi - lo)))
		.collect();
	let (x0, y0) = points[0];
	let (x1, y1) = points[points.len() - 1];
	let length = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
	if length == 0.0 {
		return 0;
	}

	let mut best = 0;
	let mut best_distance = f64::NEG_INFINITY;
	for (i, &(x, y)) in points.iter().enumerate() {
		let distance = ((y1 - y0) * x - (x1 - x0) * y + x1 * y0 - y1 * x0).abs() / length;
		if distance > best_distance {
			best_distance = distance;
			best = i;
		}
	}
	best
}

// ---------------------------------------------------------------------------
// k-means
// ---------------------------------------------------------------------------

fn nearest(centroids: &[Vec<f64>], point: &[f64]) -> (usize, f64) {
	let mut best = 0;
	let mut best_distance = f64::INFINITY;
	for (i, c) in centroids.iter().enumerate() {
		let d = squared_distance(c, point);
		if d < best_distance {
			best_distance = d;
			best = i;
		}
	}
	(best, best_distance)
}

fn rng_for(seed: u64, k: usize) -> StdRng {
	StdRng::seed_from_u64(seed ^ (k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn best_of_restarts(
	matrix: &[Vec<f64>],
	k: usize,
	config: &ClusterConfig,
) -> Result<KMeansRun, EngineError> {
	let mut rng = rng_for(config.seed, k);
	let mut best: Option<KMeansRun> = None;
	let mut last_err = None;

	for _ in 0..config.n_init.max(1) {
		match run_kmeans(matrix, k, config, &mut rng) {
			Ok(run) => {
				if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
					best = Some(run);
				}
			}
			Err(e) => last_err = Some(e),
		}
	}

	best.ok_or_else(|| last_err.unwrap_or(EngineError::DegenerateCluster { cluster: 0, k }))
}

/// k-means++ seeding: first centre uniform, the rest with probability
/// proportional to squared distance from the nearest chosen centre.
fn init_plus_plus(matrix: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
	let n = matrix.len();
	let mut centroids = Vec::with_capacity(k);
	centroids.push(matrix[rng.gen_range(0..n)].clone());

	let mut distances: Vec<f64> = matrix
		.iter()
		.map(|row| squared_distance(row, &centroids[0]))
		.collect();

	while centroids.len() < k {
		let total: f64 = distances.iter().sum();
		let next = if total > 0.0 {
			let target = rng.gen::<f64>() * total;
			let mut acc = 0.0;
			let mut pick = n - 1;
			for (i, d) in distances.iter().enumerate() {
				acc += d;
				if acc >= target && *d > 0.0 {
					pick = i;
					break;
				}
			}
			pick
		} else {
			rng.gen_range(0..n)
		};

		let centre = matrix[next].clone();
		for (d, row) in distances.iter_mut().zip(matrix) {
			*d = d.min(squared_distance(row, &centre));
		}
		centroids.push(centre);
	}
	centroids
}

fn assign(matrix: &[Vec<f64>], centroids: &[Vec<f64>], assignments: &mut [usize]) -> f64 {
	let mut inertia = 0.0;
	for (slot, row) in assignments.iter_mut().zip(matrix) {
		let (cluster, distance) = nearest(centroids, row);
		*slot = cluster;
		inertia += distance;
	}
	inertia
}

fn run_kmeans(
	matrix: &[Vec<f64>],
	k: usize,
	config: &ClusterConfig,
	rng: &mut StdRng,
) -> Result<KMeansRun, EngineError> {
	let dim = matrix[0].len();
	let mut centroids = init_plus_plus(matrix, k, rng);
	let mut assignments = vec![0usize; matrix.len()];

	for _ in 0..config.max_iter.max(1) {
		assign(matrix, &centroids, &mut assignments);

		let mut shift: f64 = 0.0;
		for cluster in 0..k {
			let members = assignments
				.iter()
				.zip(matrix)
				.filter(|(&c, _)| c == cluster)
				.map(|(_, row)| row.as_slice());
			let updated = match mean_vector(members, dim) {
				Some(mean) => mean,
				None => farthest_point(matrix, &centroids, &assignments).clone(),
			};
			shift = shift.max(squared_distance(&updated, &centroids[cluster]));
			centroids[cluster] = updated;
		}

		if shift <= config.tolerance {
			break;
		}
	}

	let inertia = assign(matrix, &centroids, &mut assignments);

	let mut sizes = vec![0usize; k];
	for &c in &assignments {
		sizes[c] += 1;
	}
	if let Some(empty) = sizes.iter().position(|&s| s == 0) {
		return Err(EngineError::DegenerateCluster { cluster: empty, k });
	}

	Ok(KMeansRun {
		centroids,
		assignments,
		inertia,
	})
}

/// Row farthest from its assigned centroid; used to reseed an empty cluster.
fn farthest_point<'a>(
	matrix: &'a [Vec<f64>],
	centroids: &[Vec<f64>],
	assignments: &[usize],
) -> &'a Vec<f64> {
	let mut best = 0;
	let mut best_distance = f64::NEG_INFINITY;
	for (i, (row, &c)) in matrix.iter().zip(assignments).enumerate() {
		let d = squared_distance(row, &centroids[c]);
		if d > best_distance {
			best_distance = d;
			best = i;
		}
	}
	&matrix[best]
}

// ---------------------------------------------------------------------------
// Quality metrics
// ---------------------------------------------------------------------------

/// Mean silhouette over all items using Euclidean distance. Singleton
/// clusters score 0; the score is 0 when k is 1 or every item is alone.
pub fn silhouette(matrix: &[Vec<f64>], assignments: &[usize], k: usize) -> f64 {
	let n = matrix.len();
	if k < 2 || k >= n {
		return 0.0;
	}

	let mut sizes = vec![0usize; k];
	for &c in assignments {
		sizes[c] += 1;
	}

	let mut total = 0.0;
	for i in 0..n {
		let own = assignments[i];
		if sizes[own] <= 1 {
			continue;
		}
		let mut sums = vec![0.0; k];
		for j in 0..n {
			if i != j {
				sums[assignments[j]] += euclidean_distance(&matrix[i], &matrix[j]);
			}
		}
		let a = sums[own] / (sizes[own] - 1) as f64;
		let b = (0..k)
			.filter(|&c| c != own && sizes[c] > 0)
			.map(|c| sums[c] / sizes[c] as f64)
			.fold(f64::INFINITY, f64::min);
		let denom = a.max(b);
		if denom > 0.0 && b.is_finite() {
			total += (b - a) / denom;
		}
	}
	total / n as f64
}

/// Mean pairwise cosine similarity inside each cluster.
fn per_cluster_similarity(matrix: &[Vec<f64>], assignments: &[usize], k: usize) -> Vec<f64> {
	let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
	for (i, &c) in assignments.iter().enumerate() {
		members[c].push(i);
	}
	members
		.iter()
		.map(|idx| {
			if idx.len() < 2 {
				return 0.0;
			}
			let mut sum = 0.0;
			let mut pairs = 0usize;
			for (a, &i) in idx.iter().enumerate() {
				for &j in &idx[a + 1..] {
					sum += cosine_similarity(&matrix[i], &matrix[j]);
					pairs += 1;
				}
			}
			sum / pairs as f64
		})
		.collect()
}

/// Average over clusters with at least two members.
fn mean_of_populated(per_cluster: &[f64], assignments: &[usize]) -> f64 {
	let mut sizes = vec![0usize; per_cluster.len()];
	for &c in assignments {
		sizes[c] += 1;
	}
	let values: Vec<f64> = per_cluster
		.iter()
		.zip(&sizes)
		.filter(|(_, &s)| s >= 2)
		.map(|(v, _)| *v)
		.collect();
	if values.is_empty() {
		0.0
	} else {
		values.iter().sum::<f64>() / values.len() as f64
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
