// ---------------------------------------------------------------------------
// Trained artifact persistence: gzipped JSON model + metrics sidecar
// ---------------------------------------------------------------------------
//
// Directory layout:
//   model.gz      gzipped JSON `{ version, trainedAt, catalog, features,
//                 clusters, training }`
//   metrics.json  pretty JSON quality metrics and the inertia curve
//
// Centroids are stored as base64 of f64 little-endian bytes. A plain
// `model.json` is accepted on load, and gzip is detected by magic bytes
// rather than trusted from the file name. Writes go to a temporary file
// that is renamed into place, so readers see either the old artifact or
// the new one.
// ---------------------------------------------------------------------------

use std::io::Read;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{ClusterModel, InertiaPoint};
use crate::error::EngineError;
use crate::features::FeatureBuilder;
use crate::model::{TrainedModel, TrainingReport};
use crate::types::{CatalogItem, QualityMetrics};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PersistenceError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Corruption: {0}")]
	Corruption(String),
	#[error("Serialization: {0}")]
	Serialization(String),
}

impl From<PersistenceError> for EngineError {
	fn from(e: PersistenceError) -> Self {
		match e {
			PersistenceError::Io(io) => EngineError::Io(io),
			PersistenceError::Corruption(msg) => EngineError::Corruption(msg),
			PersistenceError::Serialization(msg) => EngineError::Serialization(msg),
		}
	}
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ARTIFACT_VERSION: u32 = 1;
pub const MODEL_FILE: &str = "model.gz";
pub const PLAIN_MODEL_FILE: &str = "model.json";
pub const METRICS_FILE: &str = "metrics.json";

// ---------------------------------------------------------------------------
// Vector encode / decode
// ---------------------------------------------------------------------------

/// Encode a f64 slice as base64 of little-endian bytes.
pub fn encode_vector(vector: &[f64]) -> String {
	let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
	STANDARD.encode(&bytes)
}

/// Decode a base64 string of f64 little-endian bytes.
pub fn decode_vector(encoded: &str) -> Result<Vec<f64>, PersistenceError> {
	let bytes = STANDARD
		.decode(encoded)
		.map_err(|e| PersistenceError::Corruption(format!("Invalid base64: {}", e)))?;
	if bytes.len() % 8 != 0 {
		return Err(PersistenceError::Corruption("Invalid vector length".into()));
	}
	let mut result = Vec::with_capacity(bytes.len() / 8);
	for chunk in bytes.chunks_exact(8) {
		let mut raw = [0u8; 8];
		raw.copy_from_slice(chunk);
		result.push(f64::from_le_bytes(raw));
	}
	Ok(result)
}

// ---------------------------------------------------------------------------
// Gzip compress / decompress
// ---------------------------------------------------------------------------

/// Gzip-compress a byte slice (level 6).
pub fn compress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	let mut encoder = GzEncoder::new(data, Compression::new(6));
	let mut compressed = Vec::new();
	encoder.read_to_end(&mut compressed)?;
	Ok(compressed)
}

/// Gunzip-decompress a byte slice.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, PersistenceError> {
	let mut decoder = GzDecoder::new(data);
	let mut decompressed = Vec::new();
	decoder.read_to_end(&mut decompressed)?;
	Ok(decompressed)
}

/// Check if data starts with gzip magic bytes (0x1f, 0x8b).
pub fn is_gzipped(data: &[u8]) -> bool {
	data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterState {
	k: usize,
	centroids: Vec<String>,
	assignments: Vec<usize>,
	quality: QualityMetrics,
	cluster_similarity: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
	version: u32,
	trained_at: String,
	catalog: Vec<CatalogItem>,
	features: FeatureBuilder,
	clusters: ClusterState,
	training: TrainingReport,
}

/// Contents of `metrics.json`; also the `engine/metrics` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
	pub k: usize,
	pub silhouette_score: f64,
	pub intra_cluster_similarity: f64,
	pub n_samples: usize,
	pub n_features: usize,
	pub inertia_curve: Vec<InertiaPoint>,
}

/// Everything restored from an artifact directory, before the feature
/// matrix is recomputed.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
	pub trained_at: DateTime<Utc>,
	pub catalog: Vec<CatalogItem>,
	pub features: FeatureBuilder,
	pub clusters: ClusterModel,
	pub training: TrainingReport,
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

fn tmp_path(path: &Path) -> PathBuf {
	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	PathBuf::from(tmp)
}

/// Write every file to its `.tmp` sibling, then rename them all into place.
/// A failed write removes the staged files and leaves the directory as it was.
fn write_all_atomic(files: &[(PathBuf, &[u8])]) -> Result<(), PersistenceError> {
	let mut staged: Vec<PathBuf> = Vec::with_capacity(files.len());
	for (path, data) in files {
		let tmp = tmp_path(path);
		if let Err(e) = std::fs::write(&tmp, data) {
			for s in &staged {
				let _ = std::fs::remove_file(s);
			}
			return Err(e.into());
		}
		staged.push(tmp);
	}
	for ((path, _), tmp) in files.iter().zip(&staged) {
		std::fs::rename(tmp, path)?;
	}
	Ok(())
}

/// Write `model.gz` and `metrics.json` into `dir`, creating it if needed.
pub fn save_to_directory(dir: impl AsRef<Path>, model: &TrainedModel) -> Result<(), PersistenceError> {
	let dir = dir.as_ref();
	std::fs::create_dir_all(dir)?;

	let clusters = model.clusters();
	let file = ArtifactFile {
		version: ARTIFACT_VERSION,
		trained_at: model.trained_at().to_rfc3339(),
		catalog: model.catalog().to_vec(),
		features: model.features().clone(),
		clusters: ClusterState {
			k: clusters.k(),
			centroids: clusters.centroids().iter().map(|c| encode_vector(c)).collect(),
			assignments: clusters.assignments().to_vec(),
			quality: clusters.quality(),
			cluster_similarity: clusters.cluster_similarity().to_vec(),
		},
		training: model.training().clone(),
	};

	let json = serde_json::to_vec(&file)
		.map_err(|e| PersistenceError::Serialization(format!("Failed to encode model: {}", e)))?;
	let compressed = compress(&json)?;
	let metrics = serde_json::to_vec_pretty(&model.metrics())
		.map_err(|e| PersistenceError::Serialization(format!("Failed to encode metrics: {}", e)))?;

	write_all_atomic(&[
		(dir.join(MODEL_FILE), compressed.as_slice()),
		(dir.join(METRICS_FILE), metrics.as_slice()),
	])?;

	tracing::info!(
		dir = %dir.display(),
		bytes = compressed.len(),
		k = clusters.k(),
		"Artifact saved"
	);
	Ok(())
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read and validate the artifact in `dir`.
pub fn load_from_directory(dir: impl AsRef<Path>) -> Result<LoadedArtifact, PersistenceError> {
	let dir = dir.as_ref();
	let gz_path = dir.join(MODEL_FILE);
	let path = if gz_path.exists() {
		gz_path
	} else {
		dir.join(PLAIN_MODEL_FILE)
	};

	let raw = std::fs::read(&path)?;
	let json = if is_gzipped(&raw) {
		decompress(&raw)?
	} else {
		raw
	};

	let file: ArtifactFile = serde_json::from_slice(&json)
		.map_err(|e| PersistenceError::Corruption(format!("Invalid model JSON: {}", e)))?;

	if file.version != ARTIFACT_VERSION {
		return Err(PersistenceError::Corruption(format!(
			"Unsupported artifact version {} (expected {})",
			file.version, ARTIFACT_VERSION
		)));
	}

	let trained_at = DateTime::parse_from_rfc3339(&file.trained_at)
		.map_err(|e| PersistenceError::Corruption(format!("Invalid trainedAt: {}", e)))?
		.with_timezone(&Utc);

	if file.catalog.is_empty() {
		return Err(PersistenceError::Corruption("Artifact catalog is empty".into()));
	}

	file.features
		.check()
		.map_err(PersistenceError::Corruption)?;

	let centroids = file
		.clusters
		.centroids
		.iter()
		.map(|c| decode_vector(c))
		.collect::<Result<Vec<_>, _>>()?;
	if centroids.len() != file.clusters.k {
		return Err(PersistenceError::Corruption(format!(
			"{} centroids stored for k = {}",
			centroids.len(),
			file.clusters.k
		)));
	}

	let clusters = ClusterModel::from_parts(
		centroids,
		file.clusters.assignments,
		file.clusters.quality,
		file.clusters.cluster_similarity,
		file.catalog.len(),
		file.features.dim(),
	)
	.map_err(PersistenceError::Corruption)?;

	tracing::info!(
		path = %path.display(),
		items = file.catalog.len(),
		k = clusters.k(),
		"Artifact loaded"
	);

	Ok(LoadedArtifact {
		trained_at,
		catalog: file.catalog,
		features: file.features,
		clusters,
		training: file.training,
	})
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
