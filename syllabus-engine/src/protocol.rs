use std::path::PathBuf;

use serde::Deserialize;

// JSON-RPC 2.0 error codes
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const ENGINE_ERROR: i32 = -32000;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
	pub id: u64,
	pub method: String,
	#[serde(default)]
	pub params: serde_json::Value,
}

// ── Params ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClusterInfoParams {
	pub cluster_id: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReloadParams {
	pub model_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct TrainParams {
	pub catalog_path: PathBuf,
	/// Where to write the artifact before the new model is swapped in. When
	/// omitted the model is swapped in without being saved.
	pub model_dir: Option<PathBuf>,
	pub seed: Option<u64>,
	pub min_k: Option<usize>,
	pub max_k: Option<usize>,
	pub k: Option<usize>,
	pub n_init: Option<usize>,
	pub max_iter: Option<usize>,
	pub max_title_features: Option<usize>,
}
