use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cluster::ClusterConfig;
use crate::features::FeatureConfig;
use crate::model::{ServeConfig, TrainConfig};
use crate::profile::ProfileConfig;

#[derive(Parser, Debug)]
#[command(
	name = "syllabus-engine",
	version,
	about = "Course recommendation engine: offline training and a JSON-RPC stdio server"
)]
pub struct CliArgs {
	/// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
	#[arg(long, global = true, default_value = "info", env = "SYLLABUS_LOG_LEVEL")]
	pub log_level: String,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Fit features and clusters on a catalog and write the model artifact
	Train(TrainArgs),
	/// Serve recommendations over JSON-RPC 2.0 / NDJSON on stdin/stdout
	Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
	/// Catalog file (CSV, or JSON array when the extension is .json)
	#[arg(long, env = "SYLLABUS_CATALOG")]
	pub catalog: PathBuf,

	/// Output directory for model.gz and metrics.json
	#[arg(long, env = "SYLLABUS_MODEL_DIR")]
	pub out: PathBuf,

	/// Random seed for k-means initialization
	#[arg(long, default_value = "42", env = "SYLLABUS_SEED")]
	pub seed: u64,

	/// Smallest k considered
	#[arg(long, default_value = "2")]
	pub min_k: usize,

	/// Largest k considered (capped at catalog size - 1)
	#[arg(long, default_value = "15")]
	pub max_k: usize,

	/// Use exactly this many clusters instead of sweeping
	#[arg(long)]
	pub k: Option<usize>,

	/// k-means restarts per candidate k
	#[arg(long, default_value = "10")]
	pub n_init: usize,

	/// Maximum k-means iterations per restart
	#[arg(long, default_value = "300")]
	pub max_iter: usize,

	/// Maximum TF-IDF title vocabulary size
	#[arg(long, default_value = "50")]
	pub max_title_features: usize,
}

impl TrainArgs {
	pub fn train_config(&self) -> TrainConfig {
		TrainConfig {
			features: FeatureConfig {
				max_title_features: self.max_title_features,
			},
			cluster: ClusterConfig {
				seed: self.seed,
				min_k: self.min_k,
				max_k: self.max_k,
				fixed_k: self.k,
				n_init: self.n_init,
				max_iter: self.max_iter,
				..Default::default()
			},
		}
	}
}

#[derive(Args, Debug)]
pub struct ServeArgs {
	/// Model directory to load at startup; without it the server starts
	/// empty until `engine/train` or `engine/reload` is called
	#[arg(long, env = "SYLLABUS_MODEL_DIR")]
	pub model: Option<PathBuf>,

	/// Reject out-of-range `limit` values instead of clamping them
	#[arg(long)]
	pub strict_limit: bool,

	/// Minimum token coverage for fuzzy liked-title matches
	#[arg(long, default_value = "0.6")]
	pub title_match_threshold: f64,
}

impl ServeArgs {
	pub fn serve_config(&self) -> ServeConfig {
		ServeConfig {
			strict_limit: self.strict_limit,
			profile: ProfileConfig {
				title_match_threshold: self.title_match_threshold,
			},
		}
	}
}
