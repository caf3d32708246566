use anyhow::{Context, Result};
use clap::Parser;
use syllabus_engine::config::{CliArgs, Command, ServeArgs, TrainArgs};
use syllabus_engine::model::{Engine, TrainedModel};
use syllabus_engine::server::EngineServer;
use syllabus_engine::transport::NdjsonTransport;

fn main() -> Result<()> {
	let args = CliArgs::parse();

	// Logs go to stderr; stdout carries the NDJSON protocol.
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	match args.command {
		Command::Train(train) => run_train(train),
		Command::Serve(serve) => run_serve(serve),
	}
}

fn run_train(args: TrainArgs) -> Result<()> {
	let config = args.train_config();
	let model = TrainedModel::train_file(&args.catalog, &config)
		.with_context(|| format!("training on {}", args.catalog.display()))?;
	model
		.save(&args.out)
		.with_context(|| format!("writing artifact to {}", args.out.display()))?;

	let metrics = model.metrics();
	tracing::info!(
		k = metrics.k,
		silhouette = metrics.silhouette_score,
		intra_similarity = metrics.intra_cluster_similarity,
		items = metrics.n_samples,
		features = metrics.n_features,
		out = %args.out.display(),
		"Training complete"
	);
	Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
	let config = args.serve_config();
	let engine = match &args.model {
		Some(dir) => {
			let model = TrainedModel::load(dir)
				.with_context(|| format!("loading model from {}", dir.display()))?;
			Engine::with_model(model, config)
		}
		None => {
			tracing::warn!("No model directory given; serving until engine/train or engine/reload");
			Engine::new(config)
		}
	};

	let mut server = EngineServer::new(NdjsonTransport::stdout(), engine);
	tracing::info!("syllabus-engine ready");

	let stdin = std::io::stdin();
	server.run(stdin.lock())?;
	Ok(())
}
