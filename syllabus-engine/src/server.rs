// ---------------------------------------------------------------------------
// EngineServer: JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Reads JSON-RPC 2.0 requests as NDJSON, routes each `engine/*` method to
// the `Engine`, and writes one response line per request. Requests are
// handled in arrival order on the calling thread.
// ---------------------------------------------------------------------------

use std::io::{BufRead, Write};

use serde::Serialize;

use crate::error::EngineError;
use crate::model::{Engine, TrainConfig};
use crate::protocol::*;
use crate::transport::NdjsonTransport;
use crate::types::PreferenceRequest;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub struct EngineServer<W: Write> {
	transport: NdjsonTransport<W>,
	engine: Engine,
}

impl<W: Write> EngineServer<W> {
	pub fn new(transport: NdjsonTransport<W>, engine: Engine) -> Self {
		Self { transport, engine }
	}

	pub fn into_transport(self) -> NdjsonTransport<W> {
		self.transport
	}

	/// Main loop: one request per input line until EOF. Lines that are not
	/// UTF-8 or not JSON are logged and skipped; only read failures end the
	/// loop.
	pub fn run<R: BufRead>(&mut self, mut reader: R) -> Result<(), EngineError> {
		let mut buf = Vec::new();
		loop {
			buf.clear();
			if reader.read_until(b'\n', &mut buf)? == 0 {
				break;
			}

			let line = match std::str::from_utf8(&buf) {
				Ok(l) => l.trim(),
				Err(e) => {
					tracing::error!("Request line is not valid UTF-8: {}", e);
					continue;
				}
			};
			if line.is_empty() {
				continue;
			}

			let value: serde_json::Value = match serde_json::from_str(line) {
				Ok(v) => v,
				Err(e) => {
					tracing::error!("Failed to parse request: {}", e);
					continue;
				}
			};

			let id = value.get("id").and_then(serde_json::Value::as_u64);
			match serde_json::from_value::<JsonRpcRequest>(value) {
				Ok(request) => self.dispatch(request),
				Err(e) => {
					tracing::warn!("Invalid request: {}", e);
					self.transport.write_error(
						id,
						INVALID_REQUEST,
						format!("Invalid request: {}", e),
						None,
					);
				}
			}
		}

		Ok(())
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		match self.handle(&req.method, req.params) {
			Some(Ok(value)) => self.transport.write_response(id, value),
			Some(Err(e)) => {
				tracing::debug!(method = %req.method, code = e.code(), "Request failed");
				self.transport.write_engine_error(id, &e);
			}
			None => self.transport.write_error(
				id,
				METHOD_NOT_FOUND,
				format!("Unknown method: {}", req.method),
				None,
			),
		}
	}

	/// Run one method. `None` means the method does not exist.
	pub fn handle(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Option<Result<serde_json::Value, EngineError>> {
		let result = match method {
			"engine/health" => to_json(&self.engine.health()),
			"engine/recommend" => self.handle_recommend(params),
			"engine/clusterInfo" => parse_params::<ClusterInfoParams>(params)
				.and_then(|p| self.engine.cluster_info(p.cluster_id))
				.and_then(|info| to_json(&info)),
			"engine/metrics" => self.engine.metrics().and_then(|m| to_json(&m)),
			"engine/reload" => parse_params::<ReloadParams>(params)
				.and_then(|p| self.engine.reload(&p.model_dir))
				.and_then(|_| to_json(&self.engine.health())),
			"engine/train" => self.handle_train(params),
			_ => return None,
		};
		Some(result)
	}

	fn handle_recommend(&self, params: serde_json::Value) -> Result<serde_json::Value, EngineError> {
		let request: PreferenceRequest = parse_params(params)?;
		let recommendations = self.engine.recommend(&request)?;
		Ok(serde_json::json!({ "recommendations": recommendations }))
	}

	fn handle_train(&self, params: serde_json::Value) -> Result<serde_json::Value, EngineError> {
		let p: TrainParams = parse_params(params)?;

		let mut config = TrainConfig::default();
		if let Some(seed) = p.seed {
			config.cluster.seed = seed;
		}
		if let Some(min_k) = p.min_k {
			config.cluster.min_k = min_k;
		}
		if let Some(max_k) = p.max_k {
			config.cluster.max_k = max_k;
		}
		if p.k.is_some() {
			config.cluster.fixed_k = p.k;
		}
		if let Some(n_init) = p.n_init {
			config.cluster.n_init = n_init;
		}
		if let Some(max_iter) = p.max_iter {
			config.cluster.max_iter = max_iter;
		}
		if let Some(max) = p.max_title_features {
			config.features.max_title_features = max;
		}

		tracing::info!(catalog = %p.catalog_path.display(), "Training requested");
		let model = self
			.engine
			.train_and_swap(&p.catalog_path, p.model_dir.as_deref(), &config)?;

		Ok(serde_json::json!({
			"health": self.engine.health(),
			"metrics": model.metrics(),
			"training": model.training(),
		}))
	}
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode method params. A missing `params` member reads as `{}`.
fn parse_params<T: serde::de::DeserializeOwned>(
	params: serde_json::Value,
) -> Result<T, EngineError> {
	let params = if params.is_null() {
		serde_json::json!({})
	} else {
		params
	};
	serde_json::from_value(params)
		.map_err(|e| EngineError::Validation(format!("Invalid params: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
	serde_json::to_value(value)
		.map_err(|e| EngineError::Serialization(format!("Failed to encode result: {}", e)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{ServeConfig, TrainedModel};
	use crate::types::CatalogItem;
	use std::io::Cursor;

	fn catalog() -> Vec<CatalogItem> {
		[
			("Machine Learning", "Stanford University", 4.9, "Mixed", "3.2M"),
			("Deep Learning", "deeplearning.ai", 4.8, "Intermediate", "690k"),
			("Python for Everybody", "University of Michigan", 4.8, "Beginner", "1.5M"),
			("Financial Markets", "Yale University", 4.8, "Beginner", "830k"),
			("Cryptography", "Stanford University", 4.6, "Advanced", "88k"),
		]
		.into_iter()
		.map(|(t, o, r, d, e)| CatalogItem {
			title: t.into(),
			organization: o.into(),
			certificate_type: "COURSE".into(),
			rating: r,
			difficulty: d.into(),
			enrollment: e.into(),
		})
		.collect()
	}

	fn loaded_server() -> EngineServer<Vec<u8>> {
		let model = TrainedModel::train(catalog(), &TrainConfig::default()).unwrap();
		EngineServer::new(
			NdjsonTransport::new(Vec::new()),
			Engine::with_model(model, ServeConfig::default()),
		)
	}

	fn run_lines(mut server: EngineServer<Vec<u8>>, input: &str) -> Vec<serde_json::Value> {
		server.run(Cursor::new(input.as_bytes())).unwrap();
		String::from_utf8(server.into_transport().into_inner())
			.unwrap()
			.lines()
			.map(|l| serde_json::from_str(l).unwrap())
			.collect()
	}

	#[test]
	fn unknown_method_is_none() {
		let server = loaded_server();
		assert!(server.handle("engine/bogus", serde_json::Value::Null).is_none());
	}

	#[test]
	fn recommend_with_missing_params_uses_defaults() {
		let server = loaded_server();
		let value = server
			.handle("engine/recommend", serde_json::Value::Null)
			.unwrap()
			.unwrap();
		assert_eq!(value["recommendations"].as_array().unwrap().len(), 5);
	}

	#[test]
	fn recommend_bad_params_is_validation_error() {
		let server = loaded_server();
		let err = server
			.handle("engine/recommend", serde_json::json!({ "limit": "ten" }))
			.unwrap()
			.unwrap_err();
		assert_eq!(err.code(), "VALIDATION_ERROR");
	}

	#[test]
	fn cluster_info_requires_id() {
		let server = loaded_server();
		let err = server
			.handle("engine/clusterInfo", serde_json::json!({}))
			.unwrap()
			.unwrap_err();
		assert_eq!(err.code(), "VALIDATION_ERROR");

		let info = server
			.handle("engine/clusterInfo", serde_json::json!({ "cluster_id": 0 }))
			.unwrap()
			.unwrap();
		assert_eq!(info["cluster_id"], 0);
	}

	#[test]
	fn run_answers_each_line_and_skips_garbage() {
		let input = concat!(
			r#"{"jsonrpc":"2.0","id":1,"method":"engine/health"}"#,
			"\n",
			"not json\n",
			"\n",
			r#"{"jsonrpc":"2.0","id":2,"method":"engine/nope"}"#,
			"\n",
			r#"{"jsonrpc":"2.0","id":3,"method":"engine/clusterInfo","params":{"cluster_id":99}}"#,
			"\n",
		);
		let msgs = run_lines(loaded_server(), input);
		assert_eq!(msgs.len(), 3);
		assert_eq!(msgs[0]["id"], 1);
		assert_eq!(msgs[0]["result"]["model_loaded"], true);
		assert_eq!(msgs[1]["error"]["code"], METHOD_NOT_FOUND);
		assert_eq!(msgs[2]["error"]["code"], ENGINE_ERROR);
		assert_eq!(msgs[2]["error"]["data"]["engineCode"], "NOT_FOUND");
	}

	#[test]
	fn run_skips_non_utf8_lines() {
		let mut input: Vec<u8> = b"\xff\xfe garbage\n".to_vec();
		input.extend_from_slice(br#"{"jsonrpc":"2.0","id":4,"method":"engine/health"}"#);
		input.push(b'\n');

		let mut server = loaded_server();
		server.run(Cursor::new(input)).unwrap();
		let msgs: Vec<serde_json::Value> = String::from_utf8(server.into_transport().into_inner())
			.unwrap()
			.lines()
			.map(|l| serde_json::from_str(l).unwrap())
			.collect();
		assert_eq!(msgs.len(), 1);
		assert_eq!(msgs[0]["id"], 4);
		assert_eq!(msgs[0]["result"]["model_loaded"], true);
	}

	#[test]
	fn malformed_request_gets_invalid_request_reply() {
		let input = concat!(
			r#"{"jsonrpc":"2.0","id":"abc","method":"engine/health"}"#,
			"\n",
			r#"{"jsonrpc":"2.0","id":5}"#,
			"\n",
			r#"{"jsonrpc":"2.0","id":6,"method":"engine/health"}"#,
			"\n",
		);
		let msgs = run_lines(loaded_server(), input);
		assert_eq!(msgs.len(), 3);
		assert_eq!(msgs[0]["id"], serde_json::Value::Null);
		assert_eq!(msgs[0]["error"]["code"], INVALID_REQUEST);
		assert_eq!(msgs[1]["id"], 5);
		assert_eq!(msgs[1]["error"]["code"], INVALID_REQUEST);
		assert_eq!(msgs[2]["result"]["model_loaded"], true);
	}

	#[test]
	fn empty_server_reports_not_trained() {
		let server = EngineServer::new(
			NdjsonTransport::new(Vec::new()),
			Engine::new(ServeConfig::default()),
		);
		let input = concat!(
			r#"{"jsonrpc":"2.0","id":1,"method":"engine/recommend","params":{}}"#,
			"\n",
			r#"{"jsonrpc":"2.0","id":2,"method":"engine/metrics"}"#,
			"\n",
		);
		let msgs = run_lines(server, input);
		for msg in &msgs {
			assert_eq!(msg["error"]["data"]["errorClass"], "not_ready");
		}
	}

	#[test]
	fn train_over_protocol_swaps_model() {
		let dir = tempfile::tempdir().unwrap();
		let csv = dir.path().join("courses.csv");
		let mut text = String::from("title,organization,certificate_type,rating,difficulty,enrollment\n");
		for item in catalog() {
			text.push_str(&format!(
				"{},{},{},{},{},{}\n",
				item.title, item.organization, item.certificate_type, item.rating, item.difficulty, item.enrollment
			));
		}
		std::fs::write(&csv, text).unwrap();

		let server = EngineServer::new(
			NdjsonTransport::new(Vec::new()),
			Engine::new(ServeConfig::default()),
		);
		let out = dir.path().join("model");
		let value = server
			.handle(
				"engine/train",
				serde_json::json!({
					"catalog_path": csv,
					"model_dir": out,
					"k": 2,
				}),
			)
			.unwrap()
			.unwrap();
		assert_eq!(value["health"]["item_count"], 5);
		assert_eq!(value["metrics"]["k"], 2);
		assert!(out.join(crate::artifact::MODEL_FILE).exists());

		let reloaded = server
			.handle("engine/reload", serde_json::json!({ "model_dir": out }))
			.unwrap()
			.unwrap();
		assert_eq!(reloaded["k"], 2);
	}
}
