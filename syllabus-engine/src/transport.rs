use std::io::{self, Write};

use serde::Serialize;

use crate::error::EngineError;
use crate::protocol::ENGINE_ERROR;

#[derive(Serialize)]
struct JsonRpcResponse<'a> {
	jsonrpc: &'a str,
	/// `null` when the request's id could not be read.
	id: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	result: Option<serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<JsonRpcErrorBody>,
}

#[derive(Serialize)]
struct JsonRpcErrorBody {
	code: i32,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	data: Option<serde_json::Value>,
}

/// Writes one JSON-RPC message per line. Stdout in the binary; any writer
/// in tests.
pub struct NdjsonTransport<W: Write> {
	out: W,
}

impl NdjsonTransport<io::Stdout> {
	pub fn stdout() -> Self {
		Self::new(io::stdout())
	}
}

impl<W: Write> NdjsonTransport<W> {
	pub fn new(out: W) -> Self {
		Self { out }
	}

	pub fn into_inner(self) -> W {
		self.out
	}

	pub fn write_response(&mut self, id: u64, result: serde_json::Value) {
		self.write_line(&JsonRpcResponse {
			jsonrpc: "2.0",
			id: Some(id),
			result: Some(result),
			error: None,
		});
	}

	pub fn write_error(
		&mut self,
		id: impl Into<Option<u64>>,
		code: i32,
		message: impl Into<String>,
		data: Option<serde_json::Value>,
	) {
		self.write_line(&JsonRpcResponse {
			jsonrpc: "2.0",
			id: id.into(),
			result: None,
			error: Some(JsonRpcErrorBody {
				code,
				message: message.into(),
				data,
			}),
		});
	}

	/// Error response carrying the engine code and error class in `data`.
	pub fn write_engine_error(&mut self, id: u64, err: &EngineError) {
		self.write_error(id, ENGINE_ERROR, err.to_string(), Some(err.to_json_rpc_error()));
	}

	fn write_line(&mut self, value: &impl Serialize) {
		if let Err(e) = serde_json::to_writer(&mut self.out, value) {
			tracing::error!("Failed to serialize: {}", e);
			return;
		}
		let _ = writeln!(self.out);
		let _ = self.out.flush();
	}
}
