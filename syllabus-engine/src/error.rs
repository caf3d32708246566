use thiserror::Error;

/// How a caller should react to an error: fix the request, retry later once
/// a model is available, or report an engine fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
	InvalidInput,
	NotReady,
	Internal,
}

impl ErrorClass {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::InvalidInput => "invalid_input",
			Self::NotReady => "not_ready",
			Self::Internal => "internal",
		}
	}
}

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Invalid request: {0}")]
	Validation(String),
	#[error("Model not trained: train or load an artifact first")]
	ModelNotTrained,
	#[error("Empty catalog: cannot fit on zero items")]
	EmptyCatalog,
	#[error("Degenerate clustering: cluster {cluster} of {k} has no members")]
	DegenerateCluster { cluster: usize, k: usize },
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Catalog error: {0}")]
	Catalog(String),
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Artifact corruption: {0}")]
	Corruption(String),
}

impl EngineError {
	pub fn code(&self) -> &str {
		match self {
			Self::Validation(_) => "VALIDATION_ERROR",
			Self::ModelNotTrained => "MODEL_NOT_TRAINED",
			Self::EmptyCatalog => "EMPTY_CATALOG",
			Self::DegenerateCluster { .. } => "DEGENERATE_CLUSTER",
			Self::NotFound(_) => "NOT_FOUND",
			Self::Catalog(_) => "CATALOG_ERROR",
			Self::Io(_) => "IO_ERROR",
			Self::Serialization(_) => "SERIALIZATION_ERROR",
			Self::Corruption(_) => "CORRUPT_ARTIFACT",
		}
	}

	pub fn class(&self) -> ErrorClass {
		match self {
			Self::Validation(_) | Self::NotFound(_) => ErrorClass::InvalidInput,
			Self::ModelNotTrained => ErrorClass::NotReady,
			_ => ErrorClass::Internal,
		}
	}

	pub fn to_json_rpc_error(&self) -> serde_json::Value {
		serde_json::json!({
			"engineCode": self.code(),
			"errorClass": self.class().as_str(),
			"message": self.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_trained_is_retryable_class() {
		assert_eq!(EngineError::ModelNotTrained.class(), ErrorClass::NotReady);
		assert_eq!(
			EngineError::Validation("bad limit".into()).class(),
			ErrorClass::InvalidInput
		);
		assert_eq!(EngineError::EmptyCatalog.class(), ErrorClass::Internal);
	}

	#[test]
	fn json_rpc_payload_carries_code_and_class() {
		let err = EngineError::DegenerateCluster { cluster: 3, k: 5 };
		let payload = err.to_json_rpc_error();
		assert_eq!(payload["engineCode"], "DEGENERATE_CLUSTER");
		assert_eq!(payload["errorClass"], "internal");
		assert!(payload["message"].as_str().unwrap().contains("cluster 3 of 5"));
	}
}
