//! Crate-level error types shared by the interceptor, refresh coordinator, and session controller.

// self
use crate::{_prelude::*, classify::ErrorClassification};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Backend answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiFailure),

	/// Backend answered with a body that could not be decoded.
	#[error("Response from {endpoint} could not be decoded.")]
	Decode {
		/// Request path that produced the body.
		endpoint: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Backend answered 2xx but flagged the envelope as unsuccessful.
	#[error("Request was rejected: {message}.")]
	Rejected {
		/// Backend-supplied message.
		message: String,
	},
	/// The operation requires an authenticated session.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
}
impl Error {
	/// Maps the error into the failure taxonomy used by refresh decisions.
	pub fn classification(&self) -> ErrorClassification {
		match self {
			Self::Api(failure) => failure.classification,
			Self::Transport(_) => ErrorClassification::NetworkError,
			_ => ErrorClassification::Other,
		}
	}

	/// Returns the HTTP status code when the backend produced one.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(failure) => Some(failure.status),
			_ => None,
		}
	}
}

/// Non-success response returned by the backend, already classified.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Request failed with status {status} ({classification}): {message}.")]
pub struct ApiFailure {
	/// HTTP status code.
	pub status: u16,
	/// Taxonomy bucket derived from status and message.
	pub classification: ErrorClassification,
	/// Backend-supplied message or a body preview.
	pub message: String,
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL is not an absolute http(s) URL.
	#[error("API base URL `{url}` must be an absolute http(s) URL.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// A request path could not be joined onto the base URL.
	#[error("Request path `{path}` cannot be resolved against the API base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Body(#[from] serde_json::Error),
	/// A required environment variable is missing.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: String,
	},
	/// An environment variable holds a value that cannot be parsed.
	#[error("Environment variable `{name}` has an invalid value `{value}`.")]
	InvalidEnv {
		/// Variable name.
		name: String,
		/// Raw value.
		value: String,
	},
	/// Duration cannot be represented by the transport.
	#[error("The {field} duration must be non-negative.")]
	NegativeDuration {
		/// Configuration field name.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Request path being called.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}
