//! Transport primitives for API calls.
//!
//! [`ApiTransport`] is the crate's only dependency on an HTTP stack. The request
//! interceptor and the refresh coordinator both hold the same transport; the coordinator
//! calls it directly so refresh requests never re-enter the interceptor. Implementations
//! must carry cookies between calls because the refresh endpoint is authenticated by an
//! httpOnly refresh-token cookie rather than by the bearer header.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::{config::SessionConfig, error::ConfigError};

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP clients able to execute fully resolved requests.
///
/// Implementations return `Ok` for every response that arrived, whatever its status;
/// `Err` is reserved for calls that never produced a response.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes a request and buffers the response body.
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved request handed to a transport.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Header name/value pairs.
	pub headers: BTreeMap<String, String>,
	/// Serialized JSON body, if any.
	pub body: Option<Vec<u8>>,
}
impl TransportRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: BTreeMap::new(), body: None }
	}

	/// Returns the `Authorization` header value, if set.
	pub fn authorization(&self) -> Option<&str> {
		self.headers.get(AUTHORIZATION).map(String::as_str)
	}
}
impl Debug for TransportRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransportRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("authorization_set", &self.headers.contains_key(AUTHORIZATION))
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Header carrying the bearer token.
pub const AUTHORIZATION: &str = "authorization";

/// Buffered response returned by a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lowercase names.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with the provided status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: BTreeMap::new(), body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Decodes the body as JSON, reporting the failing field path on error.
	pub fn json<T>(&self, endpoint: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
		let mut de = serde_json::Deserializer::from_slice(body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { endpoint: endpoint.into(), source })
	}
}

/// Reqwest-backed transport with a cookie store and a per-request timeout.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing client. The client must keep a cookie store for refresh to work.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a cookie-aware client honoring the configured request timeout.
	pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
		let timeout = SessionConfig::std_duration(config.request_timeout, "request_timeout")?;
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.timeout(timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let endpoint = request.url.path().to_owned();
			let method = match request.method {
				Method::Get => reqwest::Method::GET,
				Method::Post => reqwest::Method::POST,
				Method::Put => reqwest::Method::PUT,
				Method::Patch => reqwest::Method::PATCH,
				Method::Delete => reqwest::Method::DELETE,
			};
			let mut builder = client.request(method, request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
			}

			let response =
				builder.send().await.map_err(|e| TransportError::network(endpoint.clone(), e))?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
				})
				.collect();
			let body = response
				.bytes()
				.await
				.map_err(|e| TransportError::network(endpoint, e))?
				.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, Deserialize)]
	struct Probe {
		#[allow(dead_code)]
		value: u32,
	}

	#[test]
	fn json_reports_the_failing_path() {
		let response = ApiResponse::new(200, r#"{"value":"nope"}"#);
		let err = response.json::<Probe>("/probe").expect_err("String is not a u32.");

		match err {
			Error::Decode { endpoint, source } => {
				assert_eq!(endpoint, "/probe");
				assert_eq!(source.path().to_string(), "value");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn empty_bodies_decode_as_null() {
		let response = ApiResponse::new(204, Vec::new());
		let value: Option<u32> = response.json("/empty").expect("Empty body should decode.");

		assert!(value.is_none());
		assert!(response.is_success());
	}

	#[test]
	fn request_debug_hides_credentials() {
		let mut request = TransportRequest::new(
			Method::Get,
			Url::parse("https://api.example.com/auth/me").expect("Fixture URL should parse."),
		);

		request.headers.insert(AUTHORIZATION.into(), "Bearer secret".into());

		let rendered = format!("{request:?}");

		assert!(!rendered.contains("secret"));
		assert!(rendered.contains("authorization_set: true"));
		assert_eq!(request.authorization(), Some("Bearer secret"));
	}
}
