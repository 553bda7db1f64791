//! Auth-aware request interceptor.
//!
//! [`ApiClient`] wraps every API call with two hooks. Before sending, it refreshes an
//! access token that is about to expire and attaches the current bearer header. After an
//! authentication failure, it routes through the shared [`RefreshCoordinator`] and
//! retries the request once. Requests to the refresh endpoint never pass through here,
//! so a failing refresh cannot recurse.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	classify::{
		AUTH_FAILURE_STATUS, DefaultFailureClassifier, ErrorClassification, FailureClassifier,
		FailureContext, is_excluded_endpoint,
	},
	config::SessionConfig,
	error::{ApiFailure, ConfigError},
	http::{AUTHORIZATION, ApiResponse, ApiTransport, Method, TransportRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{InvalidationReason, RefreshCoordinator},
};

/// Read access to the bearer token currently held by the session.
pub trait TokenSource: Send + Sync {
	/// Returns the token to attach, if any.
	fn access_token(&self) -> Option<AccessToken>;
}

/// Request descriptor handed to [`ApiClient::send`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path (plus optional query) relative to the API base URL.
	pub path: String,
	/// Extra headers.
	pub headers: BTreeMap<String, String>,
	/// Serialized JSON body.
	pub body: Option<Vec<u8>>,
	/// Set once the request has been retried after a refresh; never retried again.
	pub retried: bool,
	/// Whether the interceptor may refresh the token on this request's behalf.
	pub auto_refresh: bool,
}
impl ApiRequest {
	/// Creates a request for `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: BTreeMap::new(),
			body: None,
			retried: false,
			auto_refresh: true,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);

		Ok(self)
	}

	/// Adds a header. Names are stored lowercase.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Disables both the pre-send refresh and the refresh-and-retry path.
	pub fn without_auto_refresh(mut self) -> Self {
		self.auto_refresh = false;

		self
	}
}
impl Debug for ApiRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("path", &self.path)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("retried", &self.retried)
			.field("auto_refresh", &self.auto_refresh)
			.finish()
	}
}

/// Standard `{ success, message, data }` response envelope.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiEnvelope<T> {
	/// Backend success flag; absent means success.
	#[serde(default)]
	pub success: Option<bool>,
	/// Human-readable status message.
	#[serde(default)]
	pub message: Option<String>,
	/// Payload.
	pub data: Option<T>,
}
impl<T> ApiEnvelope<T> {
	/// Returns the payload, or [`Error::Rejected`] when the envelope reports failure.
	pub fn into_data(self) -> Result<T> {
		if self.success == Some(false) {
			return Err(Error::Rejected {
				message: self.message.unwrap_or_else(|| "request was unsuccessful".into()),
			});
		}

		self.data.ok_or_else(|| Error::Rejected {
			message: self.message.unwrap_or_else(|| "response carried no data".into()),
		})
	}
}

/// Request interceptor sharing a transport and refresh coordinator with the session.
pub struct ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	config: Arc<SessionConfig>,
	coordinator: Arc<RefreshCoordinator<T>>,
	tokens: Arc<dyn TokenSource>,
	classifier: Arc<dyn FailureClassifier>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an interceptor over `transport` reading tokens from `tokens`.
	pub fn new(
		config: impl Into<Arc<SessionConfig>>,
		transport: impl Into<Arc<T>>,
		coordinator: Arc<RefreshCoordinator<T>>,
		tokens: Arc<dyn TokenSource>,
	) -> Self {
		Self {
			transport: transport.into(),
			config: config.into(),
			coordinator,
			tokens,
			classifier: Arc::new(DefaultFailureClassifier),
		}
	}

	/// Replaces the classifier used to decide whether a failure is refreshable.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Shared refresh coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<T>> {
		&self.coordinator
	}

	/// Sends a request and decodes the JSON body of the successful response.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let path = request.path.clone();

		self.send(request).await?.json(&path)
	}

	/// Sends a request and unwraps the `data` field of its [`ApiEnvelope`].
	pub async fn send_data<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send_json::<ApiEnvelope<R>>(request).await?.into_data()
	}

	/// Sends a request, refreshing and retrying once on a refreshable auth failure.
	///
	/// Non-2xx responses surface as [`Error::Api`]; a failed refresh surfaces the original
	/// failure rather than the refresh error.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.intercept(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn intercept(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let url = self.config.resolve(&request.path)?;
		let exempt = self.is_refresh_exempt(&url);

		if request.auto_refresh && !exempt {
			self.refresh_if_expiring().await;
		}

		let epoch = self.coordinator.session_epoch();
		let sent = self.tokens.access_token();
		let response = self.dispatch(&request, &url, sent.as_ref()).await?;

		if response.is_success() {
			return Ok(response);
		}

		let failure = self.failure(&response);

		if request.retried
			|| !request.auto_refresh
			|| exempt
			|| failure.status != AUTH_FAILURE_STATUS
		{
			return Err(failure.into());
		}
		if !failure.classification.allows_refresh(self.config.refresh_on_invalid_token) {
			if failure.classification == ErrorClassification::TokenInvalid {
				self.coordinator.invalidate_at(epoch, InvalidationReason::TokenRejected);
			}

			return Err(failure.into());
		}

		request.retried = true;

		let current = self.tokens.access_token();

		if current.is_some() && current != sent {
			tracing::debug!(path = %request.path, "token replaced while in flight; retrying");

			return self.finish(self.dispatch(&request, &url, current.as_ref()).await?);
		}
		if !self.coordinator.refresh().await {
			tracing::debug!(path = %request.path, "refresh failed; surfacing original failure");

			return Err(failure.into());
		}

		tracing::debug!(path = %request.path, "retrying after refresh");

		let token = self.tokens.access_token();

		self.finish(self.dispatch(&request, &url, token.as_ref()).await?)
	}

	async fn refresh_if_expiring(&self) {
		let Some(token) = self.tokens.access_token() else {
			return;
		};

		if token.is_expiring_soon(self.config.inline_refresh_threshold)
			&& !self.coordinator.is_refreshing()
		{
			tracing::debug!("access token expiring soon; refreshing before request");

			self.coordinator.refresh().await;
		}
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		url: &Url,
		token: Option<&AccessToken>,
	) -> Result<ApiResponse> {
		let mut outgoing = TransportRequest::new(request.method, url.clone());

		outgoing.headers = request.headers.clone();
		outgoing.body = request.body.clone();

		if let Some(token) = token {
			outgoing.headers.insert(AUTHORIZATION.into(), token.bearer());
		}

		Ok(self.transport.execute(outgoing).await?)
	}

	fn finish(&self, response: ApiResponse) -> Result<ApiResponse> {
		if response.is_success() { Ok(response) } else { Err(self.failure(&response).into()) }
	}

	fn failure(&self, response: &ApiResponse) -> ApiFailure {
		FailureContext::from_response(response.status, &response.body)
			.to_api_failure(self.classifier.as_ref())
	}

	fn is_refresh_exempt(&self, url: &Url) -> bool {
		let path = url.path();

		is_excluded_endpoint(path) || path.ends_with(&self.config.endpoints.refresh)
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("api_base_url", &self.config.api_base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn envelope_unwraps_data_or_rejects() {
		let ok: ApiEnvelope<u32> =
			serde_json::from_str(r#"{"success":true,"data":7}"#).expect("Envelope should decode.");

		assert_eq!(ok.into_data().expect("Data should be present."), 7);

		let bare: ApiEnvelope<u32> =
			serde_json::from_str(r#"{"data":1}"#).expect("Envelope should decode.");

		assert_eq!(bare.into_data().expect("Missing flag means success."), 1);

		let failed: ApiEnvelope<u32> =
			serde_json::from_str(r#"{"success":false,"message":"Nope"}"#)
				.expect("Envelope should decode.");

		assert!(matches!(failed.into_data(), Err(Error::Rejected { message }) if message == "Nope"));
	}

	#[test]
	fn request_builders_set_flags_and_body() {
		let request = ApiRequest::post("/posts")
			.with_json(&serde_json::json!({ "content": "hi" }))
			.expect("Body should serialize.")
			.with_header("X-Trace", "abc")
			.without_auto_refresh();

		assert_eq!(request.method, Method::Post);
		assert_eq!(request.headers.get("x-trace").map(String::as_str), Some("abc"));
		assert_eq!(request.body.as_deref(), Some(br#"{"content":"hi"}"#.as_slice()));
		assert!(!request.auto_refresh);
		assert!(!request.retried);
		assert!(ApiRequest::get("/auth/me").auto_refresh);
	}
}
