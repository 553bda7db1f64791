//! Client-side access token lifecycle manager: singleflight refresh, an auth-aware request
//! interceptor, and a session controller that keeps short-lived bearer tokens alive.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod session;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers shared by the integration tests.

	pub use crate::_prelude::*;

	// std
	use std::collections::{BTreeSet, VecDeque};
	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		config::SessionConfig,
		error::TransportError,
		http::{ApiResponse, ApiTransport, Method, ReqwestTransport, TransportFuture, TransportRequest},
		session::{Navigator, SessionController},
	};

	/// Controller type alias used by reqwest-backed integration tests.
	pub type ReqwestTestController = SessionController<ReqwestTransport>;
	/// Controller type alias used by scripted-transport integration tests.
	pub type ScriptedTestController = SessionController<ScriptedTransport>;

	/// In-memory transport replaying canned responses per `METHOD /path`.
	///
	/// Each route holds a queue; the last queued response repeats once the others are used
	/// up. Unknown routes answer `404`. Every request is recorded.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		routes: Mutex<BTreeMap<String, VecDeque<ApiResponse>>>,
		route_delays: Mutex<BTreeMap<String, std::time::Duration>>,
		unreachable: Mutex<BTreeSet<String>>,
		requests: Mutex<Vec<TransportRequest>>,
		delay: Option<std::time::Duration>,
	}
	impl ScriptedTransport {
		/// Delays every response by `delay`.
		pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
			self.delay = Some(delay);

			self
		}

		/// Queues a JSON response for `method path`.
		pub fn respond(
			&self,
			method: Method,
			path: &str,
			status: u16,
			body: serde_json::Value,
		) -> &Self {
			self.routes
				.lock()
				.entry(format!("{method} {path}"))
				.or_default()
				.push_back(ApiResponse::new(status, body.to_string()));

			self
		}

		/// Delays responses for `method path` by `delay`, overriding [`Self::with_delay`].
		pub fn delay(&self, method: Method, path: &str, delay: std::time::Duration) -> &Self {
			self.route_delays.lock().insert(format!("{method} {path}"), delay);

			self
		}

		/// Fails every call to `method path` with a network error.
		pub fn disconnect(&self, method: Method, path: &str) -> &Self {
			self.unreachable.lock().insert(format!("{method} {path}"));

			self
		}

		/// Every request received so far, in arrival order.
		pub fn requests(&self) -> Vec<TransportRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests received for `method path`.
		pub fn calls(&self, method: Method, path: &str) -> usize {
			self.requests
				.lock()
				.iter()
				.filter(|request| request.method == method && request.url.path() == path)
				.count()
		}

		fn next_response(&self, key: &str) -> ApiResponse {
			let mut routes = self.routes.lock();

			match routes.get_mut(key) {
				Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
				Some(queue) => queue.front().cloned().unwrap_or_default(),
				None => ApiResponse::new(404, r#"{"message":"Route not scripted"}"#),
			}
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let key = format!("{} {}", request.method, request.url.path());
				let path = request.url.path().to_owned();

				self.requests.lock().push(request);

				let delay = self.route_delays.lock().get(&key).copied().or(self.delay);

				if let Some(delay) = delay {
					tokio::time::sleep(delay).await;
				}
				if self.unreachable.lock().contains(&key) {
					return Err(TransportError::network(
						path,
						std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
					));
				}

				Ok(self.next_response(&key))
			})
		}
	}

	/// Navigator that records every redirect target it receives.
	#[derive(Debug, Default)]
	pub struct RecordingNavigator(Mutex<Vec<String>>);
	impl RecordingNavigator {
		/// Returns all redirect targets in the order they were issued.
		pub fn redirects(&self) -> Vec<String> {
			self.0.lock().clone()
		}
	}
	impl Navigator for RecordingNavigator {
		fn redirect(&self, target: &str) {
			self.0.lock().push(target.to_owned());
		}
	}

	/// Encodes an unsigned JWT-shaped token whose `exp` claim is `expires_at`.
	pub fn fake_jwt(subject: &str, expires_at: OffsetDateTime) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
		let claims = serde_json::json!({ "sub": subject, "exp": expires_at.unix_timestamp() });
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.c2lnbmF0dXJl")
	}

	/// Config pointed at `base_url` with the refresh interval gate disabled.
	pub fn test_config(base_url: &str) -> SessionConfig {
		SessionConfig::new(Url::parse(base_url).expect("Test base URL should parse."))
			.expect("Test base URL should be accepted.")
			.with_min_refresh_interval(Duration::ZERO)
	}

	/// Builds a reqwest-backed controller plus the navigator it reports to.
	pub fn build_reqwest_test_controller(
		config: SessionConfig,
	) -> (Arc<ReqwestTestController>, Arc<RecordingNavigator>) {
		let transport = ReqwestTransport::from_config(&config)
			.expect("Failed to build reqwest transport for tests.");
		let navigator = Arc::new(RecordingNavigator::default());
		let controller = ReqwestTestController::new(config, transport, navigator.clone());

		(Arc::new(controller), navigator)
	}

	/// Builds a controller over a [`ScriptedTransport`] plus the navigator it reports to.
	pub fn build_scripted_test_controller(
		config: SessionConfig,
		transport: ScriptedTransport,
	) -> (Arc<ScriptedTestController>, Arc<ScriptedTransport>, Arc<RecordingNavigator>) {
		let transport = Arc::new(transport);
		let navigator = Arc::new(RecordingNavigator::default());
		let controller = ScriptedTestController::new(config, transport.clone(), navigator.clone());

		(Arc::new(controller), transport, navigator)
	}

	/// JSON user record as returned by the API.
	pub fn user_json(id: &str, username: &str) -> serde_json::Value {
		serde_json::json!({ "id": id, "username": username, "isVerified": true })
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
