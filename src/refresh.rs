//! Singleflight access token refresh with rate limiting and an attempt cap.
//!
//! [`RefreshCoordinator::refresh`] may be called from any number of tasks at once. Callers
//! queue on a single async guard; the first one through performs the network call and
//! every caller that queued behind it observes the same outcome once it settles, so at
//! most one refresh request is ever in flight. A caller that arrives while the
//! coordinator is idle is subject to two gates before any I/O happens: the minimum
//! interval since the previous attempt, and the cap on consecutive failed attempts.
//! Hitting the cap asks the session to end.
//!
//! The coordinator never touches session state itself. Outcomes are reported through
//! [`RefreshObserver`] while the guard is still held, so waiters resume only after the
//! session already carries the new token. Each outcome is tagged with the session epoch
//! the caller started under; callers whose session ended while they queued get `false`
//! without any I/O, and they never share an outcome with a later session.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	classify::{DefaultFailureClassifier, FailureClassifier, FailureContext},
	config::SessionConfig,
	http::{ApiTransport, Method, TransportRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Receives refresh outcomes; implemented by the session owner.
///
/// Every callback carries the epoch returned by [`Self::session_epoch`] when the refresh
/// was requested. Implementations must ignore outcomes whose epoch has passed.
pub trait RefreshObserver: Send + Sync {
	/// Identifies the current session. Observers without sign-in state keep the default.
	fn session_epoch(&self) -> u64 {
		0
	}

	/// A refresh succeeded. `token` is `None` when the backend only rotated cookies.
	fn on_refreshed(&self, epoch: u64, token: Option<&AccessToken>);

	/// A refresh call failed; the session can no longer be trusted.
	fn on_refresh_failed(&self, epoch: u64, error: &Error);

	/// The session must end without another refresh attempt.
	fn on_session_invalidated(&self, epoch: u64, reason: InvalidationReason);
}

/// Why the coordinator asked the session to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationReason {
	/// Consecutive failed refreshes reached the configured cap.
	AttemptsExhausted,
	/// The backend rejected the token in a way refreshing cannot fix.
	TokenRejected,
}

#[derive(Debug, Default)]
struct RefreshState {
	refreshing: bool,
	attempts: u32,
	last_attempt: Option<OffsetDateTime>,
	last_attempt_clock: Option<Instant>,
	generation: u64,
	last_epoch: u64,
	last_outcome: bool,
}

enum Gate {
	Joined(bool),
	RateLimited,
	Exhausted,
	Proceed,
}

/// Process-wide refresh state machine: `Idle → Refreshing → Idle`.
pub struct RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Shared counters for refresh outcomes.
	pub metrics: Arc<RefreshMetrics>,
	transport: Arc<T>,
	config: Arc<SessionConfig>,
	observer: Arc<dyn RefreshObserver>,
	classifier: Arc<dyn FailureClassifier>,
	state: Mutex<RefreshState>,
	flight: AsyncMutex<()>,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a coordinator that refreshes through `transport` and reports to `observer`.
	pub fn new(
		config: impl Into<Arc<SessionConfig>>,
		transport: impl Into<Arc<T>>,
		observer: Arc<dyn RefreshObserver>,
	) -> Self {
		Self {
			metrics: Default::default(),
			transport: transport.into(),
			config: config.into(),
			observer,
			classifier: Arc::new(DefaultFailureClassifier),
			state: Default::default(),
			flight: AsyncMutex::new(()),
		}
	}

	/// Replaces the classifier applied to failed refresh responses.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Refreshes the access token, joining any refresh already in flight.
	///
	/// Returns `true` once the backend issued a new token. A `false` result never implies
	/// the session is still populated; check the session before relying on it.
	pub async fn refresh(&self) -> bool {
		const KIND: FlowKind = FlowKind::Refresh;

		let epoch = self.observer.session_epoch();
		let observed = self.state.lock().generation;
		let _flight = self.flight.lock().await;

		if self.observer.session_epoch() != epoch {
			tracing::debug!("session changed while waiting for refresh; skipping");

			return false;
		}

		match self.gate(observed, epoch) {
			Gate::Joined(outcome) => {
				self.metrics.record_joined();
				tracing::debug!(outcome, "joined an in-flight refresh");

				return outcome;
			},
			Gate::RateLimited => {
				self.metrics.record_rate_limited();
				obs::record_flow_outcome(KIND, FlowOutcome::Skipped);
				tracing::warn!("refresh attempted too frequently; skipping");

				return false;
			},
			Gate::Exhausted => {
				self.metrics.record_exhausted();
				obs::record_flow_outcome(KIND, FlowOutcome::Skipped);
				tracing::error!(
					max_attempts = self.config.max_refresh_attempts,
					"refresh attempts exhausted; forcing logout"
				);
				self.observer.on_session_invalidated(epoch, InvalidationReason::AttemptsExhausted);

				return false;
			},
			Gate::Proceed => {},
		}

		let in_flight = InFlight(&self.state);
		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.instrument(self.request_refresh()).await;

		match &result {
			Ok(token) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				tracing::info!(rotated = token.is_some(), "access token refreshed");
				self.observer.on_refreshed(epoch, token.as_ref());
			},
			Err(e) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				tracing::warn!(error = %e, "access token refresh failed");
				self.observer.on_refresh_failed(epoch, e);
			},
		}

		let success = result.is_ok() && self.observer.session_epoch() == epoch;

		if result.is_ok() && !success {
			tracing::debug!("session ended during refresh; discarding the new token");
		}

		in_flight.settle(result.is_ok(), epoch);

		success
	}

	/// Returns `true` while a refresh network call is outstanding.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Consecutive failed attempts since the last success or reset.
	pub fn attempts(&self) -> u32 {
		self.state.lock().attempts
	}

	/// Instant of the most recent refresh network call.
	pub fn last_attempt_at(&self) -> Option<OffsetDateTime> {
		self.state.lock().last_attempt
	}

	/// Clears the attempt counter and the rate-limit clock.
	///
	/// A refresh already in flight keeps running and still settles for its waiters.
	pub fn reset(&self) {
		let mut state = self.state.lock();

		state.attempts = 0;
		state.last_attempt = None;
		state.last_attempt_clock = None;
	}

	/// Ends the current session without attempting a refresh.
	pub fn invalidate(&self, reason: InvalidationReason) {
		self.invalidate_at(self.observer.session_epoch(), reason);
	}

	/// Epoch of the session the observer currently holds.
	pub(crate) fn session_epoch(&self) -> u64 {
		self.observer.session_epoch()
	}

	/// Ends the session started at `epoch`; a later session is left alone.
	pub(crate) fn invalidate_at(&self, epoch: u64, reason: InvalidationReason) {
		if self.observer.session_epoch() != epoch {
			tracing::debug!(?reason, "ignoring invalidation of an ended session");

			return;
		}

		tracing::warn!(?reason, "session invalidated");
		self.reset();
		self.observer.on_session_invalidated(epoch, reason);
	}

	fn gate(&self, observed: u64, epoch: u64) -> Gate {
		let mut state = self.state.lock();

		if state.generation != observed && state.last_epoch == epoch {
			return Gate::Joined(state.last_outcome);
		}

		let now = Instant::now();

		if state.last_attempt_clock.is_some_and(|last| {
			Duration::try_from(now - last)
				.is_ok_and(|elapsed| elapsed < self.config.min_refresh_interval)
		}) {
			return Gate::RateLimited;
		}
		if state.attempts >= self.config.max_refresh_attempts {
			return Gate::Exhausted;
		}

		state.refreshing = true;
		state.attempts += 1;
		state.last_attempt = Some(OffsetDateTime::now_utc());
		state.last_attempt_clock = Some(now);

		Gate::Proceed
	}

	async fn request_refresh(&self) -> Result<Option<AccessToken>> {
		let endpoint = self.config.endpoints.refresh.as_str();
		let mut request = TransportRequest::new(Method::Post, self.config.resolve(endpoint)?);

		request.body = Some(b"{}".to_vec());

		let response = self.transport.execute(request).await?;

		if !response.is_success() {
			let ctx = FailureContext::from_response(response.status, &response.body);

			return Err(ctx.to_api_failure(self.classifier.as_ref()).into());
		}

		let body = response.json::<Option<RefreshBody>>(endpoint)?.unwrap_or_default();

		if body.success == Some(false) {
			return Err(Error::Rejected {
				message: body.message.unwrap_or_else(|| "refresh rejected".into()),
			});
		}

		Ok(body.access_token.or_else(|| body.data.and_then(|data| data.access_token)))
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &state.refreshing)
			.field("attempts", &state.attempts)
			.field("last_attempt", &state.last_attempt)
			.finish()
	}
}

/// Marks the coordinator idle again even if the refreshing future is dropped mid-call.
struct InFlight<'a>(&'a Mutex<RefreshState>);
impl InFlight<'_> {
	fn settle(self, success: bool, epoch: u64) {
		let mut state = self.0.lock();

		state.generation = state.generation.wrapping_add(1);
		state.last_epoch = epoch;
		state.last_outcome = success;

		if success {
			state.attempts = 0;
		}
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.0.lock().refreshing = false;
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RefreshBody {
	success: Option<bool>,
	message: Option<String>,
	access_token: Option<AccessToken>,
	data: Option<RefreshData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RefreshData {
	access_token: Option<AccessToken>,
}
