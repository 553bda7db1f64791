//! Auth session controller: sign-in, sign-out, session restore, and liveness.

// self
use crate::{
	_prelude::*,
	auth::{AuthPayload, LoginRequest, RegisterRequest, User},
	classify::{AUTH_FAILURE_STATUS, ErrorClassification},
	client::{ApiClient, ApiRequest},
	config::SessionConfig,
	http::ApiTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::{InvalidationReason, RefreshCoordinator},
	session::{LivenessTask, Navigator, RouteGuard, Session, SessionCore},
};

/// Owns the session and wires the interceptor and refresh coordinator to it.
///
/// Cheap accessors read a snapshot; every mutation goes through the controller or the
/// refresh outcomes it observes.
pub struct SessionController<T>
where
	T: ?Sized + ApiTransport,
{
	config: Arc<SessionConfig>,
	core: Arc<SessionCore>,
	coordinator: Arc<RefreshCoordinator<T>>,
	client: ApiClient<T>,
	guard: RouteGuard,
	liveness: Mutex<Option<LivenessTask>>,
}
impl<T> SessionController<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a signed-out controller with the default route guard.
	pub fn new(
		config: SessionConfig,
		transport: impl Into<Arc<T>>,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		Self::with_route_guard(config, transport, navigator, RouteGuard::default())
	}

	/// Creates a signed-out controller; forced logouts navigate to the guard's login route.
	pub fn with_route_guard(
		config: SessionConfig,
		transport: impl Into<Arc<T>>,
		navigator: Arc<dyn Navigator>,
		guard: RouteGuard,
	) -> Self {
		let config = Arc::new(config);
		let transport: Arc<T> = transport.into();
		let core = Arc::new(SessionCore::new(navigator, guard.login_route()));
		let coordinator: Arc<RefreshCoordinator<T>> =
			Arc::new(RefreshCoordinator::new(config.clone(), transport.clone(), core.clone()));
		let client: ApiClient<T> =
			ApiClient::new(config.clone(), transport, coordinator.clone(), core.clone());

		Self { config, core, coordinator, client, guard, liveness: Mutex::new(None) }
	}

	/// Interceptor for application requests; shares this session's token and refresh state.
	pub fn client(&self) -> &ApiClient<T> {
		&self.client
	}

	/// Shared refresh coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<T>> {
		&self.coordinator
	}

	/// Active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Route classification used for redirect decisions.
	pub fn route_guard(&self) -> &RouteGuard {
		&self.guard
	}

	/// Snapshot of the current session.
	pub fn session(&self) -> Session {
		self.core.snapshot()
	}

	/// Whether the backend has confirmed the session.
	pub fn is_authenticated(&self) -> bool {
		self.core.is_authenticated()
	}

	/// Redirect the UI must perform for `path` given the current session, if any.
	pub fn redirect_for(&self, path: &str) -> Option<&str> {
		self.guard.redirect_for(path, self.is_authenticated())
	}

	/// Signs in with credentials and stores the returned user and token.
	pub async fn login(&self, credentials: LoginRequest) -> Result<User> {
		self.sign_in("login", &self.config.endpoints.login, &credentials).await
	}

	/// Registers an account; the backend signs it in immediately.
	pub async fn register(&self, request: RegisterRequest) -> Result<User> {
		self.sign_in("register", &self.config.endpoints.register, &request).await
	}

	/// Ends the session on this device.
	///
	/// The server call is best-effort. Local state, refresh state, and the liveness task are
	/// cleared and the user is sent to the login route whatever the server answers.
	pub async fn logout(&self) {
		self.sign_out("logout", &self.config.endpoints.logout).await;
	}

	/// Ends the session on every device; otherwise identical to [`Self::logout`].
	pub async fn logout_all_devices(&self) {
		self.sign_out("logout_all", &self.config.endpoints.logout_all).await;
	}

	/// Re-establishes a session from existing cookies at application start.
	///
	/// Probes the current user. When the probe fails, refreshes once and probes again; any
	/// further failure ends the session. Unreachable backends leave the session as it is.
	/// Returns `true` when the session is confirmed.
	pub async fn restore_session(&self) -> bool {
		self.revalidate(FlowKind::RestoreSession).await
	}

	/// Runs the same probe as [`Self::restore_session`] against the live session.
	pub async fn validate_session(&self) -> bool {
		self.revalidate(FlowKind::LivenessCheck).await
	}

	/// Asks the backend whether the current token/cookie pair is valid.
	///
	/// A `401` answer is a definite "no"; other failures are surfaced.
	pub async fn check_auth(&self) -> Result<bool> {
		const KIND: FlowKind = FlowKind::CheckAuth;

		let span = FlowSpan::new(KIND, "check_auth");
		let request = ApiRequest::post(&self.config.endpoints.check_auth).without_auto_refresh();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.client.send_json::<Option<CheckAuthBody>>(request)).await;

		match result {
			Ok(body) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(body.is_some_and(|body| body.is_valid()))
			},
			Err(e) if e.status() == Some(AUTH_FAILURE_STATUS) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(false)
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Fetches the signed-in user through the interceptor and updates the session with it.
	///
	/// Fails with [`Error::NotAuthenticated`] without calling the backend when no session
	/// is active; use [`Self::restore_session`] to pick up a session from cookies.
	pub async fn fetch_current_user(&self) -> Result<User> {
		let epoch = self.core.epoch();

		if !self.core.is_authenticated() {
			return Err(Error::NotAuthenticated);
		}

		let user =
			self.client.send_data::<User>(ApiRequest::get(&self.config.endpoints.me)).await?;

		if !self.core.confirm(epoch, user.clone()) {
			return Err(Error::NotAuthenticated);
		}

		Ok(user)
	}

	/// Starts the periodic liveness check, replacing any running one.
	///
	/// Must be called from within a Tokio runtime.
	pub fn start_liveness_check(self: &Arc<Self>) -> Result<()> {
		let period =
			SessionConfig::std_duration(self.config.liveness_interval, "liveness_interval")?;
		let task = LivenessTask::spawn(Arc::downgrade(self), period);

		tracing::debug!(?period, "liveness check started");

		if let Some(previous) = self.liveness.lock().replace(task) {
			previous.stop();
		}

		Ok(())
	}

	/// Stops the periodic liveness check, if running.
	pub fn stop_liveness_check(&self) {
		if let Some(task) = self.liveness.lock().take() {
			task.stop();
		}
	}

	/// Returns `true` while a liveness task is running.
	pub fn is_liveness_running(&self) -> bool {
		self.liveness.lock().as_ref().is_some_and(|task| !task.is_finished())
	}

	pub(crate) async fn liveness_tick(&self) {
		let session = self.core.snapshot();

		if !session.is_authenticated() {
			return;
		}
		if session
			.access_token()
			.is_some_and(|token| token.is_expiring_soon(self.config.proactive_refresh_threshold))
		{
			tracing::debug!("access token nearing expiry; refreshing proactively");

			if !self.coordinator.refresh().await && !self.core.is_authenticated() {
				return;
			}
		}

		self.validate_session().await;
	}

	async fn sign_in<B>(&self, stage: &'static str, path: &str, body: &B) -> Result<User>
	where
		B: Serialize + Sync,
	{
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let request = ApiRequest::post(path).with_json(body)?.without_auto_refresh();

		match span.instrument(self.client.send_data::<AuthPayload>(request)).await {
			Ok(payload) => {
				let (user, token) = payload.into_parts();

				self.coordinator.reset();
				self.core.authenticate(user.clone(), token);
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				tracing::info!(user_id = %user.id, stage, "signed in");

				Ok(user)
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				tracing::warn!(error = %e, classification = %e.classification(), stage, "sign-in failed");

				Err(e)
			},
		}
	}

	async fn sign_out(&self, stage: &'static str, path: &str) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.stop_liveness_check();

		let request = ApiRequest::post(path).without_auto_refresh();

		if let Err(e) = span.instrument(self.client.send(request)).await {
			tracing::warn!(error = %e, stage, "server logout failed; clearing local session anyway");
		}

		self.core.sign_out();
		self.coordinator.reset();
		obs::record_flow_outcome(KIND, FlowOutcome::Success);
	}

	async fn revalidate(&self, kind: FlowKind) -> bool {
		let span = FlowSpan::new(kind, "revalidate");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let confirmed = span.instrument(self.probe_with_refresh()).await;

		obs::record_flow_outcome(
			kind,
			if confirmed { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		confirmed
	}

	async fn probe_with_refresh(&self) -> bool {
		let epoch = self.core.epoch();
		let error = match self.probe_user().await {
			Ok(user) => return self.core.confirm(epoch, user),
			Err(e) => e,
		};

		if matches!(error, Error::Transport(_)) {
			tracing::warn!(error = %error, "session probe could not reach the backend; keeping session");

			return false;
		}
		if error.status() == Some(AUTH_FAILURE_STATUS) {
			match error.classification() {
				c if c.allows_refresh(self.config.refresh_on_invalid_token) => {},
				ErrorClassification::TokenInvalid => {
					self.coordinator.invalidate_at(epoch, InvalidationReason::TokenRejected);

					return false;
				},
				c => {
					tracing::info!(classification = %c, "session rejected");
					self.core.expire(epoch);

					return false;
				},
			}
		} else {
			tracing::debug!(error = %error, "session probe failed; refreshing once");
		}

		if !self.coordinator.refresh().await {
			self.core.expire(epoch);

			return false;
		}

		match self.probe_user().await {
			Ok(user) => self.core.confirm(epoch, user),
			Err(e @ Error::Transport(_)) => {
				tracing::warn!(error = %e, "session probe after refresh could not reach the backend");

				false
			},
			Err(e) => {
				tracing::warn!(error = %e, "session probe failed after refresh");
				self.core.expire(epoch);

				false
			},
		}
	}

	async fn probe_user(&self) -> Result<User> {
		let request = ApiRequest::get(&self.config.endpoints.me).without_auto_refresh();

		self.client.send_data::<User>(request).await
	}
}
impl<T> Debug for SessionController<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionController")
			.field("session", &self.core.snapshot())
			.field("coordinator", &self.coordinator)
			.field("liveness_running", &self.is_liveness_running())
			.finish()
	}
}
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CheckAuthBody {
	success: Option<bool>,
	is_valid: Option<bool>,
	data: Option<CheckAuthData>,
}
impl CheckAuthBody {
	fn is_valid(&self) -> bool {
		self.success != Some(false)
			&& self.data.as_ref().and_then(|data| data.is_valid).or(self.is_valid).unwrap_or(false)
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CheckAuthData {
	is_valid: Option<bool>,
}
