//! Session state, its controller, the liveness task, and route-guard decisions.
//!
//! The controller is the single writer of [`Session`]. The refresh coordinator and the
//! interceptor only report outcomes; the controller's core turns them into state changes
//! and, when the session ends involuntarily, exactly one navigation to the login route.

mod controller;
mod guard;
mod liveness;

pub use controller::*;
pub use guard::*;
pub use liveness::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, User},
	client::TokenSource,
	refresh::{InvalidationReason, RefreshObserver},
};

/// Navigation sink implemented by the UI layer.
pub trait Navigator: Send + Sync {
	/// Moves the user to `target`.
	fn redirect(&self, target: &str);
}

/// Point-in-time view of the authenticated identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
	access_token: Option<AccessToken>,
	user: Option<User>,
	is_authenticated: bool,
}
impl Session {
	/// Bearer token, absent for cookie-only deployments or signed-out sessions.
	pub fn access_token(&self) -> Option<&AccessToken> {
		self.access_token.as_ref()
	}

	/// Signed-in account.
	pub fn user(&self) -> Option<&User> {
		self.user.as_ref()
	}

	/// Whether the backend has confirmed this session.
	pub fn is_authenticated(&self) -> bool {
		self.is_authenticated
	}
}

#[derive(Debug, Default)]
struct CoreState {
	session: Session,
	epoch: u64,
	signed_out: bool,
}

/// Single writer of [`Session`].
///
/// Every sign-in and every sign-out starts a new epoch. Refresh and probe outcomes carry
/// the epoch they started under and are dropped once it has passed, so a call that was
/// still in flight at logout can neither revive nor end a later session.
pub(crate) struct SessionCore {
	state: RwLock<CoreState>,
	navigator: Arc<dyn Navigator>,
	login_route: String,
}
impl SessionCore {
	pub(crate) fn new(navigator: Arc<dyn Navigator>, login_route: impl Into<String>) -> Self {
		Self { state: Default::default(), navigator, login_route: login_route.into() }
	}

	pub(crate) fn snapshot(&self) -> Session {
		self.state.read().session.clone()
	}

	pub(crate) fn is_authenticated(&self) -> bool {
		self.state.read().session.is_authenticated
	}

	pub(crate) fn epoch(&self) -> u64 {
		self.state.read().epoch
	}

	pub(crate) fn authenticate(&self, user: User, token: Option<AccessToken>) {
		let mut state = self.state.write();

		state.session = Session { access_token: token, user: Some(user), is_authenticated: true };
		state.epoch = state.epoch.wrapping_add(1);
		state.signed_out = false;
	}

	/// Confirms the session with a freshly fetched user, keeping the current token.
	///
	/// Returns `false` when `epoch` has already passed.
	pub(crate) fn confirm(&self, epoch: u64, user: User) -> bool {
		let mut state = self.state.write();

		if state.epoch != epoch {
			tracing::debug!("dropping user confirmation from an ended session");

			return false;
		}

		state.session.user = Some(user);
		state.session.is_authenticated = true;
		state.signed_out = false;

		true
	}

	/// Clears the session and navigates to the login route unconditionally.
	pub(crate) fn sign_out(&self) {
		{
			let mut state = self.state.write();

			state.session = Session::default();
			state.epoch = state.epoch.wrapping_add(1);
			state.signed_out = true;
		}

		self.navigator.redirect(&self.login_route);
	}

	/// Ends the session started at `epoch`; navigates only the first time since the last
	/// sign-in.
	pub(crate) fn expire(&self, epoch: u64) {
		let navigate = {
			let mut state = self.state.write();

			if state.epoch != epoch {
				tracing::debug!("ignoring expiry of an ended session");

				return;
			}

			state.session = Session::default();
			state.epoch = state.epoch.wrapping_add(1);

			!std::mem::replace(&mut state.signed_out, true)
		};

		if navigate {
			tracing::info!(route = %self.login_route, "session ended; redirecting");
			self.navigator.redirect(&self.login_route);
		}
	}
}
impl TokenSource for SessionCore {
	fn access_token(&self) -> Option<AccessToken> {
		self.state.read().session.access_token.clone()
	}
}
impl RefreshObserver for SessionCore {
	fn session_epoch(&self) -> u64 {
		self.epoch()
	}

	fn on_refreshed(&self, epoch: u64, token: Option<&AccessToken>) {
		let mut state = self.state.write();

		if state.epoch != epoch {
			tracing::debug!("dropping refreshed token from an ended session");

			return;
		}
		if let Some(token) = token {
			state.session.access_token = Some(token.clone());
		}
	}

	fn on_refresh_failed(&self, epoch: u64, _error: &Error) {
		self.expire(epoch);
	}

	fn on_session_invalidated(&self, epoch: u64, _reason: InvalidationReason) {
		self.expire(epoch);
	}
}
