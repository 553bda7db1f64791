//! Route-guard decisions over a route classification and the authenticated flag.

/// Access category of an application route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteKind {
	/// Only meaningful while signed out (login, register, password reset).
	AuthOnly,
	/// Requires an authenticated session.
	Protected,
	/// Open to everyone.
	Public,
}

/// Pure redirect logic consumed by the UI layer; performs no I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteGuard {
	auth_routes: Vec<String>,
	public_routes: Vec<String>,
	protected_prefixes: Vec<String>,
	login_route: String,
	landing_route: String,
}
impl RouteGuard {
	/// Routes only reachable while signed out.
	pub const DEFAULT_AUTH_ROUTES: &[&str] = &[
		"/login",
		"/register",
		"/forgot-password",
		"/verify-email",
		"/reset-password",
		"/resend-verification",
	];

	/// Replaces the auth-only routes (exact matches).
	pub fn with_auth_routes<I, S>(mut self, routes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.auth_routes = routes.into_iter().map(Into::into).collect();

		self
	}

	/// Routes open to everyone; checked before any other rule.
	pub fn with_public_routes<I, S>(mut self, routes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.public_routes = routes.into_iter().map(Into::into).collect();

		self
	}

	/// Replaces the prefixes that require authentication.
	pub fn with_protected_prefixes<I, S>(mut self, prefixes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.protected_prefixes = prefixes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the logged-out entry point.
	pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
		self.login_route = route.into();

		self
	}

	/// Overrides the landing route for signed-in users.
	pub fn with_landing_route(mut self, route: impl Into<String>) -> Self {
		self.landing_route = route.into();

		self
	}

	/// Logged-out entry point.
	pub fn login_route(&self) -> &str {
		&self.login_route
	}

	/// Default route for signed-in users.
	pub fn landing_route(&self) -> &str {
		&self.landing_route
	}

	/// Classifies `path`, ignoring any query string or fragment.
	pub fn classify(&self, path: &str) -> RouteKind {
		let path = path.split(['?', '#']).next().unwrap_or_default();

		if self.public_routes.iter().any(|route| covers(route, path)) {
			RouteKind::Public
		} else if self.auth_routes.iter().any(|route| route == path) {
			RouteKind::AuthOnly
		} else if self.protected_prefixes.iter().any(|prefix| covers(prefix, path)) {
			RouteKind::Protected
		} else {
			RouteKind::Public
		}
	}

	/// Returns the route the user must be sent to, if any. Never redirects to `path` itself.
	pub fn redirect_for(&self, path: &str, is_authenticated: bool) -> Option<&str> {
		let target = match (self.classify(path), is_authenticated) {
			(RouteKind::AuthOnly, true) => &self.landing_route,
			(RouteKind::Protected, false) => &self.login_route,
			_ => return None,
		};

		(target != path).then_some(target.as_str())
	}
}
impl Default for RouteGuard {
	fn default() -> Self {
		Self {
			auth_routes: Self::DEFAULT_AUTH_ROUTES.iter().map(|route| (*route).to_owned()).collect(),
			public_routes: Vec::new(),
			protected_prefixes: vec!["/".into()],
			login_route: "/login".into(),
			landing_route: "/".into(),
		}
	}
}

fn covers(prefix: &str, path: &str) -> bool {
	let prefix = prefix.trim_end_matches('/');

	prefix.is_empty()
		|| path == prefix
		|| path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_classification() {
		let guard = RouteGuard::default();

		assert_eq!(guard.classify("/login"), RouteKind::AuthOnly);
		assert_eq!(guard.classify("/reset-password?token=abc"), RouteKind::AuthOnly);
		assert_eq!(guard.classify("/"), RouteKind::Protected);
		assert_eq!(guard.classify("/search"), RouteKind::Protected);
		assert_eq!(guard.classify("/jane/posts"), RouteKind::Protected);
	}

	#[test]
	fn redirects_follow_the_decision_table() {
		let guard = RouteGuard::default();

		assert_eq!(guard.redirect_for("/login", true), Some("/"));
		assert_eq!(guard.redirect_for("/login", false), None);
		assert_eq!(guard.redirect_for("/search", false), Some("/login"));
		assert_eq!(guard.redirect_for("/search", true), None);
	}

	#[test]
	fn public_routes_and_custom_prefixes() {
		let guard = RouteGuard::default()
			.with_public_routes(["/about"])
			.with_protected_prefixes(["/settings", "/messages/"])
			.with_landing_route("/feed");

		assert_eq!(guard.classify("/about"), RouteKind::Public);
		assert_eq!(guard.classify("/about/team"), RouteKind::Public);
		assert_eq!(guard.classify("/settings/profile"), RouteKind::Protected);
		assert_eq!(guard.classify("/settingsx"), RouteKind::Public);
		assert_eq!(guard.classify("/messages"), RouteKind::Protected);
		assert_eq!(guard.redirect_for("/about", false), None);
		assert_eq!(guard.redirect_for("/register", true), Some("/feed"));
	}

	#[test]
	fn never_redirects_to_the_current_path() {
		let guard = RouteGuard::default().with_auth_routes(["/"]).with_landing_route("/");

		assert_eq!(guard.redirect_for("/", true), None);

		let guard = RouteGuard::default().with_login_route("/");

		assert_eq!(guard.redirect_for("/", false), None);
	}
}
