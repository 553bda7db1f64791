#![cfg(feature = "reqwest")]

// std
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
// crates.io
use serde_json::json;
use tokio::task::JoinSet;
// self
use token_broker::{
	_preludet::*,
	auth::AccessToken,
	config::SessionConfig,
	http::Method,
	refresh::{InvalidationReason, RefreshCoordinator, RefreshObserver},
};

const REFRESH_PATH: &str = "/auth/refresh-token";

#[derive(Default)]
struct CountingObserver {
	epoch: AtomicU64,
	refreshed: AtomicUsize,
	failed: AtomicUsize,
	invalidated: Mutex<Vec<InvalidationReason>>,
	outcome_epochs: Mutex<Vec<u64>>,
}
impl CountingObserver {
	fn next_session(&self) {
		self.epoch.fetch_add(1, Ordering::SeqCst);
	}
}
impl RefreshObserver for CountingObserver {
	fn session_epoch(&self) -> u64 {
		self.epoch.load(Ordering::SeqCst)
	}

	fn on_refreshed(&self, epoch: u64, _token: Option<&AccessToken>) {
		self.outcome_epochs.lock().push(epoch);
		self.refreshed.fetch_add(1, Ordering::SeqCst);
	}

	fn on_refresh_failed(&self, epoch: u64, _error: &Error) {
		self.outcome_epochs.lock().push(epoch);
		self.failed.fetch_add(1, Ordering::SeqCst);
	}

	fn on_session_invalidated(&self, _epoch: u64, reason: InvalidationReason) {
		self.invalidated.lock().push(reason);
	}
}

fn config() -> SessionConfig {
	SessionConfig::new(Url::parse("https://api.example.com").expect("Fixture URL should parse."))
		.expect("Fixture config should be valid.")
}

fn build(
	config: SessionConfig,
	transport: ScriptedTransport,
) -> (Arc<RefreshCoordinator<ScriptedTransport>>, Arc<ScriptedTransport>, Arc<CountingObserver>) {
	let transport = Arc::new(transport);
	let observer = Arc::new(CountingObserver::default());
	let coordinator = RefreshCoordinator::new(config, transport.clone(), observer.clone());

	(Arc::new(coordinator), transport, observer)
}

fn refreshed_body() -> serde_json::Value {
	json!({ "success": true, "data": { "accessToken": "fresh" } })
}

#[tokio::test]
async fn concurrent_callers_share_a_single_refresh() {
	let transport =
		ScriptedTransport::default().with_delay(std::time::Duration::from_millis(50));

	transport.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, transport, observer) = build(config(), transport);
	let mut callers = JoinSet::new();

	for _ in 0..8 {
		let coordinator = coordinator.clone();

		callers.spawn(async move { coordinator.refresh().await });
	}

	let outcomes = callers.join_all().await;

	assert_eq!(outcomes, vec![true; 8]);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 1);
	assert_eq!(observer.refreshed.load(Ordering::SeqCst), 1);
	assert_eq!(coordinator.metrics.attempts(), 1);
	assert_eq!(coordinator.metrics.joined(), 7);
	assert!(!coordinator.is_refreshing());
}

#[tokio::test]
async fn concurrent_callers_share_a_failure() {
	let transport =
		ScriptedTransport::default().with_delay(std::time::Duration::from_millis(20));

	transport.respond(Method::Post, REFRESH_PATH, 401, json!({ "message": "jwt expired" }));

	let (coordinator, transport, observer) = build(config(), transport);
	let (a, b, c) = tokio::join!(coordinator.refresh(), coordinator.refresh(), coordinator.refresh());

	assert!(!a && !b && !c);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 1);
	assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
	assert_eq!(coordinator.attempts(), 1);
}

#[tokio::test]
async fn back_to_back_refreshes_are_rate_limited() {
	let transport = ScriptedTransport::default();

	transport.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, transport, _) = build(config(), transport);

	assert!(coordinator.refresh().await);
	assert!(!coordinator.refresh().await);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 1);
	assert_eq!(coordinator.metrics.rate_limited(), 1);

	coordinator.reset();

	assert!(coordinator.refresh().await);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 2);
}

#[tokio::test]
async fn attempt_cap_forces_logout_without_network() {
	let transport = ScriptedTransport::default();

	transport.respond(Method::Post, REFRESH_PATH, 401, json!({ "message": "Unauthorized" }));

	let (coordinator, transport, observer) =
		build(config().with_min_refresh_interval(Duration::ZERO), transport);

	for _ in 0..3 {
		assert!(!coordinator.refresh().await);
	}

	assert_eq!(coordinator.attempts(), 3);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 3);
	assert!(observer.invalidated.lock().is_empty());
	assert!(!coordinator.refresh().await);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 3);
	assert_eq!(*observer.invalidated.lock(), vec![InvalidationReason::AttemptsExhausted]);
	assert_eq!(coordinator.metrics.exhausted(), 1);

	coordinator.reset();

	assert_eq!(coordinator.attempts(), 0);
	assert!(!coordinator.refresh().await);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 4);
}

#[tokio::test]
async fn success_resets_the_attempt_counter() {
	let transport = ScriptedTransport::default();

	transport
		.respond(Method::Post, REFRESH_PATH, 500, json!({ "message": "Internal error" }))
		.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, _, observer) =
		build(config().with_min_refresh_interval(Duration::ZERO), transport);

	assert!(!coordinator.refresh().await);
	assert_eq!(coordinator.attempts(), 1);
	assert!(coordinator.refresh().await);
	assert_eq!(coordinator.attempts(), 0);
	assert_eq!(observer.failed.load(Ordering::SeqCst), 1);
	assert_eq!(observer.refreshed.load(Ordering::SeqCst), 1);
	assert_eq!(coordinator.metrics.successes(), 1);
	assert_eq!(coordinator.metrics.failures(), 1);
}

#[tokio::test]
async fn cancelled_refresh_returns_to_idle() {
	let transport = ScriptedTransport::default().with_delay(std::time::Duration::from_secs(5));

	transport.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, _, _) = build(config(), transport);
	let outcome =
		tokio::time::timeout(std::time::Duration::from_millis(20), coordinator.refresh()).await;

	assert!(outcome.is_err());
	assert!(!coordinator.is_refreshing());
	assert_eq!(coordinator.attempts(), 1);
}

#[tokio::test]
async fn invalidate_notifies_without_network() {
	let (coordinator, transport, observer) = build(config(), ScriptedTransport::default());

	coordinator.invalidate(InvalidationReason::TokenRejected);

	assert_eq!(*observer.invalidated.lock(), vec![InvalidationReason::TokenRejected]);
	assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn refresh_outliving_its_session_reports_failure() {
	let transport =
		ScriptedTransport::default().with_delay(std::time::Duration::from_millis(100));

	transport.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, transport, observer) = build(config(), transport);
	let refresh = {
		let coordinator = coordinator.clone();

		tokio::spawn(async move { coordinator.refresh().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(30)).await;
	observer.next_session();

	assert!(!refresh.await.expect("Refresh task should not panic."));
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 1);
	assert_eq!(*observer.outcome_epochs.lock(), vec![0]);
}

#[tokio::test]
async fn queued_callers_from_an_ended_session_skip_the_network() {
	let transport =
		ScriptedTransport::default().with_delay(std::time::Duration::from_millis(100));

	transport.respond(Method::Post, REFRESH_PATH, 200, refreshed_body());

	let (coordinator, transport, observer) =
		build(config().with_min_refresh_interval(Duration::ZERO), transport);
	let first = {
		let coordinator = coordinator.clone();

		tokio::spawn(async move { coordinator.refresh().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(20)).await;

	let queued = {
		let coordinator = coordinator.clone();

		tokio::spawn(async move { coordinator.refresh().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	observer.next_session();

	assert!(!first.await.expect("Refresh task should not panic."));
	assert!(!queued.await.expect("Refresh task should not panic."));
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 1);

	// A caller from the new session does not inherit the stale outcome.
	assert!(coordinator.refresh().await);
	assert_eq!(transport.calls(Method::Post, REFRESH_PATH), 2);
	assert_eq!(*observer.outcome_epochs.lock(), vec![0, 1]);
}
