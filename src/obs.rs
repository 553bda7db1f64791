//! Observability helpers for session flows.
//!
//! Every flow runs inside a `tracing` span named `token_broker.flow` carrying `flow` and
//! `stage` fields. Enable the `metrics` feature to also increment the
//! `token_broker_flow_total` counter for every attempt/success/failure, labeled by
//! `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Access token refresh.
	Refresh,
	/// Intercepted API request.
	Request,
	/// Credential login or registration.
	Login,
	/// Local plus best-effort server logout.
	Logout,
	/// Startup session restore.
	RestoreSession,
	/// Periodic liveness check.
	LivenessCheck,
	/// Route-guard token validation.
	CheckAuth,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Request => "request",
			FlowKind::Login => "login",
			FlowKind::Logout => "logout",
			FlowKind::RestoreSession => "restore_session",
			FlowKind::LivenessCheck => "liveness_check",
			FlowKind::CheckAuth => "check_auth",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Flow short-circuited by a guard without doing any I/O.
	Skipped,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Skipped => "skipped",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
