//! Cancellable periodic session liveness check.

// std
use std::sync::Weak;
// crates.io
use tokio::{
	task::JoinHandle,
	time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{http::ApiTransport, session::SessionController};

/// Handle to a running liveness task. Dropping it stops the task.
#[derive(Debug)]
pub struct LivenessTask {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}
impl LivenessTask {
	/// Shortest period accepted; smaller values are raised to it.
	pub const MIN_PERIOD: std::time::Duration = std::time::Duration::from_millis(10);

	/// Spawns the task on the current Tokio runtime.
	///
	/// The task holds only a weak reference, so it ends on its own once the controller is
	/// dropped. Ticks are skipped rather than bunched when a check overruns the period.
	pub(crate) fn spawn<T>(
		controller: Weak<SessionController<T>>,
		period: std::time::Duration,
	) -> Self
	where
		T: ?Sized + ApiTransport,
	{
		let period = period.max(Self::MIN_PERIOD);
		let cancel = CancellationToken::new();
		let token = cancel.clone();
		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval_at(Instant::now() + period, period);

			interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = interval.tick() => {}
				}

				let Some(controller) = controller.upgrade() else {
					break;
				};

				tokio::select! {
					_ = token.cancelled() => break,
					_ = controller.liveness_tick() => {}
				}
			}

			tracing::debug!("liveness task stopped");
		});

		Self { cancel, handle }
	}

	/// Requests the task to stop at its next suspension point.
	pub fn stop(&self) {
		self.cancel.cancel();
	}

	/// Returns `true` once the task has exited.
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}
}
impl Drop for LivenessTask {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}
