use std::time::{
	Duration,
	Instant,
};

use async_std::{
	channel::{
		self,
		Sender,
	},
	task,
};
use aurora_plugin_framework::{
	FilterCriteria,
	PluginContext,
};
use futures::{
	select,
	FutureExt,
};

use super::EVT_PRIORITIES_CHANGED;

/// Quiet period after an emitted pulse; further requests inside it coalesce.
pub(super) const BLOCK_WINDOW: Duration = Duration::from_millis(1000);
/// How long a coalesced request waits before it tries again.
pub(super) const DEFERRED_DELAY: Duration = Duration::from_millis(500);

enum ThrottleState {
	/// No pulse in the last block window; the next request emits immediately.
	Idle,
	/// A pulse was emitted recently; requests are coalesced.
	Blocked,
	/// A coalesced request is waiting out the block window.
	BlockedPending,
}

/// Starts the countdown-pulse throttle.
///
/// The sweep requests a pulse for every running timed color or effect, four
/// times a second per slot. This task thins that stream to at most one
/// `priorities_changed` emission per block window so subscribers see a steady
/// once-a-second countdown instead of a barrage, while a request arriving
/// during the window is still delivered shortly after it ends.
pub(super) async fn start_time_throttle(plugin_context: PluginContext) -> Sender<()> {
	let (sender, receiver) = channel::unbounded();
	let shutdown_receiver = plugin_context.on_shutdown().await;

	let plugin_context_throttle = plugin_context.clone();
	plugin_context
		.spawn_volatile("Muxer countdown throttle", async move {
			let plugin_context = plugin_context_throttle;
			let mut state = ThrottleState::Idle;
			let mut block_until = Instant::now();
			let mut deferred_at = Instant::now();

			loop {
				match state {
					ThrottleState::Idle => {
						select! {
							request = receiver.recv().fuse() => {
								if request.is_err() {
									break;
								}
								emit_pulse(&plugin_context).await;
								block_until = Instant::now() + BLOCK_WINDOW;
								state = ThrottleState::Blocked;
							},
							_ = shutdown_receiver.recv().fuse() => break,
						}
					}
					ThrottleState::Blocked => {
						select! {
							request = receiver.recv().fuse() => {
								if request.is_err() {
									break;
								}
								deferred_at = Instant::now() + DEFERRED_DELAY;
								state = ThrottleState::BlockedPending;
							},
							_ = sleep_until(block_until).fuse() => {
								state = ThrottleState::Idle;
							},
							_ = shutdown_receiver.recv().fuse() => break,
						}
					}
					ThrottleState::BlockedPending => {
						select! {
							request = receiver.recv().fuse() => {
								if request.is_err() {
									break;
								}
								if Instant::now() < block_until {
									// Only the most recent request keeps the deferred slot
									deferred_at = Instant::now() + DEFERRED_DELAY;
								} else {
									emit_pulse(&plugin_context).await;
									block_until = Instant::now() + BLOCK_WINDOW;
									state = ThrottleState::Blocked;
								}
							},
							_ = sleep_until(deferred_at).fuse() => {
								if Instant::now() < block_until {
									// Still inside the window; try again after another delay
									deferred_at = Instant::now() + DEFERRED_DELAY;
								} else {
									emit_pulse(&plugin_context).await;
									block_until = Instant::now() + BLOCK_WINDOW;
									state = ThrottleState::Blocked;
								}
							},
							_ = shutdown_receiver.recv().fuse() => break,
						}
					}
				}
			}
		})
		.await;

	return sender;
}

async fn emit_pulse(plugin_context: &PluginContext) {
	plugin_context
		.emit(EVT_PRIORITIES_CHANGED.into(), FilterCriteria::None, ())
		.await;
}

async fn sleep_until(deadline: Instant) {
	task::sleep(deadline.saturating_duration_since(Instant::now())).await;
}
