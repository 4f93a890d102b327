use std::{
	sync::Arc,
	time::Duration,
};

use async_std::{
	channel::{
		self,
		Sender,
	},
	sync::RwLock,
	task,
};
use aurora_plugin_framework::PluginContext;
use futures::{
	select,
	FutureExt,
};

use super::{
	state::MuxerContext,
	update_current_time,
};
use crate::utilities::clock::Clock;

/// How often the sweep runs while enabled.
pub(super) const TICK_INTERVAL: Duration = Duration::from_millis(250);

pub(super) enum TickerMessage {
	SetEnable(bool),
}

/// Starts the periodic sweep task.
///
/// The task runs one sweep every [`TICK_INTERVAL`] until it is disabled
/// through the returned channel, and exits on the bus shutdown broadcast or
/// once every interface handle has been dropped.
pub(super) async fn start_ticker(
	plugin_context: PluginContext,
	muxer_context: Arc<RwLock<MuxerContext>>,
	clock: Arc<dyn Clock>,
	time_trigger: Sender<()>,
) -> Sender<TickerMessage> {
	let (sender, receiver) = channel::unbounded();
	let shutdown_receiver = plugin_context.on_shutdown().await;

	let plugin_context_ticker = plugin_context.clone();
	plugin_context
		.spawn_volatile("Muxer tick loop", async move {
			let plugin_context = plugin_context_ticker;
			let mut enabled = true;
			loop {
				if enabled {
					select! {
						message = receiver.recv().fuse() => match message {
							Ok(TickerMessage::SetEnable(enable)) => enabled = enable,
							Err(_) => break,
						},
						_ = shutdown_receiver.recv().fuse() => break,
						_ = task::sleep(TICK_INTERVAL).fuse() => {
							let mut ctx = muxer_context.write().await;
							update_current_time(
								&plugin_context,
								&mut ctx,
								clock.as_ref(),
								&time_trigger,
							)
							.await;
						},
					}
				} else {
					select! {
						message = receiver.recv().fuse() => match message {
							Ok(TickerMessage::SetEnable(enable)) => enabled = enable,
							Err(_) => break,
						},
						_ = shutdown_receiver.recv().fuse() => break,
					}
				}
			}
		})
		.await;

	return sender;
}
