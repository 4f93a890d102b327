use std::sync::Arc;

use aurora_plugin_framework::PluginManager;

use crate::{
	plugins::{
		self,
		muxer::MuxerInterface,
	},
	utilities::{
		clock::MonotonicClock,
		config::AuroraConfig,
	},
};

/// Registers and wires every plugin, returning the muxer interface that
/// producers (effect engine, grabbers, network servers) and consumers (LED
/// output, status) attach to.
pub async fn async_main(
	plugin_manager: &PluginManager,
	config: AuroraConfig,
) -> anyhow::Result<MuxerInterface> {
	// Register core plugin
	plugins::core::initialize(
		plugin_manager
			.register_plugin("core", "Aurora Core")
			.await
			.unwrap(),
	)
	.await;

	let muxer_interface = plugins::muxer::initialize_muxer(
		plugin_manager
			.register_plugin("muxer", "Priority Input Muxer")
			.await
			.unwrap(),
		config.led_count,
		Arc::new(MonotonicClock::new()),
	)
	.await?;

	return Ok(muxer_interface);
}
