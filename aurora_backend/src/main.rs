use std::path::Path;

use aurora_backend::{
	init,
	utilities::config::AuroraConfig,
};
use aurora_plugin_framework::PluginManager;

fn main() -> anyhow::Result<()> {
	let config = match std::env::args().nth(1) {
		Some(path) => AuroraConfig::load(Path::new(&path))?,
		None => AuroraConfig::default(),
	};

	let plugin_manager = PluginManager::new();
	return async_std::task::block_on(async move {
		let _muxer = init::async_main(&plugin_manager, config).await?;

		// Producers and consumers drive everything from here; the main task
		// just holds the process open.
		futures::future::pending::<()>().await;
		return Ok(());
	});
}
