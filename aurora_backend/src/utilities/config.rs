use std::{
	fs,
	path::Path,
};

use anyhow::{
	anyhow,
	Context,
};
use serde::{
	Deserialize,
	Serialize,
};

/// Runtime configuration for the backend, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuroraConfig {
	/// Number of LEDs on the attached strip. Every input slot's color buffer
	/// is kept at this length.
	pub led_count: usize,
}

impl Default for AuroraConfig {
	fn default() -> Self {
		return AuroraConfig { led_count: 1 };
	}
}

impl AuroraConfig {
	pub fn load(path: &Path) -> anyhow::Result<AuroraConfig> {
		let raw = fs::read_to_string(path)
			.with_context(|| format!("Could not read configuration file {}", path.display()))?;
		let config: AuroraConfig = serde_json::from_str(&raw)
			.with_context(|| format!("Could not parse configuration file {}", path.display()))?;

		if config.led_count == 0 {
			return Err(anyhow!("led_count must be at least 1"));
		}
		return Ok(config);
	}
}
