use std::collections::BTreeMap;

use serde::{
	Deserialize,
	Serialize,
};

use crate::led_utils::{
	ColorRgb,
	Component,
	LedImage,
};

/// The always-present background slot. Lower numeric values take precedence,
/// so this priority only ever shows when nothing else is active.
pub const LOWEST_PRIORITY: u8 = 255;

/// Boundary timeout sentinel meaning "register the slot as idle, without
/// supplying data".
pub const TIMEOUT_INACTIVE_MS: i64 = -100;

/// Lifetime of an input slot's data.
///
/// On the call boundary this is carried as a millisecond sentinel (`-100`
/// inactive, `-1` persistent, `>= 0` relative timeout) because that is what
/// existing producers speak; inside the muxer it is this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ms")]
pub enum Deadline {
	/// Registered, but no data has arrived yet. Skipped by selection.
	Inactive,
	/// Active with no expiration.
	Persistent,
	/// Active until the given monotonic millisecond timestamp.
	At(i64),
}

impl Deadline {
	/// Converts a boundary timeout into a deadline. Non-negative timeouts
	/// become absolute deadlines (zero expires on the very next sweep).
	pub fn from_timeout_ms(now_ms: i64, timeout_ms: i64) -> Deadline {
		if timeout_ms >= 0 {
			return Deadline::At(now_ms + timeout_ms);
		}
		if timeout_ms == TIMEOUT_INACTIVE_MS {
			return Deadline::Inactive;
		}
		return Deadline::Persistent;
	}

	/// Sentinel form for status consumers that still speak milliseconds.
	pub fn as_timeout_ms(&self) -> i64 {
		return match self {
			Deadline::Inactive => TIMEOUT_INACTIVE_MS,
			Deadline::Persistent => -1,
			Deadline::At(deadline_ms) => *deadline_ms,
		};
	}

	/// Whether the slot takes part in visible-priority selection.
	pub fn is_active(&self) -> bool {
		return !matches!(self, Deadline::Inactive);
	}

	pub fn is_expired(&self, now_ms: i64) -> bool {
		return matches!(self, Deadline::At(deadline_ms) if *deadline_ms <= now_ms);
	}
}

/// Everything the muxer tracks about one registered input slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
	pub priority: u8,
	pub component: Component,
	/// Human-readable source label, e.g. `"Web UI"`.
	pub origin: String,
	/// Ownership tag for effects (the script name); empty otherwise.
	pub owner: String,
	/// Opaque handle into the smoothing engine; stored and returned, never
	/// interpreted here.
	pub smooth_cfg: u32,
	pub deadline: Deadline,
	/// Last per-LED frame. Zero-length for image-only slots.
	pub led_colors: Vec<ColorRgb>,
	/// Last raster payload, if the slot ever carried one.
	pub image: Option<LedImage>,
}

/// State shared between the public interface, the tick loop, and status
/// consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxerContext {
	/// Registered slots by priority. Ascending iteration order doubles as the
	/// sorted priority snapshot.
	pub inputs: BTreeMap<u8, InputInfo>,

	/// The slot currently forwarded downstream.
	pub current_priority: u8,

	/// The user-pinned priority, if one was ever chosen. Only honored while
	/// `auto_select` is off.
	pub manual_priority: Option<u8>,

	/// When on, selection always follows the smallest active priority.
	pub auto_select: bool,

	/// Construction-time template for the background slot, re-inserted by a
	/// forced clear-all.
	pub lowest_info: InputInfo,
}

impl MuxerContext {
	pub fn new(led_count: usize) -> MuxerContext {
		let lowest_info = InputInfo {
			priority: LOWEST_PRIORITY,
			component: Component::Color,
			origin: String::from("System"),
			owner: String::new(),
			smooth_cfg: 0,
			deadline: Deadline::Persistent,
			led_colors: vec![ColorRgb::BLACK; led_count],
			image: None,
		};

		let mut inputs = BTreeMap::new();
		inputs.insert(LOWEST_PRIORITY, InputInfo::clone(&lowest_info));

		return MuxerContext {
			inputs,
			current_priority: LOWEST_PRIORITY,
			manual_priority: None,
			auto_select: true,
			lowest_info,
		};
	}

	/// Snapshot of the slot at `priority`, falling back to the background
	/// slot when absent.
	pub fn input_info(&self, priority: u8) -> InputInfo {
		return self
			.inputs
			.get(&priority)
			.or_else(|| self.inputs.get(&LOWEST_PRIORITY))
			.cloned()
			.unwrap_or_else(|| InputInfo::clone(&self.lowest_info));
	}

	/// Sorted snapshot of the registered priorities.
	pub fn priorities(&self) -> Vec<u8> {
		return self.inputs.keys().copied().collect();
	}

	/// Resizes every slot's color buffer to the new LED count. Grown slots
	/// repeat the first element; buffers that never held colors grow black.
	pub fn resize_led_buffers(&mut self, led_count: usize) {
		for input in self.inputs.values_mut() {
			let fill = input.led_colors.first().copied().unwrap_or(ColorRgb::BLACK);
			input.led_colors.resize(led_count, fill);
		}
		let fill = self
			.lowest_info
			.led_colors
			.first()
			.copied()
			.unwrap_or(ColorRgb::BLACK);
		self.lowest_info.led_colors.resize(led_count, fill);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deadlines_round_trip_boundary_sentinels() {
		assert_eq!(Deadline::from_timeout_ms(1000, -100), Deadline::Inactive);
		assert_eq!(Deadline::from_timeout_ms(1000, -1), Deadline::Persistent);
		assert_eq!(Deadline::from_timeout_ms(1000, 250), Deadline::At(1250));
		// Zero expires on the very next sweep
		assert_eq!(Deadline::from_timeout_ms(1000, 0), Deadline::At(1000));

		assert_eq!(Deadline::Inactive.as_timeout_ms(), -100);
		assert_eq!(Deadline::Persistent.as_timeout_ms(), -1);
		assert_eq!(Deadline::At(1250).as_timeout_ms(), 1250);
	}

	#[test]
	fn deadline_expiry_is_inclusive() {
		assert!(Deadline::At(1000).is_expired(1000));
		assert!(Deadline::At(1000).is_expired(1001));
		assert!(!Deadline::At(1000).is_expired(999));
		assert!(!Deadline::Persistent.is_expired(i64::MAX));
		assert!(!Deadline::Inactive.is_expired(i64::MAX));
	}

	#[test]
	fn resize_repeats_first_color_and_grows_black() {
		let mut ctx = MuxerContext::new(2);
		let mut colored = ctx.input_info(LOWEST_PRIORITY);
		colored.priority = 10;
		colored.led_colors = vec![ColorRgb::new(9, 9, 9)];
		ctx.inputs.insert(10, colored);

		let mut image_only = ctx.input_info(LOWEST_PRIORITY);
		image_only.priority = 20;
		image_only.led_colors = Vec::new();
		ctx.inputs.insert(20, image_only);

		ctx.resize_led_buffers(3);

		assert_eq!(
			ctx.inputs[&10].led_colors,
			vec![ColorRgb::new(9, 9, 9); 3]
		);
		assert_eq!(ctx.inputs[&20].led_colors, vec![ColorRgb::BLACK; 3]);
		assert_eq!(ctx.inputs[&LOWEST_PRIORITY].led_colors.len(), 3);
		assert_eq!(ctx.lowest_info.led_colors.len(), 3);
	}
}
