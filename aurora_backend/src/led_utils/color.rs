use serde::{
	Deserialize,
	Serialize,
};

/// A single RGB triplet as handed to the LED output stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRgb {
	pub red: u8,
	pub green: u8,
	pub blue: u8,
}

impl ColorRgb {
	pub const BLACK: ColorRgb = ColorRgb {
		red: 0,
		green: 0,
		blue: 0,
	};

	pub fn new(red: u8, green: u8, blue: u8) -> ColorRgb {
		return ColorRgb { red, green, blue };
	}
}
