use serde::{
	Deserialize,
	Serialize,
};

/// Opaque raster payload carried by an input slot.
///
/// The muxer never looks inside; it stores the blob and hands it to whichever
/// consumer reads the visible slot. Decoding and scaling belong to the
/// capture and output stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedImage {
	pub width: u32,
	pub height: u32,
	pub data: Vec<u8>,
}

impl LedImage {
	pub fn new(width: u32, height: u32, data: Vec<u8>) -> LedImage {
		return LedImage {
			width,
			height,
			data,
		};
	}

	pub fn is_empty(&self) -> bool {
		return self.data.is_empty();
	}
}
