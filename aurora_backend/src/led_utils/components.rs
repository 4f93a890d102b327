use std::fmt;

use serde::{
	Deserialize,
	Serialize,
};

/// Identifies the kind of source that owns an input slot.
///
/// `Color` and `Effect` are the two kinds whose timed slots drive the
/// countdown notifications and which a soft clear-all removes; capture and
/// network sources are expected to stream continuously and survive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
	Color,
	Effect,
	Image,
	Grabber,
	BoblightServer,
	FlatBuffer,
	ProtoBuffer,
	V4l,
}

impl Component {
	/// Stable uppercase identifier used in logs and status output.
	pub fn id_str(&self) -> &'static str {
		return match self {
			Component::Color => "COLOR",
			Component::Effect => "EFFECT",
			Component::Image => "IMAGE",
			Component::Grabber => "GRABBER",
			Component::BoblightServer => "BOBLIGHTSERVER",
			Component::FlatBuffer => "FLATBUFSERVER",
			Component::ProtoBuffer => "PROTOSERVER",
			Component::V4l => "V4L",
		};
	}
}

impl fmt::Display for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		return write!(f, "{}", self.id_str());
	}
}
