use std::collections::BTreeMap;

use super::state::{
	InputInfo,
	LOWEST_PRIORITY,
};

/// Outcome of one selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
	/// The priority that should be visible.
	pub priority: u8,

	/// Set when manual mode was requested but the pinned priority is no
	/// longer registered at all. The caller is expected to fall back to
	/// automatic selection and announce the mode change.
	pub pin_lost: bool,
}

/// Computes the visible priority for the given table and mode. Pure; all
/// state transitions and event emission stay with the caller.
///
/// Priority 0 wins outright while it carries data, even over a manual pin. A
/// pin whose slot is still registered but idle falls back to automatic
/// selection for this pass without surrendering the pin.
pub fn select_priority(
	inputs: &BTreeMap<u8, InputInfo>,
	auto_select: bool,
	manual_priority: Option<u8>,
) -> Selection {
	if let Some(input) = inputs.get(&0) {
		if input.deadline.is_active() {
			return Selection {
				priority: 0,
				pin_lost: false,
			};
		}
	}

	let auto_choice = inputs
		.values()
		.filter(|input| input.deadline.is_active())
		.map(|input| input.priority)
		.min()
		.unwrap_or(LOWEST_PRIORITY);

	if auto_select {
		return Selection {
			priority: auto_choice,
			pin_lost: false,
		};
	}

	return match manual_priority {
		Some(pinned) => match inputs.get(&pinned) {
			Some(input) if input.deadline.is_active() => Selection {
				priority: pinned,
				pin_lost: false,
			},
			Some(_) => Selection {
				priority: auto_choice,
				pin_lost: false,
			},
			None => Selection {
				priority: auto_choice,
				pin_lost: true,
			},
		},
		None => Selection {
			priority: auto_choice,
			pin_lost: true,
		},
	};
}
