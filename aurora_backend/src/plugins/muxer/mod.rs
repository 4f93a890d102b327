mod selector;
mod state;
mod throttle;
mod ticker;

#[cfg(test)]
mod tests;

pub use selector::{
	select_priority,
	Selection,
};
pub use state::{
	Deadline,
	InputInfo,
	MuxerContext,
	LOWEST_PRIORITY,
	TIMEOUT_INACTIVE_MS,
};

use std::sync::Arc;

use async_std::{
	channel::Sender,
	sync::RwLock,
};
use aurora_plugin_framework::*;
use serde::{
	Deserialize,
	Serialize,
};
use thiserror::Error;

use crate::{
	led_utils::{
		ColorRgb,
		Component,
		LedImage,
	},
	utilities::clock::Clock,
};

use ticker::TickerMessage;

/// Emitted when a priority is registered (`present: true`) or leaves the
/// table by clear or expiry (`present: false`).
pub const EVT_PRIORITY_CHANGED: &str = "muxer.priority_changed";
/// Emitted when a slot crosses between idle and carrying data.
pub const EVT_ACTIVE_STATE_CHANGED: &str = "muxer.active_state_changed";
/// Emitted with the new priority whenever the visible slot changes.
pub const EVT_VISIBLE_PRIORITY_CHANGED: &str = "muxer.visible_priority_changed";
/// Emitted when source auto-selection is switched on or off.
pub const EVT_AUTO_SELECT_CHANGED: &str = "muxer.auto_select_changed";
/// Union notification: fires after any of the above, and as the throttled
/// countdown pulse while a timed color or effect is running.
pub const EVT_PRIORITIES_CHANGED: &str = "muxer.priorities_changed";

/// Payload of [`EVT_PRIORITY_CHANGED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityChanged {
	pub priority: u8,
	pub present: bool,
}

/// Payload of [`EVT_ACTIVE_STATE_CHANGED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStateChanged {
	pub priority: u8,
	pub active: bool,
}

/// An error that could occur while initializing the muxer plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MuxerInitializationError {
	#[error("The LED count must be at least 1.")]
	InvalidLedCount,
}

/// Initialize the priority input muxer, returning its interface.
///
/// Declares the muxer's events, seeds the input table with the background
/// slot sized to `led_count`, and spawns the tick loop and the countdown
/// throttle.
pub async fn initialize_muxer(
	plugin_context: PluginContext,
	led_count: usize,
	clock: Arc<dyn Clock>,
) -> Result<MuxerInterface, MuxerInitializationError> {
	if led_count == 0 {
		return Err(MuxerInitializationError::InvalidLedCount);
	}

	// Declare events

	plugin_context
		.declare_event::<PriorityChanged>(
			EVT_PRIORITY_CHANGED.into(),
			Some("Emitted when an input slot is registered or removed".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<ActiveStateChanged>(
			EVT_ACTIVE_STATE_CHANGED.into(),
			Some("Emitted when an input slot becomes active or idle".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<u8>(
			EVT_VISIBLE_PRIORITY_CHANGED.into(),
			Some("Emitted with the priority that is now forwarded downstream".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<bool>(
			EVT_AUTO_SELECT_CHANGED.into(),
			Some("Emitted when source auto-selection is toggled".into()),
		)
		.await
		.unwrap();

	plugin_context
		.declare_event::<()>(
			EVT_PRIORITIES_CHANGED.into(),
			Some("Union notification for any change to the input table".into()),
		)
		.await
		.unwrap();

	let muxer_context = Arc::new(RwLock::new(MuxerContext::new(led_count)));

	// Start the background tasks
	let time_trigger = throttle::start_time_throttle(plugin_context.clone()).await;
	let ticker = ticker::start_ticker(
		plugin_context.clone(),
		Arc::clone(&muxer_context),
		Arc::clone(&clock),
		time_trigger.clone(),
	)
	.await;

	return Ok(MuxerInterface(
		plugin_context,
		muxer_context,
		clock,
		time_trigger,
		ticker,
	));
}

/// Data handed to a slot by one `set_input_*` call.
enum InputPayload {
	Colors(Vec<ColorRgb>),
	Image(LedImage),
}

/// The muxer plugin's interface, used by producers to feed input slots and by
/// consumers to read the visible slot.
///
/// All methods serialize through one `RwLock`; events raised by a call are on
/// the bus, in order, before the call returns.
#[derive(Clone)]
pub struct MuxerInterface(
	PluginContext,
	Arc<RwLock<MuxerContext>>,
	Arc<dyn Clock>,
	Sender<()>,
	Sender<TickerMessage>,
);

impl MuxerInterface {
	/// Registers an input slot, or refreshes its metadata if the priority is
	/// already taken. A new slot starts idle and takes no part in selection
	/// until data arrives for it.
	pub async fn register_input(
		&self,
		priority: u8,
		component: Component,
		origin: String,
		owner: String,
		smooth_cfg: u32,
	) {
		let mut ctx = self.1.write().await;
		self.register_inner(&mut ctx, priority, component, origin, owner, smooth_cfg)
			.await;
	}

	/// Updates the color frame of a registered slot. Fails (and emits
	/// nothing) if the priority was never registered or already timed out.
	pub async fn set_input_color(
		&self,
		priority: u8,
		led_colors: Vec<ColorRgb>,
		timeout_ms: i64,
	) -> bool {
		let mut ctx = self.1.write().await;
		return self
			.apply_input(&mut ctx, priority, InputPayload::Colors(led_colors), timeout_ms)
			.await;
	}

	/// Updates the image payload of a registered slot. Same contract as
	/// `set_input_color`; the slot keeps both payloads and consumers pick by
	/// component.
	pub async fn set_input_image(&self, priority: u8, image: LedImage, timeout_ms: i64) -> bool {
		let mut ctx = self.1.write().await;
		return self
			.apply_input(&mut ctx, priority, InputPayload::Image(image), timeout_ms)
			.await;
	}

	/// Puts a slot back into the idle state without unregistering it.
	pub async fn set_input_inactive(&self, priority: u8) -> bool {
		return self
			.set_input_image(priority, LedImage::default(), TIMEOUT_INACTIVE_MS)
			.await;
	}

	/// Registers `priority` as a color source if needed and shows a solid
	/// frame sized to the current LED count.
	pub async fn set_color(
		&self,
		priority: u8,
		color: ColorRgb,
		timeout_ms: i64,
		origin: String,
	) -> bool {
		let mut ctx = self.1.write().await;
		self.register_inner(
			&mut ctx,
			priority,
			Component::Color,
			origin,
			String::new(),
			0,
		)
		.await;

		let led_count = ctx.lowest_info.led_colors.len();
		return self
			.apply_input(
				&mut ctx,
				priority,
				InputPayload::Colors(vec![color; led_count]),
				timeout_ms,
			)
			.await;
	}

	/// Removes a slot. The background slot cannot be cleared.
	pub async fn clear(&self, priority: u8) -> bool {
		let mut ctx = self.1.write().await;
		return self.clear_inner(&mut ctx, priority).await;
	}

	/// Removes every slot when `force` is set (the background slot is
	/// re-seeded immediately). Otherwise removes only color and effect slots,
	/// leaving capture and network sources running.
	pub async fn clear_all(&self, force: bool) {
		let mut ctx = self.1.write().await;

		if force {
			ctx.inputs.clear();
			ctx.current_priority = LOWEST_PRIORITY;
			let lowest_info = InputInfo::clone(&ctx.lowest_info);
			ctx.inputs.insert(LOWEST_PRIORITY, lowest_info);
			return;
		}

		for priority in ctx.priorities() {
			// Priority 254 is exempt from soft clears
			let clearable = match ctx.inputs.get(&priority) {
				Some(input) => {
					matches!(input.component, Component::Color | Component::Effect)
						&& priority < LOWEST_PRIORITY - 1
				}
				None => false,
			};
			if clearable {
				self.clear_inner(&mut ctx, priority).await;
			}
		}
	}

	/// Pins a registered priority and leaves automatic selection. Returns
	/// false if the priority is not registered.
	pub async fn set_priority(&self, priority: u8) -> bool {
		let mut ctx = self.1.write().await;
		if !ctx.inputs.contains_key(&priority) {
			return false;
		}

		ctx.manual_priority = Some(priority);
		if !self.set_source_auto_select_inner(&mut ctx, false, true).await {
			// Already in manual mode; re-evaluate against the new pin
			update_current_time(&self.0, &mut ctx, self.2.as_ref(), &self.3).await;
		}
		return true;
	}

	/// Switches source auto-selection on or off. Switching off requires the
	/// last pinned priority to still be registered.
	pub async fn set_source_auto_select(&self, enable: bool) -> bool {
		let mut ctx = self.1.write().await;
		return self.set_source_auto_select_inner(&mut ctx, enable, true).await;
	}

	pub async fn is_source_auto_select_enabled(&self) -> bool {
		return self.1.read().await.auto_select;
	}

	/// Starts or stops the periodic sweep. Mutating calls still re-evaluate
	/// synchronously while the sweep is stopped, but timed slots only expire
	/// once it runs again.
	pub async fn set_enable(&self, enable: bool) {
		self.4.send(TickerMessage::SetEnable(enable)).await.ok();
	}

	/// Runs one sweep immediately: expire timed-out slots, pulse the
	/// countdown throttle, re-evaluate the visible priority.
	pub async fn refresh(&self) {
		let mut ctx = self.1.write().await;
		update_current_time(&self.0, &mut ctx, self.2.as_ref(), &self.3).await;
	}

	/// Snapshot of the slot currently forwarded downstream.
	pub async fn get_visible_input(&self) -> InputInfo {
		let ctx = self.1.read().await;
		return ctx.input_info(ctx.current_priority);
	}

	pub async fn get_current_priority(&self) -> u8 {
		return self.1.read().await.current_priority;
	}

	/// Snapshot of the slot at `priority`, falling back to the background
	/// slot when absent.
	pub async fn get_input_info(&self, priority: u8) -> InputInfo {
		return self.1.read().await.input_info(priority);
	}

	/// Sorted snapshot of the registered priorities.
	pub async fn get_priorities(&self) -> Vec<u8> {
		return self.1.read().await.priorities();
	}

	pub async fn has_priority(&self, priority: u8) -> bool {
		if priority == LOWEST_PRIORITY {
			return true;
		}
		return self.1.read().await.inputs.contains_key(&priority);
	}

	/// Resizes every slot's color buffer to a new LED count.
	pub async fn update_led_count(&self, led_count: usize) {
		let mut ctx = self.1.write().await;
		ctx.resize_led_buffers(led_count);
	}

	async fn register_inner(
		&self,
		ctx: &mut MuxerContext,
		priority: u8,
		component: Component,
		origin: String,
		owner: String,
		smooth_cfg: u32,
	) {
		if let Some(input) = ctx.inputs.get_mut(&priority) {
			// Refresh metadata only; the slot keeps its lifetime and payloads
			input.component = component;
			input.origin = origin;
			input.owner = owner;
			input.smooth_cfg = smooth_cfg;
			return;
		}

		log_debug!(
			self.0,
			"Registered new input '{}/{}' with priority {} as inactive",
			origin,
			component,
			priority
		);
		ctx.inputs.insert(
			priority,
			InputInfo {
				priority,
				component,
				origin,
				owner,
				smooth_cfg,
				deadline: Deadline::Inactive,
				led_colors: Vec::new(),
				image: None,
			},
		);

		self.0
			.emit(
				EVT_PRIORITY_CHANGED.into(),
				FilterCriteria::String(priority.to_string()),
				PriorityChanged {
					priority,
					present: true,
				},
			)
			.await;
		emit_priorities_changed(&self.0).await;
	}

	async fn apply_input(
		&self,
		ctx: &mut MuxerContext,
		priority: u8,
		payload: InputPayload,
		timeout_ms: i64,
	) -> bool {
		let deadline = Deadline::from_timeout_ms(self.2.now_ms(), timeout_ms);

		let transition = match ctx.inputs.get_mut(&priority) {
			Some(input) => {
				let was_active = input.deadline.is_active();
				input.deadline = deadline;
				match payload {
					InputPayload::Colors(led_colors) => input.led_colors = led_colors,
					InputPayload::Image(image) => input.image = Some(image),
				}

				if was_active != deadline.is_active() {
					Some(deadline.is_active())
				} else {
					None
				}
			}
			None => {
				log_error!(
					self.0,
					"Data arrived for priority {} without a registration; either register_input was never called or the slot already timed out",
					priority
				);
				return false;
			}
		};

		if let Some(active) = transition {
			log_debug!(
				self.0,
				"Priority {} is now {}",
				priority,
				if active { "active" } else { "inactive" }
			);
			self.0
				.emit(
					EVT_ACTIVE_STATE_CHANGED.into(),
					FilterCriteria::String(priority.to_string()),
					ActiveStateChanged { priority, active },
				)
				.await;
			emit_priorities_changed(&self.0).await;
		}

		update_current_time(&self.0, ctx, self.2.as_ref(), &self.3).await;
		return true;
	}

	async fn clear_inner(&self, ctx: &mut MuxerContext, priority: u8) -> bool {
		if priority >= LOWEST_PRIORITY {
			return false;
		}
		if ctx.inputs.remove(&priority).is_none() {
			return false;
		}

		log_debug!(self.0, "Removed source priority {}", priority);
		self.0
			.emit(
				EVT_PRIORITY_CHANGED.into(),
				FilterCriteria::String(priority.to_string()),
				PriorityChanged {
					priority,
					present: false,
				},
			)
			.await;
		emit_priorities_changed(&self.0).await;

		update_current_time(&self.0, ctx, self.2.as_ref(), &self.3).await;
		return true;
	}

	async fn set_source_auto_select_inner(
		&self,
		ctx: &mut MuxerContext,
		enable: bool,
		update: bool,
	) -> bool {
		if ctx.auto_select == enable {
			return false;
		}

		if !enable {
			// The pin must point at a registered slot before manual mode can engage
			let pinned_present = match ctx.manual_priority {
				Some(pinned) => ctx.inputs.contains_key(&pinned),
				None => false,
			};
			if !pinned_present {
				match ctx.manual_priority {
					Some(pinned) => {
						log_warn!(
							self.0,
							"Can't disable auto selection, as the last manually selected priority ({}) is no longer available",
							pinned
						);
					}
					None => {
						log_warn!(
							self.0,
							"Can't disable auto selection before a manual priority has been chosen"
						);
					}
				}
				return false;
			}
		}

		ctx.auto_select = enable;
		log_debug!(
			self.0,
			"Source auto select is now {}",
			if enable { "enabled" } else { "disabled" }
		);
		self.0
			.emit(EVT_AUTO_SELECT_CHANGED.into(), FilterCriteria::None, enable)
			.await;
		emit_priorities_changed(&self.0).await;

		if update {
			update_current_time(&self.0, ctx, self.2.as_ref(), &self.3).await;
		}
		return true;
	}
}

/// One sweep over the input table.
///
/// Expires timed-out slots first (each removal is announced before any
/// selection it causes), pulses the countdown throttle for surviving timed
/// colors and effects, then re-evaluates the visible priority. Runs from the
/// tick loop every 250 ms and synchronously from every mutating call.
async fn update_current_time(
	plugin_context: &PluginContext,
	ctx: &mut MuxerContext,
	clock: &dyn Clock,
	time_trigger: &Sender<()>,
) {
	let now = clock.now_ms();

	// The background slot never expires, even if a producer parks timed data
	// on it
	let expired: Vec<u8> = ctx
		.inputs
		.values()
		.filter(|input| input.priority < LOWEST_PRIORITY && input.deadline.is_expired(now))
		.map(|input| input.priority)
		.collect();
	for priority in expired {
		ctx.inputs.remove(&priority);
		log_debug!(plugin_context, "Timeout clear for priority {}", priority);
		plugin_context
			.emit(
				EVT_PRIORITY_CHANGED.into(),
				FilterCriteria::String(priority.to_string()),
				PriorityChanged {
					priority,
					present: false,
				},
			)
			.await;
		emit_priorities_changed(plugin_context).await;
	}

	// Countdown pulse for running timed colors and effects; priority 254 and
	// the background slot never pulse
	for input in ctx.inputs.values() {
		if input.priority < 254
			&& matches!(input.deadline, Deadline::At(_))
			&& matches!(input.component, Component::Color | Component::Effect)
		{
			time_trigger.try_send(()).ok();
		}
	}

	let selection = select_priority(&ctx.inputs, ctx.auto_select, ctx.manual_priority);
	if selection.pin_lost {
		log_debug!(
			plugin_context,
			"The manually selected priority is no longer available, switching to auto selection"
		);
		ctx.auto_select = true;
		plugin_context
			.emit(EVT_AUTO_SELECT_CHANGED.into(), FilterCriteria::None, true)
			.await;
		emit_priorities_changed(plugin_context).await;
	}

	if ctx.current_priority != selection.priority {
		ctx.current_priority = selection.priority;
		log_debug!(plugin_context, "Set visible priority to {}", selection.priority);
		plugin_context
			.emit(
				EVT_VISIBLE_PRIORITY_CHANGED.into(),
				FilterCriteria::None,
				selection.priority,
			)
			.await;
		emit_priorities_changed(plugin_context).await;
	}
}

async fn emit_priorities_changed(plugin_context: &PluginContext) {
	plugin_context
		.emit(EVT_PRIORITIES_CHANGED.into(), FilterCriteria::None, ())
		.await;
}
