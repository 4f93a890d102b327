use std::{
	sync::{
		atomic::{
			AtomicI64,
			Ordering,
		},
		Arc,
	},
	time::{
		Duration,
		Instant,
	},
};

use aurora_plugin_framework::*;
use tokio::time::timeout;

use super::*;
use crate::{
	led_utils::{
		ColorRgb,
		Component,
		LedImage,
	},
	utilities::clock::Clock,
};

const RED: ColorRgb = ColorRgb {
	red: 255,
	green: 0,
	blue: 0,
};
const GREEN: ColorRgb = ColorRgb {
	red: 0,
	green: 255,
	blue: 0,
};
const BLUE: ColorRgb = ColorRgb {
	red: 0,
	green: 0,
	blue: 255,
};

const RECEIVE_BUDGET: Duration = Duration::from_secs(2);

/// Hand-driven clock so deadline behavior is deterministic under test.
struct ManualClock(AtomicI64);

impl ManualClock {
	fn new() -> ManualClock {
		return ManualClock(AtomicI64::new(0));
	}

	fn advance(&self, ms: i64) {
		self.0.fetch_add(ms, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> i64 {
		return self.0.load(Ordering::SeqCst);
	}
}

struct TestRig {
	plugin_manager: PluginManager,
	probe: PluginContext,
	muxer: MuxerInterface,
	clock: Arc<ManualClock>,
}

async fn setup(led_count: usize) -> TestRig {
	let plugin_manager = PluginManager::new();
	let clock = Arc::new(ManualClock::new());

	let muxer = initialize_muxer(
		plugin_manager
			.register_plugin("muxer", "Priority Input Muxer")
			.await
			.unwrap(),
		led_count,
		Arc::clone(&clock) as Arc<dyn Clock>,
	)
	.await
	.unwrap();

	let probe = plugin_manager
		.register_plugin("probe", "Test Probe")
		.await
		.unwrap();

	return TestRig {
		plugin_manager,
		probe,
		muxer,
		clock,
	};
}

async fn expect_msg<T: BusMessage>(receiver: &EventReceiver<T>) -> Arc<T> {
	match timeout(RECEIVE_BUDGET, receiver.receive())
		.await
		.expect("Timed out waiting for an event")
	{
		Event::Msg { data, .. } => return data,
		Event::Shutdown => panic!("Expected a message, got shutdown"),
	}
}

#[tokio::test]
async fn rejects_zero_led_count() {
	let plugin_manager = PluginManager::new();
	let result = initialize_muxer(
		plugin_manager
			.register_plugin("muxer", "Priority Input Muxer")
			.await
			.unwrap(),
		0,
		Arc::new(ManualClock::new()),
	)
	.await;
	assert_eq!(result.err(), Some(MuxerInitializationError::InvalidLedCount));
}

#[tokio::test]
async fn basic_override_and_clear() {
	let rig = setup(3).await;
	let visible = rig
		.probe
		.listen::<u8>(EVT_VISIBLE_PRIORITY_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();

	rig.muxer
		.register_input(100, Component::Color, "ui".into(), String::new(), 0)
		.await;
	assert!(rig.muxer.set_input_color(100, vec![RED; 3], -1).await);

	assert_eq!(*expect_msg(&visible).await, 100);
	let info = rig.muxer.get_visible_input().await;
	assert_eq!(info.priority, 100);
	assert_eq!(info.led_colors, vec![RED; 3]);

	assert!(rig.muxer.clear(100).await);
	assert_eq!(*expect_msg(&visible).await, LOWEST_PRIORITY);
	let info = rig.muxer.get_visible_input().await;
	assert_eq!(info.led_colors, vec![ColorRgb::BLACK; 3]);
	assert_eq!(info.origin, "System");

	rig.plugin_manager.shutdown().await;
}

#[tokio::test]
async fn timed_slot_expires_through_the_tick_loop() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(50, Component::Effect, "fx".into(), "rainbow".into(), 0)
		.await;
	assert!(rig.muxer.set_input_color(50, vec![GREEN; 3], 300).await);
	assert_eq!(rig.muxer.get_current_priority().await, 50);

	// Subscribe after activation so the first delivery is the removal
	let removed = rig
		.probe
		.listen::<PriorityChanged>(EVT_PRIORITY_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();
	let visible = rig
		.probe
		.listen::<u8>(EVT_VISIBLE_PRIORITY_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();

	rig.clock.advance(301);

	assert_eq!(
		*expect_msg(&removed).await,
		PriorityChanged {
			priority: 50,
			present: false,
		}
	);
	assert_eq!(*expect_msg(&visible).await, LOWEST_PRIORITY);
	assert!(!rig.muxer.has_priority(50).await);
}

#[tokio::test]
async fn active_priority_zero_wins() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(50, Component::Color, "a".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(50, vec![RED; 3], -1).await;
	rig.muxer
		.register_input(100, Component::Color, "b".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(100, vec![GREEN; 3], -1).await;
	assert_eq!(rig.muxer.get_current_priority().await, 50);

	let image = LedImage::new(2, 2, vec![0; 12]);
	rig.muxer
		.register_input(0, Component::BoblightServer, "net".into(), String::new(), 0)
		.await;
	assert!(rig
		.muxer
		.set_input_image(0, LedImage::clone(&image), -1)
		.await);

	assert_eq!(rig.muxer.get_current_priority().await, 0);
	assert_eq!(rig.muxer.get_visible_input().await.image, Some(image));
	// The higher-numbered sources are still there, just not visible
	assert_eq!(rig.muxer.get_priorities().await, vec![0, 50, 100, LOWEST_PRIORITY]);
}

#[tokio::test]
async fn manual_pin_overrides_and_reverts_on_clear() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(30, Component::Grabber, "capture".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(30, vec![RED; 3], -1).await;
	rig.muxer
		.register_input(60, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(60, vec![BLUE; 3], -1).await;
	assert_eq!(rig.muxer.get_current_priority().await, 30);

	let auto_select = rig
		.probe
		.listen::<bool>(EVT_AUTO_SELECT_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();
	let visible = rig
		.probe
		.listen::<u8>(EVT_VISIBLE_PRIORITY_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();

	assert!(rig.muxer.set_priority(60).await);
	assert_eq!(*expect_msg(&auto_select).await, false);
	assert_eq!(*expect_msg(&visible).await, 60);
	assert!(!rig.muxer.is_source_auto_select_enabled().await);

	assert!(rig.muxer.clear(60).await);
	assert_eq!(*expect_msg(&auto_select).await, true);
	assert_eq!(*expect_msg(&visible).await, 30);
	assert!(rig.muxer.is_source_auto_select_enabled().await);
}

#[tokio::test]
async fn pinning_an_unknown_priority_fails() {
	let rig = setup(3).await;
	assert!(!rig.muxer.set_priority(42).await);
	assert!(rig.muxer.is_source_auto_select_enabled().await);
}

#[tokio::test]
async fn auto_select_toggle_edge_cases() {
	let rig = setup(3).await;

	// Enabling while already enabled is a no-op failure
	assert!(!rig.muxer.set_source_auto_select(true).await);

	// Manual mode can't engage before anything was pinned
	assert!(!rig.muxer.set_source_auto_select(false).await);
	assert!(rig.muxer.is_source_auto_select_enabled().await);

	rig.muxer
		.register_input(30, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(30, vec![RED; 3], -1).await;
	assert!(rig.muxer.set_priority(30).await);
	assert!(!rig.muxer.is_source_auto_select_enabled().await);

	// Disabling twice fails, re-enabling works
	assert!(!rig.muxer.set_source_auto_select(false).await);
	assert!(rig.muxer.set_source_auto_select(true).await);
}

#[tokio::test]
async fn soft_clear_only_touches_colors_and_effects() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(40, Component::Grabber, "capture".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(40, vec![RED; 3], -1).await;
	rig.muxer
		.register_input(80, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(80, vec![GREEN; 3], -1).await;
	rig.muxer
		.register_input(254, Component::Color, "backstop".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(254, vec![BLUE; 3], -1).await;

	rig.muxer.clear_all(false).await;

	// The capture source survives, and so does the slot just above it in
	// numbering terms: 254 is exempt from soft clears
	assert_eq!(
		rig.muxer.get_priorities().await,
		vec![40, 254, LOWEST_PRIORITY]
	);
	assert_eq!(rig.muxer.get_current_priority().await, 40);
}

#[tokio::test]
async fn forced_clear_reseeds_the_background_slot() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(40, Component::Grabber, "capture".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(40, vec![RED; 3], -1).await;

	rig.muxer.clear_all(true).await;

	assert_eq!(rig.muxer.get_priorities().await, vec![LOWEST_PRIORITY]);
	assert_eq!(rig.muxer.get_current_priority().await, LOWEST_PRIORITY);
	let info = rig.muxer.get_visible_input().await;
	assert_eq!(info.led_colors, vec![ColorRgb::BLACK; 3]);
}

#[tokio::test]
async fn idle_slots_are_ignored_until_data_arrives() {
	let rig = setup(3).await;

	let active_state = rig
		.probe
		.listen::<ActiveStateChanged>(EVT_ACTIVE_STATE_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();
	let visible = rig
		.probe
		.listen::<u8>(EVT_VISIBLE_PRIORITY_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();

	rig.muxer
		.register_input(20, Component::Color, "x".into(), String::new(), 0)
		.await;
	assert_eq!(rig.muxer.get_current_priority().await, LOWEST_PRIORITY);

	assert!(rig.muxer.set_input_color(20, vec![BLUE; 3], -1).await);
	assert_eq!(
		*expect_msg(&active_state).await,
		ActiveStateChanged {
			priority: 20,
			active: true,
		}
	);
	assert_eq!(*expect_msg(&visible).await, 20);

	// Going idle alternates the edge and hands visibility back
	assert!(rig.muxer.set_input_inactive(20).await);
	assert_eq!(
		*expect_msg(&active_state).await,
		ActiveStateChanged {
			priority: 20,
			active: false,
		}
	);
	assert_eq!(*expect_msg(&visible).await, LOWEST_PRIORITY);
	assert!(rig.muxer.has_priority(20).await);

	assert!(rig.muxer.set_input_color(20, vec![BLUE; 3], -1).await);
	assert_eq!(
		*expect_msg(&active_state).await,
		ActiveStateChanged {
			priority: 20,
			active: true,
		}
	);
}

#[tokio::test]
async fn data_without_registration_is_rejected() {
	let rig = setup(3).await;

	assert!(!rig.muxer.set_input_color(42, vec![RED; 3], -1).await);
	assert!(!rig
		.muxer
		.set_input_image(42, LedImage::new(1, 1, vec![0; 3]), -1)
		.await);

	assert_eq!(rig.muxer.get_priorities().await, vec![LOWEST_PRIORITY]);
	assert_eq!(rig.muxer.get_current_priority().await, LOWEST_PRIORITY);
}

#[tokio::test]
async fn clearing_the_background_or_unknown_slots_fails() {
	let rig = setup(3).await;
	assert!(!rig.muxer.clear(LOWEST_PRIORITY).await);
	assert!(!rig.muxer.clear(42).await);
	assert_eq!(rig.muxer.get_priorities().await, vec![LOWEST_PRIORITY]);
}

#[tokio::test]
async fn zero_timeout_expires_within_the_same_call() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(10, Component::Color, "ui".into(), String::new(), 0)
		.await;
	assert!(rig.muxer.set_input_color(10, vec![RED; 3], 0).await);

	// The synchronous sweep already collected it
	assert!(!rig.muxer.has_priority(10).await);
	assert_eq!(rig.muxer.get_current_priority().await, LOWEST_PRIORITY);
}

#[tokio::test]
async fn reregistration_refreshes_metadata_but_keeps_data() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(70, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(70, vec![RED; 3], -1).await;

	rig.muxer
		.register_input(70, Component::Effect, "fx".into(), "sunset".into(), 9)
		.await;

	let info = rig.muxer.get_input_info(70).await;
	assert_eq!(info.component, Component::Effect);
	assert_eq!(info.origin, "fx");
	assert_eq!(info.owner, "sunset");
	assert_eq!(info.smooth_cfg, 9);
	assert_eq!(info.deadline, Deadline::Persistent);
	assert_eq!(info.led_colors, vec![RED; 3]);
}

#[tokio::test]
async fn set_color_registers_and_fills_a_solid_frame() {
	let rig = setup(3).await;

	assert!(rig.muxer.set_color(90, RED, -1, "api".into()).await);

	let info = rig.muxer.get_input_info(90).await;
	assert_eq!(info.component, Component::Color);
	assert_eq!(info.origin, "api");
	assert_eq!(info.led_colors, vec![RED; 3]);
	assert_eq!(rig.muxer.get_current_priority().await, 90);
}

#[tokio::test]
async fn led_count_updates_reach_every_slot() {
	let rig = setup(3).await;

	rig.muxer
		.register_input(10, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(10, vec![RED; 3], -1).await;

	rig.muxer.update_led_count(5).await;
	assert_eq!(rig.muxer.get_input_info(10).await.led_colors, vec![RED; 5]);
	assert_eq!(
		rig.muxer.get_input_info(LOWEST_PRIORITY).await.led_colors,
		vec![ColorRgb::BLACK; 5]
	);

	// A forced clear re-seeds at the new size as well
	rig.muxer.clear_all(true).await;
	assert_eq!(
		rig.muxer.get_visible_input().await.led_colors,
		vec![ColorRgb::BLACK; 5]
	);
}

#[tokio::test]
async fn disabled_tick_loop_stops_expiry_until_refreshed() {
	let rig = setup(3).await;

	rig.muxer.set_enable(false).await;
	// Give the loop time to take the disable before moving the clock
	tokio::time::sleep(Duration::from_millis(600)).await;

	rig.muxer
		.register_input(50, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(50, vec![RED; 3], 200).await;
	rig.clock.advance(500);
	tokio::time::sleep(Duration::from_millis(600)).await;

	// Nothing swept it while the loop was off
	assert!(rig.muxer.has_priority(50).await);

	rig.muxer.refresh().await;
	assert!(!rig.muxer.has_priority(50).await);

	rig.muxer.set_enable(true).await;
}

#[tokio::test]
async fn countdown_pulses_are_rate_limited() {
	let rig = setup(3).await;

	// Park the tick loop so the only trigger requests are the refresh calls
	// below, then give it time to take the disable
	rig.muxer.set_enable(false).await;
	tokio::time::sleep(Duration::from_millis(600)).await;

	rig.muxer
		.register_input(50, Component::Color, "ui".into(), String::new(), 0)
		.await;
	rig.muxer.set_input_color(50, vec![RED; 3], 60_000).await;

	// Subscribe once the table is stable so only throttle pulses arrive
	let pulses = rig
		.probe
		.listen::<()>(EVT_PRIORITIES_CHANGED.into(), FilterCriteria::None)
		.await
		.unwrap();

	// Hammer the trigger for well over one block window
	let started = Instant::now();
	while started.elapsed() < Duration::from_millis(1400) {
		rig.muxer.refresh().await;
		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	let mut deliveries = Vec::new();
	while let Ok(event) = timeout(Duration::from_millis(1500), pulses.receive()).await {
		match event {
			Event::Msg { .. } => deliveries.push(Instant::now()),
			Event::Shutdown => break,
		}
	}

	// One immediate pulse, one deferred after the window; never a barrage
	assert!(
		deliveries.len() >= 2 && deliveries.len() <= 3,
		"Expected 2-3 throttled pulses, got {}",
		deliveries.len()
	);
	assert!(
		deliveries[1].duration_since(deliveries[0]) >= Duration::from_millis(900),
		"Pulses arrived closer together than the block window allows"
	);
}
