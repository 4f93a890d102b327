use std::{
	collections::HashMap,
	future::Future,
	sync::Arc,
};

use async_std::{
	channel::Receiver,
	sync::RwLock,
};

use crate::{
	event_emitter::{
		BusMessage,
		DeclareEventError,
		EventEmitter,
		EventReceiver,
		FilterCriteria,
		RegisterListenerError,
	},
	keep_alive::KeepAlive,
};

/// Descriptive record for a registered plugin.
pub struct Plugin {
	id: String,
	name: String,
}

/// Shared state behind every `PluginContext`: the event bus, the shutdown
/// coordinator, and the plugin table.
pub struct PluginRegistry {
	evt_bus: RwLock<EventEmitter>,
	keep_alive: RwLock<KeepAlive>,
	plugins: RwLock<HashMap<String, Arc<Plugin>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPluginError {
	IDConflict,
}

/// Owner of the plugin registry. Hosts create one, register each plugin
/// through it, and call `shutdown` to wind the application down.
#[derive(Clone)]
pub struct PluginManager(Arc<PluginRegistry>);

impl PluginManager {
	pub fn new() -> PluginManager {
		return PluginManager(Arc::new(PluginRegistry {
			evt_bus: RwLock::new(EventEmitter::new()),
			keep_alive: RwLock::new(KeepAlive::new()),
			plugins: RwLock::new(HashMap::new()),
		}));
	}

	/// Registers a plugin by ID, handing back the context it uses to reach
	/// the bus, spawn tasks, and log.
	pub async fn register_plugin(
		&self,
		id: impl Into<String>,
		name: impl Into<String>,
	) -> Result<PluginContext, RegisterPluginError> {
		return PluginContext::new(&self.0, id.into(), name.into()).await;
	}

	/// Registers a listener for the bus-wide shutdown broadcast.
	pub async fn on_shutdown(&self) -> Receiver<()> {
		return self.0.evt_bus.write().await.on_shutdown();
	}

	/// Broadcasts shutdown on the bus, then waits for every background task
	/// registered through `spawn_volatile` to finish.
	pub async fn shutdown(&self) {
		self.0.evt_bus.write().await.send_shutdown().await;
		self.0.keep_alive.write().await.shut_down().await;
	}
}

/// A plugin's handle to the shared runtime. Cheap to clone; every interface
/// struct in the backend carries one for events and logging.
#[derive(Clone)]
pub struct PluginContext(Arc<PluginRegistry>, Arc<Plugin>);

impl PluginContext {
	pub async fn new(
		registry: &Arc<PluginRegistry>,
		id: String,
		name: String,
	) -> Result<PluginContext, RegisterPluginError> {
		let mut plugins = registry.plugins.write().await;

		if plugins.contains_key(&id) {
			return Err(RegisterPluginError::IDConflict);
		}

		let plugin = Arc::new(Plugin {
			id: String::clone(&id),
			name,
		});
		plugins.insert(String::clone(&id), Arc::clone(&plugin));
		drop(plugins);

		// Advertise the registration for anything tracking plugin lifecycles
		let mut evt_bus = registry.evt_bus.write().await;
		evt_bus.emit(
			String::from("aurora.plugin_registered"),
			FilterCriteria::None,
			id,
		);
		drop(evt_bus);

		return Ok(PluginContext(Arc::clone(registry), plugin));
	}

	pub fn get_id(&self) -> &str {
		return &self.1.id;
	}

	pub fn get_name(&self) -> &str {
		return &self.1.name;
	}

	/// Declares an event on the bus, staking its name to the payload type.
	pub async fn declare_event<T: BusMessage>(
		&self,
		event_name: String,
		description: Option<String>,
	) -> Result<(), DeclareEventError> {
		return self
			.0
			.evt_bus
			.write()
			.await
			.declare_event::<T>(event_name, description);
	}

	/// Sends an event on the bus.
	pub async fn emit<T: BusMessage>(
		&self,
		event_name: String,
		filter: FilterCriteria,
		message: T,
	) {
		self.0.evt_bus.write().await.emit(event_name, filter, message);
	}

	/// Registers an event listener of the given type.
	pub async fn listen<T: BusMessage>(
		&self,
		event_name: String,
		filter: FilterCriteria,
	) -> Result<EventReceiver<T>, RegisterListenerError> {
		return self.0.evt_bus.write().await.listen(event_name, filter);
	}

	/// Registers a listener for the bus-wide shutdown broadcast.
	pub async fn on_shutdown(&self) -> Receiver<()> {
		return self.0.evt_bus.write().await.on_shutdown();
	}

	/// Spawns a background task that holds the application open until it
	/// finishes. The task must observe the shutdown broadcast and exit, or
	/// shutdown will hang on it.
	pub async fn spawn_volatile<F>(&self, name: impl Into<String>, future: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.0
			.keep_alive
			.read()
			.await
			.register_blocker(name, future)
			.await
			.ok();
	}

	pub async fn log(&self, msg: String) {
		let msg = format!("[{}] {}", self.1.id, msg);

		#[cfg(feature = "stdout-logging")]
		println!("{}", &msg);

		self.emit(String::from("log"), FilterCriteria::None, msg).await;
	}

	pub async fn log_debug(&self, msg: String) {
		let msg = format!("[{}] {}", self.1.id, msg);

		#[cfg(feature = "stdout-logging")]
		println!("{}", &msg);

		self.emit(String::from("log_debug"), FilterCriteria::None, msg)
			.await;
	}

	pub async fn log_warn(&self, msg: String) {
		let msg = format!("[{}] {}", self.1.id, msg);

		#[cfg(feature = "stdout-logging")]
		eprintln!("{}", &msg);

		self.emit(String::from("log_warn"), FilterCriteria::None, msg)
			.await;
	}

	pub async fn log_error(&self, msg: String) {
		let msg = format!("[{}] {}", self.1.id, msg);

		#[cfg(feature = "stdout-logging")]
		eprintln!("{}", &msg);

		self.emit(String::from("log_error"), FilterCriteria::None, msg)
			.await;
	}
}
