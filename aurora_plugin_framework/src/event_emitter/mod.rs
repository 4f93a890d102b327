mod event_receiver;

pub use event_receiver::{
	Event,
	EventReceiver,
};

use std::{
	any::{
		Any,
		TypeId,
	},
	collections::HashMap,
	sync::Arc,
};

use async_std::channel::{
	self,
	Receiver,
	Sender,
};
use serde::{
	de::DeserializeOwned,
	Deserialize,
	Serialize,
};
use uuid::Uuid;

/// Marker for types that may traverse the event bus.
///
/// Every payload is type-checked against the event's declared `TypeId` and must
/// be serializable so status consumers can forward it unmodified. The blanket
/// implementation means deriving `Serialize`/`Deserialize` is all a payload
/// type needs.
pub trait BusMessage: Any + Serialize + DeserializeOwned + Send + Sync {}
impl<T: Any + Serialize + DeserializeOwned + Send + Sync> BusMessage for T {}

/// Type-erased message as it travels through listener channels.
pub enum AnyEvent {
	Msg {
		data: Arc<dyn Any + Send + Sync>,
		criteria: Arc<FilterCriteria>,
	},
	Shutdown,
}

impl Clone for AnyEvent {
	fn clone(&self) -> Self {
		return match self {
			AnyEvent::Msg {
				ref data,
				ref criteria,
			} => AnyEvent::Msg {
				data: Arc::clone(data),
				criteria: Arc::clone(criteria),
			},
			AnyEvent::Shutdown => AnyEvent::Shutdown,
		};
	}
}

/// # Statically-typed event bus
///
/// The `EventEmitter` distributes data by event name. Event channels are
/// statically typed: declaring or listening on an event stakes it to a single
/// `TypeId`, and later listeners of a different type are rejected so that one
/// event name never carries two shapes of data.
///
/// Messages are delivered to every listener whose `FilterCriteria` matches the
/// emission (listeners registered with `FilterCriteria::None` match
/// everything). Delivery is non-blocking; listener channels are unbounded.
pub struct EventEmitter {
	listeners: HashMap<String, ListenerInfo>,
	shutdown_listeners: Vec<Sender<()>>,
}

impl EventEmitter {
	/// Creates a new EventEmitter.
	pub fn new() -> EventEmitter {
		return EventEmitter {
			listeners: HashMap::new(),
			shutdown_listeners: Vec::new(),
		};
	}

	/// Drops channels whose receivers have gone away, along with undeclared
	/// event entries that no longer have any listeners.
	fn gc(&mut self) {
		self.shutdown_listeners
			.retain(|listener| listener.receiver_count() > 0);

		let mut to_remove = Vec::new();
		for (event_name, listener_info) in self.listeners.iter_mut() {
			listener_info
				.listeners
				.retain(|listener| listener.1.receiver_count() > 0);

			if !listener_info.persistent && listener_info.listeners.is_empty() {
				to_remove.push(String::clone(event_name));
			}
		}
		for event_name in to_remove {
			self.listeners.remove(&event_name);
		}
	}

	/// Declares an event on the bus, staking its name to the payload type `T`
	/// and keeping the entry alive even while nobody is listening.
	///
	/// The description is surfaced to humans through diagnostic tooling and is
	/// not interpreted.
	pub fn declare_event<T: BusMessage>(
		&mut self,
		event_name: String,
		description: Option<String>,
	) -> Result<(), DeclareEventError> {
		if let Some(listener_info) = self.listeners.get_mut(&event_name) {
			if let Some(type_id) = listener_info.type_id {
				if type_id != TypeId::of::<T>() {
					return Err(DeclareEventError::AlreadyDeclared);
				}
				return Ok(());
			}
			listener_info.declare::<T>(description);
			return Ok(());
		}

		self.listeners
			.insert(event_name, ListenerInfo::new_declared::<T>(description));
		return Ok(());
	}

	/// Registers a listener of the given type, returning an
	/// `EventReceiver<T>` that yields `Arc<T>` payloads.
	pub fn listen<T: BusMessage>(
		&mut self,
		event_name: String,
		filter: FilterCriteria,
	) -> Result<EventReceiver<T>, RegisterListenerError> {
		self.gc();

		let listener_info = self
			.listeners
			.entry(String::clone(&event_name))
			.or_insert_with(ListenerInfo::new);

		// Undeclared events get staked by their first listener so a later,
		// differently-typed listener is caught here instead of silently
		// receiving nothing.
		if let Some(type_id) = listener_info.type_id {
			if type_id != TypeId::of::<T>() {
				return Err(RegisterListenerError::EventClaimedAsType);
			}
		} else {
			listener_info.type_id = Some(TypeId::of::<T>());
		}

		let (sender, receiver) = channel::unbounded();
		listener_info.listeners.push((filter, sender));
		return Ok(EventReceiver::new(event_name, receiver));
	}

	/// Registers a listener for the bus-wide shutdown broadcast.
	pub fn on_shutdown(&mut self) -> Receiver<()> {
		self.gc();

		let (sender, receiver) = channel::unbounded();
		self.shutdown_listeners.push(sender);
		return receiver;
	}

	/// Sends an event on the bus. The payload is wrapped in an `Arc` and
	/// shared by every listener whose filter matches.
	pub fn emit<T: BusMessage>(
		&mut self,
		event_name: String,
		filter: FilterCriteria,
		message: T,
	) {
		self.gc();

		if let Some(listener_info) = self.listeners.get(&event_name) {
			let criteria = Arc::new(filter);
			let data: Arc<dyn Any + Send + Sync> = Arc::new(message);
			for listener in listener_info.listeners.iter() {
				if listener.0.matches(&criteria) {
					listener
						.1
						.try_send(AnyEvent::Msg {
							data: Arc::clone(&data),
							criteria: Arc::clone(&criteria),
						})
						.ok();
				}
			}
		}
	}

	/// Broadcasts shutdown to every listener on the bus. Receivers yield
	/// `Event::Shutdown` and are expected to wind down their tasks.
	pub async fn send_shutdown(&mut self) {
		self.gc();

		for shutdown_listener in self.shutdown_listeners.iter() {
			shutdown_listener.send(()).await.ok();
		}
		for listener_info in self.listeners.values() {
			for listener in listener_info.listeners.iter() {
				listener.1.send(AnyEvent::Shutdown).await.ok();
			}
		}
	}
}

/// Bookkeeping for a single event name: the staked payload type, an optional
/// human-readable description, and the registered listener channels.
struct ListenerInfo {
	type_id: Option<TypeId>,
	description: Option<String>,
	persistent: bool,
	listeners: Vec<(FilterCriteria, Sender<AnyEvent>)>,
}

impl ListenerInfo {
	fn new() -> Self {
		return ListenerInfo {
			type_id: None,
			description: None,
			persistent: false,
			listeners: Vec::new(),
		};
	}

	fn new_declared<T: BusMessage>(description: Option<String>) -> Self {
		return ListenerInfo {
			type_id: Some(TypeId::of::<T>()),
			description,
			persistent: true,
			listeners: Vec::new(),
		};
	}

	fn declare<T: BusMessage>(&mut self, description: Option<String>) {
		self.type_id = Some(TypeId::of::<T>());
		self.description = description;
		self.persistent = true;
	}
}

/// Criteria used to scope an emission and to narrow a subscription. A
/// listener registered with `None` receives every emission of its event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FilterCriteria {
	None,
	String(String),
	Uuid(Uuid),
}

impl FilterCriteria {
	fn matches(&self, emitted: &FilterCriteria) -> bool {
		return match self {
			FilterCriteria::None => true,
			_ => self == emitted,
		};
	}
}

/// Returned when an event name is already staked to a different payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareEventError {
	AlreadyDeclared,
}

/// Returned when a listener's payload type conflicts with the event's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterListenerError {
	EventClaimedAsType,
}
