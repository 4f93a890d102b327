use std::{
	marker::PhantomData,
	sync::Arc,
};

use async_std::channel::Receiver;

use super::{
	AnyEvent,
	BusMessage,
	FilterCriteria,
};

/// Wrapped receiver that filters a type-erased event stream and yields
/// `Arc<T>` payloads of the subscribed type.
pub struct EventReceiver<T: BusMessage> {
	event_name: String,
	receiver: Receiver<AnyEvent>,
	_phantom: PhantomData<T>,
}

/// A single delivery from the bus: either a payload with the criteria it was
/// emitted under, or the shutdown broadcast.
pub enum Event<T: BusMessage> {
	Msg {
		data: Arc<T>,
		criteria: Arc<FilterCriteria>,
	},
	Shutdown,
}

impl<T: BusMessage> EventReceiver<T> {
	pub(super) fn new(event_name: String, receiver: Receiver<AnyEvent>) -> EventReceiver<T> {
		return EventReceiver::<T> {
			event_name,
			receiver,
			_phantom: PhantomData,
		};
	}

	pub fn get_name(&self) -> &str {
		return &self.event_name;
	}

	/// Receives the next message of the subscribed type.
	///
	/// Messages of another type on the same channel are discarded rather than
	/// surfaced as errors; the emitter's type staking makes them impossible in
	/// practice. A disconnected bus is reported as `Event::Shutdown`.
	pub async fn receive(&self) -> Event<T> {
		loop {
			match self.receiver.recv().await {
				Ok(AnyEvent::Msg { data, criteria }) => {
					if let Ok(data) = data.downcast::<T>() {
						return Event::Msg { data, criteria };
					}
				}
				Ok(AnyEvent::Shutdown) | Err(_) => {
					return Event::Shutdown;
				}
			}
		}
	}
}
