use std::{
	collections::HashMap,
	future::Future,
	sync::Arc,
};

use async_std::{
	sync::{
		Mutex,
		RwLock,
	},
	task::{
		self,
		JoinHandle,
	},
};
use uuid::Uuid;

/// An error returned from a `KeepAlive` registration call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveRegistrationError {
	ShuttingDown,
}

/// Hooks into the application lifecycle that prevent the process from exiting
/// while background tasks are still winding down.
///
/// Tasks registered here are expected to observe the event bus shutdown
/// broadcast and finish on their own; `shut_down` then waits for each of
/// them before returning.
#[derive(Clone)]
pub struct KeepAlive {
	internal_data: Arc<KeepAliveInternal>,
}

struct KeepAliveInternal {
	/// Set once shutdown has begun; no further registrations are accepted.
	shutting_down: RwLock<bool>,

	/// Running tasks that must complete before the application may exit.
	blockers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl KeepAlive {
	pub fn new() -> KeepAlive {
		return KeepAlive {
			internal_data: Arc::new(KeepAliveInternal {
				shutting_down: RwLock::new(false),
				blockers: Mutex::new(HashMap::new()),
			}),
		};
	}

	/// Spawns a routine that must run to completion before the application
	/// shuts down. Fails with `ShuttingDown` if shutdown has already begun.
	pub async fn register_blocker<F>(
		&self,
		_name: impl Into<String>,
		blocker: F,
	) -> Result<(), KeepAliveRegistrationError>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		if *self.internal_data.shutting_down.read().await {
			return Err(KeepAliveRegistrationError::ShuttingDown);
		}

		let uuid = Uuid::new_v4();

		// The task removes its own entry when it finishes early so the
		// blocker table doesn't accumulate completed handles.
		let internal_data = Arc::clone(&self.internal_data);
		let handle = task::spawn(async move {
			blocker.await;
			if !*internal_data.shutting_down.read().await {
				internal_data.blockers.lock().await.remove(&uuid);
			}
		});
		self.internal_data
			.blockers
			.lock()
			.await
			.insert(uuid, handle);
		return Ok(());
	}

	/// Initiates the shutdown sequence, waiting for every registered blocker
	/// to finish.
	pub async fn shut_down(&mut self) {
		*self.internal_data.shutting_down.write().await = true;

		let blockers: Vec<JoinHandle<()>> = self
			.internal_data
			.blockers
			.lock()
			.await
			.drain()
			.map(|(_id, handle)| handle)
			.collect();
		for handle in blockers {
			// This await does not drive the future, since it was created
			// using task::spawn(...)
			handle.await;
		}
	}
}
