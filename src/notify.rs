//! Change notifications for persistence collaborators.
//!
//! Observers run synchronously on the thread that completed the mutation, after the manager has
//! released its state lock, so they may call back into the manager. Events are not buffered for
//! late subscribers.

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

type Observer = Arc<dyn Fn(AuthorizationEvent) + Send + Sync>;

/// What happened to the stored credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizationEvent {
	/// A new credential was stored by an exchange or refresh.
	Changed,
	/// The credential was cleared.
	Deauthorized,
}

/// Callback registry shared by cloning; clones deliver to the same observers.
#[derive(Clone, Default)]
pub struct ChangeNotifier(Arc<Registry>);
impl ChangeNotifier {
	/// Creates a notifier with no observers.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `observer` until the returned [`Subscription`] is dropped.
	pub fn subscribe<F>(&self, observer: F) -> Subscription
	where
		F: 'static + Fn(AuthorizationEvent) + Send + Sync,
	{
		let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);

		self.0.observers.write().push((id, Arc::new(observer)));

		Subscription { id, registry: Arc::downgrade(&self.0), detached: false }
	}

	/// Number of registered observers.
	pub fn observer_count(&self) -> usize {
		self.0.observers.read().len()
	}

	pub(crate) fn notify(&self, event: AuthorizationEvent) {
		let observers =
			self.0.observers.read().iter().map(|(_, observer)| observer.clone()).collect::<Vec<_>>();

		for observer in observers {
			observer(event);
		}
	}
}
impl Debug for ChangeNotifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChangeNotifier").field("observers", &self.observer_count()).finish()
	}
}

#[derive(Default)]
struct Registry {
	observers: RwLock<Vec<(u64, Observer)>>,
	next_id: AtomicU64,
}

/// Keeps an observer registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the observer immediately"]
#[derive(Debug)]
pub struct Subscription {
	id: u64,
	registry: Weak<Registry>,
	detached: bool,
}
impl Subscription {
	/// Keeps the observer registered for the notifier's whole lifetime.
	pub fn detach(mut self) {
		self.detached = true;
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if self.detached {
			return;
		}
		if let Some(registry) = self.registry.upgrade() {
			registry.observers.write().retain(|(id, _)| *id != self.id);
		}
	}
}
