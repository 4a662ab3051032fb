//! Background execution for renewals.
//!
//! A renewal started by [`AuthorizationManager`](crate::flows::AuthorizationManager) is handed to
//! a [`Spawner`] so it reaches the backend, commits, and notifies even when every caller stops
//! waiting. Without a spawner the renewal only advances while some caller polls it.

// crates.io
use futures::future::BoxFuture;
// self
use crate::_prelude::*;

/// Detached task accepted by a [`Spawner`].
pub type BackgroundTask = BoxFuture<'static, ()>;

/// Runs renewals detached from the callers that started them.
pub trait Spawner
where
	Self: 'static + Send + Sync,
{
	/// Schedules `task`; it must be polled to completion.
	fn spawn(&self, task: BackgroundTask);
}

/// Spawns onto the ambient Tokio runtime.
///
/// Outside a runtime the task is dropped and callers drive the renewal themselves.
#[cfg(feature = "tokio")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSpawner;
#[cfg(feature = "tokio")]
impl Spawner for TokioSpawner {
	fn spawn(&self, task: BackgroundTask) {
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(task);
			},
			Err(_) => {
				crate::obs::flow_event!(debug, "No Tokio runtime; renewal stays caller-driven.");
			},
		}
	}
}

/// Spawner chosen when none is configured.
pub(crate) fn default_spawner() -> Option<Arc<dyn Spawner>> {
	#[cfg(feature = "tokio")]
	{
		Some(Arc::new(TokioSpawner))
	}
	#[cfg(not(feature = "tokio"))]
	{
		None
	}
}
