//! Single-flight renewal for [`AuthorizationManager`].
//!
//! At most one renewal runs per manager. The first caller that finds the credential stale starts
//! it and parks a shared handle in the state; later callers await the same handle. The renewal
//! commits its own result when it finishes, so a caller that gives up waiting never strands the
//! others. A configured spawner polls the handle too, which lets the renewal finish with no
//! caller left at all. Every credential mutation happens under the state lock; observers run after it is
//! released.

// std
use std::sync::Weak;
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet, TokenResponse, TokenSecret},
	error::LocalError,
	flows::{AuthorizationManager, Flow, ManagerInner, RenewFuture},
	notify::AuthorizationEvent,
	obs::{FlowOutcome, flow_event, record_flow_outcome},
};

type SharedRenewal = Shared<BoxFuture<'static, Result<TokenSecret>>>;

/// Credential plus the renewal currently replacing it.
pub(crate) struct CredentialState {
	pub(crate) credential: Option<Credential>,
	in_flight: Option<InFlight>,
	next_renewal: u64,
}
impl CredentialState {
	pub(crate) fn new(credential: Option<Credential>) -> Self {
		Self { credential, in_flight: None, next_renewal: 0 }
	}

	pub(crate) fn is_refreshing(&self) -> bool {
		self.in_flight.is_some()
	}

	/// Replaces the credential; a renewal still in flight will no longer commit.
	pub(crate) fn store(&mut self, credential: Credential) {
		self.credential = Some(credential);
		self.in_flight = None;
	}

	/// Drops the credential and any renewal; returns whether anything was held.
	pub(crate) fn clear(&mut self) -> bool {
		let had_credential = self.credential.take().is_some();
		let had_renewal = self.in_flight.take().is_some();

		had_credential || had_renewal
	}
}

struct InFlight {
	id: u64,
	outcome: SharedRenewal,
}

enum Step {
	Ready(TokenSecret),
	Wait(SharedRenewal),
}

impl<F> AuthorizationManager<F>
where
	F: Flow,
{
	pub(crate) async fn ensure_valid(
		&self,
		required: Option<&ScopeSet>,
		force: bool,
	) -> Result<TokenSecret> {
		match self.next_step(required, force)? {
			Step::Ready(token) => Ok(token),
			Step::Wait(outcome) => outcome.await,
		}
	}

	fn next_step(&self, required: Option<&ScopeSet>, force: bool) -> Result<Step> {
		let inner = &self.inner;
		let now = inner.clock.now();
		let mut state = inner.state.lock();

		match state.credential.as_ref() {
			Some(credential) => {
				match required {
					Some(required) if F::SCOPED && !credential.is_authorized_for(required) =>
						return Err(LocalError::InsufficientScope {
							required: required.clone(),
							granted: credential.scopes.clone(),
						}
						.into()),
					_ => {},
				}

				if !force && !credential.is_expired_at(now, inner.tolerance) {
					return Ok(Step::Ready(credential.access_token.clone()));
				}
			},
			None if !F::SELF_AUTHORIZING =>
				return Err(LocalError::unauthorized("no credential has been obtained yet").into()),
			None => {},
		}

		if let Some(in_flight) = state.in_flight.as_ref() {
			record_flow_outcome(F::KIND, FlowOutcome::Joined);
			flow_event!(debug, flow = F::KIND.as_str(), id = in_flight.id, "Joining in-flight renewal.");

			return Ok(Step::Wait(in_flight.outcome.clone()));
		}

		let renewal = inner.flow.renew(state.credential.as_ref())?;
		let id = state.next_renewal;

		state.next_renewal += 1;

		let outcome = drive(Arc::downgrade(inner), id, renewal).boxed().shared();

		state.in_flight = Some(InFlight { id, outcome: outcome.clone() });

		drop(state);

		flow_event!(debug, flow = F::KIND.as_str(), id, force, "Starting renewal.");

		if let Some(spawner) = inner.spawner.as_ref() {
			spawner.spawn(outcome.clone().map(|_| ()).boxed());
		}

		Ok(Step::Wait(outcome))
	}
}

async fn drive<F>(inner: Weak<ManagerInner<F>>, id: u64, renewal: RenewFuture) -> Result<TokenSecret>
where
	F: Flow,
{
	let result = renewal.await;

	match inner.upgrade() {
		Some(inner) => inner.commit(id, result),
		// Every manager handle is gone; nobody can observe the credential.
		None => result.map(|response| response.access_token),
	}
}

impl<F> ManagerInner<F>
where
	F: Flow,
{
	fn commit(&self, id: u64, result: Result<TokenResponse>) -> Result<TokenSecret> {
		let received_at = self.clock.now();
		let (outcome, event) = {
			let mut state = self.state.lock();

			if state.in_flight.as_ref().map(|in_flight| in_flight.id) != Some(id) {
				flow_event!(debug, flow = F::KIND.as_str(), id, "Discarding superseded renewal.");

				return match state.credential.as_ref() {
					Some(credential) => Ok(credential.access_token.clone()),
					None => Err(LocalError::unauthorized(
						"the credential was cleared while a renewal was in flight",
					)
					.into()),
				};
			}

			state.in_flight = None;

			let converted = result.and_then(|response| {
				let had_scope = response.scope.is_some();

				Credential::from_response(response, received_at).map(|fresh| (fresh, had_scope))
			});

			match converted {
				Ok((fresh, had_scope)) => {
					let fresh = match state.credential.as_ref() {
						Some(previous) => fresh.inherit(previous, had_scope),
						None => fresh,
					};
					let token = fresh.access_token.clone();

					state.credential = Some(fresh);

					(Ok(token), Some(AuthorizationEvent::Changed))
				},
				Err(err) if err.requires_reauthorization() => {
					let cleared = state.credential.take().is_some();

					(Err(err), cleared.then_some(AuthorizationEvent::Deauthorized))
				},
				Err(err) => (Err(err), None),
			}
		};

		match &outcome {
			Ok(_) => {
				flow_event!(debug, flow = F::KIND.as_str(), id, "Renewal committed.");
			},
			Err(err) => {
				flow_event!(warn, flow = F::KIND.as_str(), id, error = %err, "Renewal failed.");
			},
		}

		if let Some(event) = event {
			self.notifier.notify(event);
		}

		outcome
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use futures::channel::oneshot;
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		auth::Scope,
		backend::{BackendDescriptor, DirectDescriptor},
		clock::{Clock, ManualClock},
		error::{AuthenticationError, Error, TransportError},
		flows::{AuthorizationState, ManagerConfig},
		spawn::{BackgroundTask, Spawner},
	};

	/// Flow whose renewals wait on test-controlled channels.
	struct GatedFlow {
		calls: AtomicUsize,
		pending: Mutex<Vec<oneshot::Sender<Result<TokenResponse>>>>,
	}
	impl GatedFlow {
		fn new() -> Self {
			Self { calls: AtomicUsize::new(0), pending: Mutex::new(Vec::new()) }
		}

		fn release(&self, result: Result<TokenResponse>) {
			let sender = self.pending.lock().remove(0);

			let _ = sender.send(result);
		}
	}
	impl Flow for GatedFlow {
		const KIND: crate::obs::FlowKind = crate::obs::FlowKind::AuthorizationCode;
		const SCOPED: bool = true;
		const SELF_AUTHORIZING: bool = false;

		fn descriptor(&self) -> BackendDescriptor {
			DirectDescriptor::builder("client")
				.build()
				.expect("Fixture descriptor should validate.")
				.into()
		}

		fn renew(&self, current: Option<&Credential>) -> Result<RenewFuture> {
			crate::flows::refresh_token_of(current)?;
			self.calls.fetch_add(1, Ordering::SeqCst);

			let (sender, receiver) = oneshot::channel();

			self.pending.lock().push(sender);

			Ok(Box::pin(async move {
				receiver.await.unwrap_or_else(|_| Err(LocalError::Other("gate dropped".into()).into()))
			}))
		}
	}

	fn response(token: &str) -> TokenResponse {
		TokenResponse {
			access_token: TokenSecret::new(token),
			token_type: Some("Bearer".into()),
			scope: None,
			expires_in: Some(3600),
			refresh_token: None,
		}
	}

	/// Spawner that parks tasks until the test runs them.
	#[derive(Clone, Default)]
	struct ParkingSpawner(Arc<Mutex<Vec<BackgroundTask>>>);
	impl ParkingSpawner {
		fn take(&self) -> Vec<BackgroundTask> {
			std::mem::take(&mut *self.0.lock())
		}
	}
	impl Spawner for ParkingSpawner {
		fn spawn(&self, task: BackgroundTask) {
			self.0.lock().push(task);
		}
	}

	fn stale_manager(clock: &ManualClock) -> AuthorizationManager<GatedFlow> {
		stale_manager_with(ManagerConfig::default().with_clock(clock.clone()), clock)
	}

	fn stale_manager_with(
		config: ManagerConfig,
		clock: &ManualClock,
	) -> AuthorizationManager<GatedFlow> {
		let credential = Credential::new("stale")
			.with_refresh_token("refresh")
			.with_expiration_date(clock.now() - Duration::seconds(1))
			.with_scopes(ScopeSet::from([Scope::UserReadPrivate]));
		let manager = AuthorizationManager::with_config(GatedFlow::new(), config);

		manager.inner.state.lock().store(credential);

		manager
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_renewal() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);
		let required = ScopeSet::from([Scope::UserReadPrivate]);
		let first = manager.ensure_valid(Some(&required), false);
		let second = manager.ensure_valid(Some(&required), false);
		let third = manager.ensure_valid(Some(&required), false);
		let (first, second, third, ()) = futures::join!(first, second, third, async {
			tokio::task::yield_now().await;
			manager.flow().release(Ok(response("fresh")));
		});

		for token in [first, second, third] {
			assert_eq!(token.expect("Every caller should receive the token.").expose(), "fresh");
		}

		assert_eq!(manager.flow().calls.load(Ordering::SeqCst), 1);

		let credential = manager.credential().expect("Credential should be stored.");

		assert_eq!(credential.refresh_token, Some(TokenSecret::new("refresh")));
		assert_eq!(credential.scopes, required);
		assert_eq!(manager.state(), AuthorizationState::Authorized);
	}

	#[tokio::test]
	async fn abandoned_waiter_does_not_strand_the_renewal() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);

		{
			let abandoned = manager.ensure_valid(None, false);

			futures::pin_mut!(abandoned);

			assert!(futures::poll!(abandoned.as_mut()).is_pending());
		}

		assert_eq!(manager.state(), AuthorizationState::Refreshing);

		let (token, ()) = futures::join!(manager.ensure_valid(None, false), async {
			manager.flow().release(Ok(response("fresh")));
		});

		assert_eq!(token.expect("The joined renewal should complete.").expose(), "fresh");
		assert_eq!(manager.flow().calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn terminal_failure_clears_the_credential() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();
		let _subscription = manager.subscribe(move |event| sink.lock().push(event));
		let (result, ()) = futures::join!(manager.ensure_valid(None, false), async {
			manager.flow().release(Err(AuthenticationError {
				error: "invalid_grant".into(),
				description: None,
				status: Some(400),
			}
			.into()));
		});

		assert!(matches!(result, Err(Error::Authentication(_))));
		assert_eq!(manager.state(), AuthorizationState::Unauthorized);
		assert_eq!(*events.lock(), vec![AuthorizationEvent::Deauthorized]);

		let again = manager.ensure_valid(None, false).await;

		assert!(matches!(again, Err(Error::Local(LocalError::Unauthorized { .. }))));
		assert_eq!(manager.flow().calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn transient_failure_keeps_the_credential() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);
		let (result, ()) = futures::join!(manager.ensure_valid(None, false), async {
			manager.flow().release(Err(TransportError::network(std::io::Error::other("reset")).into()));
		});

		assert!(result.expect_err("Transport failures propagate.").is_retryable());
		assert_eq!(manager.state(), AuthorizationState::Expired);
		assert!(manager.credential().is_some());
	}

	#[tokio::test]
	async fn deauthorize_supersedes_an_in_flight_renewal() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);
		let (result, ()) = futures::join!(manager.ensure_valid(None, false), async {
			tokio::task::yield_now().await;

			assert!(manager.deauthorize());

			manager.flow().release(Ok(response("late")));
		});

		assert!(matches!(result, Err(Error::Local(LocalError::Unauthorized { .. }))));
		assert!(manager.credential().is_none());
		assert!(!manager.deauthorize());
	}

	#[tokio::test]
	async fn insufficient_scope_never_renews() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = stale_manager(&clock);
		let result = manager.ensure_valid(Some(&ScopeSet::from([Scope::Streaming])), false).await;

		assert!(matches!(result, Err(Error::Local(LocalError::InsufficientScope { .. }))));
		assert_eq!(manager.flow().calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn spawned_renewal_commits_without_any_caller() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let spawner = ParkingSpawner::default();
		let manager = stale_manager_with(
			ManagerConfig::default().with_clock(clock.clone()).with_spawner(spawner.clone()),
			&clock,
		);
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();
		let _subscription = manager.subscribe(move |event| sink.lock().push(event));

		{
			let abandoned = manager.ensure_valid(None, false);

			futures::pin_mut!(abandoned);

			assert!(futures::poll!(abandoned.as_mut()).is_pending());
		}

		let mut tasks = spawner.take();

		assert_eq!(tasks.len(), 1);

		manager.flow().release(Ok(response("detached")));
		tasks.remove(0).await;

		assert_eq!(manager.state(), AuthorizationState::Authorized);
		assert_eq!(*events.lock(), vec![AuthorizationEvent::Changed]);
		assert_eq!(
			manager.access_token().expect("Token should be stored.").expose(),
			"detached"
		);

		assert!(manager.ensure_valid(None, true).now_or_never().is_none());
		assert_eq!(spawner.take().len(), 1);
	}
}
