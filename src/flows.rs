//! Flow managers: one credential, one backend, one authorization flow each.
//!
//! [`AuthorizationManager`] is generic over a [`Flow`]. The flow decides how a credential is
//! renewed (refresh token or a new client credentials grant); the manager owns the credential,
//! serializes every mutation, coalesces concurrent renewals, and notifies observers.

pub mod authorization_code;
pub mod client_credentials;
pub mod pkce;

mod coordinator;
mod redirect;

pub use authorization_code::*;
pub use client_credentials::*;
pub use pkce::*;

// crates.io
use futures::future::BoxFuture;
// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet, TokenResponse, TokenSecret},
	backend::BackendDescriptor,
	clock::{Clock, SystemClock},
	error::{ConfigError, DecodingError, LocalError},
	flows::coordinator::CredentialState,
	notify::{AuthorizationEvent, ChangeNotifier, Subscription},
	obs::{FlowKind, flow_event},
	spawn::{self, Spawner},
};

/// Refresh tolerance applied when none is configured.
pub const DEFAULT_REFRESH_TOLERANCE: Duration = Duration::seconds(120);

/// Future performing one renewal round trip.
pub type RenewFuture = BoxFuture<'static, Result<TokenResponse>>;

/// Grant-specific behaviour plugged into an [`AuthorizationManager`].
pub trait Flow
where
	Self: 'static + Send + Sync,
{
	/// Label used for spans, metrics, and errors.
	const KIND: FlowKind;
	/// Whether required scopes are checked against the granted scopes.
	const SCOPED: bool;
	/// Whether the flow can obtain a credential without a prior user authorization.
	const SELF_AUTHORIZING: bool;

	/// Backend configuration to persist with the credential.
	fn descriptor(&self) -> BackendDescriptor;

	/// Starts a renewal of `current`.
	///
	/// Failures known before any network call (e.g. no refresh token) are returned directly.
	fn renew(&self, current: Option<&Credential>) -> Result<RenewFuture>;
}

/// Observable summary of a manager's credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizationState {
	/// No credential is held.
	Unauthorized,
	/// A credential is held and outside the refresh tolerance.
	Authorized,
	/// A credential is held but expired or inside the refresh tolerance.
	Expired,
	/// A renewal is in flight.
	Refreshing,
}

/// What a persistence collaborator stores: the backend configuration plus the credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
	/// Strategy configuration the credential was obtained with.
	pub backend: BackendDescriptor,
	/// Current credential, if authorized.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credential: Option<Credential>,
}

/// Per-manager settings.
#[derive(Clone)]
pub struct ManagerConfig {
	tolerance: Duration,
	clock: Arc<dyn Clock>,
	notifier: ChangeNotifier,
	spawner: Option<Arc<dyn Spawner>>,
}
impl ManagerConfig {
	/// Treats credentials as expired this long before their expiry. Negative values clamp to zero.
	pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
		self.tolerance = tolerance.max(Duration::ZERO);

		self
	}

	/// Replaces the wall clock, e.g. with [`crate::clock::ManualClock`].
	pub fn with_clock(mut self, clock: impl Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Shares an existing notifier instead of creating a new one.
	pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
		self.notifier = notifier;

		self
	}

	/// Runs started renewals on `spawner` so they finish even if every caller stops waiting.
	///
	/// Defaults to [`crate::spawn::TokioSpawner`] with the `tokio` feature.
	pub fn with_spawner(mut self, spawner: impl Spawner) -> Self {
		self.spawner = Some(Arc::new(spawner));

		self
	}

	/// Leaves renewals to be driven by the callers awaiting them.
	pub fn without_spawner(mut self) -> Self {
		self.spawner = None;

		self
	}

	/// Configured refresh tolerance.
	pub fn tolerance(&self) -> Duration {
		self.tolerance
	}
}
impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			tolerance: DEFAULT_REFRESH_TOLERANCE,
			clock: Arc::new(SystemClock),
			notifier: ChangeNotifier::new(),
			spawner: spawn::default_spawner(),
		}
	}
}
impl Debug for ManagerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ManagerConfig")
			.field("tolerance", &self.tolerance)
			.field("notifier", &self.notifier)
			.field("spawner", &self.spawner.is_some())
			.finish_non_exhaustive()
	}
}

/// Owns a credential and keeps it usable for one flow.
///
/// Clones share the same credential, notifier, and in-flight renewal.
pub struct AuthorizationManager<F>
where
	F: Flow,
{
	inner: Arc<ManagerInner<F>>,
}
impl<F> AuthorizationManager<F>
where
	F: Flow,
{
	/// Creates an unauthorized manager with default settings.
	pub fn new(flow: F) -> Self {
		Self::with_config(flow, ManagerConfig::default())
	}

	/// Creates an unauthorized manager.
	pub fn with_config(flow: F, config: ManagerConfig) -> Self {
		Self::from_parts(flow, None, config)
	}

	/// Rebuilds a manager from persisted state without notifying observers.
	///
	/// `flow` must have been built from `persisted.backend`: the descriptor is re-validated and
	/// compared with [`Flow::descriptor`], so a later [`snapshot`](Self::snapshot) reproduces it.
	pub fn restore(flow: F, persisted: PersistedState, config: ManagerConfig) -> Result<Self> {
		persisted.backend.validate().map_err(ConfigError::from)?;

		let configured = flow.descriptor();

		if configured != persisted.backend {
			return Err(ConfigError::DescriptorMismatch {
				persisted_client_id: persisted.backend.client_id().to_owned(),
				configured_client_id: configured.client_id().to_owned(),
			}
			.into());
		}

		Ok(Self::from_parts(flow, persisted.credential, config))
	}

	fn from_parts(flow: F, credential: Option<Credential>, config: ManagerConfig) -> Self {
		let ManagerConfig { tolerance, clock, notifier, spawner } = config;

		Self {
			inner: Arc::new(ManagerInner {
				flow,
				state: Mutex::new(CredentialState::new(credential)),
				notifier,
				clock,
				tolerance,
				spawner,
			}),
		}
	}

	/// Grant-specific configuration.
	pub fn flow(&self) -> &F {
		&self.inner.flow
	}

	/// Backend configuration.
	pub fn descriptor(&self) -> BackendDescriptor {
		self.inner.flow.descriptor()
	}

	/// Configured refresh tolerance.
	pub fn tolerance(&self) -> Duration {
		self.inner.tolerance
	}

	/// Notifier fired after every credential change.
	pub fn notifier(&self) -> &ChangeNotifier {
		&self.inner.notifier
	}

	/// Shorthand for `self.notifier().subscribe(observer)`.
	pub fn subscribe<O>(&self, observer: O) -> Subscription
	where
		O: 'static + Fn(AuthorizationEvent) + Send + Sync,
	{
		self.inner.notifier.subscribe(observer)
	}

	/// Copy of the current credential.
	pub fn credential(&self) -> Option<Credential> {
		self.inner.state.lock().credential.clone()
	}

	/// Access token of the current credential, whether or not it is expired.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.inner.state.lock().credential.as_ref().map(|credential| credential.access_token.clone())
	}

	/// Granted scopes of the current credential.
	pub fn scopes(&self) -> Option<ScopeSet> {
		self.inner.state.lock().credential.as_ref().map(|credential| credential.scopes.clone())
	}

	/// Expiry of the current credential.
	pub fn expiration_date(&self) -> Option<OffsetDateTime> {
		self.inner.state.lock().credential.as_ref().and_then(|credential| credential.expiration_date)
	}

	/// `true` when no credential is held or it is within the refresh tolerance of expiry.
	pub fn access_token_is_expired(&self) -> bool {
		let now = self.inner.clock.now();

		self.inner
			.state
			.lock()
			.credential
			.as_ref()
			.is_none_or(|credential| credential.is_expired_at(now, self.inner.tolerance))
	}

	/// `true` when a credential is held and, for scoped flows, grants every scope in `scopes`.
	///
	/// Expiry is not considered; an expired credential can still be refreshed.
	pub fn is_authorized(&self, scopes: &ScopeSet) -> bool {
		self.inner
			.state
			.lock()
			.credential
			.as_ref()
			.is_some_and(|credential| !F::SCOPED || credential.is_authorized_for(scopes))
	}

	/// Current lifecycle state.
	pub fn state(&self) -> AuthorizationState {
		let now = self.inner.clock.now();
		let state = self.inner.state.lock();

		if state.is_refreshing() {
			return AuthorizationState::Refreshing;
		}

		match state.credential.as_ref() {
			None => AuthorizationState::Unauthorized,
			Some(credential) if credential.is_expired_at(now, self.inner.tolerance) =>
				AuthorizationState::Expired,
			Some(_) => AuthorizationState::Authorized,
		}
	}

	/// Returns an access token that covers `required` and is outside the refresh tolerance,
	/// renewing it first when needed.
	///
	/// Concurrent callers share a single renewal. Scope sufficiency is checked before any
	/// network call and never triggers one.
	pub async fn valid_token(&self, required: &ScopeSet) -> Result<TokenSecret> {
		self.ensure_valid(Some(required), false).await
	}

	/// Renews the credential; with `only_if_expired` the call is a no-op while the credential is
	/// still valid.
	pub async fn refresh_tokens(&self, only_if_expired: bool) -> Result<()> {
		self.ensure_valid(None, !only_if_expired).await.map(|_| ())
	}

	/// Clears the credential and abandons any in-flight renewal.
	///
	/// Returns `false` and stays silent when there was nothing to clear.
	pub fn deauthorize(&self) -> bool {
		let changed = self.inner.state.lock().clear();

		if changed {
			flow_event!(debug, flow = F::KIND.as_str(), "Credential cleared.");

			self.inner.notifier.notify(AuthorizationEvent::Deauthorized);
		}

		changed
	}

	/// Snapshot for persistence.
	pub fn snapshot(&self) -> PersistedState {
		PersistedState { backend: self.descriptor(), credential: self.credential() }
	}

	/// Stores a credential produced by an authorization exchange and notifies observers.
	pub(crate) fn install(&self, response: TokenResponse, require_refresh_token: bool) -> Result<()> {
		if require_refresh_token && response.refresh_token.is_none() {
			return Err(DecodingError::MissingField { field: "refresh_token" }.into());
		}

		let credential = Credential::from_response(response, self.inner.clock.now())?;

		self.inner.state.lock().store(credential);

		flow_event!(debug, flow = F::KIND.as_str(), "Credential installed from an exchange.");

		self.inner.notifier.notify(AuthorizationEvent::Changed);

		Ok(())
	}
}
impl<F> Clone for AuthorizationManager<F>
where
	F: Flow,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<F> Debug for AuthorizationManager<F>
where
	F: Flow + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationManager")
			.field("flow", &self.inner.flow)
			.field("state", &self.state())
			.field("tolerance", &self.inner.tolerance)
			.finish_non_exhaustive()
	}
}

struct ManagerInner<F> {
	flow: F,
	state: Mutex<CredentialState>,
	notifier: ChangeNotifier,
	clock: Arc<dyn Clock>,
	tolerance: Duration,
	spawner: Option<Arc<dyn Spawner>>,
}

/// Refresh token of `current`, or the reason the flow cannot renew without one.
pub(crate) fn refresh_token_of(current: Option<&Credential>) -> Result<TokenSecret> {
	match current {
		Some(credential) => credential.refresh_token.clone().ok_or_else(|| {
			LocalError::unauthorized("the credential carries no refresh token").into()
		}),
		None => Err(LocalError::unauthorized("no credential has been obtained yet").into()),
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		auth::Scope,
		backend::{DirectDescriptor, Grant, TokenBackend},
		clock::ManualClock,
		flows::ClientCredentialsFlow,
	};

	struct FixedBackend(AtomicUsize);
	impl TokenBackend for FixedBackend {
		fn descriptor(&self) -> BackendDescriptor {
			DirectDescriptor::builder("client")
				.client_secret("secret")
				.build()
				.expect("Fixture descriptor should validate.")
				.into()
		}

		fn exchange<'a>(
			&'a self,
			_: Grant<'a>,
		) -> crate::backend::BackendFuture<'a, TokenResponse> {
			let n = self.0.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				Ok(TokenResponse {
					access_token: TokenSecret::new(format!("cc-{n}")),
					token_type: Some("Bearer".into()),
					scope: None,
					expires_in: Some(3600),
					refresh_token: None,
				})
			})
		}
	}

	fn manager(clock: &ManualClock) -> AuthorizationManager<ClientCredentialsFlow<FixedBackend>> {
		AuthorizationManager::with_config(
			ClientCredentialsFlow::new(FixedBackend(AtomicUsize::new(0))),
			ManagerConfig::default().with_clock(clock.clone()),
		)
	}

	#[test]
	fn tolerance_clamps_to_zero() {
		let config = ManagerConfig::default().with_tolerance(Duration::seconds(-5));

		assert_eq!(config.tolerance(), Duration::ZERO);
		assert_eq!(ManagerConfig::default().tolerance(), DEFAULT_REFRESH_TOLERANCE);
	}

	#[tokio::test]
	async fn state_tracks_expiry_through_the_clock() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = manager(&clock);

		assert_eq!(manager.state(), AuthorizationState::Unauthorized);
		assert!(manager.access_token_is_expired());

		let token = manager
			.valid_token(&ScopeSet::from([Scope::Streaming]))
			.await
			.expect("Client credentials should self-authorize.");

		assert_eq!(token.expose(), "cc-0");
		assert_eq!(manager.state(), AuthorizationState::Authorized);

		clock.advance(Duration::seconds(3600 - 120));

		assert_eq!(manager.state(), AuthorizationState::Expired);
		assert!(manager.access_token_is_expired());
	}

	#[tokio::test]
	async fn snapshot_restores_an_equivalent_manager() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let manager = manager(&clock);

		manager.refresh_tokens(false).await.expect("Renewal should succeed.");

		let snapshot = manager.snapshot();
		let json = serde_json::to_string(&snapshot).expect("Snapshot should serialize.");
		let decoded: PersistedState =
			serde_json::from_str(&json).expect("Snapshot should deserialize.");
		let restored = AuthorizationManager::restore(
			ClientCredentialsFlow::new(FixedBackend(AtomicUsize::new(0))),
			decoded,
			ManagerConfig::default().with_clock(clock.clone()),
		)
		.expect("Snapshot should restore.");

		assert_eq!(restored.credential(), manager.credential());
		assert_eq!(restored.state(), AuthorizationState::Authorized);
	}

	#[test]
	fn refresh_token_is_required_for_renewal() {
		let err = refresh_token_of(Some(&Credential::new("access")))
			.expect_err("Credentials without a refresh token cannot renew.");

		assert!(err.requires_reauthorization());
		assert!(refresh_token_of(None).is_err());
		assert_eq!(
			refresh_token_of(Some(&Credential::new("a").with_refresh_token("r")))
				.expect("Refresh token should be returned.")
				.expose(),
			"r"
		);
	}
}
