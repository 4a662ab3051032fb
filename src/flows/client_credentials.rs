//! Client credentials flow for server-to-server access.
//!
//! There is no user and no refresh token: renewing means requesting a new token with the client
//! credentials, which also works from `Unauthorized`. Tokens from this grant carry no user scopes,
//! so required scopes are not checked.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	backend::{BackendDescriptor, Grant, TokenBackend},
	flows::{AuthorizationManager, Flow, RenewFuture},
	obs::FlowKind,
};

/// Manager driving the client credentials flow.
pub type ClientCredentialsManager<B> = AuthorizationManager<ClientCredentialsFlow<B>>;

/// Client credentials grant configuration.
pub struct ClientCredentialsFlow<B>
where
	B: TokenBackend,
{
	backend: Arc<B>,
}
impl<B> ClientCredentialsFlow<B>
where
	B: TokenBackend,
{
	/// Uses `backend` for token requests.
	pub fn new(backend: B) -> Self {
		Self { backend: Arc::new(backend) }
	}

	/// Backend performing token requests.
	pub fn backend(&self) -> &B {
		&self.backend
	}
}
impl<B> Flow for ClientCredentialsFlow<B>
where
	B: TokenBackend,
{
	const KIND: FlowKind = FlowKind::ClientCredentials;
	const SCOPED: bool = false;
	const SELF_AUTHORIZING: bool = true;

	fn descriptor(&self) -> BackendDescriptor {
		self.backend.descriptor()
	}

	fn renew(&self, _: Option<&Credential>) -> Result<RenewFuture> {
		let backend = self.backend.clone();

		Ok(Box::pin(async move { backend.exchange(Grant::ClientCredentials).await }))
	}
}
impl<B> Debug for ClientCredentialsFlow<B>
where
	B: TokenBackend + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsFlow").field("backend", &self.backend).finish()
	}
}

impl<B> AuthorizationManager<ClientCredentialsFlow<B>>
where
	B: TokenBackend,
{
	/// Requests a new token even if the current one is still valid.
	///
	/// Joins a renewal that is already in flight instead of starting a second one.
	pub async fn authorize(&self) -> Result<()> {
		self.ensure_valid(None, true).await.map(|_| ())
	}
}
