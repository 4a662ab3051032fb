//! Authorization code flow for confidential clients.
//!
//! The user authorizes in a browser, the provider redirects back with `?code=..&state=..`, and
//! the backend exchanges the code for an access + refresh token pair. Renewal uses the refresh
//! token; a rejected refresh token sends the manager back to `Unauthorized`.

// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet},
	backend::{BackendDescriptor, Grant, RefreshingBackend},
	flows::{
		AuthorizationManager, Flow, RenewFuture, refresh_token_of,
		redirect::{self, RedirectCode},
	},
	obs::{FlowKind, FlowSpan, TokenCall},
};

/// Manager driving the authorization code flow.
pub type AuthorizationCodeManager<B> = AuthorizationManager<AuthorizationCodeFlow<B>>;

/// Authorization code grant configuration.
pub struct AuthorizationCodeFlow<B>
where
	B: RefreshingBackend,
{
	backend: Arc<B>,
	authorization_endpoint: Option<Url>,
}
impl<B> AuthorizationCodeFlow<B>
where
	B: RefreshingBackend,
{
	/// Uses `backend` for exchanges and refreshes.
	pub fn new(backend: B) -> Self {
		Self { backend: Arc::new(backend), authorization_endpoint: None }
	}

	/// Overrides the provider authorization endpoint; it is validated when a URL is built.
	pub fn with_authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Backend performing token requests.
	pub fn backend(&self) -> &B {
		&self.backend
	}
}
impl<B> Flow for AuthorizationCodeFlow<B>
where
	B: RefreshingBackend,
{
	const KIND: FlowKind = FlowKind::AuthorizationCode;
	const SCOPED: bool = true;
	const SELF_AUTHORIZING: bool = false;

	fn descriptor(&self) -> BackendDescriptor {
		self.backend.descriptor()
	}

	fn renew(&self, current: Option<&Credential>) -> Result<RenewFuture> {
		let refresh_token = refresh_token_of(current)?;
		let backend = self.backend.clone();

		Ok(Box::pin(async move { backend.refresh(Self::KIND, refresh_token.expose()).await }))
	}
}
impl<B> Debug for AuthorizationCodeFlow<B>
where
	B: RefreshingBackend + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationCodeFlow")
			.field("backend", &self.backend)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.finish()
	}
}

impl<B> AuthorizationManager<AuthorizationCodeFlow<B>>
where
	B: RefreshingBackend,
{
	/// URL the user opens to approve `scopes`.
	///
	/// `state` is echoed back in the redirect and should be checked when exchanging the code.
	/// `show_dialog` forces the approval dialog even if the user approved before.
	pub fn authorization_url(
		&self,
		redirect_uri: &Url,
		scopes: &ScopeSet,
		state: Option<&str>,
		show_dialog: bool,
	) -> Result<Url> {
		let descriptor = self.descriptor();
		let mut url = redirect::authorization_request(
			self.flow().authorization_endpoint.as_ref(),
			descriptor.client_id(),
			redirect_uri,
			scopes,
			state,
		)?;

		url.query_pairs_mut().append_pair("show_dialog", if show_dialog { "true" } else { "false" });

		Ok(url)
	}

	/// Exchanges the code in `redirect_uri_with_query` for tokens and stores them.
	///
	/// The redirect's `state` must equal `state`; with `None` it must carry no state at all.
	pub async fn request_access_and_refresh_tokens(
		&self,
		redirect_uri_with_query: &Url,
		state: Option<&str>,
	) -> Result<()> {
		let RedirectCode { code, redirect_uri } =
			redirect::parse_redirect(redirect_uri_with_query, state)?;
		let span = FlowSpan::new(FlowKind::AuthorizationCode, "manager", TokenCall::Exchange);
		let response = span
			.instrument(
				self.flow()
					.backend
					.exchange(Grant::AuthorizationCode { code: &code, redirect_uri: &redirect_uri }),
			)
			.await?;

		self.install(response, true)
	}
}
