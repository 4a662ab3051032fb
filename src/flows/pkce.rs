//! Authorization code flow with PKCE for public clients.
//!
//! No client secret is involved: the authorization request carries the S256 challenge of a
//! random verifier and the exchange proves possession of the verifier. [`AuthorizationSession`]
//! bundles the per-attempt values so callers cannot mix them up between attempts.

// self
use crate::{
	_prelude::*,
	auth::{self, Credential, ScopeSet},
	backend::{BackendDescriptor, Grant, RefreshingBackend},
	flows::{
		AuthorizationManager, Flow, RenewFuture, refresh_token_of,
		redirect::{self, RedirectCode},
	},
	obs::{FlowKind, FlowSpan, TokenCall},
};

const CODE_CHALLENGE_METHOD: &str = "S256";

/// Manager driving the PKCE flow.
pub type PkceManager<B> = AuthorizationManager<PkceFlow<B>>;

/// Authorization code + PKCE grant configuration.
pub struct PkceFlow<B>
where
	B: RefreshingBackend,
{
	backend: Arc<B>,
	authorization_endpoint: Option<Url>,
}
impl<B> PkceFlow<B>
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
impl<B> Flow for PkceFlow<B>
where
	B: RefreshingBackend,
{
	const KIND: FlowKind = FlowKind::AuthorizationCodePkce;
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
impl<B> Debug for PkceFlow<B>
where
	B: RefreshingBackend + Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceFlow")
			.field("backend", &self.backend)
			.field("authorization_endpoint", &self.authorization_endpoint)
			.finish()
	}
}

/// Values generated for one PKCE authorization attempt.
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Opaque value that must round-trip through the redirect.
	pub state: String,
	/// Redirect URI sent with the authorization request.
	pub redirect_uri: Url,
	/// Scopes requested.
	pub scopes: ScopeSet,
	/// URL the user should open.
	pub authorization_url: Url,
	code_verifier: String,
	code_challenge: String,
}
impl AuthorizationSession {
	/// S256 challenge sent with the authorization request.
	pub fn code_challenge(&self) -> &str {
		&self.code_challenge
	}

	/// Secret verifier proving possession during the exchange.
	pub fn code_verifier(&self) -> &str {
		&self.code_verifier
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("authorization_url", &self.authorization_url)
			.field("code_challenge", &self.code_challenge)
			.finish_non_exhaustive()
	}
}

impl<B> AuthorizationManager<PkceFlow<B>>
where
	B: RefreshingBackend,
{
	/// URL the user opens to approve `scopes`, carrying `code_challenge`.
	pub fn authorization_url(
		&self,
		redirect_uri: &Url,
		code_challenge: &str,
		state: Option<&str>,
		scopes: &ScopeSet,
	) -> Result<Url> {
		let descriptor = self.descriptor();
		let mut url = redirect::authorization_request(
			self.flow().authorization_endpoint.as_ref(),
			descriptor.client_id(),
			redirect_uri,
			scopes,
			state,
		)?;

		url.query_pairs_mut()
			.append_pair("code_challenge_method", CODE_CHALLENGE_METHOD)
			.append_pair("code_challenge", code_challenge);

		Ok(url)
	}

	/// Exchanges the code in `redirect_uri_with_query` using `code_verifier` and stores the
	/// tokens.
	///
	/// The verifier must be 43 to 128 characters long. The redirect's `state` must equal `state`;
	/// with `None` it must carry no state at all.
	pub async fn request_access_and_refresh_tokens(
		&self,
		redirect_uri_with_query: &Url,
		code_verifier: &str,
		state: Option<&str>,
	) -> Result<()> {
		auth::pkce::validate_code_verifier(code_verifier)?;

		let RedirectCode { code, redirect_uri } =
			redirect::parse_redirect(redirect_uri_with_query, state)?;
		let span =
			FlowSpan::new(FlowKind::AuthorizationCodePkce, "manager", TokenCall::Exchange);
		let response = span
			.instrument(self.flow().backend.exchange(Grant::Pkce {
				code: &code,
				code_verifier,
				redirect_uri: &redirect_uri,
			}))
			.await?;

		self.install(response, true)
	}

	/// Generates a verifier, challenge, and state, and builds the authorization URL.
	pub fn start_authorization(
		&self,
		redirect_uri: Url,
		scopes: ScopeSet,
	) -> Result<AuthorizationSession> {
		let code_verifier = auth::make_code_verifier();
		let code_challenge = auth::make_code_challenge(&code_verifier);
		let state = auth::make_state();
		let authorization_url =
			self.authorization_url(&redirect_uri, &code_challenge, Some(&state), &scopes)?;

		Ok(AuthorizationSession {
			state,
			redirect_uri,
			scopes,
			authorization_url,
			code_verifier,
			code_challenge,
		})
	}

	/// Finishes the attempt started by [`Self::start_authorization`].
	pub async fn complete_authorization(
		&self,
		session: &AuthorizationSession,
		redirect_uri_with_query: &Url,
	) -> Result<()> {
		self.request_access_and_refresh_tokens(
			redirect_uri_with_query,
			&session.code_verifier,
			Some(&session.state),
		)
		.await
	}
}
