//! Direct strategy: the application talks to the provider token endpoint with its own secret.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse as _, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenResponse, TokenSecret},
	backend::{
		BackendDescriptor, BackendFuture, ClientAuthMethod, DirectDescriptor, Grant,
		RefreshingBackend, TokenBackend, response,
	},
	clock::{Clock, SystemClock},
	error::{AuthenticationError, ConfigError, DecodingError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient, TransportErrorMapper},
	obs::{FlowKind, FlowSpan, TokenCall},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

type TokenEndpointClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Direct strategy specialized for the bundled reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestDirectBackend = DirectBackend<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Calls the provider token endpoint through the `oauth2` crate.
///
/// The authorization code and client credentials grants authenticate with the client secret
/// (Basic auth by default). PKCE exchanges and PKCE refreshes never send the secret; the client id
/// travels in the form body instead.
pub struct DirectBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: DirectDescriptor,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	clock: Arc<dyn Clock>,
}
impl<C, M> DirectBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a backend that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: DirectDescriptor,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			descriptor,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			clock: Arc::new(SystemClock),
		}
	}

	/// Resolves HTTP-date `Retry-After` hints against `clock` instead of the system clock.
	pub fn with_clock(mut self, clock: impl Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Configuration this backend was built from.
	pub fn direct_descriptor(&self) -> &DirectDescriptor {
		&self.descriptor
	}

	fn oauth_client(&self, flow: FlowKind) -> Result<TokenEndpointClient> {
		let token_url = TokenUrl::new(self.descriptor.token_endpoint.to_string())
			.map_err(ConfigError::from)?;
		let mut client = BasicClient::new(ClientId::new(self.descriptor.client_id.clone()))
			.set_token_uri(token_url);

		if flow != FlowKind::AuthorizationCodePkce {
			let secret = self
				.descriptor
				.client_secret
				.as_ref()
				.ok_or(ConfigError::MissingClientSecret { flow })?;

			client = client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));

			if self.descriptor.client_auth == ClientAuthMethod::ClientSecretPost {
				client = client.set_auth_type(AuthType::RequestBody);
			}
		}

		Ok(client)
	}

	fn map_error(
		&self,
		flow: FlowKind,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let status = meta.as_ref().and_then(|meta| meta.status);
		let retry_after = meta
			.as_ref()
			.and_then(|meta| meta.retry_after)
			.and_then(|hint| hint.remaining(self.clock.now()));

		match err {
			RequestTokenError::ServerResponse(_)
			| RequestTokenError::Parse(..)
			| RequestTokenError::Other(_)
				if status == Some(429) =>
				response::classify_error_response(status, retry_after, &[]),
			RequestTokenError::ServerResponse(body) => AuthenticationError {
				error: body.error().as_ref().to_owned(),
				description: body.error_description().cloned(),
				status,
			}
			.into(),
			RequestTokenError::Request(err) =>
				self.error_mapper.map_transport_error(flow, meta.as_ref(), err),
			RequestTokenError::Parse(source, body) => match status {
				Some(code) if !(200..300).contains(&code) =>
					response::classify_error_response(status, retry_after, &body),
				_ => DecodingError::json(source, status, None).into(),
			},
			RequestTokenError::Other(message) =>
				DecodingError::UnexpectedResponse { status, body_preview: Some(message) }.into(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl DirectBackend<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a backend with its own reqwest transport.
	pub fn new(descriptor: DirectDescriptor) -> Self {
		Self::with_http_client(
			descriptor,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenBackend for DirectBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn descriptor(&self) -> BackendDescriptor {
		BackendDescriptor::Direct(self.descriptor.clone())
	}

	fn exchange<'a>(&'a self, grant: Grant<'a>) -> BackendFuture<'a, TokenResponse> {
		let flow = grant.flow();
		let span = FlowSpan::new(flow, "direct", TokenCall::Exchange);

		Box::pin(span.track(async move {
			let client = self.oauth_client(flow)?;
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let result = match grant {
				Grant::AuthorizationCode { code, redirect_uri } => {
					let redirect_url =
						RedirectUrl::new(redirect_uri.to_string()).map_err(ConfigError::from)?;

					client
						.exchange_code(AuthorizationCode::new(code.to_owned()))
						.set_redirect_uri(Cow::Owned(redirect_url))
						.request_async(&handle)
						.await
				},
				Grant::Pkce { code, code_verifier, redirect_uri } => {
					let redirect_url =
						RedirectUrl::new(redirect_uri.to_string()).map_err(ConfigError::from)?;

					client
						.exchange_code(AuthorizationCode::new(code.to_owned()))
						.set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_owned()))
						.set_redirect_uri(Cow::Owned(redirect_url))
						.request_async(&handle)
						.await
				},
				Grant::ClientCredentials =>
					client.exchange_client_credentials().request_async(&handle).await,
			};

			result
				.map(|response| from_oauth_response(&response))
				.map_err(|err| self.map_error(flow, meta.take(), err))
		}))
	}
}
impl<C, M> RefreshingBackend for DirectBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(
		&'a self,
		flow: FlowKind,
		refresh_token: &'a str,
	) -> BackendFuture<'a, TokenResponse> {
		let span = FlowSpan::new(flow, "direct", TokenCall::Refresh);

		Box::pin(span.track(async move {
			let client = self.oauth_client(flow)?;
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let result =
				client.exchange_refresh_token(&refresh_secret).request_async(&handle).await;

			result
				.map(|response| from_oauth_response(&response))
				.map_err(|err| self.map_error(flow, meta.take(), err))
		}))
	}
}
impl<C, M> Debug for DirectBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DirectBackend").field("descriptor", &self.descriptor).finish_non_exhaustive()
	}
}

fn from_oauth_response(response: &BasicTokenResponse) -> TokenResponse {
	TokenResponse {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		token_type: Some(response.token_type().as_ref().to_owned()),
		scope: response.scopes().map(|scopes| {
			scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" ")
		}),
		expires_in: response.expires_in().map(|lifetime| lifetime.as_secs()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
	}
}
