//! Delegated strategy: a trusted backend holds the client secret and performs exchanges.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenResponse,
	backend::{
		BackendDescriptor, BackendFuture, DelegatedDescriptor, Grant, RefreshingBackend,
		TokenBackend, response,
	},
	clock::{Clock, SystemClock},
	error::ConfigError,
	http::{ResponseMetadataSlot, RetryAfter, TokenHttpClient, TransportErrorMapper},
	obs::{FlowKind, FlowSpan, TokenCall},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Delegated strategy specialized for the bundled reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestDelegatedBackend =
	DelegatedBackend<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Posts grants to a trusted backend instead of the provider.
///
/// Request bodies carry no secret:
///
/// - authorization code: `grant_type=authorization_code&code=..&redirect_uri=..`
/// - PKCE: the same plus `code_verifier` and `client_id`
/// - client credentials: `grant_type=client_credentials`
/// - refresh (to the refresh URL): `grant_type=refresh_token&refresh_token=..`, plus `client_id`
///   for PKCE
///
/// The backend must answer with the provider's JSON token shape.
pub struct DelegatedBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: DelegatedDescriptor,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	clock: Arc<dyn Clock>,
}
impl<C, M> DelegatedBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a backend that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: DelegatedDescriptor,
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
	pub fn delegated_descriptor(&self) -> &DelegatedDescriptor {
		&self.descriptor
	}

	async fn post_form(
		&self,
		flow: FlowKind,
		url: &Url,
		form: &[(&str, &str)],
	) -> Result<TokenResponse> {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(form.iter().copied())
			.finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle
			.call(request)
			.await
			.map_err(|err| self.error_mapper.map_transport_error(flow, meta.take().as_ref(), err))?;
		let status = response.status();

		if status.is_success() {
			response::decode_token_response(status, response.body())
		} else {
			let retry_after = RetryAfter::from_headers(response.headers())
				.and_then(|hint| hint.remaining(self.clock.now()));

			Err(response::classify_error_response(
				Some(status.as_u16()),
				retry_after,
				response.body(),
			))
		}
	}
}
#[cfg(feature = "reqwest")]
impl DelegatedBackend<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a backend with its own reqwest transport.
	pub fn new(descriptor: DelegatedDescriptor) -> Self {
		Self::with_http_client(
			descriptor,
			ReqwestHttpClient::default(),
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> TokenBackend for DelegatedBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn descriptor(&self) -> BackendDescriptor {
		BackendDescriptor::Delegated(self.descriptor.clone())
	}

	fn exchange<'a>(&'a self, grant: Grant<'a>) -> BackendFuture<'a, TokenResponse> {
		let flow = grant.flow();
		let span = FlowSpan::new(flow, "delegated", TokenCall::Exchange);

		Box::pin(span.track(async move {
			let client_id = self.descriptor.client_id.as_str();

			match grant {
				Grant::AuthorizationCode { code, redirect_uri } => {
					let form = [
						("grant_type", "authorization_code"),
						("code", code),
						("redirect_uri", redirect_uri.as_str()),
					];

					self.post_form(flow, &self.descriptor.token_url, &form).await
				},
				Grant::Pkce { code, code_verifier, redirect_uri } => {
					let form = [
						("grant_type", "authorization_code"),
						("code", code),
						("redirect_uri", redirect_uri.as_str()),
						("code_verifier", code_verifier),
						("client_id", client_id),
					];

					self.post_form(flow, &self.descriptor.token_url, &form).await
				},
				Grant::ClientCredentials => {
					let form = [("grant_type", "client_credentials")];

					self.post_form(flow, &self.descriptor.token_url, &form).await
				},
			}
		}))
	}
}
impl<C, M> RefreshingBackend for DelegatedBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(
		&'a self,
		flow: FlowKind,
		refresh_token: &'a str,
	) -> BackendFuture<'a, TokenResponse> {
		let span = FlowSpan::new(flow, "delegated", TokenCall::Refresh);

		Box::pin(span.track(async move {
			let client_id = self.descriptor.client_id.as_str();
			let mut form = vec![("grant_type", "refresh_token"), ("refresh_token", refresh_token)];

			if flow == FlowKind::AuthorizationCodePkce {
				form.push(("client_id", client_id));
			}

			self.post_form(flow, &self.descriptor.token_refresh_url, &form).await
		}))
	}
}
impl<C, M> Debug for DelegatedBackend<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatedBackend")
			.field("descriptor", &self.descriptor)
			.finish_non_exhaustive()
	}
}
