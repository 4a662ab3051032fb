//! Backend strategies that perform token exchanges.
//!
//! A strategy is either *direct* (the application holds the client secret and calls the
//! provider's token endpoint) or *delegated* (a trusted backend holds the secret). Both return the
//! provider's JSON token shape, so flow managers never care which one they talk to.
//!
//! [`TokenBackend`] covers every flow; [`RefreshingBackend`] adds refresh for the two user
//! authorization flows. Client credentials managers only require the former.

pub mod delegated;
pub mod descriptor;
pub mod direct;

mod response;

pub use delegated::*;
pub use descriptor::*;
pub use direct::*;

// self
use crate::{_prelude::*, auth::TokenResponse, obs::FlowKind};

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Authorization grant exchanged for tokens.
#[derive(Clone, Copy, Debug)]
pub enum Grant<'a> {
	/// Code from the authorization redirect.
	AuthorizationCode {
		/// Authorization code.
		code: &'a str,
		/// Redirect URI used when requesting the code.
		redirect_uri: &'a Url,
	},
	/// Code from the authorization redirect plus the PKCE verifier.
	Pkce {
		/// Authorization code.
		code: &'a str,
		/// Verifier whose challenge accompanied the authorization request.
		code_verifier: &'a str,
		/// Redirect URI used when requesting the code.
		redirect_uri: &'a Url,
	},
	/// Client credentials; nothing besides the client itself.
	ClientCredentials,
}
impl Grant<'_> {
	/// Flow that produces this grant.
	pub fn flow(&self) -> FlowKind {
		match self {
			Grant::AuthorizationCode { .. } => FlowKind::AuthorizationCode,
			Grant::Pkce { .. } => FlowKind::AuthorizationCodePkce,
			Grant::ClientCredentials => FlowKind::ClientCredentials,
		}
	}
}

/// Strategy able to exchange grants for tokens.
pub trait TokenBackend
where
	Self: 'static + Send + Sync,
{
	/// Configuration persisted with the credential.
	fn descriptor(&self) -> BackendDescriptor;

	/// Exchanges `grant` for a fresh token response.
	fn exchange<'a>(&'a self, grant: Grant<'a>) -> BackendFuture<'a, TokenResponse>;
}

/// Strategy that can also renew tokens with a refresh token.
pub trait RefreshingBackend: TokenBackend {
	/// Exchanges `refresh_token` issued to `flow` for a new token response.
	fn refresh<'a>(
		&'a self,
		flow: FlowKind,
		refresh_token: &'a str,
	) -> BackendFuture<'a, TokenResponse>;
}
impl<T> TokenBackend for Arc<T>
where
	T: ?Sized + TokenBackend,
{
	fn descriptor(&self) -> BackendDescriptor {
		(**self).descriptor()
	}

	fn exchange<'a>(&'a self, grant: Grant<'a>) -> BackendFuture<'a, TokenResponse> {
		(**self).exchange(grant)
	}
}
impl<T> RefreshingBackend for Arc<T>
where
	T: ?Sized + RefreshingBackend,
{
	fn refresh<'a>(
		&'a self,
		flow: FlowKind,
		refresh_token: &'a str,
	) -> BackendFuture<'a, TokenResponse> {
		(**self).refresh(flow, refresh_token)
	}
}
