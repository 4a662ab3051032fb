//! Credential record held by a flow manager and its token-response wire form.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::DecodingError,
};

/// Token endpoint success body: `{access_token, token_type, scope?, expires_in, refresh_token?}`.
///
/// Both backend strategies produce this shape; the owning manager stamps it with the receive time
/// via [`Credential::from_response`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Bearer token.
	pub access_token: TokenSecret,
	/// Token type, normally `Bearer`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Space-delimited granted scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Lifetime in seconds, relative to the response.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_in: Option<u64>,
	/// Refresh token, when issued or rotated.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("expires_in", &self.expires_in)
			.field("has_refresh_token", &self.refresh_token.is_some())
			.finish_non_exhaustive()
	}
}

/// Access token, optional refresh token, expiry, and granted scopes.
///
/// The JSON layout (`access_token`, `refresh_token`, `expiration_date` as RFC 3339, `scope` as a
/// space-delimited string) is what persistence collaborators store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token attached to API requests.
	pub access_token: TokenSecret,
	/// Refresh token; absent for client credentials.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry instant.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expiration_date: Option<OffsetDateTime>,
	/// Scopes the resource owner approved.
	#[serde(default, rename = "scope")]
	pub scopes: ScopeSet,
}
impl Credential {
	/// Creates a credential with no refresh token, no expiry, and no scopes.
	pub fn new(access_token: impl Into<TokenSecret>) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			expiration_date: None,
			scopes: ScopeSet::new(),
		}
	}

	/// Sets the refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Sets the absolute expiry.
	pub fn with_expiration_date(mut self, expiration_date: OffsetDateTime) -> Self {
		self.expiration_date = Some(expiration_date);

		self
	}

	/// Sets the granted scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Converts a token response received at `received_at` into a credential.
	///
	/// `expires_in` must be present and positive; unknown scopes are rejected.
	pub fn from_response(response: TokenResponse, received_at: OffsetDateTime) -> Result<Self> {
		let expires_in =
			response.expires_in.ok_or(DecodingError::MissingField { field: "expires_in" })?;
		let expires_in =
			i64::try_from(expires_in).map_err(|_| DecodingError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(DecodingError::NonPositiveExpiresIn.into());
		}

		let expiration_date = received_at
			.checked_add(Duration::seconds(expires_in))
			.ok_or(DecodingError::ExpiresInOutOfRange)?;
		let scopes = match response.scope.as_deref() {
			Some(scope) => ScopeSet::parse(scope)?,
			None => ScopeSet::new(),
		};

		Ok(Self {
			access_token: response.access_token,
			refresh_token: response.refresh_token,
			expiration_date: Some(expiration_date),
			scopes,
		})
	}

	/// `true` when the expiry is unknown or `now + leeway` has reached it.
	pub fn is_expired_at(&self, now: OffsetDateTime, leeway: Duration) -> bool {
		match self.expiration_date {
			Some(expiration_date) => now + leeway >= expiration_date,
			None => true,
		}
	}

	/// `true` when the granted scopes are a superset of `required`.
	pub fn is_authorized_for(&self, required: &ScopeSet) -> bool {
		ScopeSet::is_sufficient(required, &self.scopes)
	}

	/// Fills fields a refresh response may omit from the credential it replaces.
	pub(crate) fn inherit(mut self, previous: &Credential, response_had_scope: bool) -> Self {
		if self.refresh_token.is_none() {
			self.refresh_token = previous.refresh_token.clone();
		}
		if !response_had_scope {
			self.scopes = previous.scopes.clone();
		}

		self
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &self.access_token)
			.field("refresh_token", &self.refresh_token)
			.field("expiration_date", &self.expiration_date)
			.field("scopes", &self.scopes)
			.finish()
	}
}
