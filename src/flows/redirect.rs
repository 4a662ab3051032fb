//! Authorization request URLs and parsing of the redirect that answers them.

// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	backend::{
		DEFAULT_AUTHORIZATION_ENDPOINT,
		descriptor::{default_endpoint, validate_endpoint},
	},
	error::{AuthorizationError, ConfigError, LocalError},
};

/// Validated authorization endpoint override, or the provider default.
pub(crate) fn authorization_endpoint(custom: Option<&Url>) -> Result<Url> {
	match custom {
		Some(url) => {
			validate_endpoint("authorization", url).map_err(ConfigError::from)?;

			Ok(url.clone())
		},
		None => Ok(default_endpoint("authorization", DEFAULT_AUTHORIZATION_ENDPOINT)
			.map_err(ConfigError::from)?),
	}
}

/// Builds the common part of an authorization request; flows append their own parameters.
pub(crate) fn authorization_request(
	endpoint: Option<&Url>,
	client_id: &str,
	redirect_uri: &Url,
	scopes: &ScopeSet,
	state: Option<&str>,
) -> Result<Url> {
	let mut url = authorization_endpoint(endpoint)?;
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("client_id", client_id);
	pairs.append_pair("response_type", "code");
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scopes.is_empty() {
		pairs.append_pair("scope", &scopes.format());
	}
	if let Some(state) = state {
		pairs.append_pair("state", state);
	}

	drop(pairs);

	Ok(url)
}

/// Authorization code carried by a successful redirect.
#[derive(Debug)]
pub(crate) struct RedirectCode {
	pub(crate) code: String,
	/// The redirect with query and fragment removed, as sent in the token request.
	pub(crate) redirect_uri: Url,
}

/// Extracts the code from `redirect`.
///
/// The received `state` must equal `expected_state` exactly; with `None` the redirect must carry
/// no `state` at all. The check runs first so a forged redirect is never treated as a provider
/// answer.
pub(crate) fn parse_redirect(redirect: &Url, expected_state: Option<&str>) -> Result<RedirectCode> {
	let mut code = None;
	let mut error = None;
	let mut received_state = None;

	for (key, value) in redirect.query_pairs() {
		match key.as_ref() {
			"code" => code = Some(value.into_owned()),
			"error" => error = Some(value.into_owned()),
			"state" => received_state = Some(value.into_owned()),
			_ => {},
		}
	}

	if received_state.as_deref() != expected_state {
		return Err(LocalError::InvalidState {
			supplied: expected_state.map(ToOwned::to_owned),
			received: received_state,
		}
		.into());
	}
	if let Some(error) = error {
		return Err(AuthorizationError { error, state: received_state }.into());
	}

	let code = code.ok_or_else(|| {
		LocalError::Other("the redirect carries neither `code` nor `error`".into())
	})?;
	let mut redirect_uri = redirect.clone();

	redirect_uri.set_query(None);
	redirect_uri.set_fragment(None);

	Ok(RedirectCode { code, redirect_uri })
}
