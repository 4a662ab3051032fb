//! Classification of token endpoint responses shared by both strategies.

// crates.io
use oauth2::http::StatusCode;
// self
use crate::{
	_prelude::*,
	auth::TokenResponse,
	error::{
		AuthenticationError, DecodingError, RateLimitedError, ResourceError, body_preview,
	},
};

#[derive(Deserialize)]
struct ResourceEnvelope {
	error: ResourceError,
}

/// Decodes a 2xx body. The body itself is never kept in the error since it may hold tokens.
pub(crate) fn decode_token_response(status: StatusCode, body: &[u8]) -> Result<TokenResponse> {
	let deserializer = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(deserializer)
		.map_err(|source| DecodingError::json(source, Some(status.as_u16()), None).into())
}

/// Classifies a non-2xx response by status and body shape.
///
/// Order: 429 is always rate limiting; then `{error, error_description}`; then
/// `{error: {status, message}}`; anything else is a decoding failure with a body preview.
pub(crate) fn classify_error_response(
	status: Option<u16>,
	retry_after: Option<Duration>,
	body: &[u8],
) -> Error {
	if status == Some(StatusCode::TOO_MANY_REQUESTS.as_u16()) {
		return RateLimitedError { retry_after }.into();
	}
	if let Ok(mut authentication) = serde_json::from_slice::<AuthenticationError>(body) {
		authentication.status = status;

		return authentication.into();
	}
	if let Ok(envelope) = serde_json::from_slice::<ResourceEnvelope>(body) {
		return envelope.error.into();
	}

	DecodingError::UnexpectedResponse { status, body_preview: body_preview(body) }.into()
}
