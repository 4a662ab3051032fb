//! Error taxonomy shared by scopes, backends, and flow managers.
//!
//! [`Error`] is `Clone` so a single refresh outcome can be handed to every caller that joined
//! it; underlying sources are therefore kept behind [`Arc`].

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, UnrecognizedScope},
	obs::FlowKind,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Detected locally without a network call.
	#[error(transparent)]
	Local(#[from] LocalError),
	/// Token endpoint rejected the grant, refresh token, or client credentials.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// The authorization redirect carried an error instead of a code.
	#[error(transparent)]
	Authorization(#[from] AuthorizationError),
	/// Service-level rejection unrelated to OAuth semantics.
	#[error(transparent)]
	Resource(#[from] ResourceError),
	/// Upstream asked the caller to slow down.
	#[error(transparent)]
	RateLimited(#[from] RateLimitedError),
	/// Token response did not have the expected shape.
	#[error(transparent)]
	Decoding(#[from] DecodingError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when retrying the same operation later may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::Transport(_) | Error::RateLimited(_) => true,
			Error::Authentication(err) => !err.is_terminal(),
			_ => false,
		}
	}

	/// Returns `true` when the stored credential can no longer be used and the caller must run
	/// the authorization flow again.
	pub fn requires_reauthorization(&self) -> bool {
		match self {
			Error::Authentication(err) => err.is_terminal(),
			Error::Local(LocalError::Unauthorized { .. }) => true,
			_ => false,
		}
	}
}
impl From<UnrecognizedScope> for Error {
	fn from(e: UnrecognizedScope) -> Self {
		LocalError::from(e).into()
	}
}

/// Failures detected without contacting the network.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LocalError {
	/// No usable credential is available.
	#[error("Not authorized: {reason}.")]
	Unauthorized {
		/// Why the manager cannot produce a token.
		reason: String,
	},
	/// The granted scopes do not cover the request.
	#[error("Insufficient scope: required `{required}`, granted `{granted}`.")]
	InsufficientScope {
		/// Scopes the caller asked for.
		required: ScopeSet,
		/// Scopes the credential carries.
		granted: ScopeSet,
	},
	/// A scope string is outside the known vocabulary.
	#[error(transparent)]
	UnrecognizedScope(#[from] UnrecognizedScope),
	/// The redirect `state` does not match the value sent with the authorization URL.
	#[error("Authorization state mismatch: supplied {supplied:?}, received {received:?}.")]
	InvalidState {
		/// State supplied by the application.
		supplied: Option<String>,
		/// State found in the redirect query.
		received: Option<String>,
	},
	/// Anything else that is knowable locally.
	#[error("{0}")]
	Other(String),
}
impl LocalError {
	/// Builds an [`LocalError::Unauthorized`] with the given reason.
	pub fn unauthorized(reason: impl Into<String>) -> Self {
		Self::Unauthorized { reason: reason.into() }
	}
}

/// OAuth error body (`{error, error_description}`) returned by a token endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, ThisError)]
#[error(
	"Token endpoint rejected the request with `{error}`{}.",
	.description.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
)]
pub struct AuthenticationError {
	/// OAuth error code, e.g. `invalid_grant`.
	pub error: String,
	/// Human readable description, when supplied.
	#[serde(default, rename = "error_description")]
	pub description: Option<String>,
	/// HTTP status code, when available.
	#[serde(skip)]
	pub status: Option<u16>,
}
impl AuthenticationError {
	/// Returns `true` when the grant, refresh token, or client credentials are unusable.
	///
	/// `temporarily_unavailable` and `server_error` describe upstream hiccups and are the only
	/// codes that do not force re-authorization.
	pub fn is_terminal(&self) -> bool {
		!matches!(self.error.as_str(), "temporarily_unavailable" | "server_error")
	}
}

/// Error found in the authorization redirect query.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Authorization failed with `{error}`.")]
pub struct AuthorizationError {
	/// Error code from the redirect, e.g. `access_denied`.
	pub error: String,
	/// State echoed back by the authorization server.
	pub state: Option<String>,
}
impl AuthorizationError {
	/// Returns `true` when the user declined the authorization request.
	pub fn access_was_denied(&self) -> bool {
		self.error == "access_denied"
	}
}

/// Generic service error body (`{"error": {"status", "message"}}`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, ThisError)]
#[error("Service returned {status}: {message}.")]
pub struct ResourceError {
	/// HTTP status reported inside the body.
	pub status: u16,
	/// Service message.
	pub message: String,
}

/// Returned for HTTP 429 responses.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Rate limited by the token endpoint{}.", .retry_after.map(|d| format!("; retry after {d}")).unwrap_or_default())]
pub struct RateLimitedError {
	/// Delay requested through the `Retry-After` header.
	pub retry_after: Option<Duration>,
}

/// Token responses that could not be turned into a credential.
#[derive(Clone, Debug, ThisError)]
pub enum DecodingError {
	/// Body is not the expected JSON shape.
	#[error("Token endpoint returned malformed JSON.")]
	Json {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Leading part of the body; never kept for successful responses.
		body_preview: Option<String>,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Error response in none of the recognized shapes.
	#[error("Token endpoint returned an unrecognized response.")]
	UnexpectedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Leading part of the body or a transport supplied message.
		body_preview: Option<String>,
	},
	/// Response omitted a field the flow requires.
	#[error("Token response is missing `{field}`.")]
	MissingField {
		/// JSON field name.
		field: &'static str,
	},
	/// `expires_in` was zero.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// `expires_in` does not fit an instant.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl DecodingError {
	/// HTTP status attached to the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			DecodingError::Json { status, .. } | DecodingError::UnexpectedResponse { status, .. } =>
				*status,
			_ => None,
		}
	}

	pub(crate) fn json(
		source: serde_path_to_error::Error<serde_json::Error>,
		status: Option<u16>,
		body: Option<&[u8]>,
	) -> Self {
		Self::Json { status, body_preview: body.and_then(body_preview), source: Arc::new(source) }
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// A URL could not be parsed.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Backend descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::backend::DescriptorError),
	/// The direct backend needs a client secret for this flow.
	#[error("The {flow} flow requires a client secret.")]
	MissingClientSecret {
		/// Flow that attempted the exchange.
		flow: FlowKind,
	},
	/// Persisted backend configuration differs from the one the flow was built with.
	#[error(
		"Persisted backend for client `{persisted_client_id}` does not match the flow's backend for client `{configured_client_id}`."
	)]
	DescriptorMismatch {
		/// Client id recorded in the persisted state.
		persisted_client_id: String,
		/// Client id of the flow's backend.
		configured_client_id: String,
	},
	/// PKCE code verifiers must be 43 to 128 characters long.
	#[error("Code verifier length {length} is outside 43..=128.")]
	InvalidCodeVerifier {
		/// Observed length.
		length: usize,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure.
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(e: url::ParseError) -> Self {
		Self::InvalidUrl { source: e }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io {
		/// IO failure.
		#[source]
		source: Arc<std::io::Error>,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

pub(crate) fn body_preview(body: &[u8]) -> Option<String> {
	if body.is_empty() {
		return None;
	}

	let text = String::from_utf8_lossy(body);
	let preview = match text.char_indices().nth(BODY_PREVIEW_LIMIT) {
		Some((end, _)) => format!("{}...", &text[..end]),
		None => text.into_owned(),
	};

	Some(preview)
}
