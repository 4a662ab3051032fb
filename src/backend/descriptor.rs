//! Immutable backend configuration, persisted alongside the credential.

// std
use std::net::IpAddr;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Provider token endpoint used when none is configured.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
/// Provider authorization endpoint used when none is configured.
pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.spotify.com/authorize";

/// Errors raised while validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DescriptorError {
	/// The client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// An endpoint URL could not be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// How the direct strategy presents the client secret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Which strategy performs token exchanges, and how to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackendDescriptor {
	/// The application holds the client secret and calls the provider itself.
	Direct(DirectDescriptor),
	/// A trusted backend holds the secret and performs exchanges for the application.
	Delegated(DelegatedDescriptor),
}
impl BackendDescriptor {
	/// Client identifier shared by both strategies.
	pub fn client_id(&self) -> &str {
		match self {
			BackendDescriptor::Direct(direct) => &direct.client_id,
			BackendDescriptor::Delegated(delegated) => &delegated.client_id,
		}
	}

	/// Re-runs builder validation, e.g. after deserializing persisted state.
	pub fn validate(&self) -> Result<(), DescriptorError> {
		match self {
			BackendDescriptor::Direct(direct) => direct.validate(),
			BackendDescriptor::Delegated(delegated) => delegated.validate(),
		}
	}
}
impl From<DirectDescriptor> for BackendDescriptor {
	fn from(value: DirectDescriptor) -> Self {
		Self::Direct(value)
	}
}
impl From<DelegatedDescriptor> for BackendDescriptor {
	fn from(value: DelegatedDescriptor) -> Self {
		Self::Delegated(value)
	}
}

/// Configuration for the direct strategy.
///
/// The secret is persisted with the descriptor; choosing this strategy makes the application
/// responsible for storing it safely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectDescriptor {
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret; required for the authorization code and client credentials flows.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<TokenSecret>,
	/// Provider token endpoint.
	pub token_endpoint: Url,
	/// How the secret is presented.
	#[serde(default)]
	pub client_auth: ClientAuthMethod,
}
impl DirectDescriptor {
	/// Starts a builder targeting the default provider token endpoint.
	pub fn builder(client_id: impl Into<String>) -> DirectDescriptorBuilder {
		DirectDescriptorBuilder::new(client_id)
	}

	fn validate(&self) -> Result<(), DescriptorError> {
		validate_client_id(&self.client_id)?;
		validate_endpoint("token", &self.token_endpoint)
	}
}

/// Builder for [`DirectDescriptor`].
#[derive(Debug)]
pub struct DirectDescriptorBuilder {
	client_id: String,
	client_secret: Option<TokenSecret>,
	token_endpoint: Option<Url>,
	client_auth: ClientAuthMethod,
}
impl DirectDescriptorBuilder {
	fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			token_endpoint: None,
			client_auth: ClientAuthMethod::default(),
		}
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides how the secret is presented.
	pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Consumes the builder and validates the descriptor.
	pub fn build(self) -> Result<DirectDescriptor, DescriptorError> {
		let token_endpoint = match self.token_endpoint {
			Some(url) => url,
			None => default_endpoint("token", DEFAULT_TOKEN_ENDPOINT)?,
		};
		let descriptor = DirectDescriptor {
			client_id: self.client_id,
			client_secret: self.client_secret,
			token_endpoint,
			client_auth: self.client_auth,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

/// Configuration for the delegated strategy; it carries no secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedDescriptor {
	/// OAuth client identifier.
	pub client_id: String,
	/// Backend URL performing authorization code and client credentials exchanges.
	pub token_url: Url,
	/// Backend URL performing refreshes.
	pub token_refresh_url: Url,
}
impl DelegatedDescriptor {
	/// Creates and validates a delegated descriptor.
	pub fn new(
		client_id: impl Into<String>,
		token_url: Url,
		token_refresh_url: Url,
	) -> Result<Self, DescriptorError> {
		let descriptor = Self { client_id: client_id.into(), token_url, token_refresh_url };

		descriptor.validate()?;

		Ok(descriptor)
	}

	fn validate(&self) -> Result<(), DescriptorError> {
		validate_client_id(&self.client_id)?;
		validate_endpoint("token", &self.token_url)?;
		validate_endpoint("token refresh", &self.token_refresh_url)
	}
}

pub(crate) fn default_endpoint(
	endpoint: &'static str,
	raw: &'static str,
) -> Result<Url, DescriptorError> {
	Url::parse(raw).map_err(|source| DescriptorError::InvalidEndpoint { endpoint, source })
}

fn validate_client_id(client_id: &str) -> Result<(), DescriptorError> {
	if client_id.trim().is_empty() { Err(DescriptorError::EmptyClientId) } else { Ok(()) }
}

pub(crate) fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), DescriptorError> {
	let loopback = match url.host() {
		Some(url::Host::Domain(domain)) => domain == "localhost",
		Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	};

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(DescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}
