//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use httpmock::MockServer;
use parking_lot::Mutex;
use url::Url;
// self
use oauth2_steward::{
	auth::{TokenResponse, TokenSecret},
	backend::{
		BackendDescriptor, BackendFuture, ClientAuthMethod, DelegatedDescriptor, DirectDescriptor,
		Grant, RefreshingBackend, ReqwestDelegatedBackend, ReqwestDirectBackend, TokenBackend,
	},
	error::Result,
	flows::{AuthorizationManager, Flow},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	notify::{AuthorizationEvent, Subscription},
	obs::FlowKind,
};

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";
/// `base64("client-it:secret-it")`.
pub const BASIC_AUTHORIZATION: &str = "Basic Y2xpZW50LWl0OnNlY3JldC1pdA==";

/// Reqwest client that also accepts the self-signed certificates `httpmock` serves over HTTPS.
pub fn test_reqwest_http_client() -> ReqwestHttpClient {
	let client = reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

pub fn mock_url(server: &MockServer, path: &str) -> Url {
	Url::parse(&server.url(path)).expect("Mock server URL should parse.")
}

pub fn direct_backend(
	server: &MockServer,
	secret: Option<&str>,
	client_auth: ClientAuthMethod,
) -> ReqwestDirectBackend {
	let mut builder = DirectDescriptor::builder(CLIENT_ID)
		.token_endpoint(mock_url(server, "/api/token"))
		.client_auth(client_auth);

	if let Some(secret) = secret {
		builder = builder.client_secret(secret);
	}

	let descriptor = builder.build().expect("Direct descriptor should validate.");

	ReqwestDirectBackend::with_http_client(
		descriptor,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
}

pub fn delegated_backend(server: &MockServer) -> ReqwestDelegatedBackend {
	let descriptor = DelegatedDescriptor::new(
		CLIENT_ID,
		mock_url(server, "/swap"),
		mock_url(server, "/refresh"),
	)
	.expect("Delegated descriptor should validate.");

	ReqwestDelegatedBackend::with_http_client(
		descriptor,
		test_reqwest_http_client(),
		ReqwestTransportErrorMapper,
	)
}

pub fn token_response(
	access_token: &str,
	refresh_token: Option<&str>,
	expires_in: u64,
	scope: Option<&str>,
) -> TokenResponse {
	TokenResponse {
		access_token: TokenSecret::new(access_token),
		token_type: Some("Bearer".into()),
		scope: scope.map(str::to_owned),
		expires_in: Some(expires_in),
		refresh_token: refresh_token.map(TokenSecret::new),
	}
}

/// In-process backend that counts requests and replays scripted outcomes.
///
/// Once the script runs dry every request succeeds with `access-<n>`. Each request waits for
/// `delay` first so concurrent callers overlap.
pub struct ScriptedBackend {
	calls: AtomicUsize,
	grants: Mutex<Vec<FlowKind>>,
	script: Mutex<VecDeque<Result<TokenResponse>>>,
	delay: StdDuration,
}
impl ScriptedBackend {
	pub fn new() -> Self {
		Self {
			calls: AtomicUsize::new(0),
			grants: Mutex::new(Vec::new()),
			script: Mutex::new(VecDeque::new()),
			delay: StdDuration::ZERO,
		}
	}

	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = delay;

		self
	}

	pub fn then(self, outcome: Result<TokenResponse>) -> Self {
		self.script.lock().push_back(outcome);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn grants(&self) -> Vec<FlowKind> {
		self.grants.lock().clone()
	}

	fn respond(&self, flow: FlowKind) -> BackendFuture<'_, TokenResponse> {
		let n = self.calls.fetch_add(1, Ordering::SeqCst);

		self.grants.lock().push(flow);

		let outcome = self.script.lock().pop_front().unwrap_or_else(|| {
			Ok(token_response(&format!("access-{n}"), None, 3600, None))
		});
		let delay = self.delay;

		Box::pin(async move {
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			outcome
		})
	}
}
impl TokenBackend for ScriptedBackend {
	fn descriptor(&self) -> BackendDescriptor {
		DirectDescriptor::builder(CLIENT_ID)
			.client_secret(CLIENT_SECRET)
			.build()
			.expect("Scripted descriptor should validate.")
			.into()
	}

	fn exchange<'a>(&'a self, grant: Grant<'a>) -> BackendFuture<'a, TokenResponse> {
		self.respond(grant.flow())
	}
}
impl RefreshingBackend for ScriptedBackend {
	fn refresh<'a>(
		&'a self,
		flow: FlowKind,
		_refresh_token: &'a str,
	) -> BackendFuture<'a, TokenResponse> {
		self.respond(flow)
	}
}

/// Collects every event the manager's notifier delivers while the subscription lives.
pub fn record_events<F>(
	manager: &AuthorizationManager<F>,
) -> (Arc<Mutex<Vec<AuthorizationEvent>>>, Subscription)
where
	F: Flow,
{
	let events = Arc::new(Mutex::new(Vec::new()));
	let sink = events.clone();
	let subscription = manager.subscribe(move |event| sink.lock().push(event));

	(events, subscription)
}
