#![cfg(feature = "reqwest")]

mod common;

// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::*;
use oauth2_steward::{
	auth::{Credential, Scope, ScopeSet},
	backend::{ClientAuthMethod, TokenBackend},
	error::{DecodingError, Error, LocalError},
	flows::{
		AuthorizationCodeFlow, AuthorizationManager, AuthorizationState, ManagerConfig,
		PersistedState,
	},
	notify::AuthorizationEvent,
};

const TOKEN_BODY: &str = r#"{"access_token":"access-success","token_type":"Bearer","scope":"user-read-email user-read-private","expires_in":3600,"refresh_token":"refresh-success"}"#;

fn redirect(query: &str) -> url::Url {
	url::Url::parse(&format!("http://127.0.0.1:8888/callback?{query}"))
		.expect("Redirect fixture should parse.")
}

#[tokio::test]
async fn exchange_uses_basic_auth_and_stores_the_credential() {
	let server = MockServer::start_async().await;
	let manager = AuthorizationManager::new(AuthorizationCodeFlow::new(direct_backend(
		&server,
		Some(CLIENT_SECRET),
		ClientAuthMethod::ClientSecretBasic,
	)));
	let (events, _subscription) = record_events(&manager);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.header("authorization", BASIC_AUTHORIZATION)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "code-123")
				.form_urlencoded_tuple("redirect_uri", "http://127.0.0.1:8888/callback");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;

	manager
		.request_access_and_refresh_tokens(&redirect("code=code-123&state=xyz"), Some("xyz"))
		.await
		.expect("Authorization code exchange should succeed.");

	mock.assert_calls_async(1).await;

	let credential = manager.credential().expect("Credential should be stored.");

	assert_eq!(credential.access_token.expose(), "access-success");
	assert_eq!(
		credential.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-success")
	);
	assert_eq!(credential.scopes, ScopeSet::from([Scope::UserReadEmail, Scope::UserReadPrivate]));
	assert_eq!(manager.state(), AuthorizationState::Authorized);
	assert_eq!(*events.lock(), vec![AuthorizationEvent::Changed]);
}

#[tokio::test]
async fn client_secret_post_moves_credentials_into_the_body() {
	let server = MockServer::start_async().await;
	let manager = AuthorizationManager::new(AuthorizationCodeFlow::new(direct_backend(
		&server,
		Some(CLIENT_SECRET),
		ClientAuthMethod::ClientSecretPost,
	)));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.header_missing("authorization")
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("client_secret", CLIENT_SECRET);
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;

	manager
		.request_access_and_refresh_tokens(&redirect("code=abc"), None)
		.await
		.expect("Authorization code exchange should succeed.");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn unrequested_state_in_the_redirect_is_rejected_before_exchange() {
	let server = MockServer::start_async().await;
	let manager = AuthorizationManager::new(AuthorizationCodeFlow::new(direct_backend(
		&server,
		Some(CLIENT_SECRET),
		ClientAuthMethod::ClientSecretBasic,
	)));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await;
	let err = manager
		.request_access_and_refresh_tokens(&redirect("code=c&state=attacker"), None)
		.await
		.expect_err("A state the application never sent must fail.");

	mock.assert_calls_async(0).await;

	assert!(matches!(
		err,
		Error::Local(LocalError::InvalidState { supplied: None, received: Some(ref received) })
			if received == "attacker"
	));
	assert_eq!(manager.state(), AuthorizationState::Unauthorized);
}

#[tokio::test]
async fn exchange_without_refresh_token_is_rejected() {
	let server = MockServer::start_async().await;
	let manager = AuthorizationManager::new(AuthorizationCodeFlow::new(direct_backend(
		&server,
		Some(CLIENT_SECRET),
		ClientAuthMethod::ClientSecretBasic,
	)));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"a","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let err = manager
		.request_access_and_refresh_tokens(&redirect("code=abc"), None)
		.await
		.expect_err("User flows require a refresh token.");

	mock.assert_calls_async(1).await;

	assert!(matches!(
		err,
		Error::Decoding(DecodingError::MissingField { field: "refresh_token" })
	));
	assert!(manager.credential().is_none());
}

#[tokio::test]
async fn invalid_grant_on_exchange_leaves_the_manager_unauthorized() {
	let server = MockServer::start_async().await;
	let manager = AuthorizationManager::new(AuthorizationCodeFlow::new(direct_backend(
		&server,
		Some(CLIENT_SECRET),
		ClientAuthMethod::ClientSecretBasic,
	)));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#);
		})
		.await;
	let err = manager
		.request_access_and_refresh_tokens(&redirect("code=stale"), None)
		.await
		.expect_err("Invalid codes should be rejected.");

	mock.assert_calls_async(1).await;

	match err {
		Error::Authentication(err) => {
			assert_eq!(err.error, "invalid_grant");
			assert_eq!(err.description.as_deref(), Some("Invalid authorization code"));
			assert_eq!(err.status, Some(400));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(manager.state(), AuthorizationState::Unauthorized);
}

#[tokio::test]
async fn refresh_keeps_the_previous_refresh_token_and_scopes() {
	let server = MockServer::start_async().await;
	let backend =
		direct_backend(&server, Some(CLIENT_SECRET), ClientAuthMethod::ClientSecretBasic);
	let stale = Credential::new("stale-access")
		.with_refresh_token("long-lived")
		.with_expiration_date(time::OffsetDateTime::now_utc() - Duration::minutes(1))
		.with_scopes(ScopeSet::from([Scope::Streaming]));
	let persisted = PersistedState { backend: backend.descriptor(), credential: Some(stale) };
	let manager = AuthorizationManager::restore(
		AuthorizationCodeFlow::new(backend),
		persisted,
		ManagerConfig::default(),
	)
	.expect("Persisted state should restore.");
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/token")
				.header("authorization", BASIC_AUTHORIZATION)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "long-lived");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"renewed","token_type":"Bearer","expires_in":3600}"#);
		})
		.await;
	let token = manager
		.valid_token(&ScopeSet::from([Scope::Streaming]))
		.await
		.expect("Stale credential should refresh.");

	mock.assert_calls_async(1).await;

	assert_eq!(token.expose(), "renewed");

	let credential = manager.credential().expect("Credential should remain.");

	assert_eq!(credential.refresh_token.as_ref().map(|secret| secret.expose()), Some("long-lived"));
	assert_eq!(credential.scopes, ScopeSet::from([Scope::Streaming]));
}
