mod common;

// std
use std::{fs, path::Path};
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::*;
use graph_mailer::{
	cache::TokenCache,
	error::{Error, TokenError},
	flows::{TokenAcquirer, TokenRequest},
	http::HttpClient,
	registry::IdentityRegistry,
};

// Occupies the cache path with a non-empty directory so the atomic replace fails.
fn block_cache_path(path: &Path) {
	fs::remove_file(path).expect("Seeded cache should be removable.");
	fs::create_dir_all(path.join("occupied")).expect("Blocking directory should be created.");
}

#[tokio::test]
async fn unauthorized_then_accepted_refreshes_once_and_persists_rotation() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("rotation");

	seed_cache(&cache_path, "refresh-one");

	let first_refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-one");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("stale-token", Some("refresh-two")));
		})
		.await;
	let second_refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-two");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("fresh-token", Some("refresh-three")));
		})
		.await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(POST).path(ME_SEND_PATH).header("authorization", "Bearer stale-token");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(POST).path(ME_SEND_PATH).header("authorization", "Bearer fresh-token");
			then.status(202).header("request-id", "req-me");
		})
		.await;
	let (transport, sleeper) = transport(graph_config(&server, "delegated", Some(&cache_path)));
	let report = transport.deliver(&message()).await.expect("Second attempt should be accepted.");

	assert_eq!(report.attempts.len(), 2);
	assert_eq!(report.request_id.as_deref(), Some("req-me"));
	assert_eq!(sleeper.waits(), [Duration::seconds(1)]);

	first_refresh.assert_calls_async(1).await;
	second_refresh.assert_calls_async(1).await;
	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;

	let persisted = TokenCache::load(&cache_path).expect("Persisted cache should reload.");

	assert_eq!(
		persisted.single_account().expect("Account should be cached.").refresh_token.expose(),
		"refresh-three"
	);

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;

		let mode = fs::metadata(&cache_path).expect("Cache metadata should load.").permissions().mode();

		assert_eq!(mode & 0o777, 0o600);
	}

	let handle = transport
		.registry()
		.get(&transport.config().identity)
		.expect("The delegated handle should be registered.");

	assert!(!handle.lock_state().await.cache.has_state_changed());
}

#[tokio::test]
async fn empty_cache_requires_interactive_setup_without_network() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("never-issued", None));
		})
		.await;
	let cache_path = scratch_path("empty");
	let (transport, _sleeper) = transport(graph_config(&server, "delegated", Some(&cache_path)));
	let err = transport.deliver(&message()).await.expect_err("An empty cache cannot refresh.");

	assert!(matches!(err, Error::Token(TokenError::NoCachedIdentity)));
	assert!(!cache_path.exists(), "Nothing changed, so nothing is written.");

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn revoked_refresh_material_maps_to_invalid_grant() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("revoked");

	seed_cache(&cache_path, "refresh-revoked");

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("refresh_token=refresh-revoked");
			then.status(400).header("content-type", "application/json").body(
				r#"{"error":"invalid_grant","error_description":"AADSTS700082: The refresh token has expired due to inactivity."}"#,
			);
		})
		.await;
	let original = fs::read(&cache_path).expect("Seeded cache should be readable.");
	let (transport, _sleeper) = transport(graph_config(&server, "delegated", Some(&cache_path)));
	let err = transport.deliver(&message()).await.expect_err("Revoked material should fail.");

	match &err {
		Error::Token(TokenError::InvalidGrant { reason }) =>
			assert!(reason.starts_with("AADSTS700082")),
		other => panic!("Expected an invalid grant error, got {other:?}."),
	}
	assert!(!err.to_string().contains("refresh-revoked"));
	assert_eq!(fs::read(&cache_path).expect("Cache should be readable."), original);

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_acquisitions_share_one_refresh() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("singleflight");

	seed_cache(&cache_path, "refresh-shared");

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("shared-token", None));
		})
		.await;
	let config = graph_config(&server, "delegated", Some(&cache_path));
	let registry = IdentityRegistry::new();
	let handle = registry.get_or_create(&config).expect("Handle should build.");
	let acquirer = TokenAcquirer::new(
		HttpClient::new(config.request_timeout).expect("HTTP client should build."),
		Default::default(),
	);
	let (first, second) = tokio::join!(
		acquirer.acquire(&handle, TokenRequest::new()),
		acquirer.acquire(&handle, TokenRequest::new()),
	);

	assert_eq!(first.expect("First acquisition should succeed.").secret(), "shared-token");
	assert_eq!(second.expect("Second acquisition should succeed.").secret(), "shared-token");

	// Without rotation the cache stays clean and is not rewritten.
	assert!(!handle.lock_state().await.cache.has_state_changed());

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_cache_write_does_not_abort_delivery() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("unwritable");

	seed_cache(&cache_path, "refresh-one");

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("refresh_token=refresh-one");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("rotated-token", Some("refresh-two")));
		})
		.await;
	let send = server
		.mock_async(|when, then| {
			when.method(POST).path(ME_SEND_PATH).header("authorization", "Bearer rotated-token");
			then.status(202).header("request-id", "req-unwritable");
		})
		.await;
	let (transport, _sleeper) = transport(graph_config(&server, "delegated", Some(&cache_path)));

	block_cache_path(&cache_path);

	let report = transport
		.deliver(&message())
		.await
		.expect("A failed cache write should not fail the send.");

	assert_eq!(report.attempts.len(), 1);
	assert_eq!(report.attempts[0].status, Some(202));
	assert_eq!(report.request_id.as_deref(), Some("req-unwritable"));

	let handle = transport
		.registry()
		.get(&transport.config().identity)
		.expect("The delegated handle should be registered.");
	let state = handle.lock_state().await;

	assert!(state.cache.has_state_changed(), "The rotation must stay pending.");
	assert_eq!(
		state.cache.single_account().expect("Account should be cached.").refresh_token.expose(),
		"refresh-two"
	);
	assert!(cache_path.is_dir());

	token.assert_calls_async(1).await;
	send.assert_calls_async(1).await;
}

#[tokio::test]
async fn reused_token_retries_a_pending_cache_write() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("pending");

	seed_cache(&cache_path, "refresh-one");

	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).body_includes("refresh_token=refresh-one");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("cached-token", Some("refresh-two")));
		})
		.await;
	let config = graph_config(&server, "delegated", Some(&cache_path));
	let registry = IdentityRegistry::new();
	let handle = registry.get_or_create(&config).expect("Handle should build.");
	let acquirer = TokenAcquirer::new(
		HttpClient::new(config.request_timeout).expect("HTTP client should build."),
		Default::default(),
	);

	block_cache_path(&cache_path);

	let first = acquirer
		.acquire(&handle, TokenRequest::new())
		.await
		.expect("Refresh should succeed even though the write fails.");

	assert!(handle.lock_state().await.cache.has_state_changed());

	fs::remove_dir_all(&cache_path).expect("Blocking directory should be removable.");

	let second = acquirer
		.acquire(&handle, TokenRequest::new())
		.await
		.expect("The in-memory token should be reused.");

	assert_eq!(second.secret(), first.secret());
	assert!(!handle.lock_state().await.cache.has_state_changed());
	assert_eq!(
		TokenCache::load(&cache_path)
			.expect("Retried write should produce a readable cache.")
			.single_account()
			.expect("Account should be cached.")
			.refresh_token
			.expose(),
		"refresh-two"
	);

	token.assert_calls_async(1).await;
}
