mod common;

// std
use std::{fs, sync::Arc};
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
// self
use common::*;
use graph_mailer::{
	cache::CachePersistence,
	delivery::OutboundMessage,
	error::{ConfigError, Error, TokenError},
	registry::IdentityRegistry,
	transport::{GraphTransport, MailTransport, SendFuture, select_transport},
};

#[derive(Debug, Default)]
struct RecordingTransport {
	subjects: Mutex<Vec<String>>,
}
impl MailTransport for RecordingTransport {
	fn send<'a>(&'a self, message: &'a OutboundMessage) -> SendFuture<'a> {
		self.subjects.lock().push(message.subject.clone());

		Box::pin(async { Ok(()) })
	}
}

#[tokio::test]
async fn disabled_settings_keep_the_direct_transport() {
	let server = MockServer::start_async().await;
	let catch_all = server
		.mock_async(|when, then| {
			when.method(POST);
			then.status(500);
		})
		.await;
	let direct = Arc::new(RecordingTransport::default());
	let settings = graph_mailer::config::MailSettings {
		enabled: false,
		..settings(&server, "client_credentials", None)
	};
	let selected =
		select_transport(&settings, direct.clone()).expect("Disabled settings should not fail.");

	selected.send(&message()).await.expect("Direct transport should accept the message.");

	assert_eq!(*direct.subjects.lock(), ["Your upload was published"]);

	catch_all.assert_calls_async(0).await;
}

#[tokio::test]
async fn enabled_settings_route_through_graph() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("selected-token", None));
		})
		.await;
	let send = server
		.mock_async(|when, then| {
			when.method(POST).path(APP_SEND_PATH).header("authorization", "Bearer selected-token");
			then.status(202);
		})
		.await;
	let direct = Arc::new(RecordingTransport::default());
	let selected = select_transport(&settings(&server, "client_credentials", None), direct.clone())
		.expect("Enabled settings should select Graph.");

	selected.send(&message()).await.expect("Graph delivery should succeed.");

	assert!(direct.subjects.lock().is_empty());

	token.assert_calls_async(1).await;
	send.assert_calls_async(1).await;
}

#[tokio::test]
async fn invalid_settings_fail_selection() {
	let server = MockServer::start_async().await;
	let direct = Arc::new(RecordingTransport::default());
	let settings = graph_mailer::config::MailSettings {
		client_secret: Default::default(),
		..settings(&server, "client_credentials", None)
	};
	let err = select_transport(&settings, direct)
		.err()
		.expect("A missing client secret should fail selection.");

	assert!(matches!(
		err,
		Error::Config(ConfigError::MissingSetting { setting: "client_secret" })
	));
}

#[tokio::test]
async fn concurrent_sends_share_one_token_acquisition() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("shared-token", None));
		})
		.await;
	let send = server
		.mock_async(|when, then| {
			when.method(POST).path(APP_SEND_PATH);
			then.status(202);
		})
		.await;
	let (transport, _sleeper) = transport(graph_config(&server, "client_credentials", None));
	let first = message();
	let second = message().with_to("editor@example.org");
	let (a, b) = tokio::join!(transport.deliver(&first), transport.deliver(&second));

	a.expect("First send should succeed.");
	b.expect("Second send should succeed.");

	token.assert_calls_async(1).await;
	send.assert_calls_async(2).await;
}

#[tokio::test]
async fn transports_sharing_a_registry_share_the_handle() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("registry-token", None));
		})
		.await;
	let send = server
		.mock_async(|when, then| {
			when.method(POST).path(APP_SEND_PATH);
			then.status(202);
		})
		.await;
	let registry = Arc::new(IdentityRegistry::new());
	let persistence = Arc::new(CachePersistence::new());
	let config = graph_config(&server, "client_credentials", None);
	let first = GraphTransport::with_shared(config.clone(), registry.clone(), persistence.clone())
		.expect("First transport should build.");
	let second = GraphTransport::with_shared(config, registry.clone(), persistence)
		.expect("Second transport should build.");

	assert_eq!(registry.len(), 1);

	first.deliver(&message()).await.expect("First transport should deliver.");
	second.deliver(&message()).await.expect("Second transport should deliver.");

	token.assert_calls_async(1).await;
	send.assert_calls_async(2).await;
}

#[tokio::test]
async fn corrupt_cache_fails_construction() {
	let server = MockServer::start_async().await;
	let cache_path = scratch_path("corrupt");

	fs::write(&cache_path, b"{ not json").expect("Corrupt fixture should be written.");

	let err = GraphTransport::new(graph_config(&server, "delegated", Some(&cache_path)))
		.err()
		.expect("A corrupt cache should fail construction.");

	match err {
		Error::Token(TokenError::CacheLoad { path, .. }) => assert_eq!(path, cache_path),
		other => panic!("Expected a cache load error, got {other:?}."),
	}
}
