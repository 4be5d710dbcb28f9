#![allow(dead_code)]

// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
	sync::Arc,
};
// crates.io
use httpmock::prelude::*;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use graph_mailer::{
	auth::{TenantId, TokenSecret},
	cache::{CachedAccount, TokenCache},
	config::{self, GraphConfig, MailSettings},
	delivery::{OutboundMessage, SleepFuture, Sleeper},
	transport::GraphTransport,
	url::Url,
};

pub const TENANT: &str = "contoso.onmicrosoft.com";
pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";
pub const SENDER: &str = "noreply@contoso.com";
pub const TOKEN_PATH: &str = "/contoso.onmicrosoft.com/oauth2/v2.0/token";
pub const APP_SEND_PATH: &str = "/v1.0/users/noreply@contoso.com/sendMail";
pub const ME_SEND_PATH: &str = "/v1.0/me/sendMail";

/// Records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
	waits: Mutex<Vec<Duration>>,
}
impl RecordingSleeper {
	pub fn waits(&self) -> Vec<Duration> {
		self.waits.lock().clone()
	}
}
impl Sleeper for RecordingSleeper {
	fn sleep(&self, wait: Duration) -> SleepFuture<'_> {
		self.waits.lock().push(wait);

		Box::pin(async {})
	}
}

pub fn settings(server: &MockServer, flow: &str, cache: Option<&Path>) -> MailSettings {
	MailSettings {
		enabled: true,
		flow: flow.into(),
		tenant_id: TENANT.into(),
		client_id: CLIENT_ID.into(),
		client_secret: TokenSecret::new(CLIENT_SECRET),
		sender_email: SENDER.into(),
		token_cache_file: cache.map(Path::to_path_buf),
		api_base: Url::parse(&server.url("/v1.0")).expect("Mock API base should parse."),
		authority: Url::parse(&server.base_url()).expect("Mock authority should parse."),
		..MailSettings::default()
	}
}

pub fn graph_config(server: &MockServer, flow: &str, cache: Option<&Path>) -> GraphConfig {
	config::validate(&settings(server, flow, cache)).expect("Mock settings should validate.")
}

pub fn transport(config: GraphConfig) -> (GraphTransport, Arc<RecordingSleeper>) {
	let sleeper = Arc::new(RecordingSleeper::default());
	let transport = GraphTransport::new(config)
		.expect("Transport should build against the mock server.")
		.with_sleeper(sleeper.clone());

	(transport, sleeper)
}

pub fn token_body(access_token: &str, refresh_token: Option<&str>) -> String {
	match refresh_token {
		Some(refresh) => format!(
			r#"{{"access_token":"{access_token}","token_type":"Bearer","expires_in":3599,"refresh_token":"{refresh}"}}"#
		),
		None => format!(
			r#"{{"access_token":"{access_token}","token_type":"Bearer","expires_in":3599}}"#
		),
	}
}

pub fn message() -> OutboundMessage {
	OutboundMessage::new("Your upload was published", SENDER)
		.with_to("author@example.org")
		.with_html("<p>Published.</p>")
}

pub fn scratch_path(label: &str) -> PathBuf {
	let dir = env::temp_dir().join(format!(
		"graph_mailer_it_{label}_{}_{}",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	));

	fs::create_dir_all(&dir).expect("Scratch directory should be created.");

	dir.join("token_cache.json")
}

pub fn seed_cache(path: &Path, refresh_token: &str) {
	let mut cache = TokenCache::default();

	cache.insert_account(CachedAccount::new(
		"uid.utid",
		SENDER,
		TenantId::new(TENANT).expect("Tenant fixture should be valid."),
		refresh_token,
	));
	fs::write(path, cache.serialize().expect("Cache fixture should serialize."))
		.expect("Cache fixture should be written.");
}
