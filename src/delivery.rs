//! Delivery of outbound messages through the Graph `sendMail` endpoint.
//!
//! [`GraphDelivery::deliver`] runs a bounded retry loop of [`MAX_ATTEMPTS`] attempts:
//!
//! - `202 Accepted` succeeds.
//! - `401` forces a fresh token acquisition, then waits one second.
//! - `429` waits for the `Retry-After` hint, falling back to `2^attempt` seconds.
//! - `500`, `502`, `503`, and `504` wait `2^attempt` seconds.
//! - Transport failures wait `2^attempt` seconds and retry with the same token.
//! - Any other status fails immediately.
//!
//! Waits go through a [`Sleeper`] and never hold the handle's state lock.

pub mod message;
pub mod sleep;

pub use message::*;
pub use sleep::*;

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
// self
use crate::{
	_prelude::*,
	auth::FlowKind,
	config::GraphConfig,
	error::{ConfigError, DeliveryError},
	flows::{TokenAcquirer, TokenRequest},
	http::{self, HttpClient},
	obs::{self, FlowSpan},
	registry::ClientHandle,
};

/// Total attempts per delivery (one initial request plus two retries).
pub const MAX_ATTEMPTS: u32 = 3;

const ACCEPTED: u16 = 202;
const UNAUTHORIZED: u16 = 401;
const TOO_MANY_REQUESTS: u16 = 429;
const RETRYABLE_STATUSES: [u16; 6] = [401, 429, 500, 502, 503, 504];
const LOG_BODY_LIMIT: usize = 500;
const ERROR_BODY_LIMIT: usize = 200;
// Unreserved characters and `@` stay literal in the mailbox path segment.
const MAILBOX_SEGMENT: &AsciiSet =
	&NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~').remove(b'@');

/// One `sendMail` attempt as observed by the retry loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryAttempt {
	/// 1-based attempt number.
	pub attempt: u32,
	/// HTTP status, absent on transport failure.
	pub status: Option<u16>,
	/// Wait applied before the next attempt.
	pub wait: Option<Duration>,
}

/// Summary of a successful (or suppressed) delivery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
	/// Attempts performed, in order.
	pub attempts: Vec<DeliveryAttempt>,
	/// Provider correlation identifier of the accepted request.
	pub request_id: Option<String>,
	/// The message was accepted without being sent.
	pub suppressed: bool,
}
impl DeliveryReport {
	fn suppressed() -> Self {
		Self { suppressed: true, ..Default::default() }
	}

	/// Waits applied between attempts.
	pub fn waits(&self) -> Vec<Duration> {
		self.attempts.iter().filter_map(|attempt| attempt.wait).collect()
	}
}

/// Resolves the `sendMail` URL for `flow`.
///
/// Delegated tokens act as the signed-in account (`/me/sendMail`); app-only tokens address the
/// sender's mailbox explicitly (`/users/{sender}/sendMail`).
pub fn send_mail_endpoint(api_base: &Url, flow: FlowKind, sender: &str) -> Result<Url, ConfigError> {
	let base = api_base.as_str().trim_end_matches('/');
	let raw = match flow {
		FlowKind::Delegated => format!("{base}/me/sendMail"),
		FlowKind::ServiceIdentity =>
			format!("{base}/users/{}/sendMail", utf8_percent_encode(sender, MAILBOX_SEGMENT)),
	};

	Url::parse(&raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint: "sendMail", source })
}

/// Retry-aware `sendMail` client for one configured identity.
#[derive(Clone, Debug)]
pub struct GraphDelivery {
	http_client: HttpClient,
	acquirer: TokenAcquirer,
	endpoint: Url,
	sender: String,
	suppress_send: bool,
	sleeper: Arc<dyn Sleeper>,
}
impl GraphDelivery {
	/// Builds a delivery client for `config`.
	pub fn new(
		config: &GraphConfig,
		http_client: HttpClient,
		acquirer: TokenAcquirer,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			http_client,
			acquirer,
			endpoint: send_mail_endpoint(&config.api_base, config.flow(), &config.sender)?,
			sender: config.sender.clone(),
			suppress_send: config.suppress_send,
			sleeper: Arc::new(TokioSleeper),
		})
	}

	/// Replaces the wait primitive used between attempts.
	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = sleeper;

		self
	}

	/// Resolved `sendMail` URL.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Delivers `message` using tokens acquired for `handle`.
	///
	/// Suppressed deliveries and rejected messages never touch the network.
	pub async fn deliver(
		&self,
		handle: &ClientHandle,
		message: &OutboundMessage,
	) -> Result<DeliveryReport> {
		if self.suppress_send {
			tracing::debug!(subject = %message.subject, "Outbound message suppressed.");

			return Ok(DeliveryReport::suppressed());
		}

		message.check()?;

		let body = serde_json::to_vec(&message.payload(&self.sender)).map_err(DeliveryError::from)?;
		let span = FlowSpan::new(handle.key().flow, "deliver");

		span.instrument(self.send_with_retries(handle, message, body)).await
	}

	async fn send_with_retries(
		&self,
		handle: &ClientHandle,
		message: &OutboundMessage,
		body: Vec<u8>,
	) -> Result<DeliveryReport> {
		let mut token = self.acquirer.acquire(handle, TokenRequest::new()).await?;
		let mut attempts = Vec::new();
		let mut attempt = 0;

		loop {
			let number = attempt + 1;
			let exhausted = number == MAX_ATTEMPTS;
			let sent = self
				.http_client
				.inner()
				.post(self.endpoint.clone())
				.bearer_auth(token.secret())
				.header(CONTENT_TYPE, "application/json")
				.body(body.clone())
				.send()
				.await;
			let response = match sent {
				Ok(response) => response,
				Err(e) => {
					obs::record_delivery_attempt(None);
					tracing::warn!(error = %e, attempt = number, max_attempts = MAX_ATTEMPTS, "sendMail request failed.");

					if exhausted {
						return Err(
							DeliveryError::Transport { attempts: number, source: Box::new(e) }.into()
						);
					}

					let wait = backoff(attempt);

					attempts.push(DeliveryAttempt { attempt: number, status: None, wait: Some(wait) });
					self.sleeper.sleep(wait).await;

					attempt += 1;

					continue;
				},
			};
			let status = response.status().as_u16();
			let request_id = correlation_id(response.headers());

			obs::record_delivery_attempt(Some(status));

			if status == ACCEPTED {
				attempts.push(DeliveryAttempt { attempt: number, status: Some(status), wait: None });
				tracing::info!(
					recipients = message.recipient_count(),
					request_id = request_id.as_deref().unwrap_or("?"),
					"Message sent via Graph API."
				);
				tracing::debug!(to = ?message.to, subject = %message.subject, "Message sent via Graph API.");

				return Ok(DeliveryReport { attempts, request_id, suppressed: false });
			}

			let retry_after = http::parse_retry_after(response.headers());
			let text = response.text().await.unwrap_or_default();

			if !RETRYABLE_STATUSES.contains(&status) || exhausted {
				tracing::error!(
					status,
					request_id = request_id.as_deref().unwrap_or("?"),
					body = %truncate(&text, LOG_BODY_LIMIT),
					"sendMail failed."
				);

				let body = truncate(&text, ERROR_BODY_LIMIT);
				let err = if exhausted && RETRYABLE_STATUSES.contains(&status) {
					DeliveryError::Exhausted { status, request_id, body, attempts: number }
				} else {
					DeliveryError::Rejected { status, request_id, body }
				};

				return Err(err.into());
			}

			let wait = match status {
				UNAUTHORIZED => {
					tracing::warn!(attempt = number, "Graph API returned 401; re-acquiring token.");

					token = self.acquirer.acquire(handle, TokenRequest::new().force_refresh()).await?;

					Duration::seconds(1)
				},
				TOO_MANY_REQUESTS => retry_after.unwrap_or_else(|| backoff(attempt)),
				_ => backoff(attempt),
			};

			tracing::warn!(
				status,
				wait_secs = wait.as_seconds_f64(),
				attempt = number,
				max_attempts = MAX_ATTEMPTS,
				"Retrying sendMail."
			);
			attempts.push(DeliveryAttempt { attempt: number, status: Some(status), wait: Some(wait) });
			self.sleeper.sleep(wait).await;

			attempt += 1;
		}
	}
}

/// `2^attempt` seconds for the 0-based `attempt`.
fn backoff(attempt: u32) -> Duration {
	Duration::seconds(1_i64 << attempt.min(16))
}

fn correlation_id(headers: &HeaderMap) -> Option<String> {
	["request-id", "client-request-id"]
		.into_iter()
		.find_map(|name| headers.get(name)?.to_str().ok().map(str::to_owned))
}

fn truncate(text: &str, limit: usize) -> String {
	text.chars().take(limit).collect()
}
