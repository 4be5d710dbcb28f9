//! Mail transport selection.
//!
//! The host picks a transport once at startup with [`select_transport`]; sends never branch on
//! the feature flag again.

// self
use crate::{
	_prelude::*,
	auth::FlowKind,
	cache::CachePersistence,
	config::{self, GraphConfig, MailSettings},
	delivery::{DeliveryReport, GraphDelivery, OutboundMessage, Sleeper},
	error::ConfigError,
	flows::TokenAcquirer,
	http::HttpClient,
	registry::IdentityRegistry,
};

/// Boxed future returned by [`MailTransport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Contract for anything that can deliver an [`OutboundMessage`].
pub trait MailTransport
where
	Self: Send + Sync,
{
	/// Delivers `message`.
	fn send<'a>(&'a self, message: &'a OutboundMessage) -> SendFuture<'a>;
}

/// [`MailTransport`] delivering through the Microsoft Graph API.
#[derive(Debug)]
pub struct GraphTransport {
	config: GraphConfig,
	registry: Arc<IdentityRegistry>,
	delivery: GraphDelivery,
}
impl GraphTransport {
	/// Builds a transport with a private registry and persistence coordinator.
	pub fn new(config: GraphConfig) -> Result<Self> {
		Self::with_shared(config, Default::default(), Default::default())
	}

	/// Builds a transport sharing `registry` and `persistence` with other transports of the
	/// process.
	///
	/// The client handle is created eagerly, so an unreadable token cache fails here rather than
	/// on the first send.
	pub fn with_shared(
		config: GraphConfig,
		registry: Arc<IdentityRegistry>,
		persistence: Arc<CachePersistence>,
	) -> Result<Self> {
		let http_client = HttpClient::new(config.request_timeout)?;
		let acquirer = TokenAcquirer::new(http_client.clone(), persistence);
		let delivery = GraphDelivery::new(&config, http_client, acquirer)?;

		registry.get_or_create(&config)?;

		Ok(Self { config, registry, delivery })
	}

	/// Replaces the wait primitive used between delivery attempts.
	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.delivery = self.delivery.with_sleeper(sleeper);

		self
	}

	/// Validated configuration.
	pub fn config(&self) -> &GraphConfig {
		&self.config
	}

	/// Registry holding this transport's client handle.
	pub fn registry(&self) -> &Arc<IdentityRegistry> {
		&self.registry
	}

	/// Delivers `message` and returns the attempt report.
	pub async fn deliver(&self, message: &OutboundMessage) -> Result<DeliveryReport> {
		let handle = self.registry.get_or_create(&self.config)?;

		self.delivery.deliver(&handle, message).await
	}
}
impl MailTransport for GraphTransport {
	fn send<'a>(&'a self, message: &'a OutboundMessage) -> SendFuture<'a> {
		Box::pin(async move { self.deliver(message).await.map(|_| ()) })
	}
}

/// Chooses the transport for the process.
///
/// Disabled settings hand back `direct`; enabled settings are validated once and produce a
/// [`GraphTransport`]. For the delegated flow the token cache permissions are audited
/// (advisory warning only).
pub fn select_transport(
	settings: &MailSettings,
	direct: Arc<dyn MailTransport>,
) -> Result<Arc<dyn MailTransport>> {
	let config = match config::validate(settings) {
		Ok(config) => config,
		Err(ConfigError::Disabled) => {
			tracing::debug!("Graph mail delivery disabled; using the direct transport.");

			return Ok(direct);
		},
		Err(e) => return Err(e.into()),
	};

	if let (FlowKind::Delegated, Some(path)) = (config.flow(), config.token_cache_file.as_deref()) {
		config::audit_cache_permissions(path);
	}

	Ok(Arc::new(GraphTransport::new(config)?))
}
