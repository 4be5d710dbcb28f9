//! Credential flow kinds and the identity key that selects a client handle.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, TenantId},
};

/// Credential flow used to obtain access tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
	/// App-only tokens minted with the client secret (`client_credentials`).
	#[default]
	#[serde(rename = "client_credentials")]
	ServiceIdentity,
	/// Tokens refreshed silently on behalf of a previously consented account.
	#[serde(rename = "delegated")]
	Delegated,
}
impl FlowKind {
	/// Returns the configuration value naming the flow.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ServiceIdentity => "client_credentials",
			FlowKind::Delegated => "delegated",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for FlowKind {
	type Err = UnknownFlowKind;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"client_credentials" => Ok(FlowKind::ServiceIdentity),
			"delegated" => Ok(FlowKind::Delegated),
			other => Err(UnknownFlowKind(other.to_owned())),
		}
	}
}

/// Error returned when a flow name is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown flow `{0}`.")]
pub struct UnknownFlowKind(pub String);

/// Selects exactly one [`ClientHandle`](crate::registry::ClientHandle) per process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityKey {
	/// Directory tenant.
	pub tenant: TenantId,
	/// App registration.
	pub client: ClientId,
	/// Credential flow.
	pub flow: FlowKind,
}
impl IdentityKey {
	/// Builds a key for the provided tenant/client/flow tuple.
	pub fn new(tenant: TenantId, client: ClientId, flow: FlowKind) -> Self {
		Self { tenant, client, flow }
	}
}
impl Display for IdentityKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}/{}", self.tenant, self.client, self.flow)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn flow_kind_parses_configuration_values() {
		assert_eq!("client_credentials".parse::<FlowKind>(), Ok(FlowKind::ServiceIdentity));
		assert_eq!("delegated".parse::<FlowKind>(), Ok(FlowKind::Delegated));
		assert_eq!(
			"interactive".parse::<FlowKind>(),
			Err(UnknownFlowKind("interactive".into()))
		);
		assert_eq!(FlowKind::default(), FlowKind::ServiceIdentity);
	}

	#[test]
	fn flow_kind_serde_uses_configuration_values() {
		let payload =
			serde_json::to_string(&FlowKind::Delegated).expect("Flow kind should serialize.");

		assert_eq!(payload, "\"delegated\"");

		let parsed: FlowKind = serde_json::from_str("\"client_credentials\"")
			.expect("Flow kind should deserialize.");

		assert_eq!(parsed, FlowKind::ServiceIdentity);
	}

	#[test]
	fn identity_keys_distinguish_flows() {
		let tenant = TenantId::new("consumers").expect("Tenant fixture should be valid.");
		let client = ClientId::new("client-1").expect("Client fixture should be valid.");
		let service = IdentityKey::new(tenant.clone(), client.clone(), FlowKind::ServiceIdentity);
		let delegated = IdentityKey::new(tenant, client, FlowKind::Delegated);

		assert_ne!(service, delegated);
		assert_eq!(delegated.to_string(), "consumers/client-1/delegated");
	}
}
