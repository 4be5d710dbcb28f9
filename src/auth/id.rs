//! Directory identifiers: the tenant segment of the authority URL and the app registration id.

// self
use crate::_prelude::*;

const CLIENT_ID_MAX_LEN: usize = 128;
const DOMAIN_MAX_LEN: usize = 253;
const LABEL_MAX_LEN: usize = 63;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (tenant, client).
		kind: &'static str,
	},
	/// The tenant is none of the forms the authority accepts.
	#[error(
		"Tenant must be a directory GUID, a domain name, or one of `common`, `organizations`, `consumers`."
	)]
	UnsupportedTenant,
	/// The client identifier contains characters that cannot be sent as a form value.
	#[error("Client identifier must be printable ASCII without whitespace, at most {max} characters.")]
	MalformedClient {
		/// Maximum permitted length.
		max: usize,
	},
}

/// Form of a [`TenantId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TenantKind {
	/// Directory object GUID.
	Guid,
	/// Verified domain of the directory (`contoso.onmicrosoft.com`).
	Domain,
	/// Work, school, and personal accounts (`common`).
	Common,
	/// Work and school accounts only (`organizations`).
	Organizations,
	/// Personal Microsoft accounts only (`consumers`).
	Consumers,
}

/// Directory tenant, normalized to lowercase.
///
/// The value is interpolated into the token endpoint path, so only the forms the identity
/// platform routes are accepted.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId {
	value: String,
	kind: TenantKind,
}
impl TenantId {
	/// Parses and classifies a tenant.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let value = value.as_ref().to_ascii_lowercase();

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: "Tenant" });
		}

		let kind = match value.as_str() {
			"common" => TenantKind::Common,
			"organizations" => TenantKind::Organizations,
			"consumers" => TenantKind::Consumers,
			v if is_guid(v) => TenantKind::Guid,
			v if is_domain(v) => TenantKind::Domain,
			_ => return Err(IdentifierError::UnsupportedTenant),
		};

		Ok(Self { value, kind })
	}

	/// Form of the tenant.
	pub fn kind(&self) -> TenantKind {
		self.kind
	}

	/// Path segment used in the authority URL.
	pub fn as_str(&self) -> &str {
		&self.value
	}
}
impl From<TenantId> for String {
	fn from(tenant: TenantId) -> Self {
		tenant.value
	}
}
impl TryFrom<String> for TenantId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for TenantId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for TenantId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Tenant({:?}: {})", self.kind, self.value)
	}
}
impl Display for TenantId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.value)
	}
}

/// Application (client) identifier of an app registration, sent as the `client_id` form value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);
impl ClientId {
	/// Validates a client identifier.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let value = value.as_ref();

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind: "Client" });
		}
		if value.len() > CLIENT_ID_MAX_LEN || !value.bytes().all(|b| b.is_ascii_graphic()) {
			return Err(IdentifierError::MalformedClient { max: CLIENT_ID_MAX_LEN });
		}

		Ok(Self(value.to_owned()))
	}

	/// Identifier as registered.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Client({})", self.0)
	}
}
impl Display for ClientId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

// 8-4-4-4-12 hex groups.
fn is_guid(value: &str) -> bool {
	value.len() == 36
		&& value.char_indices().all(|(i, c)| match i {
			8 | 13 | 18 | 23 => c == '-',
			_ => c.is_ascii_hexdigit(),
		})
}

fn is_domain(value: &str) -> bool {
	if value.len() > DOMAIN_MAX_LEN || !value.contains('.') {
		return false;
	}

	let labels_ok = value.split('.').all(|label| {
		!label.is_empty()
			&& label.len() <= LABEL_MAX_LEN
			&& !label.starts_with('-')
			&& !label.ends_with('-')
			&& label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
	});
	// A numeric top-level label would be an IPv4 literal, not a directory domain.
	let tld_ok = value.rsplit('.').next().is_some_and(|tld| tld.bytes().any(|b| b.is_ascii_alphabetic()));

	labels_ok && tld_ok
}
