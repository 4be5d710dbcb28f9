//! Observability helpers for token flows and deliveries.
//!
//! Every token acquisition runs inside a `graph_mailer.flow` span carrying the `flow`
//! (credential flow) and `stage` (call site) fields. With the `metrics` feature enabled,
//! `graph_mailer_flow_total{flow,outcome}` counts acquisitions and
//! `graph_mailer_delivery_attempt_total{status}` counts `sendMail` attempts.

mod metrics;
mod span;

pub use metrics::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each flow invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// A cached token satisfied the request.
	Reused,
	/// The provider issued a new token.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Reused => "reused",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
