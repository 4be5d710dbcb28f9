// self
use crate::{auth::FlowKind, obs::FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"graph_mailer_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records one `sendMail` attempt labeled by HTTP status (`transport_error` when none).
pub fn record_delivery_attempt(status: Option<u16>) {
	#[cfg(feature = "metrics")]
	{
		let status = status.map_or_else(|| "transport_error".to_owned(), |code| code.to_string());

		metrics::counter!("graph_mailer_delivery_attempt_total", "status" => status).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = status;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_noops_without_a_global_recorder() {
		record_flow_outcome(FlowKind::Delegated, FlowOutcome::Failure);
		record_delivery_attempt(Some(429));
		record_delivery_attempt(None);
	}
}
