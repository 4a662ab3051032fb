// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented by [`record_flow_outcome`], labeled by `flow` and `outcome`.
pub const FLOW_COUNTER: &str = "oauth2_steward_flow_total";

/// Counts one outcome for `kind`.
///
/// Backends report `attempt`, `success`, and `failure` through
/// [`FlowSpan::track`](crate::obs::FlowSpan::track). Flow managers report `joined` for every
/// caller that waits on a renewal already in flight, so `joined / attempt` shows how much the
/// single-flight refresh saves. Does nothing without the `metrics` feature.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}
