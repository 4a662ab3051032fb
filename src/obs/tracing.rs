// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome, TokenCall, record_flow_outcome},
};

/// Emits a `tracing` event under the `oauth2_steward` target; expands to nothing without the
/// feature, so arguments must not carry side effects.
macro_rules! flow_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		::tracing::$level!(target: "oauth2_steward", $($arg)+);
	}};
}
pub(crate) use flow_event;

/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span around one call to a token endpoint.
///
/// The span is named `oauth2_steward.token_call` and carries `flow`, `via` (`direct`,
/// `delegated`, or `manager` for the outer span a flow manager opens around an exchange), and
/// `call`. Only labels are recorded; codes, verifiers, and tokens never enter a span.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	call: TokenCall,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `call` made on behalf of `kind` through `via`.
	pub fn new(kind: FlowKind, via: &'static str, call: TokenCall) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_steward.token_call",
				flow = kind.as_str(),
				via,
				call = call.as_str()
			);

			Self { kind, call, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = via;

			Self { kind, call }
		}
	}

	/// Runs `fut` inside the span without holding an entered guard across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Instruments `fut` and counts it as one attempt that either succeeds or fails.
	///
	/// Failures raised before the request leaves (e.g. a missing client secret) count too.
	pub async fn track<T, Fut>(self, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		record_flow_outcome(self.kind, FlowOutcome::Attempt);

		let result = self.instrument(fut).await;

		match &result {
			Ok(_) => record_flow_outcome(self.kind, FlowOutcome::Success),
			Err(err) => {
				record_flow_outcome(self.kind, FlowOutcome::Failure);
				flow_event!(
					debug,
					flow = self.kind.as_str(),
					call = self.call.as_str(),
					retryable = err.is_retryable(),
					"Token call failed."
				);

				#[cfg(not(feature = "tracing"))]
				let _ = (err, self.call);
			},
		}

		result
	}
}
