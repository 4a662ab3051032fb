//! Optional observability helpers for flow managers.
//!
//! # Feature Flags
//!
//! - `tracing` emits `oauth2_steward.token_call` spans (see [`FlowSpan`]) and debug events for
//!   renewal transitions under the `oauth2_steward` target.
//! - `metrics` increments [`FLOW_COUNTER`] labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

pub(crate) use self::tracing::flow_event;

// self
use crate::_prelude::*;

/// Authorization flows a manager can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization code grant with a confidential client.
	AuthorizationCode,
	/// Authorization code grant with PKCE and no client secret.
	AuthorizationCodePkce,
	/// Client credentials grant.
	ClientCredentials,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::AuthorizationCodePkce => "authorization_code_pkce",
			FlowKind::ClientCredentials => "client_credentials",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for token operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// A network exchange or refresh started.
	Attempt,
	/// A caller attached to an in-flight refresh instead of starting one.
	Joined,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Joined => "joined",
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

/// Token endpoint operation covered by a [`FlowSpan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenCall {
	/// Authorization code, PKCE, or client credentials grant.
	Exchange,
	/// Refresh token grant.
	Refresh,
}
impl TokenCall {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenCall::Exchange => "exchange",
			TokenCall::Refresh => "refresh",
		}
	}
}
