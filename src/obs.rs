//! Optional observability helpers for lease operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `lease_broker.op` with
//!   the `op`, `lease`, `provider`, `lease_id`, and `outcome` fields.
//! - Enable `metrics` to publish, through the global recorder:
//!   - `lease_broker_op_total` counter labeled by `op` + `outcome`,
//!   - `lease_broker_op_duration_seconds` histogram labeled by `op`,
//!   - `lease_broker_lost_total` counter,
//!   - `lease_broker_staleness_at_loss_seconds` histogram,
//!   - `lease_broker_renewal_attempts` histogram (attempts per window),
//!   - `lease_broker_held_leases` gauge.
//!
//! Both integrations compile to no-ops when their feature is disabled; the
//! always-on per-manager counters live in
//! [`LeaseMetrics`](crate::manager::LeaseMetrics).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Lease operations observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeaseOp {
	/// Lease acquisition, including the polling loop.
	Acquire,
	/// One renewal attempt.
	Renew,
	/// Handle release.
	Release,
	/// Administrative break.
	Break,
}
impl LeaseOp {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LeaseOp::Acquire => "acquire",
			LeaseOp::Renew => "renew",
			LeaseOp::Release => "release",
			LeaseOp::Break => "break",
		}
	}
}
impl Display for LeaseOp {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated to the caller or retry policy.
	Failure,
	/// Acquisition found the lease held by another owner.
	AlreadyHeld,
	/// Acquisition ran out of time.
	Timeout,
	/// The lease was definitively lost.
	Lost,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::AlreadyHeld => "already_held",
			OpOutcome::Timeout => "timeout",
			OpOutcome::Lost => "lost",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
