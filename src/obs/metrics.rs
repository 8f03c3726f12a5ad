// self
use crate::obs::{LeaseOp, OpOutcome};

/// Increments the operation counter via the global metrics recorder (when
/// enabled).
pub fn record_op_outcome(op: LeaseOp, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"lease_broker_op_total",
			"op" => op.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (op, outcome);
	}
}

/// Records an operation's wall-clock duration in seconds.
pub fn record_op_duration(op: LeaseOp, seconds: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("lease_broker_op_duration_seconds", "op" => op.as_str())
			.record(seconds);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (op, seconds);
	}
}

/// Records a lease loss together with the holder's staleness at that moment.
pub fn record_loss(seconds_since_renewal: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("lease_broker_lost_total").increment(1);
		metrics::histogram!("lease_broker_staleness_at_loss_seconds")
			.record(seconds_since_renewal);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = seconds_since_renewal;
	}
}

/// Records how many attempts one renewal window consumed.
pub fn record_renewal_attempts(attempts: u32) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("lease_broker_renewal_attempts").record(f64::from(attempts));
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = attempts;
	}
}

/// Adjusts the gauge tracking currently-held leases in this process.
pub fn record_held_delta(delta: i64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("lease_broker_held_leases").increment(delta as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = delta;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_op_outcome(LeaseOp::Renew, OpOutcome::Failure);
		record_op_duration(LeaseOp::Acquire, 0.25);
		record_loss(54.0);
		record_renewal_attempts(3);
		record_held_delta(-1);
	}
}
