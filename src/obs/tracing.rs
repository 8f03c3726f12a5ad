// self
use crate::{
	_prelude::*,
	lease::{LeaseId, LeaseName},
	obs::{LeaseOp, OpOutcome},
	provider::ProviderKind,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by lease operations.
#[derive(Clone, Debug)]
pub struct LeaseSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl LeaseSpan {
	/// Creates a new span tagged with the operation, lease name, and provider
	/// kind; the lease id and outcome are recorded once known.
	pub fn new(op: LeaseOp, name: &LeaseName, provider: ProviderKind) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"lease_broker.op",
				op = op.as_str(),
				lease = %name,
				provider = provider.as_str(),
				lease_id = tracing::field::Empty,
				outcome = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (op, name, provider);

			Self {}
		}
	}

	/// Records the fencing token once the backend has issued or confirmed it.
	pub fn record_lease_id(&self, lease_id: &LeaseId) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("lease_id", tracing::field::display(lease_id));
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = lease_id;
		}
	}

	/// Records the operation outcome label.
	pub fn record_outcome(&self, outcome: OpOutcome) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = outcome;
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> LeaseSpanGuard {
		#[cfg(feature = "tracing")]
		{
			LeaseSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			LeaseSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await`
	/// points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
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
}

/// RAII guard returned by [`LeaseSpan::entered`].
pub struct LeaseSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for LeaseSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("LeaseSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn name() -> LeaseName {
		LeaseName::new("leader").expect("Lease name fixture should be valid.")
	}

	#[test]
	fn lease_span_noop_without_tracing() {
		let span = LeaseSpan::new(LeaseOp::Acquire, &name(), ProviderKind::AtomicKv);

		span.record_lease_id(&LeaseId::new("token"));
		span.record_outcome(OpOutcome::Success);

		let _guard = span.entered();
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = LeaseSpan::new(LeaseOp::Renew, &name(), ProviderKind::Occ);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
