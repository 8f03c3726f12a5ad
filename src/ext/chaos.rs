//! Fault-injecting provider decorator for exercising failure branches.
//!
//! The decorator is indistinguishable from a real provider to the engine:
//! same operation signatures, same error kinds. It is compiled only under
//! `cfg(test)` or the `test` crate feature, so chaos cannot be instantiated
//! in a production configuration.

// std
use std::collections::VecDeque;
// crates.io
use rand::{Rng, SeedableRng, rngs::StdRng};
// self
use crate::{
	_prelude::*,
	lease::{LeaseId, LeaseMetadata, LeaseName},
	obs::LeaseOp,
	provider::{AcquireOutcome, LeaseProvider, ProviderError, ProviderFuture, ProviderKind},
	store::StoreError,
};

/// A single injected fault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
	/// Fail the call with a transient backend error.
	Unavailable,
	/// Fail the call with a fencing-token rejection.
	Lost,
	/// Delay the call before forwarding it to the inner provider.
	Delay(StdDuration),
}

/// Decides which targeted calls receive which fault.
#[derive(Debug)]
pub struct FaultPlan(Mode);

#[derive(Debug)]
enum Mode {
	Probabilistic { rate: f64, fault: Fault, rng: Mutex<StdRng> },
	Sequence(Mutex<VecDeque<Option<Fault>>>),
	EveryNth { n: u64, fault: Fault, calls: Mutex<u64> },
}

impl FaultPlan {
	/// Seeded probabilistic plan: each targeted call fails with probability
	/// `rate`. Deterministic per seed.
	pub fn probabilistic(rate: f64, fault: Fault, seed: u64) -> Self {
		Self(Mode::Probabilistic { rate, fault, rng: Mutex::new(StdRng::seed_from_u64(seed)) })
	}

	/// Deterministic per-call script. `None` entries pass through; an
	/// exhausted script always passes.
	pub fn sequence(steps: impl IntoIterator<Item = Option<Fault>>) -> Self {
		Self(Mode::Sequence(Mutex::new(steps.into_iter().collect())))
	}

	/// Injects `fault` on every `n`-th targeted call (1-based).
	pub fn every_nth(n: u64, fault: Fault) -> Self {
		Self(Mode::EveryNth { n, fault, calls: Mutex::new(0) })
	}

	fn next(&self) -> Option<Fault> {
		match &self.0 {
			Mode::Probabilistic { rate, fault, rng } =>
				rng.lock().random_bool(*rate).then(|| fault.clone()),
			Mode::Sequence(steps) => steps.lock().pop_front().flatten(),
			Mode::EveryNth { n, fault, calls } => {
				let mut calls = calls.lock();

				*calls += 1;

				(*n > 0 && *calls % *n == 0).then(|| fault.clone())
			},
		}
	}
}

/// Provider decorator injecting faults per a [`FaultPlan`].
pub struct ChaosProvider {
	inner: Arc<dyn LeaseProvider>,
	plan: FaultPlan,
	targets: Vec<LeaseOp>,
}
impl ChaosProvider {
	/// Wraps `inner`, targeting every operation by default.
	pub fn new(inner: Arc<dyn LeaseProvider>, plan: FaultPlan) -> Self {
		Self {
			inner,
			plan,
			targets: vec![LeaseOp::Acquire, LeaseOp::Renew, LeaseOp::Release, LeaseOp::Break],
		}
	}

	/// Restricts fault injection to the listed operations.
	pub fn with_targets(mut self, targets: impl IntoIterator<Item = LeaseOp>) -> Self {
		self.targets = targets.into_iter().collect();

		self
	}

	async fn fault_for(&self, op: LeaseOp) -> Result<(), ProviderError> {
		if !self.targets.contains(&op) {
			return Ok(());
		}

		match self.plan.next() {
			None => Ok(()),
			Some(Fault::Delay(delay)) => {
				tokio::time::sleep(delay).await;

				Ok(())
			},
			Some(Fault::Unavailable) =>
				Err(ProviderError::Unavailable { source: StoreError::backend("injected fault") }),
			Some(Fault::Lost) => Err(ProviderError::Lost { reason: "injected fault".into() }),
		}
	}
}
impl LeaseProvider for ChaosProvider {
	fn acquire<'a>(
		&'a self,
		name: &'a LeaseName,
		duration: Duration,
		metadata: &'a LeaseMetadata,
	) -> ProviderFuture<'a, AcquireOutcome> {
		Box::pin(async move {
			self.fault_for(LeaseOp::Acquire).await?;

			self.inner.acquire(name, duration, metadata).await
		})
	}

	fn renew<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
		duration: Duration,
	) -> ProviderFuture<'a, OffsetDateTime> {
		Box::pin(async move {
			self.fault_for(LeaseOp::Renew).await?;

			self.inner.renew(name, lease_id, duration).await
		})
	}

	fn release<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			self.fault_for(LeaseOp::Release).await?;

			self.inner.release(name, lease_id).await
		})
	}

	fn break_lease<'a>(&'a self, name: &'a LeaseName) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			self.fault_for(LeaseOp::Break).await?;

			self.inner.break_lease(name).await
		})
	}

	fn kind(&self) -> ProviderKind {
		self.inner.kind()
	}

	fn validate(&self, duration: Duration) -> Result<(), crate::error::ConfigError> {
		self.inner.validate(duration)
	}
}
impl Debug for ChaosProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ChaosProvider")
			.field("kind", &self.inner.kind())
			.field("plan", &self.plan)
			.field("targets", &self.targets)
			.finish()
	}
}
