// std
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Thread-safe counters describing one manager's lease activity.
///
/// Always available, independent of the `metrics` feature, so callers and
/// tests can assert on behavior without installing a metrics recorder.
#[derive(Debug, Default)]
pub struct LeaseMetrics {
	acquire_attempts: AtomicU64,
	acquire_successes: AtomicU64,
	renew_attempts: AtomicU64,
	renew_failures: AtomicU64,
	leases_lost: AtomicU64,
	held: AtomicI64,
}
impl LeaseMetrics {
	/// Returns the total number of acquisition attempts against the backend.
	pub fn acquire_attempts(&self) -> u64 {
		self.acquire_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of granted acquisitions.
	pub fn acquire_successes(&self) -> u64 {
		self.acquire_successes.load(Ordering::Relaxed)
	}

	/// Returns the total number of renewal attempts (engine and manual).
	pub fn renew_attempts(&self) -> u64 {
		self.renew_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of failed renewal attempts.
	pub fn renew_failures(&self) -> u64 {
		self.renew_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of leases declared lost.
	pub fn leases_lost(&self) -> u64 {
		self.leases_lost.load(Ordering::Relaxed)
	}

	/// Returns the number of leases this process currently holds through the
	/// owning manager.
	pub fn held(&self) -> i64 {
		self.held.load(Ordering::Relaxed)
	}

	pub(crate) fn record_acquire_attempt(&self) {
		self.acquire_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_acquire_success(&self) {
		self.acquire_successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renew_attempt(&self) {
		self.renew_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renew_failure(&self) {
		self.renew_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_lost(&self) {
		self.leases_lost.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_held(&self) {
		self.held.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_drop_held(&self) {
		self.held.fetch_sub(1, Ordering::Relaxed);
	}
}
