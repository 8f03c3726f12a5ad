//! Provider contract implemented by every lease backend strategy.
//!
//! A backend implements exactly four operations over a namespace of leases.
//! Providers are stateless between calls; all authority lives in the backend
//! store, so any number of provider instances across any number of processes
//! are interchangeable. Every operation is cancellable by dropping its future,
//! and `acquire` never queues: when the lease is held elsewhere it returns
//! [`AcquireOutcome::Held`] immediately.

pub mod kv;
pub mod native;
pub mod occ;

pub use kv::AtomicKvProvider;
pub use native::NativeLeaseProvider;
pub use occ::OccLeaseProvider;

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	lease::{LeaseId, LeaseMetadata, LeaseName, LeaseRecord},
	store::StoreError,
};

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + 'a + Send>>;

/// Backend strategy label used in spans and metric tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
	/// Store-native lease primitive (lock token per object).
	NativeLease,
	/// Optimistic concurrency over versioned documents.
	Occ,
	/// Atomic key-value with TTL and compare-and-act.
	AtomicKv,
}
impl ProviderKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderKind::NativeLease => "native_lease",
			ProviderKind::Occ => "occ",
			ProviderKind::AtomicKv => "atomic_kv",
		}
	}
}
impl Display for ProviderKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome of an acquisition attempt.
///
/// "Held by another" is a signal, not an error; the acquisition manager polls
/// on it and `try_acquire` surfaces it as an absent handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
	/// The lease was obtained; the record carries the fencing token.
	Granted(LeaseRecord),
	/// Another holder currently owns the lease.
	Held,
}

/// Error type produced by [`LeaseProvider`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderError {
	/// Backend unreachable or the operation failed wholesale; safe to retry.
	#[error("Lease backend is unavailable.")]
	Unavailable {
		/// Underlying store failure.
		#[source]
		source: StoreError,
	},
	/// The stored fencing token no longer matches, or the record is gone.
	/// Terminal for the holder.
	#[error("Lease is no longer held: {reason}.")]
	Lost {
		/// Backend-supplied detail.
		reason: String,
	},
}
impl From<StoreError> for ProviderError {
	fn from(source: StoreError) -> Self {
		Self::Unavailable { source }
	}
}

/// Storage contract implemented by lease backends.
pub trait LeaseProvider
where
	Self: Send + Sync,
{
	/// Attempts to acquire the named lease for `duration`, attaching
	/// `metadata` to the backend record.
	fn acquire<'a>(
		&'a self,
		name: &'a LeaseName,
		duration: Duration,
		metadata: &'a LeaseMetadata,
	) -> ProviderFuture<'a, AcquireOutcome>;

	/// Renews the lease identified by `lease_id`, returning the new expiry.
	///
	/// Fails with [`ProviderError::Lost`] when the stored token differs or the
	/// record is gone.
	fn renew<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
		duration: Duration,
	) -> ProviderFuture<'a, OffsetDateTime>;

	/// Releases the lease identified by `lease_id`. Idempotent: a missing or
	/// mismatched record succeeds silently.
	fn release<'a>(&'a self, name: &'a LeaseName, lease_id: &'a LeaseId)
	-> ProviderFuture<'a, ()>;

	/// Administrative override that forcibly ends any active lease on `name`.
	fn break_lease<'a>(&'a self, name: &'a LeaseName) -> ProviderFuture<'a, ()>;

	/// Backend strategy label for spans and metrics.
	fn kind(&self) -> ProviderKind;

	/// Fail-fast duration check applied before any I/O; backends with bounded
	/// lease durations reject out-of-range requests here.
	fn validate(&self, duration: Duration) -> Result<(), ConfigError> {
		let _ = duration;

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn provider_kind_labels_are_stable() {
		assert_eq!(ProviderKind::NativeLease.as_str(), "native_lease");
		assert_eq!(ProviderKind::Occ.as_str(), "occ");
		assert_eq!(ProviderKind::AtomicKv.as_str(), "atomic_kv");
	}

	#[test]
	fn store_errors_coerce_into_unavailable() {
		let error: ProviderError = StoreError::backend("boom").into();

		assert!(matches!(error, ProviderError::Unavailable { .. }));
	}
}
