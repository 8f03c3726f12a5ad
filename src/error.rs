//! Broker-level error types shared across the manager, providers, and stores.

// self
use crate::{_prelude::*, lease::LeaseName, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical lease error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; raised before any I/O is performed.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The lease could not be obtained within the allowed timeout.
	#[error("Timed out acquiring lease `{name}`.")]
	AcquireTimeout {
		/// Name of the contested lease.
		name: LeaseName,
	},
	/// The unbounded acquisition loop hit its attempt safety valve.
	#[error("Gave up acquiring lease `{name}` after {attempts} attempts.")]
	AcquireAttemptsExhausted {
		/// Name of the contested lease.
		name: LeaseName,
		/// Acquisition attempts made before giving up.
		attempts: u32,
	},
	/// The lease is definitively no longer held. Terminal for the handle.
	#[error("Lease `{name}` is no longer held: {reason}.")]
	Lost {
		/// Name of the lost lease.
		name: LeaseName,
		/// Backend- or engine-supplied reason.
		reason: String,
	},
	/// Transient renewal failure; the backend record may still be held.
	#[error("Failed to renew lease `{name}`.")]
	Renewal {
		/// Name of the lease whose renewal failed.
		name: LeaseName,
		/// Underlying store failure.
		#[source]
		source: StoreError,
	},
	/// Backend unreachable, unauthenticated, or failed wholesale.
	#[error("Lease backend is unavailable.")]
	Unavailable {
		/// Underlying store failure.
		#[source]
		source: StoreError,
	},
}

/// Configuration and validation failures raised at construction time.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum ConfigError {
	/// Lease durations must be strictly positive.
	#[error("Lease duration must be positive, got {duration}.")]
	NonPositiveDuration {
		/// Rejected duration.
		duration: Duration,
	},
	/// The renewal interval must sit strictly inside the lease duration.
	#[error("Renew interval {interval} must be positive and shorter than the lease duration {duration}.")]
	RenewIntervalOutOfRange {
		/// Effective renewal interval.
		interval: Duration,
		/// Configured lease duration.
		duration: Duration,
	},
	/// The retry interval must be positive whenever retries are enabled.
	#[error("Renew retry interval must be positive when retries are enabled, got {interval}.")]
	NonPositiveRetryInterval {
		/// Rejected retry interval.
		interval: Duration,
	},
	/// The safety fraction lies outside the supported band.
	#[error("Safety fraction must lie within [0.5, 0.95], got {fraction}.")]
	SafetyFractionOutOfRange {
		/// Rejected fraction.
		fraction: f64,
	},
	/// The exponential retry budget cannot fit inside the safety window.
	#[error("Retry horizon {horizon} does not fit inside the safety window {window}.")]
	RetryHorizonExceedsSafetyWindow {
		/// Total backoff budget `retry_interval * (2^max_retries - 1)`.
		horizon: Duration,
		/// Safety window `safety_fraction * duration`.
		window: Duration,
	},
	/// The requested duration falls outside the backend-supported range.
	#[error("Lease duration {duration} is outside the backend-supported range {min}..={max}.")]
	DurationOutOfBackendRange {
		/// Rejected duration.
		duration: Duration,
		/// Shortest duration the backend accepts.
		min: Duration,
		/// Longest duration the backend accepts.
		max: Duration,
	},
	/// The acquisition retry interval must be positive.
	#[error("Acquire retry interval must be positive, got {interval}.")]
	NonPositiveAcquireRetryInterval {
		/// Rejected retry interval.
		interval: Duration,
	},
	/// The acquisition timeout cannot be negative.
	#[error("Acquire timeout cannot be negative, got {timeout}.")]
	NegativeAcquireTimeout {
		/// Rejected timeout.
		timeout: Duration,
	},
}
