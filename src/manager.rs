//! Acquisition manager: polls a provider until a lease is granted, a timeout
//! elapses, or the caller cancels by dropping the future.

mod metrics;

pub use metrics::LeaseMetrics;

// crates.io
use tokio::time::{Instant, sleep};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	lease::{LeaseHandle, LeaseMetadata, LeaseName, RenewalPolicy},
	obs::{self, LeaseOp, LeaseSpan, OpOutcome},
	provider::{AcquireOutcome, LeaseProvider, ProviderError},
};

/// Attempt cap applied when the acquisition timeout is unbounded, so a
/// permanently contested or down backend cannot spin forever.
const MAX_ACQUIRE_ATTEMPTS: u32 = 10_000;

/// Overall time budget for one acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireTimeout {
	/// Fail with [`Error::AcquireTimeout`] once the budget elapses. A zero
	/// budget makes a single attempt, behaving like `try_acquire` with an
	/// error instead of an absent handle.
	After(Duration),
	/// Poll until acquired, bounded only by the attempt safety valve.
	Unbounded,
}

/// Per-manager configuration applied to every acquisition.
#[derive(Clone, Debug)]
pub struct LeaseOptions {
	/// Lease duration requested when a request does not override it.
	pub default_lease_duration: Duration,
	/// Whether acquired handles start the renewal engine.
	pub auto_renew: bool,
	/// Nominal wait between renewal attempts; two thirds of the duration
	/// when unset.
	pub renew_interval: Option<Duration>,
	/// Base delay between consecutive renewal retries.
	pub renew_retry_interval: Duration,
	/// Renewal retries per window after the initial attempt; 0 fails fast.
	pub renew_max_retries: u32,
	/// Fraction of the duration past which a holder abandons the lease.
	pub safety_fraction: f64,
	/// Overall acquisition budget.
	pub acquire_timeout: AcquireTimeout,
	/// Wait between acquisition attempts while the lease is held elsewhere.
	pub acquire_retry_interval: Duration,
	/// Metadata attached to every acquisition.
	pub metadata: LeaseMetadata,
}
impl LeaseOptions {
	const DEFAULT_ACQUIRE_RETRY_INTERVAL: Duration = Duration::seconds(5);

	/// Creates the default option set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Overrides the default lease duration.
	pub fn with_lease_duration(mut self, duration: Duration) -> Self {
		self.default_lease_duration = duration;

		self
	}

	/// Enables or disables automatic renewal on acquired handles.
	pub fn with_auto_renew(mut self, auto_renew: bool) -> Self {
		self.auto_renew = auto_renew;

		self
	}

	/// Overrides the renewal interval (the 2/3 rule applies when unset).
	pub fn with_renew_interval(mut self, interval: Duration) -> Self {
		self.renew_interval = Some(interval);

		self
	}

	/// Overrides the base renewal retry delay.
	pub fn with_renew_retry_interval(mut self, interval: Duration) -> Self {
		self.renew_retry_interval = interval;

		self
	}

	/// Overrides the renewal retry budget per window.
	pub fn with_renew_max_retries(mut self, retries: u32) -> Self {
		self.renew_max_retries = retries;

		self
	}

	/// Overrides the safety fraction.
	pub fn with_safety_fraction(mut self, fraction: f64) -> Self {
		self.safety_fraction = fraction;

		self
	}

	/// Overrides the acquisition budget.
	pub fn with_acquire_timeout(mut self, timeout: AcquireTimeout) -> Self {
		self.acquire_timeout = timeout;

		self
	}

	/// Overrides the wait between contested acquisition attempts.
	pub fn with_acquire_retry_interval(mut self, interval: Duration) -> Self {
		self.acquire_retry_interval = interval;

		self
	}

	/// Replaces the metadata attached to every acquisition.
	pub fn with_metadata(mut self, metadata: LeaseMetadata) -> Self {
		self.metadata = metadata;

		self
	}

	/// Derives the renewal policy for a concrete lease duration.
	pub(crate) fn renewal_policy(&self, duration: Duration) -> RenewalPolicy {
		RenewalPolicy {
			duration,
			renew_interval: self.renew_interval,
			retry_interval: self.renew_retry_interval,
			max_retries: self.renew_max_retries,
			safety_fraction: self.safety_fraction,
		}
	}

	/// Validates every knob; called by [`LeaseManager::new`] before any I/O.
	pub fn validate(&self) -> Result<(), ConfigError> {
		self.renewal_policy(self.default_lease_duration).validate()?;

		if !self.acquire_retry_interval.is_positive() {
			return Err(ConfigError::NonPositiveAcquireRetryInterval {
				interval: self.acquire_retry_interval,
			});
		}
		if let AcquireTimeout::After(timeout) = self.acquire_timeout
			&& timeout.is_negative()
		{
			return Err(ConfigError::NegativeAcquireTimeout { timeout });
		}

		Ok(())
	}
}
impl Default for LeaseOptions {
	fn default() -> Self {
		Self {
			default_lease_duration: RenewalPolicy::DEFAULT_DURATION,
			auto_renew: true,
			renew_interval: None,
			renew_retry_interval: RenewalPolicy::DEFAULT_RETRY_INTERVAL,
			renew_max_retries: RenewalPolicy::DEFAULT_MAX_RETRIES,
			safety_fraction: RenewalPolicy::DEFAULT_SAFETY_FRACTION,
			acquire_timeout: AcquireTimeout::Unbounded,
			acquire_retry_interval: Self::DEFAULT_ACQUIRE_RETRY_INTERVAL,
			metadata: LeaseMetadata::new(),
		}
	}
}

/// Per-acquisition request parameters layered over the manager defaults.
#[derive(Clone, Debug)]
pub struct AcquireRequest {
	/// Lease name to contest.
	pub name: LeaseName,
	/// Overrides the manager's default lease duration.
	pub duration: Option<Duration>,
	/// Overrides the manager's acquisition budget.
	pub timeout: Option<AcquireTimeout>,
	/// Merged over the manager's metadata; the request wins per key.
	pub metadata: LeaseMetadata,
}
impl AcquireRequest {
	/// Creates a request inheriting every manager default.
	pub fn new(name: LeaseName) -> Self {
		Self { name, duration: None, timeout: None, metadata: LeaseMetadata::new() }
	}

	/// Overrides the lease duration for this acquisition.
	pub fn with_duration(mut self, duration: Duration) -> Self {
		self.duration = Some(duration);

		self
	}

	/// Overrides the acquisition budget for this acquisition.
	pub fn with_timeout(mut self, timeout: AcquireTimeout) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Merges additional metadata over the manager's map.
	pub fn with_metadata(mut self, metadata: LeaseMetadata) -> Self {
		self.metadata = metadata;

		self
	}
}

/// Coordinates lease acquisition against a single provider.
///
/// The manager owns the provider handle, the option set, and the always-on
/// counters; acquired leases run their renewal engines independently, with no
/// cross-lease coordination. Same-process attempts on one name are serialized
/// through a per-name guard so local contenders do not hammer the backend
/// concurrently.
pub struct LeaseManager {
	provider: Arc<dyn LeaseProvider>,
	options: LeaseOptions,
	metrics: Arc<LeaseMetrics>,
	acquire_guards: Mutex<HashMap<LeaseName, Arc<AsyncMutex<()>>>>,
}
impl LeaseManager {
	/// Builds a manager after fail-fast validation. No I/O is performed;
	/// invalid configurations are rejected before a backend is ever touched.
	pub fn new(provider: Arc<dyn LeaseProvider>, options: LeaseOptions) -> Result<Self> {
		options.validate()?;
		provider.validate(options.default_lease_duration)?;

		Ok(Self {
			provider,
			options,
			metrics: Default::default(),
			acquire_guards: Default::default(),
		})
	}

	/// Returns the manager's option set.
	pub fn options(&self) -> &LeaseOptions {
		&self.options
	}

	/// Always-on counters for this manager.
	pub fn metrics(&self) -> &LeaseMetrics {
		&self.metrics
	}

	/// Acquires `name`, polling until granted or the configured timeout
	/// elapses. Cancellation is dropping the returned future.
	pub async fn acquire(&self, name: LeaseName) -> Result<LeaseHandle> {
		self.acquire_with(AcquireRequest::new(name)).await
	}

	/// [`acquire`](Self::acquire) with per-request overrides.
	pub async fn acquire_with(&self, request: AcquireRequest) -> Result<LeaseHandle> {
		let name = request.name.clone();

		self.run_acquire(request, false).await?.ok_or(Error::AcquireTimeout { name })
	}

	/// Single-attempt acquisition returning `None` while the lease is held by
	/// another owner.
	pub async fn try_acquire(&self, name: LeaseName) -> Result<Option<LeaseHandle>> {
		self.try_acquire_with(AcquireRequest::new(name)).await
	}

	/// [`try_acquire`](Self::try_acquire) with per-request overrides.
	pub async fn try_acquire_with(&self, request: AcquireRequest) -> Result<Option<LeaseHandle>> {
		self.run_acquire(request, true).await
	}

	/// Administrative override that forcibly ends any active lease on `name`,
	/// regardless of who holds it.
	pub async fn break_lease(&self, name: &LeaseName) -> Result<()> {
		let span = LeaseSpan::new(LeaseOp::Break, name, self.provider.kind());

		obs::record_op_outcome(LeaseOp::Break, OpOutcome::Attempt);

		match span.instrument(self.provider.break_lease(name)).await {
			Ok(()) => {
				span.record_outcome(OpOutcome::Success);
				obs::record_op_outcome(LeaseOp::Break, OpOutcome::Success);

				Ok(())
			},
			Err(error) => {
				span.record_outcome(OpOutcome::Failure);
				obs::record_op_outcome(LeaseOp::Break, OpOutcome::Failure);

				Err(match error {
					ProviderError::Unavailable { source } => Error::Unavailable { source },
					ProviderError::Lost { reason } =>
						Error::Lost { name: name.clone(), reason },
				})
			},
		}
	}

	async fn run_acquire(
		&self,
		request: AcquireRequest,
		try_only: bool,
	) -> Result<Option<LeaseHandle>> {
		let AcquireRequest { name, duration, timeout, metadata } = request;
		let duration = duration.unwrap_or(self.options.default_lease_duration);

		// Per-request overrides are validated exactly like construction-time
		// options, before any backend call.
		self.provider.validate(duration)?;

		let policy = self.options.renewal_policy(duration);

		policy.validate()?;

		let timeout = timeout.unwrap_or(self.options.acquire_timeout);
		let mut merged = self.options.metadata.clone();

		merged.extend(metadata);

		let retry = self.options.acquire_retry_interval.unsigned_abs();
		let span = LeaseSpan::new(LeaseOp::Acquire, &name, self.provider.kind());
		let started = Instant::now();
		let deadline = match timeout {
			AcquireTimeout::After(budget) => Some(started + budget.unsigned_abs()),
			AcquireTimeout::Unbounded => None,
		};
		let result = span
			.instrument(self.acquire_loop(&name, policy, &merged, deadline, retry, try_only))
			.await;

		obs::record_op_duration(LeaseOp::Acquire, started.elapsed().as_secs_f64());

		match &result {
			Ok(Some(handle)) => {
				span.record_lease_id(handle.lease_id());
				span.record_outcome(OpOutcome::Success);
				obs::record_op_outcome(LeaseOp::Acquire, OpOutcome::Success);
			},
			Ok(None) => {
				span.record_outcome(OpOutcome::AlreadyHeld);
				obs::record_op_outcome(LeaseOp::Acquire, OpOutcome::AlreadyHeld);
			},
			Err(Error::AcquireTimeout { .. }) => {
				span.record_outcome(OpOutcome::Timeout);
				obs::record_op_outcome(LeaseOp::Acquire, OpOutcome::Timeout);
			},
			Err(_) => {
				span.record_outcome(OpOutcome::Failure);
				obs::record_op_outcome(LeaseOp::Acquire, OpOutcome::Failure);
			},
		}

		result
	}

	async fn acquire_loop(
		&self,
		name: &LeaseName,
		policy: RenewalPolicy,
		metadata: &LeaseMetadata,
		deadline: Option<Instant>,
		retry: StdDuration,
		try_only: bool,
	) -> Result<Option<LeaseHandle>> {
		for _ in 0..MAX_ACQUIRE_ATTEMPTS {
			self.metrics.record_acquire_attempt();
			obs::record_op_outcome(LeaseOp::Acquire, OpOutcome::Attempt);

			let outcome = {
				let guard = self.acquire_guard(name);
				let _serialized = guard.lock().await;

				self.provider.acquire(name, policy.duration, metadata).await
			};

			match outcome {
				Ok(AcquireOutcome::Granted(record)) => {
					self.metrics.record_acquire_success();

					return Ok(Some(LeaseHandle::start(
						record,
						name.clone(),
						self.provider.clone(),
						policy.clone(),
						self.metrics.clone(),
						self.options.auto_renew,
					)));
				},
				Ok(AcquireOutcome::Held) => {
					if try_only {
						return Ok(None);
					}

					let now = Instant::now();

					match deadline {
						Some(deadline) if now >= deadline =>
							return Err(Error::AcquireTimeout { name: name.clone() }),
						Some(deadline) => sleep(retry.min(deadline - now)).await,
						None => sleep(retry).await,
					}
				},
				Err(ProviderError::Unavailable { source }) =>
					return Err(Error::Unavailable { source }),
				Err(ProviderError::Lost { reason }) =>
					return Err(Error::Lost { name: name.clone(), reason }),
			}
		}

		Err(Error::AcquireAttemptsExhausted { name: name.clone(), attempts: MAX_ACQUIRE_ATTEMPTS })
	}

	fn acquire_guard(&self, name: &LeaseName) -> Arc<AsyncMutex<()>> {
		self.acquire_guards
			.lock()
			.entry(name.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone()
	}
}
impl Debug for LeaseManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaseManager")
			.field("provider", &self.provider.kind())
			.field("options", &self.options)
			.finish()
	}
}
