//! In-process lease handle: state machine, manual renewal, release, events.

// crates.io
use tokio::{sync::watch, task::JoinHandle, time::Instant};
// self
use crate::{
	_prelude::*,
	lease::{
		LeaseEvent, LeaseId, LeaseName, LeaseRecord, LostReason,
		events::EventSink,
		renewal::{self, RenewalPolicy},
	},
	manager::LeaseMetrics,
	obs::{self, LeaseOp, LeaseSpan, OpOutcome},
	provider::{LeaseProvider, ProviderError},
};

/// Wall-clock budget granted to the renewal engine to observe a cancellation
/// before it is aborted outright.
const ABORT_BUDGET: StdDuration = StdDuration::from_secs(1);

/// Lifecycle state of a lease handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseState {
	/// The lease is held; the renewal engine may be running.
	Acquired,
	/// A release is in flight; the engine is winding down.
	Releasing,
	/// The lease was returned to the backend. Terminal.
	Released,
	/// The lease is definitively gone. Terminal.
	Lost,
}
impl LeaseState {
	/// Returns a stable label suitable for logs and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			LeaseState::Acquired => "acquired",
			LeaseState::Releasing => "releasing",
			LeaseState::Released => "released",
			LeaseState::Lost => "lost",
		}
	}

	/// Returns `true` for states no transition leaves.
	pub const fn is_terminal(self) -> bool {
		matches!(self, LeaseState::Released | LeaseState::Lost)
	}
}
impl Display for LeaseState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Mutable timing fields. The renewal engine is the sole writer while the
/// handle is `Acquired`; the release path only ever touches `state`.
#[derive(Debug)]
struct Timing {
	expires_at: OffsetDateTime,
	last_successful_renewal: OffsetDateTime,
	// Monotonic mirror of the field above; all safety arithmetic runs on it.
	last_renewal_instant: Instant,
	renewal_count: u64,
	consecutive_renewal_failures: u32,
}

/// State shared between a [`LeaseHandle`] and its renewal engine task.
pub(crate) struct HandleShared {
	name: LeaseName,
	lease_id: LeaseId,
	acquired_at: OffsetDateTime,
	provider: Arc<dyn LeaseProvider>,
	policy: RenewalPolicy,
	metrics: Arc<LeaseMetrics>,
	state: watch::Sender<LeaseState>,
	timing: RwLock<Timing>,
	events: EventSink,
}
impl HandleShared {
	pub(crate) fn policy(&self) -> &RenewalPolicy {
		&self.policy
	}

	fn state(&self) -> LeaseState {
		*self.state.borrow()
	}

	/// Single transition point: enforces the state machine and keeps the
	/// held-lease accounting in step with departures from `Acquired`.
	fn transition(&self, to: LeaseState) -> bool {
		let mut left_acquired = false;
		let changed = self.state.send_if_modified(|state| {
			let allowed = matches!(
				(*state, to),
				(LeaseState::Acquired, LeaseState::Releasing)
					| (LeaseState::Acquired, LeaseState::Lost)
					| (LeaseState::Releasing, LeaseState::Released)
			);

			if allowed {
				left_acquired = *state == LeaseState::Acquired;
				*state = to;
			}

			allowed
		});

		if changed && left_acquired {
			self.metrics.record_drop_held();
			obs::record_held_delta(-1);
		}

		changed
	}

	pub(crate) fn since_last_renewal(&self) -> StdDuration {
		self.timing.read().last_renewal_instant.elapsed()
	}

	pub(crate) async fn renew_via_provider(&self) -> Result<OffsetDateTime, ProviderError> {
		let span = LeaseSpan::new(LeaseOp::Renew, &self.name, self.provider.kind());

		span.record_lease_id(&self.lease_id);
		self.metrics.record_renew_attempt();
		obs::record_op_outcome(LeaseOp::Renew, OpOutcome::Attempt);

		let started = Instant::now();
		let result = span
			.instrument(self.provider.renew(&self.name, &self.lease_id, self.policy.duration))
			.await;

		obs::record_op_duration(LeaseOp::Renew, started.elapsed().as_secs_f64());

		match &result {
			Ok(_) => {
				span.record_outcome(OpOutcome::Success);
				obs::record_op_outcome(LeaseOp::Renew, OpOutcome::Success);
			},
			Err(ProviderError::Lost { .. }) => {
				span.record_outcome(OpOutcome::Lost);
				obs::record_op_outcome(LeaseOp::Renew, OpOutcome::Lost);
			},
			Err(ProviderError::Unavailable { .. }) => {
				span.record_outcome(OpOutcome::Failure);
				obs::record_op_outcome(LeaseOp::Renew, OpOutcome::Failure);
			},
		}

		result
	}

	pub(crate) fn complete_renewal(&self, expires_at: OffsetDateTime) {
		let renewal_count = {
			let mut timing = self.timing.write();

			timing.expires_at = expires_at;
			timing.last_successful_renewal = OffsetDateTime::now_utc();
			timing.last_renewal_instant = Instant::now();
			timing.consecutive_renewal_failures = 0;
			timing.renewal_count += 1;

			timing.renewal_count
		};

		self.events.dispatch(&LeaseEvent::Renewed { expires_at, renewal_count });
	}

	pub(crate) fn fail_renewal(&self, attempt: u32, will_retry: bool, source: &dyn Display) {
		self.timing.write().consecutive_renewal_failures += 1;
		self.metrics.record_renew_failure();
		self.events.dispatch(&LeaseEvent::RenewalFailed {
			attempt,
			will_retry,
			error: source.to_string(),
		});
	}

	/// Marks the lease lost. A no-op when a release already left `Acquired`,
	/// so cancellation never masquerades as a loss.
	pub(crate) fn lose(&self, reason: LostReason) {
		let staleness = self.since_last_renewal();

		if !self.transition(LeaseState::Lost) {
			return;
		}

		self.metrics.record_lost();
		obs::record_loss(staleness.as_secs_f64());

		#[cfg(feature = "tracing")]
		tracing::warn!(lease = %self.name, reason = %reason, "lease lost");

		self.events.dispatch(&LeaseEvent::Lost { reason });
	}
}

/// In-process handle to an acquired lease.
///
/// The handle owns the background renewal engine. Prefer an explicit
/// [`release`](LeaseHandle::release) at the end of the critical section;
/// dropping the handle only cancels the engine and leaves the backend record
/// to expire on its own, handing the lease over within one duration instead of
/// immediately.
pub struct LeaseHandle {
	shared: Arc<HandleShared>,
	engine: Mutex<Option<JoinHandle<()>>>,
}
impl LeaseHandle {
	/// Wraps a freshly acquired record and starts the renewal engine.
	pub(crate) fn start(
		record: LeaseRecord,
		name: LeaseName,
		provider: Arc<dyn LeaseProvider>,
		policy: RenewalPolicy,
		metrics: Arc<LeaseMetrics>,
		auto_renew: bool,
	) -> Self {
		let (state, state_rx) = watch::channel(LeaseState::Acquired);
		let shared = Arc::new(HandleShared {
			name,
			lease_id: record.lease_id,
			acquired_at: record.acquired_at,
			provider,
			policy,
			metrics,
			state,
			timing: RwLock::new(Timing {
				expires_at: record.expires_at,
				last_successful_renewal: record.acquired_at,
				last_renewal_instant: Instant::now(),
				renewal_count: 0,
				consecutive_renewal_failures: 0,
			}),
			events: EventSink::default(),
		});

		shared.metrics.record_held();
		obs::record_held_delta(1);

		let engine = auto_renew.then(|| tokio::spawn(renewal::run(shared.clone(), state_rx)));

		Self { shared, engine: Mutex::new(engine) }
	}

	/// Name of the held lease.
	pub fn name(&self) -> &LeaseName {
		&self.shared.name
	}

	/// Fencing token identifying this holder.
	pub fn lease_id(&self) -> &LeaseId {
		&self.shared.lease_id
	}

	/// Instant the lease was acquired.
	pub fn acquired_at(&self) -> OffsetDateTime {
		self.shared.acquired_at
	}

	/// Expiry acknowledged by the backend; advances on every successful
	/// renewal.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.shared.timing.read().expires_at
	}

	/// Successful renewals on this handle so far.
	pub fn renewal_count(&self) -> u64 {
		self.shared.timing.read().renewal_count
	}

	/// Instant of the last successful renewal (the acquisition instant until
	/// the first renewal lands).
	pub fn last_successful_renewal(&self) -> OffsetDateTime {
		self.shared.timing.read().last_successful_renewal
	}

	/// Consecutive renewal failures since the last success.
	pub fn consecutive_renewal_failures(&self) -> u32 {
		self.shared.timing.read().consecutive_renewal_failures
	}

	/// Monotonic time elapsed since the last successful renewal; feeds the
	/// safety threshold.
	pub fn time_since_last_successful_renewal(&self) -> StdDuration {
		self.shared.since_last_renewal()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> LeaseState {
		self.shared.state()
	}

	/// Returns `true` while the handle is `Acquired` and unexpired.
	pub fn is_held(&self) -> bool {
		self.state() == LeaseState::Acquired && self.expires_at() > OffsetDateTime::now_utc()
	}

	/// Watch channel following the handle's lifecycle state; completes loss
	/// and release observation without polling.
	pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
		self.shared.state.subscribe()
	}

	/// Registers a lifecycle event subscriber. Subscribers are best-effort
	/// observers: panics are isolated and ordering is per-handle only.
	pub fn on_event(&self, subscriber: impl Fn(&LeaseEvent) + Send + Sync + 'static) {
		self.shared.events.subscribe(Box::new(subscriber));
	}

	/// Manually renews the lease once, advancing the handle's timing fields
	/// on success. Unlike the engine, failures surface directly to the
	/// caller.
	pub async fn renew_once(&self) -> Result<OffsetDateTime> {
		let state = self.state();

		if state != LeaseState::Acquired {
			return Err(Error::Lost {
				name: self.shared.name.clone(),
				reason: format!("the handle is already {state}"),
			});
		}

		match self.shared.renew_via_provider().await {
			Ok(expires_at) => {
				self.shared.complete_renewal(expires_at);

				Ok(expires_at)
			},
			Err(ProviderError::Lost { reason }) => {
				self.shared.lose(LostReason::Rejected { reason: reason.clone() });

				Err(Error::Lost { name: self.shared.name.clone(), reason })
			},
			Err(ProviderError::Unavailable { source }) => {
				self.shared.timing.write().consecutive_renewal_failures += 1;
				self.shared.metrics.record_renew_failure();

				Err(Error::Renewal { name: self.shared.name.clone(), source })
			},
		}
	}

	/// Releases the lease: stops the renewal engine, then returns the lease
	/// to the backend. Idempotent; backend errors are logged and swallowed,
	/// since the record expires on its own either way.
	pub async fn release(&self) {
		if !self.shared.transition(LeaseState::Releasing) {
			return;
		}

		self.stop_engine().await;

		let span = LeaseSpan::new(LeaseOp::Release, &self.shared.name, self.shared.provider.kind());

		span.record_lease_id(&self.shared.lease_id);
		obs::record_op_outcome(LeaseOp::Release, OpOutcome::Attempt);

		match span
			.instrument(self.shared.provider.release(&self.shared.name, &self.shared.lease_id))
			.await
		{
			Ok(()) => {
				span.record_outcome(OpOutcome::Success);
				obs::record_op_outcome(LeaseOp::Release, OpOutcome::Success);
			},
			Err(_error) => {
				span.record_outcome(OpOutcome::Failure);
				obs::record_op_outcome(LeaseOp::Release, OpOutcome::Failure);

				#[cfg(feature = "tracing")]
				tracing::warn!(
					lease = %self.shared.name,
					error = %_error,
					"failed to release lease; the backend record will expire on its own",
				);
			},
		}

		self.shared.transition(LeaseState::Released);
	}

	async fn stop_engine(&self) {
		let Some(mut engine) = self.engine.lock().take() else { return };

		// The state change already woke the engine; grant it the abort budget
		// to observe the transition before pulling the plug.
		if tokio::time::timeout(ABORT_BUDGET, &mut engine).await.is_err() {
			engine.abort();
		}
	}
}
impl Drop for LeaseHandle {
	fn drop(&mut self) {
		self.shared.transition(LeaseState::Releasing);

		if let Some(engine) = self.engine.lock().take() {
			engine.abort();
		}
	}
}
impl Debug for LeaseHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaseHandle")
			.field("name", &self.shared.name)
			.field("lease_id", &self.shared.lease_id)
			.field("state", &self.state())
			.field("expires_at", &self.expires_at())
			.finish()
	}
}
