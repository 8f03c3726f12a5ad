//! Renewal policy arithmetic and the per-lease renewal engine.

// crates.io
use tokio::{
	sync::watch,
	time::{Instant, sleep_until},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	lease::{
		LostReason,
		handle::{HandleShared, LeaseState},
	},
	obs,
	provider::ProviderError,
};

/// Timing parameters governing automatic renewal for one lease.
///
/// The defaults follow the 2/3 rule: renew at two thirds of the lease
/// duration, leaving the final third as retry budget before the safety
/// threshold abandons the lease.
#[derive(Clone, Debug, PartialEq)]
pub struct RenewalPolicy {
	/// Lease duration requested from the backend.
	pub duration: Duration,
	/// Nominal wait between renewal attempts; two thirds of `duration` when
	/// unset.
	pub renew_interval: Option<Duration>,
	/// Base delay between consecutive renewal retries.
	pub retry_interval: Duration,
	/// Retries allowed per renewal window after the initial attempt; 0 fails
	/// fast.
	pub max_retries: u32,
	/// Fraction of `duration` past which the holder abandons the lease as
	/// definitively lost. Valid range `[0.5, 0.95]`.
	pub safety_fraction: f64,
}
impl RenewalPolicy {
	/// Default lease duration requested from backends.
	pub const DEFAULT_DURATION: Duration = Duration::seconds(60);
	/// Default retries per renewal window.
	pub const DEFAULT_MAX_RETRIES: u32 = 3;
	/// Default base delay between renewal retries.
	pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::seconds(5);
	/// Default safety fraction.
	pub const DEFAULT_SAFETY_FRACTION: f64 = 0.9;

	/// Creates the policy for the provided lease duration with default
	/// renewal knobs.
	pub fn for_duration(duration: Duration) -> Self {
		Self { duration, ..Default::default() }
	}

	/// Overrides the renewal interval (the 2/3 rule applies when unset).
	pub fn with_renew_interval(mut self, interval: Duration) -> Self {
		self.renew_interval = Some(interval);

		self
	}

	/// Overrides the base retry delay.
	pub fn with_retry_interval(mut self, interval: Duration) -> Self {
		self.retry_interval = interval;

		self
	}

	/// Overrides the retry budget per renewal window.
	pub fn with_max_retries(mut self, retries: u32) -> Self {
		self.max_retries = retries;

		self
	}

	/// Overrides the safety fraction.
	pub fn with_safety_fraction(mut self, fraction: f64) -> Self {
		self.safety_fraction = fraction;

		self
	}

	/// Effective renewal interval: the explicit override, or two thirds of
	/// the lease duration.
	pub fn effective_interval(&self) -> Duration {
		self.renew_interval.unwrap_or(self.duration * 2 / 3)
	}

	/// Window after a successful renewal past which the lease is declared
	/// lost: `safety_fraction * duration`.
	pub fn safety_window(&self) -> Duration {
		self.duration * self.safety_fraction
	}

	/// Total exponential backoff budget:
	/// `retry_interval * (2^max_retries - 1)`, saturating at [`Duration::MAX`].
	pub fn retry_horizon(&self) -> Duration {
		let factor = 2_f64.powi(self.max_retries.min(63) as i32) - 1.0;
		let seconds = self.retry_interval.as_seconds_f64() * factor;

		if seconds >= Duration::MAX.as_seconds_f64() {
			Duration::MAX
		} else {
			Duration::seconds_f64(seconds)
		}
	}

	/// Backoff slept after failed attempt `attempt` (1-based):
	/// `retry_interval * 2^(attempt - 1)`.
	pub(crate) fn backoff_after(&self, attempt: u32) -> Duration {
		Duration::seconds_f64(
			self.retry_interval.as_seconds_f64() * 2_f64.powi(attempt.saturating_sub(1) as i32),
		)
	}

	/// Validates the policy. Rejected configurations never reach a backend;
	/// the engine's sliding safety check remains the precise runtime
	/// backstop for retry overruns.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.duration.is_positive() {
			return Err(ConfigError::NonPositiveDuration { duration: self.duration });
		}

		let interval = self.effective_interval();

		if !interval.is_positive() || interval >= self.duration {
			return Err(ConfigError::RenewIntervalOutOfRange {
				interval,
				duration: self.duration,
			});
		}
		if !(0.5..=0.95).contains(&self.safety_fraction) {
			return Err(ConfigError::SafetyFractionOutOfRange { fraction: self.safety_fraction });
		}
		if self.max_retries > 0 {
			if !self.retry_interval.is_positive() {
				return Err(ConfigError::NonPositiveRetryInterval {
					interval: self.retry_interval,
				});
			}

			let horizon = self.retry_horizon();
			let window = self.safety_window();

			if horizon >= window {
				return Err(ConfigError::RetryHorizonExceedsSafetyWindow { horizon, window });
			}
		}

		Ok(())
	}
}
impl Default for RenewalPolicy {
	fn default() -> Self {
		Self {
			duration: Self::DEFAULT_DURATION,
			renew_interval: None,
			retry_interval: Self::DEFAULT_RETRY_INTERVAL,
			max_retries: Self::DEFAULT_MAX_RETRIES,
			safety_fraction: Self::DEFAULT_SAFETY_FRACTION,
		}
	}
}

/// Renewal engine: one background task per acquired lease, from acquisition
/// until the handle leaves `Acquired`.
///
/// All timing arithmetic runs on the monotonic clock; wall-clock instants only
/// flow through the handle's record fields. The loop suspends at the interval
/// sleep, the retry sleep, and the provider call, and every suspension point
/// doubles as a cancellation point by watching the handle state.
pub(crate) async fn run(shared: Arc<HandleShared>, mut state: watch::Receiver<LeaseState>) {
	let interval = shared.policy().effective_interval().unsigned_abs();
	let safety = shared.policy().safety_window().unsigned_abs();
	let attempts_per_window = shared.policy().max_retries.saturating_add(1);
	let mut last_attempt = Instant::now();

	loop {
		if !sleep_while_acquired(&mut state, last_attempt + interval).await {
			return;
		}

		let mut attempt = 1_u32;

		loop {
			// The window is measured from the last *successful* renewal, not
			// from acquisition; the reference slides forward on every success
			// so a long-lived holder never trips the threshold spuriously.
			let stale_for = shared.since_last_renewal();

			if stale_for >= safety {
				shared.lose(LostReason::SafetyThresholdExceeded { since_last_renewal: stale_for });
				obs::record_renewal_attempts(attempt);

				return;
			}
			if *state.borrow() != LeaseState::Acquired {
				return;
			}

			last_attempt = Instant::now();

			let outcome = {
				let renew = shared.renew_via_provider();

				tokio::pin!(renew);
				tokio::select! {
					biased;
					// Every state change leaves Acquired, so any wake-up here
					// means the engine must wind down; dropping the in-flight
					// renewal cancels it.
					_ = state.changed() => return,
					outcome = &mut renew => outcome,
				}
			};

			match outcome {
				Ok(expires_at) => {
					shared.complete_renewal(expires_at);
					obs::record_renewal_attempts(attempt);

					break;
				},
				Err(ProviderError::Lost { reason }) => {
					shared.lose(LostReason::Rejected { reason });
					obs::record_renewal_attempts(attempt);

					return;
				},
				Err(ProviderError::Unavailable { source }) => {
					let will_retry = attempt < attempts_per_window;

					shared.fail_renewal(attempt, will_retry, &source);

					if !will_retry {
						shared.lose(LostReason::RetriesExhausted { attempts: attempt });
						obs::record_renewal_attempts(attempt);

						return;
					}

					let backoff = shared.policy().backoff_after(attempt).unsigned_abs();
					let budget = safety.saturating_sub(shared.since_last_renewal());

					if !sleep_while_acquired(&mut state, Instant::now() + backoff.min(budget))
						.await
					{
						return;
					}

					attempt += 1;
				},
			}
		}
	}
}

/// Sleeps until `deadline`, returning `false` early when the handle leaves
/// `Acquired` or every state sender is gone.
async fn sleep_while_acquired(
	state: &mut watch::Receiver<LeaseState>,
	deadline: Instant,
) -> bool {
	loop {
		tokio::select! {
			biased;
			changed = state.changed() =>
				if changed.is_err() || *state.borrow() != LeaseState::Acquired {
					return false;
				},
			() = sleep_until(deadline) => return true,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_follow_the_two_thirds_rule_and_validate() {
		let policy = RenewalPolicy::default();

		assert_eq!(policy.effective_interval(), Duration::seconds(40));
		assert_eq!(policy.safety_window(), Duration::seconds(54));
		assert_eq!(policy.retry_horizon(), Duration::seconds(35));
		policy.validate().expect("The default policy should validate.");
	}

	#[test]
	fn oversized_retry_horizon_is_rejected_before_any_io() {
		// D=60, I=50, M=3, R=10: horizon 10*(2^3-1)=70 cannot fit inside the
		// 54s safety window.
		let policy = RenewalPolicy::default()
			.with_renew_interval(Duration::seconds(50))
			.with_retry_interval(Duration::seconds(10));
		let error = policy.validate().expect_err("The oversized horizon should be rejected.");

		assert!(matches!(error, ConfigError::RetryHorizonExceedsSafetyWindow { .. }));
	}

	#[test]
	fn interval_must_sit_inside_the_duration() {
		let at_duration =
			RenewalPolicy::default().with_renew_interval(RenewalPolicy::DEFAULT_DURATION);

		assert!(matches!(
			at_duration.validate(),
			Err(ConfigError::RenewIntervalOutOfRange { .. })
		));

		let zero = RenewalPolicy::default().with_renew_interval(Duration::ZERO);

		assert!(matches!(zero.validate(), Err(ConfigError::RenewIntervalOutOfRange { .. })));
	}

	#[test]
	fn safety_fraction_band_is_enforced() {
		for fraction in [0.49, 0.96, -1.0] {
			let policy = RenewalPolicy::default()
				.with_safety_fraction(fraction)
				.with_retry_interval(Duration::seconds(1));

			assert!(
				matches!(policy.validate(), Err(ConfigError::SafetyFractionOutOfRange { .. })),
				"fraction {fraction} should be rejected"
			);
		}

		RenewalPolicy::default()
			.with_safety_fraction(0.95)
			.validate()
			.expect("The 0.95 boundary with default retries should construct.");
		RenewalPolicy::default()
			.with_safety_fraction(0.5)
			.with_retry_interval(Duration::seconds(3))
			.validate()
			.expect("The 0.5 boundary should construct with a 21s horizon inside 30s.");
	}

	#[test]
	fn fifteen_second_leases_derive_clamped_timings() {
		let policy = RenewalPolicy::for_duration(Duration::seconds(15))
			.with_retry_interval(Duration::seconds(1));

		assert_eq!(policy.effective_interval(), Duration::seconds(10));
		assert_eq!(policy.safety_window(), Duration::seconds_f64(13.5));
		policy.validate().expect("Short leases with a tightened retry interval should validate.");

		// The default 35s horizon cannot fit a 13.5s window; construction must
		// fail before any I/O rather than losing the lease at runtime.
		assert!(matches!(
			RenewalPolicy::for_duration(Duration::seconds(15)).validate(),
			Err(ConfigError::RetryHorizonExceedsSafetyWindow { .. })
		));
	}

	#[test]
	fn fail_fast_policies_skip_retry_checks() {
		let policy = RenewalPolicy::default()
			.with_max_retries(0)
			.with_retry_interval(Duration::ZERO);

		policy.validate().expect("A fail-fast policy should not require a retry interval.");
		assert_eq!(policy.retry_horizon(), Duration::ZERO);
	}

	#[test]
	fn backoff_doubles_per_failed_attempt() {
		let policy = RenewalPolicy::default();

		assert_eq!(policy.backoff_after(1), Duration::seconds(5));
		assert_eq!(policy.backoff_after(2), Duration::seconds(10));
		assert_eq!(policy.backoff_after(3), Duration::seconds(20));
	}

	#[test]
	fn non_positive_durations_are_rejected() {
		assert!(matches!(
			RenewalPolicy::for_duration(Duration::ZERO).validate(),
			Err(ConfigError::NonPositiveDuration { .. })
		));
		assert!(matches!(
			RenewalPolicy::for_duration(Duration::seconds(-5)).validate(),
			Err(ConfigError::NonPositiveDuration { .. })
		));
	}
}
