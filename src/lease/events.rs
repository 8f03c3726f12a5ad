//! Observable lease lifecycle events and subscriber fan-out.

// std
use std::panic::{AssertUnwindSafe, catch_unwind};
// self
use crate::_prelude::*;

/// Reason attached to a terminal [`LeaseEvent::Lost`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LostReason {
	/// The backend rejected the fencing token, or the record vanished.
	Rejected {
		/// Backend-supplied detail.
		reason: String,
	},
	/// The holder went stale past the safety threshold without a successful
	/// renewal.
	SafetyThresholdExceeded {
		/// Time elapsed since the last successful renewal.
		since_last_renewal: StdDuration,
	},
	/// Every renewal attempt in the window failed.
	RetriesExhausted {
		/// Attempts consumed, including the initial one.
		attempts: u32,
	},
}
impl Display for LostReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Rejected { reason } => write!(f, "rejected by the backend ({reason})"),
			Self::SafetyThresholdExceeded { since_last_renewal } => write!(
				f,
				"no successful renewal for {:.1}s, past the safety threshold",
				since_last_renewal.as_secs_f64()
			),
			Self::RetriesExhausted { attempts } =>
				write!(f, "renewal retries exhausted after {attempts} attempts"),
		}
	}
}

/// Lifecycle transition emitted by a lease handle.
#[derive(Clone, Debug)]
pub enum LeaseEvent {
	/// A renewal succeeded.
	Renewed {
		/// New expiry acknowledged by the backend.
		expires_at: OffsetDateTime,
		/// Successful renewals on this handle so far.
		renewal_count: u64,
	},
	/// A renewal attempt failed.
	RenewalFailed {
		/// 1-based attempt number within the current renewal window.
		attempt: u32,
		/// Whether the engine will retry within this window.
		will_retry: bool,
		/// Failure description.
		error: String,
	},
	/// The lease is definitively gone. Terminal; no event follows it.
	Lost {
		/// Why the lease was abandoned.
		reason: LostReason,
	},
}

/// Callback registered through
/// [`LeaseHandle::on_event`](crate::lease::LeaseHandle::on_event).
pub type EventSubscriber = Box<dyn Fn(&LeaseEvent) + Send + Sync>;

/// Panic-isolating fan-out list. Subscribers are best-effort observers; a
/// panicking callback must never take the renewal engine down with it.
#[derive(Default)]
pub(crate) struct EventSink {
	subscribers: RwLock<Vec<EventSubscriber>>,
}
impl EventSink {
	pub(crate) fn subscribe(&self, subscriber: EventSubscriber) {
		self.subscribers.write().push(subscriber);
	}

	pub(crate) fn dispatch(&self, event: &LeaseEvent) {
		let subscribers = self.subscribers.read();

		for subscriber in subscribers.iter() {
			if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
				warn_subscriber_panic();
			}
		}
	}
}
impl Debug for EventSink {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EventSink")
			.field("subscribers", &self.subscribers.read().len())
			.finish()
	}
}

fn warn_subscriber_panic() {
	#[cfg(feature = "tracing")]
	tracing::warn!("lease event subscriber panicked");
}
