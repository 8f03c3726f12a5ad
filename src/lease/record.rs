//! Authoritative lease record returned by backend providers.

// self
use crate::{_prelude::*, lease::LeaseId};

/// Opaque client-supplied key/value annotations attached to a lease.
pub type LeaseMetadata = BTreeMap<String, String>;

/// Authoritative backend state for one lease, as returned by a successful
/// acquisition.
///
/// The record is a snapshot; the backend remains the source of truth and the
/// renewal engine advances the in-process view on every successful renewal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
	/// Fencing token identifying the holder.
	pub lease_id: LeaseId,
	/// Instant beyond which the record is void.
	pub expires_at: OffsetDateTime,
	/// Advisory acquisition instant, for inspection.
	pub acquired_at: OffsetDateTime,
	/// Client metadata stored alongside the lease.
	pub metadata: LeaseMetadata,
}
impl LeaseRecord {
	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at <= instant
	}

	/// Returns `true` if the record is still live at the provided instant.
	pub fn is_live_at(&self, instant: OffsetDateTime) -> bool {
		!self.is_expired_at(instant)
	}

	/// Time remaining before expiry at the provided instant; negative once
	/// expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn record() -> LeaseRecord {
		let acquired_at = macros::datetime!(2025-01-01 00:00 UTC);

		LeaseRecord {
			lease_id: LeaseId::new("token-1"),
			expires_at: acquired_at + Duration::seconds(60),
			acquired_at,
			metadata: LeaseMetadata::from_iter([("region".to_owned(), "eu-west".to_owned())]),
		}
	}

	#[test]
	fn expiry_helpers_agree_on_the_boundary() {
		let record = record();

		assert!(record.is_live_at(record.expires_at - Duration::seconds(1)));
		assert!(record.is_expired_at(record.expires_at));
		assert!(record.is_expired_at(record.expires_at + Duration::seconds(1)));
	}

	#[test]
	fn remaining_goes_negative_after_expiry() {
		let record = record();

		assert_eq!(record.remaining_at(record.acquired_at), Duration::seconds(60));
		assert_eq!(
			record.remaining_at(record.expires_at + Duration::seconds(5)),
			Duration::seconds(-5)
		);
	}
}
