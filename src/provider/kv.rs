//! Atomic key-value backend using set-if-absent with TTL and compare-and-act.

// self
use crate::{
	_prelude::*,
	lease::{LeaseId, LeaseMetadata, LeaseName, LeaseRecord},
	provider::{AcquireOutcome, LeaseProvider, ProviderError, ProviderFuture, ProviderKind},
	store::AtomicKv,
};

/// Hash field carrying the fencing token.
const LEASE_ID_FIELD: &str = "leaseId";
/// Hash field carrying the acquisition instant.
const ACQUIRED_AT_FIELD: &str = "acquiredAt";
/// Prefix applied to client metadata fields inside the hash.
const META_FIELD_PREFIX: &str = "meta_";

/// Lease provider over an atomic key-value store.
///
/// Acquisition is a single set-if-absent-with-TTL; the key's expiry *is* the
/// lease expiry, so a crashed holder's record vanishes on its own. Renewal and
/// release are server-evaluated compare-and-act units keyed on the stored
/// fencing token.
#[derive(Clone, Debug)]
pub struct AtomicKvProvider<S> {
	store: S,
	prefix: String,
}
impl<S> AtomicKvProvider<S> {
	/// Creates a provider over the given key-value store.
	pub fn new(store: S) -> Self {
		Self { store, prefix: String::new() }
	}

	/// Prepends `prefix` to every key derived from a lease name.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();

		self
	}

	fn key(&self, name: &LeaseName) -> String {
		format!("{}{name}", self.prefix)
	}
}
impl<S> LeaseProvider for AtomicKvProvider<S>
where
	S: AtomicKv,
{
	fn acquire<'a>(
		&'a self,
		name: &'a LeaseName,
		duration: Duration,
		metadata: &'a LeaseMetadata,
	) -> ProviderFuture<'a, AcquireOutcome> {
		Box::pin(async move {
			let key = self.key(name);
			let lease_id = LeaseId::mint();
			let acquired_at = OffsetDateTime::now_utc();
			let mut fields = BTreeMap::from_iter([
				(LEASE_ID_FIELD.to_owned(), lease_id.as_str().to_owned()),
				(ACQUIRED_AT_FIELD.to_owned(), acquired_at.to_string()),
			]);

			for (k, v) in metadata {
				fields.insert(format!("{META_FIELD_PREFIX}{k}"), v.clone());
			}

			if self.store.set_if_absent(&key, fields, duration).await? {
				Ok(AcquireOutcome::Granted(LeaseRecord {
					lease_id,
					expires_at: acquired_at + duration,
					acquired_at,
					metadata: metadata.clone(),
				}))
			} else {
				Ok(AcquireOutcome::Held)
			}
		})
	}

	fn renew<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
		duration: Duration,
	) -> ProviderFuture<'a, OffsetDateTime> {
		Box::pin(async move {
			let key = self.key(name);
			let now = OffsetDateTime::now_utc();

			if self
				.store
				.expire_if_field_matches(&key, LEASE_ID_FIELD, lease_id.as_str(), duration)
				.await?
			{
				Ok(now + duration)
			} else {
				Err(ProviderError::Lost {
					reason: "fencing token mismatch or the key expired".into(),
				})
			}
		})
	}

	fn release<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let key = self.key(name);

			// Succeeds regardless of whether the token still matched.
			let _ = self
				.store
				.delete_if_field_matches(&key, LEASE_ID_FIELD, lease_id.as_str())
				.await?;

			Ok(())
		})
	}

	fn break_lease<'a>(&'a self, name: &'a LeaseName) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let key = self.key(name);

			self.store.delete(&key).await?;

			Ok(())
		})
	}

	fn kind(&self) -> ProviderKind {
		ProviderKind::AtomicKv
	}
}
