//! Native-lease backend over an object store's built-in lease primitive.

// std
use std::ops::RangeInclusive;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	lease::{LeaseId, LeaseMetadata, LeaseName, LeaseRecord},
	provider::{AcquireOutcome, LeaseProvider, ProviderError, ProviderFuture, ProviderKind},
	store::{LeaseAcquisition, LeaseObjectStore, LeaseRenewal, MetadataWrite},
};

/// Metadata key carrying the acquisition instant on the backend object.
const ACQUIRED_AT_KEY: &str = "acquired_at";
const DEFAULT_MIN_DURATION: Duration = Duration::seconds(15);
const DEFAULT_MAX_DURATION: Duration = Duration::seconds(60);

/// Lease provider backed by a store's native lease primitive.
///
/// The store mints the lock token, so the token doubles as the fencing token
/// without any minting on our side. Metadata is written only after the lease
/// is acquired, conditioned on the token, so a non-holder can neither break
/// the lease through a metadata update nor leak writes into the object.
#[derive(Clone, Debug)]
pub struct NativeLeaseProvider<S> {
	store: S,
	prefix: String,
	duration_bounds: RangeInclusive<Duration>,
}
impl<S> NativeLeaseProvider<S> {
	/// Creates a provider over the given object store.
	pub fn new(store: S) -> Self {
		Self {
			store,
			prefix: String::new(),
			duration_bounds: DEFAULT_MIN_DURATION..=DEFAULT_MAX_DURATION,
		}
	}

	/// Prepends `prefix` to every object key derived from a lease name.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.prefix = prefix.into();

		self
	}

	/// Overrides the store's supported lease duration range.
	pub fn with_duration_bounds(mut self, bounds: RangeInclusive<Duration>) -> Self {
		self.duration_bounds = bounds;

		self
	}

	fn object_key(&self, name: &LeaseName) -> String {
		format!("{}{name}", self.prefix)
	}
}
impl<S> LeaseProvider for NativeLeaseProvider<S>
where
	S: LeaseObjectStore,
{
	fn acquire<'a>(
		&'a self,
		name: &'a LeaseName,
		duration: Duration,
		metadata: &'a LeaseMetadata,
	) -> ProviderFuture<'a, AcquireOutcome> {
		Box::pin(async move {
			let key = self.object_key(name);

			self.store.ensure_object(&key).await?;

			let (token, expires_at) = match self.store.acquire_lease(&key, duration).await? {
				LeaseAcquisition::Acquired { token, expires_at } => (token, expires_at),
				LeaseAcquisition::Held => return Ok(AcquireOutcome::Held),
			};
			let acquired_at = OffsetDateTime::now_utc();
			let mut stored = metadata.clone();

			stored.insert(ACQUIRED_AT_KEY.to_owned(), acquired_at.to_string());

			// The store rejects the write when another token took the lease in
			// the meantime (an administrative break followed by a reacquire);
			// that is indistinguishable from losing the race.
			match self.store.set_metadata(&key, &token, &stored).await? {
				MetadataWrite::Written => {},
				MetadataWrite::HeldByAnotherLease => return Ok(AcquireOutcome::Held),
			}

			Ok(AcquireOutcome::Granted(LeaseRecord {
				lease_id: LeaseId::new(token),
				expires_at,
				acquired_at,
				metadata: stored,
			}))
		})
	}

	fn renew<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
		duration: Duration,
	) -> ProviderFuture<'a, OffsetDateTime> {
		Box::pin(async move {
			let key = self.object_key(name);

			match self.store.renew_lease(&key, lease_id.as_str(), duration).await? {
				LeaseRenewal::Renewed { expires_at } => Ok(expires_at),
				LeaseRenewal::NotHeld => Err(ProviderError::Lost {
					reason: "the store no longer recognizes the lease token".into(),
				}),
			}
		})
	}

	fn release<'a>(
		&'a self,
		name: &'a LeaseName,
		lease_id: &'a LeaseId,
	) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let key = self.object_key(name);

			// A mismatched or missing lease releases to a no-op.
			let _ = self.store.release_lease(&key, lease_id.as_str()).await?;

			Ok(())
		})
	}

	fn break_lease<'a>(&'a self, name: &'a LeaseName) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let key = self.object_key(name);

			self.store.break_lease(&key).await?;

			Ok(())
		})
	}

	fn kind(&self) -> ProviderKind {
		ProviderKind::NativeLease
	}

	fn validate(&self, duration: Duration) -> Result<(), ConfigError> {
		if self.duration_bounds.contains(&duration) {
			Ok(())
		} else {
			Err(ConfigError::DurationOutOfBackendRange {
				duration,
				min: *self.duration_bounds.start(),
				max: *self.duration_bounds.end(),
			})
		}
	}
}
