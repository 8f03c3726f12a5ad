//! Optimistic-concurrency backend over a versioned document store.

// self
use crate::{
	_prelude::*,
	lease::{LeaseId, LeaseMetadata, LeaseName, LeaseRecord},
	provider::{AcquireOutcome, LeaseProvider, ProviderError, ProviderFuture, ProviderKind},
	store::{DocumentInsert, DocumentReplace, DocumentStore, StoreError, VersionedDocument},
};

/// Document schema stored per lease name.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LeaseDocument {
	lease_id: LeaseId,
	expires_at: OffsetDateTime,
	acquired_at: OffsetDateTime,
	metadata: LeaseMetadata,
}
impl LeaseDocument {
	fn fresh(duration: Duration, metadata: &LeaseMetadata) -> Self {
		let acquired_at = OffsetDateTime::now_utc();

		Self {
			lease_id: LeaseId::mint(),
			expires_at: acquired_at + duration,
			acquired_at,
			metadata: metadata.clone(),
		}
	}

	fn into_record(self) -> LeaseRecord {
		LeaseRecord {
			lease_id: self.lease_id,
			expires_at: self.expires_at,
			acquired_at: self.acquired_at,
			metadata: self.metadata,
		}
	}
}

/// Lease provider performing compare-and-swap over per-name documents.
///
/// Two distinct checks guard every write: the document's version token is the
/// CAS precondition ("nobody changed the record since I read it") and the
/// stored `lease_id` is the authority check ("I am the owner"). Abandoned
/// records are reaped by the container's TTL cleanup, configured on the store.
#[derive(Clone, Debug)]
pub struct OccLeaseProvider<S> {
	store: S,
}
impl<S> OccLeaseProvider<S> {
	/// Creates a provider over the given document store.
	pub fn new(store: S) -> Self {
		Self { store }
	}
}
impl<S> LeaseProvider for OccLeaseProvider<S>
where
	S: DocumentStore,
{
	fn acquire<'a>(
		&'a self,
		name: &'a LeaseName,
		duration: Duration,
		metadata: &'a LeaseMetadata,
	) -> ProviderFuture<'a, AcquireOutcome> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			match self.store.read(name).await? {
				None => {
					let document = LeaseDocument::fresh(duration, metadata);

					match self.store.insert(name, to_value(&document)?).await? {
						DocumentInsert::Inserted(_) =>
							Ok(AcquireOutcome::Granted(document.into_record())),
						// Another acquirer won the insert race.
						DocumentInsert::AlreadyExists => Ok(AcquireOutcome::Held),
					}
				},
				Some(versioned) => {
					let current = parse(&versioned)?;

					if current.expires_at > now {
						return Ok(AcquireOutcome::Held);
					}

					let document = LeaseDocument::fresh(duration, metadata);

					match self.store.replace(name, to_value(&document)?, &versioned.version).await?
					{
						DocumentReplace::Replaced(_) =>
							Ok(AcquireOutcome::Granted(document.into_record())),
						// A CAS failure means another acquirer overwrote the
						// expired record first.
						DocumentReplace::VersionMismatch | DocumentReplace::Missing =>
							Ok(AcquireOutcome::Held),
					}
				},
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
			let Some(versioned) = self.store.read(name).await? else {
				return Err(ProviderError::Lost { reason: "the lease record is gone".into() });
			};
			let mut document = parse(&versioned)?;

			if document.lease_id != *lease_id {
				return Err(ProviderError::Lost { reason: "fencing token mismatch".into() });
			}

			document.expires_at = OffsetDateTime::now_utc() + duration;

			match self.store.replace(name, to_value(&document)?, &versioned.version).await? {
				DocumentReplace::Replaced(_) => Ok(document.expires_at),
				DocumentReplace::VersionMismatch | DocumentReplace::Missing =>
					Err(ProviderError::Lost {
						reason: "the lease record changed during renewal".into(),
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
			if let Some(versioned) = self.store.read(name).await?
				&& let Ok(document) = parse(&versioned)
				&& document.lease_id == *lease_id
			{
				// Conditioned on the version so a concurrent reacquire wins.
				let _ = self.store.delete(name, Some(&versioned.version)).await?;
			}

			Ok(())
		})
	}

	fn break_lease<'a>(&'a self, name: &'a LeaseName) -> ProviderFuture<'a, ()> {
		Box::pin(async move {
			let _ = self.store.delete(name, None).await?;

			Ok(())
		})
	}

	fn kind(&self) -> ProviderKind {
		ProviderKind::Occ
	}
}

fn to_value(document: &LeaseDocument) -> Result<serde_json::Value, ProviderError> {
	serde_json::to_value(document)
		.map_err(|e| StoreError::serialization(e.to_string()).into())
}

fn parse(versioned: &VersionedDocument) -> Result<LeaseDocument, ProviderError> {
	serde_json::from_value(versioned.value.clone())
		.map_err(|e| StoreError::serialization(e.to_string()).into())
}
