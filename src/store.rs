//! Backend collaborator contracts the lease providers are written against.
//!
//! Each backend strategy consumes a small set of storage primitives; these
//! traits describe exactly those primitives and nothing else. Client
//! construction, credential acquisition, and connection management are the
//! collaborator's concern and happen before a store handle reaches this crate.
//! Implementations must be shareable across leases (`Send + Sync`) and keep no
//! per-lease state of their own.

pub mod memory;

pub use memory::{MemoryDocumentStore, MemoryKv, MemoryObjectStore};

// self
use crate::{_prelude::*, lease::LeaseMetadata};

/// Boxed future returned by store collaborator operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Error type produced by store collaborators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failure surfaced by the backend or its codec.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure (I/O, authentication, throttling).
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	/// Builds a backend-level failure from a message.
	pub fn backend(message: impl Into<String>) -> Self {
		Self::Backend { message: message.into() }
	}

	/// Builds a serialization failure from a message.
	pub fn serialization(message: impl Into<String>) -> Self {
		Self::Serialization { message: message.into() }
	}
}

/// Object store exposing a native lease primitive: an opaque lock token
/// associated with an object for a bounded duration, acquired and renewed
/// atomically by the store itself.
pub trait LeaseObjectStore
where
	Self: Send + Sync,
{
	/// Creates the target object with empty content when absent.
	fn ensure_object<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Atomically acquires the object's lease for `duration`.
	fn acquire_lease<'a>(
		&'a self,
		key: &'a str,
		duration: Duration,
	) -> StoreFuture<'a, LeaseAcquisition>;

	/// Renews the lease identified by `token`.
	fn renew_lease<'a>(
		&'a self,
		key: &'a str,
		token: &'a str,
		duration: Duration,
	) -> StoreFuture<'a, LeaseRenewal>;

	/// Releases the lease identified by `token`.
	fn release_lease<'a>(&'a self, key: &'a str, token: &'a str) -> StoreFuture<'a, LeaseRelease>;

	/// Forcibly ends any active lease on the object.
	fn break_lease<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Writes object metadata conditioned on the supplied lease token.
	fn set_metadata<'a>(
		&'a self,
		key: &'a str,
		token: &'a str,
		metadata: &'a LeaseMetadata,
	) -> StoreFuture<'a, MetadataWrite>;
}

/// Result of a native lease acquisition attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseAcquisition {
	/// The store granted the lease and minted a lock token.
	Acquired {
		/// Store-issued lock token.
		token: String,
		/// Expiry instant acknowledged by the store.
		expires_at: OffsetDateTime,
	},
	/// Another token currently holds the lease.
	Held,
}

/// Result of a native lease renewal attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseRenewal {
	/// The lease clock was reset.
	Renewed {
		/// New expiry instant acknowledged by the store.
		expires_at: OffsetDateTime,
	},
	/// The token no longer matches or the lease is gone.
	NotHeld,
}

/// Result of a native lease release call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseRelease {
	/// The lease was released.
	Released,
	/// The token no longer matched; nothing was released.
	NotHeld,
}

/// Result of a token-conditioned metadata write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataWrite {
	/// Metadata was written under the supplied token.
	Written,
	/// A different token holds the lease; nothing was written.
	HeldByAnotherLease,
}

/// Opaque per-document version token used as the CAS precondition.
///
/// Distinct from the lease id: the version proves "nobody changed the record
/// since I read it", the lease id proves "I am the owner". OCC needs both.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentVersion(String);
impl DocumentVersion {
	/// Wraps a store-issued version token (e.g. an ETag).
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the token as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

/// A document together with the version token observed at read time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedDocument {
	/// Document body.
	pub value: serde_json::Value,
	/// Version token to use as a CAS precondition.
	pub version: DocumentVersion,
}

/// Document store with per-document version tokens and compare-and-swap
/// writes, as used by the optimistic-concurrency backend.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	/// Fetches the document stored under `name`, if present.
	fn read<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<VersionedDocument>>;

	/// Inserts `document` under `name` iff no document exists there.
	fn insert<'a>(
		&'a self,
		name: &'a str,
		document: serde_json::Value,
	) -> StoreFuture<'a, DocumentInsert>;

	/// Replaces the document under `name` iff its version still equals
	/// `expected`.
	fn replace<'a>(
		&'a self,
		name: &'a str,
		document: serde_json::Value,
		expected: &'a DocumentVersion,
	) -> StoreFuture<'a, DocumentReplace>;

	/// Deletes the document under `name`; when `expected` is supplied the
	/// delete only proceeds if the version still matches.
	fn delete<'a>(
		&'a self,
		name: &'a str,
		expected: Option<&'a DocumentVersion>,
	) -> StoreFuture<'a, DocumentDelete>;
}

/// Result of a conditional document insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentInsert {
	/// The document was created; carries its initial version token.
	Inserted(DocumentVersion),
	/// A document already exists under the name.
	AlreadyExists,
}

/// Result of a compare-and-swap document replace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentReplace {
	/// The swap succeeded; carries the new version token.
	Replaced(DocumentVersion),
	/// Another writer changed the document since it was read.
	VersionMismatch,
	/// The document vanished since it was read.
	Missing,
}

/// Result of a (conditionally) versioned document delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentDelete {
	/// The document was removed.
	Deleted,
	/// Another writer changed the document since it was read.
	VersionMismatch,
	/// No document existed under the name.
	Missing,
}

/// Key-value store providing atomic set-if-absent with TTL and server-side
/// compare-and-act evaluation, as used by the atomic-KV backend.
///
/// The conditional operations are contractually single atomic units evaluated
/// on the server (the store's combined command form, or a script). Splitting
/// them into separate round-trips admits a loss-then-reacquire race in which a
/// stale holder's release deletes a new owner's lease.
pub trait AtomicKv
where
	Self: Send + Sync,
{
	/// Atomically sets `fields` at `key` with expiry `ttl` iff the key is
	/// absent; returns `true` when the key was set.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		fields: BTreeMap<String, String>,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Resets the key's TTL iff `field` currently equals `expected`; returns
	/// `true` when the expiry was reset.
	fn expire_if_field_matches<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		expected: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Deletes the key iff `field` currently equals `expected`; returns `true`
	/// when the key was removed.
	fn delete_if_field_matches<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		expected: &'a str,
	) -> StoreFuture<'a, bool>;

	/// Unconditionally deletes the key.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
