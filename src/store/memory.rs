//! Thread-safe in-memory store implementations for local development and tests.
//!
//! One reference implementation per collaborator contract. All three keep
//! their state behind shared interior mutability, so cloning a store yields
//! another handle onto the same backend: two providers over clones of one
//! store behave like two processes sharing a real backend.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	lease::LeaseMetadata,
	store::{
		AtomicKv, DocumentDelete, DocumentInsert, DocumentReplace, DocumentStore, DocumentVersion,
		LeaseAcquisition, LeaseObjectStore, LeaseRelease, LeaseRenewal, MetadataWrite, StoreError,
		StoreFuture, VersionedDocument,
	},
};

const DEFAULT_TTL_GRACE: Duration = Duration::seconds(300);

type ObjectMap = Arc<RwLock<HashMap<String, ObjectEntry>>>;
type DocumentMap = Arc<RwLock<HashMap<String, DocumentEntry>>>;
type KvMap = Arc<RwLock<HashMap<String, KvEntry>>>;

#[derive(Clone, Debug, Default)]
struct ObjectEntry {
	lease: Option<ObjectLease>,
	metadata: LeaseMetadata,
}

#[derive(Clone, Debug)]
struct ObjectLease {
	token: String,
	expires_at: OffsetDateTime,
}
impl ObjectLease {
	fn is_live(&self, now: OffsetDateTime) -> bool {
		self.expires_at > now
	}
}

/// In-memory [`LeaseObjectStore`] mimicking an object store's native lease
/// primitive.
#[derive(Clone, Debug, Default)]
pub struct MemoryObjectStore(ObjectMap);
impl MemoryObjectStore {
	/// Returns the metadata currently stored for `key`, for inspection.
	pub fn metadata(&self, key: &str) -> Option<LeaseMetadata> {
		self.0.read().get(key).map(|entry| entry.metadata.clone())
	}

	/// Returns the live lease token on `key`, if any.
	pub fn lease_token(&self, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		self.0
			.read()
			.get(key)
			.and_then(|entry| entry.lease.as_ref())
			.filter(|lease| lease.is_live(now))
			.map(|lease| lease.token.clone())
	}

	fn ensure_now(map: ObjectMap, key: String) {
		map.write().entry(key).or_default();
	}

	fn acquire_now(
		map: ObjectMap,
		key: String,
		duration: Duration,
	) -> Result<LeaseAcquisition, StoreError> {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();
		let entry = guard
			.get_mut(&key)
			.ok_or_else(|| StoreError::backend(format!("object `{key}` does not exist")))?;

		if entry.lease.as_ref().is_some_and(|lease| lease.is_live(now)) {
			return Ok(LeaseAcquisition::Held);
		}

		let token = format!("{:032x}", rand::random::<u128>());
		let expires_at = now + duration;

		entry.lease = Some(ObjectLease { token: token.clone(), expires_at });

		Ok(LeaseAcquisition::Acquired { token, expires_at })
	}

	fn renew_now(map: ObjectMap, key: String, token: String, duration: Duration) -> LeaseRenewal {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get_mut(&key).and_then(|entry| entry.lease.as_mut()) {
			Some(lease) if lease.token == token => {
				lease.expires_at = now + duration;

				LeaseRenewal::Renewed { expires_at: lease.expires_at }
			},
			_ => LeaseRenewal::NotHeld,
		}
	}

	fn release_now(map: ObjectMap, key: String, token: String) -> LeaseRelease {
		let mut guard = map.write();
		let Some(entry) = guard.get_mut(&key) else { return LeaseRelease::NotHeld };

		match entry.lease.as_ref() {
			Some(lease) if lease.token == token => {
				entry.lease = None;

				LeaseRelease::Released
			},
			_ => LeaseRelease::NotHeld,
		}
	}

	fn break_now(map: ObjectMap, key: String) {
		if let Some(entry) = map.write().get_mut(&key) {
			entry.lease = None;
		}
	}

	fn set_metadata_now(
		map: ObjectMap,
		key: String,
		token: String,
		metadata: LeaseMetadata,
	) -> Result<MetadataWrite, StoreError> {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();
		let entry = guard
			.get_mut(&key)
			.ok_or_else(|| StoreError::backend(format!("object `{key}` does not exist")))?;

		match entry.lease.as_ref() {
			Some(lease) if lease.token == token && lease.is_live(now) => {
				entry.metadata = metadata;

				Ok(MetadataWrite::Written)
			},
			_ => Ok(MetadataWrite::HeldByAnotherLease),
		}
	}
}
impl LeaseObjectStore for MemoryObjectStore {
	fn ensure_object<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::ensure_now(map, key);

			Ok(())
		})
	}

	fn acquire_lease<'a>(
		&'a self,
		key: &'a str,
		duration: Duration,
	) -> StoreFuture<'a, LeaseAcquisition> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Self::acquire_now(map, key, duration) })
	}

	fn renew_lease<'a>(
		&'a self,
		key: &'a str,
		token: &'a str,
		duration: Duration,
	) -> StoreFuture<'a, LeaseRenewal> {
		let map = self.0.clone();
		let key = key.to_owned();
		let token = token.to_owned();

		Box::pin(async move { Ok(Self::renew_now(map, key, token, duration)) })
	}

	fn release_lease<'a>(&'a self, key: &'a str, token: &'a str) -> StoreFuture<'a, LeaseRelease> {
		let map = self.0.clone();
		let key = key.to_owned();
		let token = token.to_owned();

		Box::pin(async move { Ok(Self::release_now(map, key, token)) })
	}

	fn break_lease<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			Self::break_now(map, key);

			Ok(())
		})
	}

	fn set_metadata<'a>(
		&'a self,
		key: &'a str,
		token: &'a str,
		metadata: &'a LeaseMetadata,
	) -> StoreFuture<'a, MetadataWrite> {
		let map = self.0.clone();
		let key = key.to_owned();
		let token = token.to_owned();
		let metadata = metadata.clone();

		Box::pin(async move { Self::set_metadata_now(map, key, token, metadata) })
	}
}

#[derive(Clone, Debug)]
struct DocumentEntry {
	value: serde_json::Value,
	version: DocumentVersion,
}

/// In-memory [`DocumentStore`] with monotonically increasing version tokens
/// and container-level TTL cleanup.
///
/// Expired documents linger for a configurable grace period past their
/// `expires_at` field before the simulated container TTL removes them, the
/// way a real container-level TTL sweeps abandoned records.
#[derive(Clone, Debug)]
pub struct MemoryDocumentStore {
	entries: DocumentMap,
	next_version: Arc<AtomicU64>,
	ttl_grace: Duration,
}
impl MemoryDocumentStore {
	/// Overrides the cleanup grace period applied past each document's
	/// `expires_at` field.
	pub fn with_ttl_grace(mut self, grace: Duration) -> Self {
		self.ttl_grace = grace;

		self
	}

	/// Returns `true` if a document is currently stored under `name`.
	pub fn contains(&self, name: &str) -> bool {
		self.purge_expired();

		self.entries.read().contains_key(name)
	}

	fn mint_version(&self) -> DocumentVersion {
		DocumentVersion::new(self.next_version.fetch_add(1, Ordering::Relaxed).to_string())
	}

	fn purge_expired(&self) {
		let now = OffsetDateTime::now_utc();
		let grace = self.ttl_grace;

		self.entries.write().retain(|_, entry| match expiry_hint(&entry.value) {
			Some(expires_at) => expires_at + grace > now,
			None => true,
		});
	}
}
impl Default for MemoryDocumentStore {
	fn default() -> Self {
		Self {
			entries: Default::default(),
			next_version: Default::default(),
			ttl_grace: DEFAULT_TTL_GRACE,
		}
	}
}
impl DocumentStore for MemoryDocumentStore {
	fn read<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<VersionedDocument>> {
		Box::pin(async move {
			self.purge_expired();

			Ok(self.entries.read().get(name).map(|entry| VersionedDocument {
				value: entry.value.clone(),
				version: entry.version.clone(),
			}))
		})
	}

	fn insert<'a>(
		&'a self,
		name: &'a str,
		document: serde_json::Value,
	) -> StoreFuture<'a, DocumentInsert> {
		Box::pin(async move {
			self.purge_expired();

			let mut guard = self.entries.write();

			if guard.contains_key(name) {
				return Ok(DocumentInsert::AlreadyExists);
			}

			let version = self.mint_version();

			guard.insert(name.to_owned(), DocumentEntry {
				value: document,
				version: version.clone(),
			});

			Ok(DocumentInsert::Inserted(version))
		})
	}

	fn replace<'a>(
		&'a self,
		name: &'a str,
		document: serde_json::Value,
		expected: &'a DocumentVersion,
	) -> StoreFuture<'a, DocumentReplace> {
		Box::pin(async move {
			self.purge_expired();

			let mut guard = self.entries.write();
			let Some(entry) = guard.get_mut(name) else { return Ok(DocumentReplace::Missing) };

			if entry.version != *expected {
				return Ok(DocumentReplace::VersionMismatch);
			}

			let version = self.mint_version();

			entry.value = document;
			entry.version = version.clone();

			Ok(DocumentReplace::Replaced(version))
		})
	}

	fn delete<'a>(
		&'a self,
		name: &'a str,
		expected: Option<&'a DocumentVersion>,
	) -> StoreFuture<'a, DocumentDelete> {
		Box::pin(async move {
			self.purge_expired();

			let mut guard = self.entries.write();
			let Some(entry) = guard.get(name) else { return Ok(DocumentDelete::Missing) };

			if expected.is_some_and(|version| entry.version != *version) {
				return Ok(DocumentDelete::VersionMismatch);
			}

			guard.remove(name);

			Ok(DocumentDelete::Deleted)
		})
	}
}

fn expiry_hint(value: &serde_json::Value) -> Option<OffsetDateTime> {
	value.get("expires_at").and_then(|raw| serde_json::from_value(raw.clone()).ok())
}

#[derive(Clone, Debug)]
struct KvEntry {
	fields: BTreeMap<String, String>,
	expires_at: OffsetDateTime,
}
impl KvEntry {
	fn is_live(&self, now: OffsetDateTime) -> bool {
		self.expires_at > now
	}
}

/// In-memory [`AtomicKv`] with key-level expiry.
///
/// Expired keys are treated as absent and reaped lazily, matching a real
/// store's TTL behavior closely enough for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct MemoryKv(KvMap);
impl MemoryKv {
	/// Returns `true` if a live entry is stored under `key`.
	pub fn contains(&self, key: &str) -> bool {
		let now = OffsetDateTime::now_utc();

		self.0.read().get(key).is_some_and(|entry| entry.is_live(now))
	}

	/// Returns a field of the live entry under `key`, for inspection.
	pub fn field(&self, key: &str, field: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		self.0
			.read()
			.get(key)
			.filter(|entry| entry.is_live(now))
			.and_then(|entry| entry.fields.get(field).cloned())
	}

	fn set_if_absent_now(
		map: KvMap,
		key: String,
		fields: BTreeMap<String, String>,
		ttl: Duration,
	) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		if guard.get(&key).is_some_and(|entry| entry.is_live(now)) {
			return false;
		}

		guard.insert(key, KvEntry { fields, expires_at: now + ttl });

		true
	}

	fn expire_if_match_now(
		map: KvMap,
		key: String,
		field: String,
		expected: String,
		ttl: Duration,
	) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get_mut(&key) {
			Some(entry)
				if entry.is_live(now) && entry.fields.get(&field) == Some(&expected) =>
			{
				entry.expires_at = now + ttl;

				true
			},
			_ => false,
		}
	}

	fn delete_if_match_now(map: KvMap, key: String, field: String, expected: String) -> bool {
		let now = OffsetDateTime::now_utc();
		let mut guard = map.write();

		match guard.get(&key) {
			Some(entry) if entry.is_live(now) && entry.fields.get(&field) == Some(&expected) => {
				guard.remove(&key);

				true
			},
			_ => false,
		}
	}
}
impl AtomicKv for MemoryKv {
	fn set_if_absent<'a>(
		&'a self,
		key: &'a str,
		fields: BTreeMap<String, String>,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move { Ok(Self::set_if_absent_now(map, key, fields, ttl)) })
	}

	fn expire_if_field_matches<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		expected: &'a str,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		let map = self.0.clone();
		let key = key.to_owned();
		let field = field.to_owned();
		let expected = expected.to_owned();

		Box::pin(async move { Ok(Self::expire_if_match_now(map, key, field, expected, ttl)) })
	}

	fn delete_if_field_matches<'a>(
		&'a self,
		key: &'a str,
		field: &'a str,
		expected: &'a str,
	) -> StoreFuture<'a, bool> {
		let map = self.0.clone();
		let key = key.to_owned();
		let field = field.to_owned();
		let expected = expected.to_owned();

		Box::pin(async move { Ok(Self::delete_if_match_now(map, key, field, expected)) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();
		let key = key.to_owned();

		Box::pin(async move {
			map.write().remove(&key);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn object_lease_cycle_acquire_renew_release() {
		let store = MemoryObjectStore::default();

		store.ensure_object("leases/leader").await.expect("Ensure should succeed.");

		let acquired = store
			.acquire_lease("leases/leader", Duration::seconds(30))
			.await
			.expect("Acquire should succeed on an unleased object.");
		let LeaseAcquisition::Acquired { token, expires_at } = acquired else {
			panic!("First acquisition should be granted.");
		};

		assert_eq!(
			store
				.acquire_lease("leases/leader", Duration::seconds(30))
				.await
				.expect("Second acquire should not error."),
			LeaseAcquisition::Held
		);

		let renewed = store
			.renew_lease("leases/leader", &token, Duration::seconds(30))
			.await
			.expect("Renew should not error.");
		let LeaseRenewal::Renewed { expires_at: renewed_at } = renewed else {
			panic!("Renewal with the held token should succeed.");
		};

		assert!(renewed_at >= expires_at);
		assert_eq!(
			store
				.renew_lease("leases/leader", "stale-token", Duration::seconds(30))
				.await
				.expect("Renew with a stale token should not error."),
			LeaseRenewal::NotHeld
		);
		assert_eq!(
			store
				.release_lease("leases/leader", &token)
				.await
				.expect("Release should not error."),
			LeaseRelease::Released
		);
		assert!(store.lease_token("leases/leader").is_none());
	}

	#[tokio::test]
	async fn object_metadata_writes_are_token_conditioned() {
		let store = MemoryObjectStore::default();

		store.ensure_object("leases/x").await.expect("Ensure should succeed.");

		let LeaseAcquisition::Acquired { token, .. } = store
			.acquire_lease("leases/x", Duration::seconds(30))
			.await
			.expect("Acquire should succeed.")
		else {
			panic!("Acquisition should be granted.");
		};
		let metadata = LeaseMetadata::from_iter([("holder".to_owned(), "p1".to_owned())]);

		assert_eq!(
			store
				.set_metadata("leases/x", &token, &metadata)
				.await
				.expect("Metadata write should not error."),
			MetadataWrite::Written
		);
		assert_eq!(
			store
				.set_metadata("leases/x", "intruder", &metadata)
				.await
				.expect("Conditioned write should not error."),
			MetadataWrite::HeldByAnotherLease
		);
		assert_eq!(store.metadata("leases/x"), Some(metadata));
	}

	#[tokio::test]
	async fn document_replace_requires_the_observed_version() {
		let store = MemoryDocumentStore::default();
		let body = serde_json::json!({ "lease_id": "a" });

		let DocumentInsert::Inserted(version) =
			store.insert("x", body.clone()).await.expect("Insert should succeed.")
		else {
			panic!("Insert into an empty store should succeed.");
		};

		assert_eq!(
			store.insert("x", body.clone()).await.expect("Duplicate insert should not error."),
			DocumentInsert::AlreadyExists
		);

		let DocumentReplace::Replaced(next) = store
			.replace("x", serde_json::json!({ "lease_id": "b" }), &version)
			.await
			.expect("Replace should not error.")
		else {
			panic!("Replace with the observed version should succeed.");
		};

		assert_eq!(
			store
				.replace("x", body, &version)
				.await
				.expect("Stale replace should not error."),
			DocumentReplace::VersionMismatch
		);
		assert_eq!(
			store.delete("x", Some(&version)).await.expect("Stale delete should not error."),
			DocumentDelete::VersionMismatch
		);
		assert_eq!(
			store.delete("x", Some(&next)).await.expect("Fresh delete should not error."),
			DocumentDelete::Deleted
		);
		assert!(!store.contains("x"));
	}

	#[tokio::test]
	async fn concurrent_document_swaps_allow_a_single_winner() {
		let store = MemoryDocumentStore::default();

		let DocumentInsert::Inserted(version) = store
			.insert("x", serde_json::json!({ "lease_id": "base" }))
			.await
			.expect("Insert should succeed.")
		else {
			panic!("Insert into an empty store should succeed.");
		};
		let store_a = store.clone();
		let store_b = store.clone();
		let version_a = version.clone();
		let version_b = version;
		let task_a = tokio::spawn(async move {
			store_a
				.replace("x", serde_json::json!({ "lease_id": "a" }), &version_a)
				.await
				.expect("CAS task A should complete.")
		});
		let task_b = tokio::spawn(async move {
			store_b
				.replace("x", serde_json::json!({ "lease_id": "b" }), &version_b)
				.await
				.expect("CAS task B should complete.")
		});
		let (outcome_a, outcome_b) = tokio::join!(task_a, task_b);
		let outcomes = [
			outcome_a.expect("CAS task A should not panic."),
			outcome_b.expect("CAS task B should not panic."),
		];
		let winners = outcomes
			.iter()
			.filter(|outcome| matches!(outcome, DocumentReplace::Replaced(_)))
			.count();

		assert_eq!(winners, 1, "exactly one swap should win");
	}

	#[tokio::test]
	async fn documents_expire_after_the_ttl_grace() {
		let store = MemoryDocumentStore::default().with_ttl_grace(Duration::ZERO);
		let expired = OffsetDateTime::now_utc() - Duration::seconds(1);

		store
			.insert("x", serde_json::json!({ "lease_id": "a", "expires_at": expired }))
			.await
			.expect("Insert should succeed.");

		assert!(!store.contains("x"), "the container TTL should reap expired documents");
	}

	#[tokio::test]
	async fn kv_set_if_absent_respects_live_entries_and_ttl() {
		let store = MemoryKv::default();
		let fields = BTreeMap::from_iter([("leaseId".to_owned(), "a".to_owned())]);

		assert!(
			store
				.set_if_absent("ll:x", fields.clone(), Duration::seconds(30))
				.await
				.expect("First set should not error.")
		);
		assert!(
			!store
				.set_if_absent("ll:x", fields.clone(), Duration::seconds(30))
				.await
				.expect("Second set should not error.")
		);

		// A dead key behaves exactly like an absent one.
		assert!(
			store
				.set_if_absent("ll:dead", fields, Duration::seconds(-1))
				.await
				.expect("Set with an already-elapsed TTL should not error.")
		);
		assert!(!store.contains("ll:dead"));
	}

	#[tokio::test]
	async fn kv_compare_and_act_checks_the_lease_field() {
		let store = MemoryKv::default();
		let fields = BTreeMap::from_iter([("leaseId".to_owned(), "a".to_owned())]);

		store
			.set_if_absent("ll:x", fields, Duration::seconds(30))
			.await
			.expect("Set should not error.");

		assert!(
			store
				.expire_if_field_matches("ll:x", "leaseId", "a", Duration::seconds(30))
				.await
				.expect("Matching expire should not error.")
		);
		assert!(
			!store
				.expire_if_field_matches("ll:x", "leaseId", "b", Duration::seconds(30))
				.await
				.expect("Mismatched expire should not error.")
		);
		assert!(
			!store
				.delete_if_field_matches("ll:x", "leaseId", "b")
				.await
				.expect("Mismatched delete should not error.")
		);
		assert!(store.contains("ll:x"));
		assert!(
			store
				.delete_if_field_matches("ll:x", "leaseId", "a")
				.await
				.expect("Matching delete should not error.")
		);
		assert!(!store.contains("ll:x"));
	}
}
