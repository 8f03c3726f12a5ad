//! Rust’s turnkey distributed lease broker—time-bound exclusive ownership of
//! named resources over pluggable backends, with CAS-smart providers, an
//! auto-renewing lease engine, and transport-aware observability in one crate
//! built for production.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod error;
pub mod ext;
pub mod lease;
pub mod manager;
pub mod obs;
pub mod provider;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		manager::{LeaseManager, LeaseOptions},
		provider::{AtomicKvProvider, LeaseProvider, NativeLeaseProvider, OccLeaseProvider},
		store::{MemoryDocumentStore, MemoryKv, MemoryObjectStore},
	};

	/// Wraps any provider in a manager, panicking on invalid option fixtures.
	pub fn manager_over(provider: Arc<dyn LeaseProvider>, options: LeaseOptions) -> LeaseManager {
		LeaseManager::new(provider, options).expect("Options fixture should validate.")
	}

	/// Builds a manager over a fresh in-memory atomic-KV backend, returning
	/// the store so further managers (or assertions) can share it.
	pub fn memory_kv_manager(options: LeaseOptions) -> (LeaseManager, MemoryKv) {
		let store = MemoryKv::default();
		let manager = manager_over(Arc::new(AtomicKvProvider::new(store.clone())), options);

		(manager, store)
	}

	/// Builds a manager over a fresh in-memory document (OCC) backend.
	pub fn memory_occ_manager(options: LeaseOptions) -> (LeaseManager, MemoryDocumentStore) {
		let store = MemoryDocumentStore::default();
		let manager = manager_over(Arc::new(OccLeaseProvider::new(store.clone())), options);

		(manager, store)
	}

	/// Builds a manager over a fresh in-memory native-lease backend with the
	/// store's duration bounds widened for sub-second test leases.
	pub fn memory_native_manager(options: LeaseOptions) -> (LeaseManager, MemoryObjectStore) {
		let store = MemoryObjectStore::default();
		let provider = NativeLeaseProvider::new(store.clone())
			.with_duration_bounds(Duration::milliseconds(50)..=Duration::seconds(120));
		let manager = manager_over(Arc::new(provider), options);

		(manager, store)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}
