//! Manager-level acquisition behavior: polling, timeouts, the try variant,
//! and the administrative break.

// self
use lease_broker::{
	_preludet::*,
	error::Error,
	ext::{ChaosProvider, Fault, FaultPlan},
	lease::{LeaseMetadata, LeaseName, LeaseState},
	manager::{AcquireRequest, AcquireTimeout, LeaseOptions},
	obs::LeaseOp,
	provider::AtomicKvProvider,
	store::MemoryKv,
};

fn name(value: &str) -> LeaseName {
	LeaseName::new(value).expect("Lease name fixture should be valid.")
}

fn quiet_options() -> LeaseOptions {
	// Engine-free handles keep acquisition tests focused on the manager.
	LeaseOptions::default().with_auto_renew(false)
}

#[tokio::test(flavor = "multi_thread")]
async fn try_acquire_race_elects_a_single_winner() {
	let store = MemoryKv::default();
	let manager_a = Arc::new(manager_over(
		Arc::new(AtomicKvProvider::new(store.clone())),
		quiet_options(),
	));
	let manager_b = Arc::new(manager_over(
		Arc::new(AtomicKvProvider::new(store.clone())),
		quiet_options(),
	));
	let racer_a = manager_a.clone();
	let racer_b = manager_b.clone();
	let task_a =
		tokio::spawn(async move { racer_a.try_acquire(name("x")).await.expect("A should not error.") });
	let task_b =
		tokio::spawn(async move { racer_b.try_acquire(name("x")).await.expect("B should not error.") });
	let (a, b) = tokio::join!(task_a, task_b);
	let a = a.expect("Racer A should not panic.");
	let b = b.expect("Racer B should not panic.");

	assert_eq!(
		a.is_some() as u8 + b.is_some() as u8,
		1,
		"exactly one racer should obtain a handle"
	);

	let winner = a.or(b).expect("One handle should exist.");

	assert!(winner.is_held());

	winner.release().await;

	// With the winner gone, the loser succeeds on its next poll.
	let retry = manager_b
		.try_acquire(name("x"))
		.await
		.expect("Retry should not error.")
		.expect("The lease should be free after release.");

	assert!(retry.is_held());

	retry.release().await;
}

#[tokio::test(start_paused = true)]
async fn acquire_blocks_until_the_holder_releases() {
	let (manager_a, store) = memory_kv_manager(quiet_options());
	let manager_b =
		Arc::new(manager_over(Arc::new(AtomicKvProvider::new(store.clone())), quiet_options()));
	let held = manager_a.acquire(name("x")).await.expect("First acquire should succeed.");
	let waiter = manager_b.clone();
	let blocked = tokio::spawn(async move { waiter.acquire(name("x")).await });

	// Let the waiter burn a few 5s polls against the held lease.
	tokio::time::sleep(StdDuration::from_secs(12)).await;
	assert!(!blocked.is_finished(), "the waiter should still be polling");

	held.release().await;

	let handle = blocked
		.await
		.expect("The waiter should not panic.")
		.expect("The waiter should obtain the lease after release.");

	assert!(handle.is_held());
	assert_eq!(handle.state(), LeaseState::Acquired);

	handle.release().await;
	assert_eq!(handle.state(), LeaseState::Released);
	assert!(!store.contains("x"));
}

#[tokio::test(start_paused = true)]
async fn acquire_times_out_against_a_stubborn_holder() {
	let (manager_a, store) = memory_kv_manager(quiet_options());
	let manager_b =
		manager_over(Arc::new(AtomicKvProvider::new(store.clone())), quiet_options());
	let _held = manager_a.acquire(name("x")).await.expect("First acquire should succeed.");
	let error = manager_b
		.acquire_with(
			AcquireRequest::new(name("x"))
				.with_timeout(AcquireTimeout::After(Duration::seconds(7))),
		)
		.await
		.expect_err("The bounded acquire should time out.");

	assert!(matches!(error, Error::AcquireTimeout { .. }));
	assert!(
		manager_b.metrics().acquire_attempts() >= 2,
		"the waiter should have polled at least twice before timing out"
	);
}

#[tokio::test]
async fn zero_timeout_behaves_like_try_acquire() {
	let (manager_a, store) = memory_kv_manager(quiet_options());
	let manager_b =
		manager_over(Arc::new(AtomicKvProvider::new(store.clone())), quiet_options());
	let _held = manager_a.acquire(name("x")).await.expect("First acquire should succeed.");
	let error = manager_b
		.acquire_with(
			AcquireRequest::new(name("x")).with_timeout(AcquireTimeout::After(Duration::ZERO)),
		)
		.await
		.expect_err("A zero budget against a held lease should time out.");

	assert!(matches!(error, Error::AcquireTimeout { .. }));
	assert_eq!(
		manager_b.metrics().acquire_attempts(),
		1,
		"a zero budget makes exactly one attempt"
	);
}

#[tokio::test]
async fn provider_unavailability_propagates_without_retry() {
	let inner = Arc::new(AtomicKvProvider::new(MemoryKv::default()));
	let chaotic = ChaosProvider::new(inner, FaultPlan::sequence([Some(Fault::Unavailable)]))
		.with_targets([LeaseOp::Acquire]);
	let manager = manager_over(Arc::new(chaotic), quiet_options());
	let error = manager
		.acquire(name("x"))
		.await
		.expect_err("Acquisition against a down backend should fail.");

	assert!(matches!(error, Error::Unavailable { .. }));
	assert_eq!(manager.metrics().acquire_attempts(), 1, "outer retry is the caller's concern");
	assert_eq!(manager.metrics().acquire_successes(), 0);

	// The backend recovered (the script is exhausted); the same manager works.
	let handle = manager.acquire(name("x")).await.expect("The retried acquire should succeed.");

	handle.release().await;
}

#[tokio::test]
async fn break_lease_evicts_the_current_holder() {
	let (manager_a, store) = memory_kv_manager(quiet_options());
	let manager_b =
		manager_over(Arc::new(AtomicKvProvider::new(store.clone())), quiet_options());
	let held = manager_a.acquire(name("x")).await.expect("First acquire should succeed.");

	manager_b.break_lease(&name("x")).await.expect("Break should succeed.");

	let taken = manager_b
		.try_acquire(name("x"))
		.await
		.expect("Post-break acquire should not error.")
		.expect("The lease should be free after the break.");

	assert_ne!(taken.lease_id(), held.lease_id());

	// The evicted holder discovers the loss on its next manual renewal.
	let error = held.renew_once().await.expect_err("The evicted holder should not renew.");

	assert!(matches!(error, Error::Lost { .. }));
	assert_eq!(held.state(), LeaseState::Lost);

	taken.release().await;
}

#[tokio::test]
async fn request_metadata_merges_over_manager_metadata() {
	let store = MemoryKv::default();
	let options = quiet_options().with_metadata(LeaseMetadata::from_iter([
		("app".to_owned(), "broker".to_owned()),
		("holder".to_owned(), "default".to_owned()),
	]));
	let manager = manager_over(Arc::new(AtomicKvProvider::new(store.clone())), options);
	let handle = manager
		.acquire_with(AcquireRequest::new(name("x")).with_metadata(LeaseMetadata::from_iter([(
			"holder".to_owned(),
			"p2".to_owned(),
		)])))
		.await
		.expect("Acquire should succeed.");

	assert_eq!(store.field("x", "meta_app"), Some("broker".to_owned()));
	assert_eq!(store.field("x", "meta_holder"), Some("p2".to_owned()), "the request wins per key");

	handle.release().await;
}

#[tokio::test]
async fn managers_work_over_every_backend() {
	let (kv, _) = memory_kv_manager(quiet_options());
	let (occ, _) = memory_occ_manager(quiet_options());
	let (native, _) = memory_native_manager(quiet_options());

	for manager in [kv, occ, native] {
		let handle = manager
			.acquire(name("leader"))
			.await
			.unwrap_or_else(|e| panic!("Acquire should succeed over {manager:?}: {e}"));

		assert!(handle.is_held());
		assert!(
			manager
				.try_acquire(name("leader"))
				.await
				.expect("Contested try_acquire should not error.")
				.is_none(),
			"a held lease should not be granted twice"
		);

		handle.release().await;

		let retaken = manager
			.try_acquire(name("leader"))
			.await
			.expect("Post-release acquire should not error.")
			.expect("The lease should be free after release.");

		retaken.release().await;
	}
}

#[tokio::test]
async fn metrics_track_the_acquisition_lifecycle() {
	let (manager, _store) = memory_kv_manager(quiet_options());
	let handle = manager.acquire(name("x")).await.expect("Acquire should succeed.");

	assert_eq!(manager.metrics().acquire_attempts(), 1);
	assert_eq!(manager.metrics().acquire_successes(), 1);
	assert_eq!(manager.metrics().held(), 1);

	handle.release().await;
	handle.release().await;

	assert_eq!(manager.metrics().held(), 0, "release must decrement exactly once");
}
