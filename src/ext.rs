//! Extension points layered on top of the core lease contract.

#[cfg(any(test, feature = "test"))] pub mod chaos;
#[cfg(any(test, feature = "test"))] pub use chaos::{ChaosProvider, Fault, FaultPlan};
