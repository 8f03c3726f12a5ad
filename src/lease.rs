//! Lease domain model: names, fencing tokens, records, events, and handles.

pub mod events;
pub mod handle;
pub mod id;
pub mod record;
pub mod renewal;

pub use events::{EventSubscriber, LeaseEvent, LostReason};
pub use handle::{LeaseHandle, LeaseState};
pub use id::{LeaseId, LeaseName, LeaseNameError};
pub use record::{LeaseMetadata, LeaseRecord};
pub use renewal::RenewalPolicy;
