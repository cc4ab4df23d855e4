//! Live database handles and the admission control guarding them.

pub mod admission;
pub mod handle;

pub use admission::{AdmissionPermit, AdmissionSemaphore};
pub use handle::{ConnectionSource, Database, GuardedConnection};
