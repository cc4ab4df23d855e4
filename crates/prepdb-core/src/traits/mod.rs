//! Trait seams between the provider layers.

pub mod cancellation;
pub mod provider;

pub use cancellation::{Cancellable, TaskState};
pub use provider::{DatabaseProvider, ProviderIdentity, TemplatableProvider};
