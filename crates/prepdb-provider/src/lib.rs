//! # prepdb-provider
//!
//! The provider stack consumers talk to:
//! `PrefetchingProvider(TemplatingProvider(EngineProvider))`.
//!
//! - [`TemplatingProvider`] reuses the longest cached template prefix of a
//!   preparer and clones from it.
//! - [`PrefetchingProvider`] keeps a per-preparer pipeline of databases
//!   prepared ahead of demand on a shared [`PriorityExecutor`].
//! - [`ProviderRegistry`] resolves provider types by name and composes the
//!   stack.
//! - [`DatabaseContext`] is the swappable handle a test holds.

pub mod context;
pub mod executor;
pub mod prefetching;
pub mod registry;
pub mod setup;
pub mod template_cache;
pub mod templating;

pub use context::{ContextState, DatabaseContext};
pub use executor::{ExecutorJob, PriorityExecutor};
pub use prefetching::PrefetchingProvider;
pub use registry::{DependencyMissing, ProviderRegistration, ProviderRegistry};
pub use setup::{SetupGuard, SetupPhase, SetupPhaseTracker};
pub use template_cache::TemplateCache;
pub use templating::TemplatingProvider;
