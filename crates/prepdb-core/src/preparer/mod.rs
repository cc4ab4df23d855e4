//! Preparation steps and the composite preparer used as the template cache key.

pub mod composite;
pub mod descriptor;
pub mod fn_step;
pub mod migration;
pub mod sql_script;
pub mod step;

pub use composite::CompositePreparer;
pub use descriptor::{StepDescriptor, StepDescriptorBuilder};
pub use fn_step::FnStep;
pub use migration::{Migration, MigrationSet, MigrationSetBuilder};
pub use sql_script::SqlScript;
pub use step::{PreparationStep, Step};
