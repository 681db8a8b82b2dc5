//! Application Services
//!
//! Long-lived components shared by the use cases.

mod execution_coordinator;
mod fill_applier;
mod recent_ids;

pub use execution_coordinator::{
    Admission, CoordinatorSettings, ExecutionCoordinator, ShutdownReport,
};
pub use fill_applier::{FillApplier, FillOutcome};
pub use recent_ids::{DEFAULT_ID_WINDOW, RecentIds};
