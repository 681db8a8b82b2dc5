//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod approve_order;
mod execute_order;
mod reconcile_account;

pub use approve_order::{ApprovalOutcome, ApproveOrderUseCase, RISK_REJECTED};
pub use execute_order::{
    ExecuteOrderUseCase, ExecutionOutcome, ExecutionSettings, INTERRUPTED_REASON,
    TIMED_OUT_REASON,
};
pub use reconcile_account::{
    Discrepancy, ReconcileAccountUseCase, ReconciliationReport, compare_ledgers,
};
