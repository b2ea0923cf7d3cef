//! Waiting-list reconciliation and "slot available" notifications.
//!
//! For each class the aggregator merges the explicit waiting list with
//! waiting-status bookings, the reconciler decides whether the class's slot
//! notification should be created, extended or retracted, and the driver runs
//! that pipeline for every class (daily) or for a single class (on demand).

mod aggregator;
mod driver;
mod error;
mod locks;
mod reconciler;
mod schedule;
mod store;
mod types;

pub use aggregator::{build_roster, WaitlistAggregator};
pub use driver::{ClassFailure, ClassOutcome, DriverConfig, ReconciliationDriver, RunSummary};
pub use error::{ReconcileError, StoreError};
pub use locks::ClassLocks;
pub use reconciler::{decide, ActionKind, SlotAction, SlotContext, SlotReconciler};
pub use schedule::{run_daily, DailySchedule};
pub use store::StudioStore;
pub use types::*;
