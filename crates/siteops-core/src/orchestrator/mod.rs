//! Time-driven orchestration: run ledger, trigger scheduler and worker pool.
//!
//! The scheduler fires triggers under the ledger's single-flight guarantee;
//! reconciler sweeps fan out into `WorkUnit`s that the dispatcher executes.

pub mod dispatcher;
pub mod ledger;
pub mod scheduler;
pub mod unit;

pub use dispatcher::{Completion, Dispatcher, DispatcherConfig, UnitHandle, UnitJob};
pub use ledger::{RunLedger, RunToken, StartOutcome, TriggerRun};
pub use scheduler::{
    RunContext, RunOutcome, RunReport, Runnable, Scheduler, SchedulerConfig, SchedulerHandle,
};
pub use unit::{UnitAction, UnitFailure, UnitOutcome, UnitReport, WorkUnit};
