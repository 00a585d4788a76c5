pub mod budget_eval;
pub mod outcome;
pub mod targets;
pub mod workflow;

pub use budget_eval::{evaluate_budget, BudgetVerdict, OverageTolerance};
pub use outcome::{CycleRecord, RunStatus, WorkflowOutcome};
pub use targets::daily_calorie_target;
pub use tokio_util::sync::CancellationToken;
pub use workflow::{BudgetWorkflow, WorkflowState};
