//! Per-job execution.
//!
//! Turns a discovered job into one converter invocation: picks the target
//! format from the caller's [`FormatPolicy`], assigns a collision-free output
//! path from the batch's [`OutputPlan`], runs the tool and applies the
//! caller's [`PostSuccessAction`] to the sources.

mod job_executor;
mod plan;
mod policy;
mod post_action;
mod result;

pub use job_executor::JobExecutor;
pub use plan::OutputPlan;
pub use policy::{FormatPolicy, ResolvedTarget};
pub use post_action::PostSuccessAction;
pub use result::{FailureKind, FailureReason, JobOutcome, JobResult};
