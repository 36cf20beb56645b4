//! Pipeline task contract
//!
//! A [`Task`] is one opaque stage of the resolved pipeline — an eraser, an
//! imager, a recorder or a checksum engine. The engine owns exactly one
//! active task at a time, runs it to completion on the calling thread and
//! receives progress through the [`TaskMonitor`] it passes in. A task is
//! produced fresh by the capability resolver for each pipeline build and
//! is never reused across builds; the same instance is only re-run for
//! stage-local retryable errors.

use std::time::Duration;

use crate::decision::BurnAction;
use crate::error::Result;
use crate::track::ChecksumType;

/// What kind of work a pipeline stage does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Blank or format the destination medium
    Erase,
    /// Produce an image from the session input
    Image,
    /// Write to the destination medium
    Record,
    /// Verify checksums
    Checksum,
}

/// Progress snapshot a running task can report
#[derive(Debug, Clone, Default)]
pub struct TaskProgress {
    /// Bytes written so far
    pub written: u64,
    /// Current rate in bytes per second
    pub rate: u64,
    /// Estimated remaining time
    pub remaining: Option<Duration>,
}

/// Sink a running task reports into
pub trait TaskMonitor {
    /// The task advanced to `fraction` (0.0..=1.0) of its own work
    fn progress_changed(&self, fraction: f64, remaining: Option<Duration>);

    /// The task moved to another phase of its work
    fn action_changed(&self, action: BurnAction);

    /// The task computed a checksum of the data it processed. The engine
    /// attaches it to the recorded track for post-burn verification.
    fn checksum_computed(&self, kind: ChecksumType, value: &str) {
        let _ = (kind, value);
    }
}

/// One opaque stage of the burn pipeline
pub trait Task: Send + Sync {
    /// What kind of stage this is
    fn action(&self) -> TaskAction;

    /// Run the stage to completion, blocking the caller
    fn run(&self, monitor: &dyn TaskMonitor) -> Result<()>;

    /// Dry-run the stage: validate feasibility and compute the output
    /// size without writing anything
    fn check(&self, monitor: &dyn TaskMonitor) -> Result<()>;

    /// Request cancellation. With `protect` set the task finishes the
    /// hardware-critical part it is in before stopping.
    fn cancel(&self, protect: bool) -> Result<()>;

    /// Whether the task is currently running
    fn is_running(&self) -> bool;

    /// Output size in bytes, available after a successful [`Self::check`]
    fn output_size(&self) -> Result<u64>;

    /// Live progress of a running task
    fn progress(&self) -> Option<TaskProgress>;
}
