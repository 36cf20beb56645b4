//! User decision protocol and engine events
//!
//! Every user-facing question the engine needs answered is a synchronous
//! call into an injected [`DecisionHandler`]: the engine blocks until the
//! observer returns a [`Decision`]. The handler that is not wired up
//! answers Cancel — consent is never assumed. The one exception is the
//! dummy-success question, whose unobserved default is Proceed so that an
//! unattended simulate-then-burn run completes.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::medium::MediaSet;

/// Answer to a synchronous user question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Carry on with the operation
    Proceed,
    /// Abort the operation
    Cancel,
}

/// Why the engine is asking for a medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaIssue {
    /// No medium in the drive
    NoMedium,
    /// The drive is busy
    Busy,
    /// The medium cannot be handled
    Unsupported,
    /// The medium holds no readable data
    NoData,
    /// The medium cannot be blanked
    NotRewritable,
    /// The medium cannot receive the session
    NotWritable,
    /// Not enough space left on the medium
    NoSpace,
    /// The medium must be taken out and reloaded
    NeedReload,
    /// The original disc must come back after a same-drive copy
    ReloadAfterCopy,
    /// The burnt disc is needed for checksum verification
    Checksum,
}

/// The data-loss situations a destination medium can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLossWarning {
    /// The medium will be blanked, destroying its contents
    Blanking,
    /// Previous data sessions will no longer be visible to the OS
    PreviousSessionInvisible,
    /// Audio appended to an appendable disc may not play on CD players
    AudioToAppendable,
    /// Audio-only content on a rewritable disc may confuse CD players
    RewritableAudio,
}

/// Labels for what the engine is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnAction {
    /// Nothing yet
    None,
    /// Gathering drives and media
    Preparing,
    /// Computing the session size
    GettingSize,
    /// Creating the image
    CreatingImage,
    /// Blanking the medium
    Blanking,
    /// Writing to the medium
    Recording,
    /// Closing the session
    Fixating,
    /// Verifying checksums
    Checksumming,
    /// All done
    Finished,
}

impl BurnAction {
    /// Human-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            BurnAction::None => "Ready",
            BurnAction::Preparing => "Preparing to burn",
            BurnAction::GettingSize => "Getting size",
            BurnAction::CreatingImage => "Creating image",
            BurnAction::Blanking => "Blanking",
            BurnAction::Recording => "Writing",
            BurnAction::Fixating => "Finalizing",
            BurnAction::Checksumming => "Verifying",
            BurnAction::Finished => "Finished",
        }
    }
}

/// Progress report published on every task tick
#[derive(Debug, Clone)]
pub struct Progress {
    /// Fraction of the whole operation, 0.0..=1.0
    pub overall: f64,
    /// Fraction of the current task, 0.0..=1.0
    pub task: f64,
    /// Estimated remaining time, when the task can tell
    pub remaining: Option<Duration>,
}

/// Callback type for progress reports
pub type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

/// Callback type for action-state changes
pub type ActionCallback = Box<dyn Fn(BurnAction) + Send + Sync>;

/// Synchronous question-and-answer interface to the user
///
/// Implementations usually bridge to a UI; they may block for as long as
/// the user takes. Every question defaults to Cancel when unanswered,
/// except [`DecisionHandler::dummy_success`].
pub trait DecisionHandler: Send + Sync {
    /// Ask the user to insert a medium of class `required` into the named
    /// drive, because of `issue`
    fn insert_medium(&self, drive: &str, issue: MediaIssue, required: MediaSet) -> Decision {
        let _ = (drive, issue, required);
        Decision::Cancel
    }

    /// Ask the user to accept losing data in the given way
    fn accept_data_loss(&self, warning: DataLossWarning) -> Decision {
        let _ = warning;
        Decision::Cancel
    }

    /// Ask the user for another location for a temp or output image.
    /// `None` cancels the operation.
    fn alternate_location(&self, error: &Error, is_temporary: bool) -> Option<PathBuf> {
        let _ = (error, is_temporary);
        None
    }

    /// Ask whether Joliet extensions may be dropped from all data tracks
    fn disable_joliet(&self) -> Decision {
        Decision::Cancel
    }

    /// The simulation succeeded; ask whether to go ahead with the real
    /// burn. Unanswered default is Proceed.
    fn dummy_success(&self) -> Decision {
        Decision::Proceed
    }
}

/// Default handler: denies everything except the dummy-success question
pub struct DenyAll;

impl DecisionHandler for DenyAll {}
