//! Capability resolver contract
//!
//! The resolver turns a session into concrete work: an ordered task list
//! for recording, a standalone blanking or checksum task, and the
//! flag/output-type feasibility answers the engine needs while locking
//! media and checking flag consistency. Task construction consumes the
//! session state at call time, so the engine re-invokes the resolver
//! whenever the medium or the flags may have changed.

use std::sync::Arc;

use crate::error::Result;
use crate::flags::BurnFlags;
use crate::session::Session;
use crate::task::Task;
use crate::track::TrackType;

/// Produces tasks and feasibility answers for a session
pub trait CapabilityResolver: Send + Sync {
    /// Build the ordered task list implementing the session
    fn build_pipeline(&self, session: &Session) -> Result<Vec<Arc<dyn Task>>>;

    /// Build a standalone blanking task for the destination medium
    fn blanking_task(&self, session: &Session) -> Result<Arc<dyn Task>>;

    /// Build a standalone checksum-verification task
    fn checksum_task(&self, session: &Session) -> Result<Arc<dyn Task>>;

    /// Whether the session input can be turned into the given output
    fn output_supported(&self, session: &Session, output: &TrackType) -> bool;

    /// The flags supported and the flags compulsory for the session in
    /// its current state
    fn burn_flags(&self, session: &Session) -> Result<(BurnFlags, BurnFlags)>;

    /// Whether the destination medium could be blanked for this session
    fn can_blank(&self, session: &Session) -> bool;
}
