//! # Burnish Core
//!
//! Core library providing the burn orchestration engine for Burnish.
//!
//! The engine turns a declarative [`Session`] (tracks, flags, drives)
//! into an ordered sequence of hardware operations — erasing, imaging,
//! recording, checksumming — and recovers from the transient failures a
//! real drive and medium can produce: busy drives, wrong media, DMA
//! underruns, ejected discs. Task construction, drive discovery and the
//! low-level command work stay behind the [`CapabilityResolver`],
//! [`Drive`] and [`Task`] traits.
//!
//! ## Modules
//!
//! - `engine`: the session orchestrator (`record`/`blank`/`check`)
//! - `session`: the declarative recording request
//! - `recovery`: the error-to-recovery-action policy
//! - `decision`: synchronous user prompts and progress events
//! - `medium`, `track`, `flags`: the data model
//! - `caps`, `task`: the resolver and task contracts
//! - `config`: engine timing knobs
//! - `error`: error types and result alias
//!
//! ## Example
//!
//! ```ignore
//! use burnish_core::{Engine, EngineConfig, Session};
//! use std::sync::Arc;
//!
//! let mut engine = Engine::new(resolver)
//!     .decision_handler(Box::new(ui))
//!     .on_progress(|p| println!("{:.1}%", p.overall * 100.0));
//!
//! let handle = engine.handle(); // cancel/status from another thread
//! engine.record(&mut session)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod caps;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod flags;
pub mod medium;
pub mod session;
pub mod task;
pub mod track;

mod lock;
mod pipeline;
mod recovery;

pub use cancel::CancelToken;
pub use caps::CapabilityResolver;
pub use config::EngineConfig;
pub use decision::{
    ActionCallback, BurnAction, DataLossWarning, Decision, DecisionHandler, DenyAll, MediaIssue,
    Progress, ProgressCallback,
};
pub use engine::{BurnHandle, BurnStatus, Engine};
pub use error::{Error, Result};
pub use flags::BurnFlags;
pub use medium::{cd_speed_to_rate, Drive, MediaSet, Medium, CD_RATE, DVD_RATE};
pub use session::{Output, Session};
pub use task::{Task, TaskAction, TaskMonitor, TaskProgress};
pub use track::{
    ChecksumType, ImageFormat, StreamFormat, Track, TrackSource, TrackType, MD5_CHECKSUM_FILE,
    SHA1_CHECKSUM_FILE, SHA256_CHECKSUM_FILE,
};
