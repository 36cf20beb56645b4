//! Session orchestrator
//!
//! [`Engine`] is the top-level state machine behind [`Engine::record`],
//! [`Engine::blank`] and [`Engine::check`]: it owns the lock/run/unlock
//! lifecycle, the dummy-burn-then-real-burn protocol, post-burn checksum
//! verification and the same-source-destination special case. Media
//! locking lives in `lock.rs` and pipeline execution in `pipeline.rs`;
//! both are `impl Engine` blocks over the state defined here.
//!
//! One engine instance runs one operation at a time on the calling
//! thread. A [`BurnHandle`] taken beforehand can cancel the operation or
//! query its status from another thread.

use std::sync::{Arc, Mutex, PoisonError};

use crate::cancel::CancelToken;
use crate::caps::CapabilityResolver;
use crate::config::EngineConfig;
use crate::decision::{
    ActionCallback, BurnAction, Decision, DecisionHandler, DenyAll, MediaIssue, Progress,
    ProgressCallback,
};
use crate::error::{Error, Result};
use crate::flags::BurnFlags;
use crate::lock::DestLock;
use crate::medium::{Drive, MediaSet};
use crate::session::Session;
use crate::task::{Task, TaskProgress};
use crate::track::{ImageFormat, Track, TrackSource, TrackType};

/// Snapshot returned by [`Engine::status`]
#[derive(Debug, Clone)]
pub struct BurnStatus {
    /// Media relevant to the current stage: the input medium while
    /// imaging, `FILE` for file output, otherwise the destination medium
    pub media: MediaSet,
    /// Size of the session image, when the active task knows it
    pub image_size: Option<u64>,
    /// Bytes written by the active task
    pub written: Option<u64>,
    /// Current rate of the active task in bytes per second
    pub rate: Option<u64>,
}

/// State shared between the engine and its cancel/status handles
pub(crate) struct EngineShared {
    pub(crate) cancel: CancelToken,
    task: Mutex<Option<Arc<dyn Task>>>,
    status_media: Mutex<MediaSet>,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            cancel: CancelToken::new(),
            task: Mutex::new(None),
            status_media: Mutex::new(MediaSet::NONE),
        }
    }

    fn active_task(&self) -> Option<Arc<dyn Task>> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active_task(&self, task: Option<Arc<dyn Task>>) {
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = task;
    }

    fn set_status_media(&self, media: MediaSet) {
        *self
            .status_media
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = media;
    }

    fn request_cancel(&self, protect: bool) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.active_task() {
            if task.is_running() {
                return task.cancel(protect);
            }
        }
        Ok(())
    }

    fn status(&self) -> Result<BurnStatus> {
        let task = self.active_task().ok_or(Error::NotReady)?;
        let image_size = task.output_size().ok();

        if !task.is_running() {
            return Err(Error::NotReady);
        }

        let progress: Option<TaskProgress> = task.progress();
        Ok(BurnStatus {
            media: *self
                .status_media
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            image_size,
            written: progress.as_ref().map(|p| p.written),
            rate: progress.as_ref().map(|p| p.rate),
        })
    }
}

/// Cloneable handle for cancelling or observing a running operation from
/// another thread
#[derive(Clone)]
pub struct BurnHandle {
    shared: Arc<EngineShared>,
}

impl BurnHandle {
    /// Request cancellation of the current operation. With `protect` set
    /// the active task finishes its hardware-critical section first.
    pub fn cancel(&self, protect: bool) -> Result<()> {
        self.shared.request_cancel(protect)
    }

    /// Status of the active task, or `NotReady` when none is in flight
    pub fn status(&self) -> Result<BurnStatus> {
        self.shared.status()
    }
}

/// The burn orchestration engine
pub struct Engine {
    pub(crate) caps: Arc<dyn CapabilityResolver>,
    pub(crate) config: EngineConfig,
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) decisions: Box<dyn DecisionHandler>,
    pub(crate) progress_cb: Option<ProgressCallback>,
    pub(crate) action_cb: Option<ActionCallback>,

    pub(crate) src: Option<Arc<dyn Drive>>,
    pub(crate) dest: Option<Arc<dyn Drive>>,
    pub(crate) src_locked: bool,
    pub(crate) dest_locked: bool,

    pub(crate) tasks_done: usize,
    pub(crate) task_nb: usize,
    pub(crate) session_start: u64,
    pub(crate) session_end: u64,
}

impl Engine {
    /// Create an engine with default configuration
    pub fn new(caps: Arc<dyn CapabilityResolver>) -> Self {
        Self::with_config(caps, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(caps: Arc<dyn CapabilityResolver>, config: EngineConfig) -> Self {
        Self {
            caps,
            config,
            shared: Arc::new(EngineShared::new()),
            decisions: Box::new(DenyAll),
            progress_cb: None,
            action_cb: None,
            src: None,
            dest: None,
            src_locked: false,
            dest_locked: false,
            tasks_done: 0,
            task_nb: 0,
            session_start: 0,
            session_end: 0,
        }
    }

    /// Install the decision handler answering user questions
    #[must_use]
    pub fn decision_handler(mut self, handler: Box<dyn DecisionHandler>) -> Self {
        self.decisions = handler;
        self
    }

    /// Set a progress callback
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.progress_cb = Some(Box::new(callback));
        self
    }

    /// Set an action-state callback
    #[must_use]
    pub fn on_action<F>(mut self, callback: F) -> Self
    where
        F: Fn(BurnAction) + Send + Sync + 'static,
    {
        self.action_cb = Some(Box::new(callback));
        self
    }

    /// Get a handle for cancelling or observing from another thread
    pub fn handle(&self) -> BurnHandle {
        BurnHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Request cancellation of the current operation
    pub fn cancel(&self, protect: bool) -> Result<()> {
        self.shared.request_cancel(protect)
    }

    /// Status of the active task, or `NotReady` when none is in flight
    pub fn status(&self) -> Result<BurnStatus> {
        self.shared.status()
    }

    // --- top-level operations ---

    /// Burn the session: lock media, run the resolved pipeline with full
    /// error recovery, verify, and unlock.
    pub fn record(&mut self, session: &mut Session) -> Result<()> {
        self.begin_operation();
        self.emit_action(BurnAction::Preparing);

        let result = self.record_inner(session);

        let result = match result {
            Ok(()) => self.unlock_both(session),
            Err(err) => {
                let _ = self.unlock_both(session);
                Err(err)
            }
        };

        // an orchestration status leaking to the caller is a bug, not an
        // answer; report it as an internal error
        let result = match result {
            Err(
                err @ (Error::NotReady | Error::NotSupported | Error::Running | Error::NotRunning),
            ) => {
                tracing::warn!("Internal error with result {:?}", err);
                Err(Error::General("An internal error occurred".to_string()))
            }
            other => other,
        };

        match &result {
            Ok(()) => tracing::debug!("Session successfully finished"),
            Err(Error::Cancelled) => tracing::debug!("Session cancelled by user"),
            Err(err) => tracing::debug!("Session error: {}", err),
        }
        result
    }

    /// Blank a rewritable medium in the destination drive
    pub fn blank(&mut self, session: &mut Session) -> Result<()> {
        self.begin_operation();

        let result = self.blank_inner(session);
        let result = match result {
            Ok(()) => self.unlock_both(session),
            Err(err) => {
                let _ = self.unlock_both(session);
                Err(err)
            }
        };

        if result.is_ok() {
            self.emit_action(BurnAction::Finished);
        }
        result
    }

    /// Verify the checksum of the session's single track
    pub fn check(&mut self, session: &mut Session) -> Result<()> {
        self.begin_operation();

        if session.tracks().len() != 1 {
            return Err(Error::General(
                "Only one track at a time can be checked".to_string(),
            ));
        }

        let result = self.check_inner(session);
        match result {
            Ok(()) => self.unlock_both(session),
            Err(err) => {
                let _ = self.unlock_both(session);
                Err(err)
            }
        }
    }

    // --- operation plumbing ---

    fn begin_operation(&mut self) {
        self.shared.cancel.reset();
        self.shared.set_active_task(None);
        self.shared.set_status_media(MediaSet::NONE);
        self.tasks_done = 0;
        self.task_nb = 0;
        self.session_start = 0;
        self.session_end = 0;
    }

    fn record_inner(&mut self, session: &mut Session) -> Result<()> {
        if session.same_src_dest_drive() {
            // device-to-device copy through an intermediate image
            self.same_src_dest_image(session)?;
            self.same_src_dest_reload_medium(session)?;
        } else if !session.dest_is_file() {
            // lock the destination early so the medium informs every
            // later decision
            let mut outcome = self.lock_destination(session)?;
            while let DestLock::NeedReload(issue) = outcome {
                let required = Self::required_dest_media(session);
                self.ask_for_dest_media(session, issue, required)?;
                outcome = self.lock_destination(session)?;
            }
        }

        if session.input_type().is_disc() {
            self.lock_source(session)?;
        }

        self.record_session(session, true)
    }

    fn check_inner(&mut self, session: &mut Session) -> Result<()> {
        let checks_medium = matches!(session.tracks()[0].source(), TrackSource::Image { .. });
        if checks_medium {
            // the checksum lives in the image; the disc to compare it
            // against must be present and locked
            self.lock_for_checksum(session)?;
        }

        self.run_checksum_task(session)
    }

    fn blank_inner(&mut self, session: &mut Session) -> Result<()> {
        self.lock_rewritable(session)?;

        let mut result = self.run_blank_task(session);
        while matches!(result, Err(Error::MediumNotRewritable)) {
            self.ask_for_dest_media(
                session,
                MediaIssue::NotRewritable,
                MediaSet::REWRITABLE.union(MediaSet::HAS_DATA),
            )?;
            self.lock_rewritable(session)?;
            result = self.run_blank_task(session);
        }
        result
    }

    fn run_blank_task(&mut self, session: &Session) -> Result<()> {
        let task = match self.caps.blanking_task(session) {
            Ok(task) => task,
            Err(err) => {
                tracing::debug!("No blanking task for this session: {}", err);
                return Err(Error::NotSupported);
            }
        };

        self.task_nb = 1;
        self.tasks_done = 0;
        self.shared.set_active_task(Some(Arc::clone(&task)));

        let result = self.run_eraser(session, task.as_ref());
        self.shared.set_active_task(None);

        if result.is_ok() {
            self.tasks_done = 1;
            self.emit_action(BurnAction::Finished);
        }
        result
    }

    pub(crate) fn run_checksum_task(&mut self, session: &Session) -> Result<()> {
        tracing::debug!("Starting to check track integrity");

        let task = match self.caps.checksum_task(session) {
            Ok(task) => task,
            Err(err) => {
                tracing::debug!("The track cannot be checked: {}", err);
                return Err(Error::NotSupported);
            }
        };

        self.task_nb = 1;
        self.tasks_done = 0;
        self.shared.set_active_task(Some(Arc::clone(&task)));

        let result = {
            let monitor = self.monitor();
            task.run(&monitor)
        };
        self.emit_progress(1.0, 1.0, None);

        if matches!(result, Ok(()) | Err(Error::Cancelled)) {
            self.emit_action(BurnAction::Finished);
        }

        self.shared.set_active_task(None);
        if result.is_ok() {
            self.tasks_done = 1;
        }
        result
    }

    // --- record session loop ---

    /// One full record attempt: flag consistency, pipeline, dummy
    /// protocol and post-burn verification.
    fn record_session(&mut self, session: &mut Session, erase_allowed: bool) -> Result<()> {
        // no two images are ever byte-identical, even when built from the
        // same files; stale checksums must not survive into this run
        Self::unset_track_checksums(session);

        let mut used_flags;
        loop {
            // try a flag combination on a settings snapshot so the
            // original session is left untainted
            session.push_settings();

            if let Err(err) = self.check_session_consistency(session) {
                session.pop_settings();
                return Err(err);
            }

            let result = self.run_pipeline(session, erase_allowed);

            // keep the flags that were actually used for this attempt
            used_flags = session.flags();
            session.pop_settings();

            match result {
                Ok(()) => break,
                Err(Error::Retry) => continue,
                Err(err) => return Err(err),
            }
        }

        self.emit_action(BurnAction::Finished);

        if session.dest_is_file() {
            return Ok(());
        }

        if used_flags.contains(BurnFlags::DUMMY) {
            tracing::debug!("Dummy session successfully finished");

            if self.decisions.dummy_success() != Decision::Proceed {
                return Err(Error::Cancelled);
            }

            Self::unset_track_checksums(session);

            // burn for real this time; the dummy pass already erased the
            // medium if that was needed, and it was not reloaded since
            session.remove_flag(BurnFlags::DUMMY);
            let result = self.record_session(session, false);
            session.add_flag(BurnFlags::DUMMY);
            return result;
        }

        self.post_burn_verification(session)
    }

    /// Verify the just-burnt medium against the checksum captured during
    /// recording, when there is exactly one checksummed track.
    fn post_burn_verification(&mut self, session: &mut Session) -> Result<()> {
        if session.tracks().len() != 1 {
            return Ok(());
        }

        let Some((kind, value)) = session.tracks()[0]
            .checksum()
            .map(|(kind, value)| (kind, value.to_string()))
        else {
            return Ok(());
        };

        let Some(dest) = self.dest.clone() else {
            return Ok(());
        };

        let mut track = Track::disc(dest);
        match kind.file_name() {
            Some(name) => track.set_checksum(kind, name),
            None => track.set_checksum(kind, value),
        }

        session.push_tracks();
        session.add_track(track);

        // give the drive time to settle (the OS may briefly grab the
        // fresh medium), then wait for it to be probed again
        let settled = self
            .shared
            .cancel
            .sleep(self.config.checksum_settle_delay())
            .and_then(|()| self.wait_for_dest_medium());
        if let Err(err) = settled {
            session.pop_tracks();
            return Err(err);
        }

        if kind.is_digest() {
            if let Some(medium) = self.dest.as_ref().and_then(|drive| drive.medium()) {
                if !medium.status().contains(MediaSet::RANDOM_WRITABLE) {
                    // no byte addresses on track-based media; verify the
                    // last written track instead
                    let track_num = medium.track_count();
                    tracing::debug!("Last written track num == {}", track_num);
                    if let Some(track) = session.tracks_mut().last_mut() {
                        track.set_track_num(track_num);
                    }
                } else {
                    tracing::debug!(
                        "Last written track address == {}..{}",
                        self.session_start,
                        self.session_end
                    );
                    if let Some(track) = session.tracks_mut().last_mut() {
                        track.set_address_range(self.session_start, self.session_end);
                    }
                }
            }
        }

        let result = self.run_checksum_task(session);
        session.pop_tracks();

        match result {
            // recording itself already completed; backing out of the
            // verification is not a failure
            Err(Error::Cancelled) => Ok(()),
            other => other,
        }
    }

    // --- flag consistency ---

    /// Re-derive a flag set the resolver agrees with: drop unsupported
    /// flags (MERGE excepted, which is never best-effort) and force-add
    /// compulsory ones.
    pub(crate) fn check_session_consistency(&self, session: &mut Session) -> Result<()> {
        tracing::debug!("Checking session consistency");

        session.validate()?;

        let flags = session.flags();
        session.set_flags(BurnFlags::NONE);

        let (mut supported, mut compulsory) = self.caps.burn_flags(session)?;

        for flag in BurnFlags::each() {
            if !flags.contains(flag) {
                continue;
            }

            if supported.contains(flag) {
                session.add_flag(flag);
                (supported, compulsory) = self.caps.burn_flags(session)?;
            } else if flag == BurnFlags::DUMMY {
                // simulation is merely unavailable on this medium
                tracing::debug!("Flag DUMMY set but not supported, dropped");
            } else if flag == BurnFlags::MERGE {
                return Err(Error::MergeImpossible);
            } else {
                tracing::debug!("Flag {} set but not supported, dropped", flag);
            }
        }

        let mut retval = session.flags();
        if retval != flags {
            tracing::debug!("Some flags were not supported. Corrected to {}", retval);
        }

        if retval != retval.union(compulsory) {
            retval = retval.union(compulsory);
            tracing::debug!(
                "Some compulsory flags were forgotten. Corrected to {}",
                retval
            );
        }

        session.set_flags(retval);
        Ok(())
    }

    // --- same source/destination drive ---

    /// Image the source disc to a temporary file so the one drive can be
    /// reused as the destination.
    fn same_src_dest_image(&mut self, session: &mut Session) -> Result<()> {
        // the destination media type is unknown at this point, so settle
        // for the most capable intermediate format the resolver supports
        let format = ImageFormat::PREFERENCE
            .into_iter()
            .find(|format| {
                self.caps
                    .output_supported(session, &TrackType::Image { format: *format })
            })
            .ok_or_else(|| {
                Error::General("No format for the temporary image could be found".to_string())
            })?;

        tracing::debug!("Same-drive copy through intermediate {:?} image", format);

        session.push_settings();
        let result = self.same_src_dest_image_inner(session, format);
        session.pop_settings();
        result
    }

    fn same_src_dest_image_inner(
        &mut self,
        session: &mut Session,
        format: ImageFormat,
    ) -> Result<()> {
        let (image, toc) = loop {
            match session.tmp_image_path(format) {
                Ok(paths) => break paths,
                Err(err @ (Error::DiskSpace(_) | Error::Permission(_))) => {
                    match self.decisions.alternate_location(&err, true) {
                        Some(dir) => session.set_tmp_dir(dir),
                        None => return Err(Error::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        };

        // some recorders cannot overwrite leftovers at the target path
        let _ = std::fs::remove_file(&image);
        if let Some(toc) = &toc {
            let _ = std::fs::remove_file(toc);
        }

        session.set_image_output(format, image.clone(), toc.clone());

        self.lock_source(session)?;

        if let Err(err) = self.record_session(session, true) {
            let _ = self.unlock_source();
            return Err(err);
        }

        // free the drive for the destination medium
        self.eject_src_media()?;

        // the produced image replaces the disc as the session source
        session.set_tracks(vec![Track::image(image, toc, format)]);
        Ok(())
    }

    /// After the copy image is made, get the destination disc loaded and
    /// locked with a flag set the new medium actually supports.
    fn same_src_dest_reload_medium(&mut self, session: &mut Session) -> Result<()> {
        tracing::debug!("Reloading medium after copy");

        // flags like DUMMY or BURNPROOF may be unreachable on the medium
        // the user inserts; lenient re-adjustment on every attempt
        let saved_flags = session.flags();
        let required = Self::required_dest_media(session);
        let mut issue = MediaIssue::ReloadAfterCopy;

        loop {
            self.ask_for_dest_media(session, issue, required)?;

            // adjust the flags to the new medium before locking, since
            // locking checks the adequacy of what was inserted
            match self.check_session_consistency(session) {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => {
                    issue = MediaIssue::Unsupported;
                    session.set_flags(saved_flags);
                    continue;
                }
            }

            // with flags and media type consistent, size can still fail
            match self.lock_destination(session) {
                Ok(DestLock::Ready) => return Ok(()),
                Ok(DestLock::NeedReload(reload_issue)) => {
                    issue = reload_issue;
                    session.set_flags(saved_flags);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => {
                    session.set_flags(saved_flags);
                }
            }
        }
    }

    // --- helpers ---

    pub(crate) fn required_dest_media(session: &Session) -> MediaSet {
        let required = session.required_media().intersection(
            MediaSet::WRITABLE
                .union(MediaSet::CD)
                .union(MediaSet::DVD)
                .union(MediaSet::BD),
        );
        if required.is_empty() {
            MediaSet::WRITABLE
        } else {
            required
        }
    }

    fn unset_track_checksums(session: &mut Session) {
        for track in session.tracks_mut() {
            track.clear_checksum();
        }
    }

    pub(crate) fn emit_progress(
        &self,
        overall: f64,
        task: f64,
        remaining: Option<std::time::Duration>,
    ) {
        if let Some(callback) = &self.progress_cb {
            callback(&Progress {
                overall,
                task,
                remaining,
            });
        }
    }

    pub(crate) fn emit_action(&self, action: BurnAction) {
        if let Some(callback) = &self.action_cb {
            callback(action);
        }
    }

    pub(crate) fn set_status_media(&self, media: MediaSet) {
        self.shared.set_status_media(media);
    }

    pub(crate) fn set_active_task(&self, task: Option<Arc<dyn Task>>) {
        self.shared.set_active_task(task);
    }
}
