//! Task pipeline runner
//!
//! Executes the resolver's ordered task list: erase stages first, imagers
//! dry-run before they run for real, and the terminal stage is a recorder
//! (or an imager for file output). Every failure goes through the
//! recovery policy; a recovered stage re-enters from the top, including
//! the medium-state checks. Aggregate progress is republished on every
//! task tick as `(task fraction + tasks done) / task count`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::decision::{ActionCallback, BurnAction, Decision, MediaIssue, Progress, ProgressCallback};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::flags::BurnFlags;
use crate::medium::{Drive, MediaSet};
use crate::recovery::{throttled_rate, Recovery, TaskScope};
use crate::session::Session;
use crate::task::{Task, TaskAction, TaskMonitor};
use crate::track::ChecksumType;

/// Relays one task's ticks as aggregate engine progress and collects the
/// checksum the task computed along the way
pub(crate) struct PipelineMonitor<'a> {
    tasks_done: usize,
    task_nb: usize,
    progress_cb: Option<&'a ProgressCallback>,
    action_cb: Option<&'a ActionCallback>,
    checksum: Mutex<Option<(ChecksumType, String)>>,
}

impl PipelineMonitor<'_> {
    pub(crate) fn take_checksum(&self) -> Option<(ChecksumType, String)> {
        self.checksum
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl TaskMonitor for PipelineMonitor<'_> {
    fn progress_changed(&self, fraction: f64, remaining: Option<Duration>) {
        if let Some(callback) = self.progress_cb {
            let task_nb = self.task_nb.max(1);
            let overall = (fraction + self.tasks_done as f64) / task_nb as f64;
            callback(&Progress {
                overall,
                task: fraction,
                remaining,
            });
        }
    }

    fn action_changed(&self, action: BurnAction) {
        if let Some(callback) = self.action_cb {
            callback(action);
        }
    }

    fn checksum_computed(&self, kind: ChecksumType, value: &str) {
        *self.checksum.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((kind, value.to_string()));
    }
}

impl Engine {
    pub(crate) fn monitor(&self) -> PipelineMonitor<'_> {
        PipelineMonitor {
            tasks_done: self.tasks_done,
            task_nb: self.task_nb,
            progress_cb: self.progress_cb.as_ref(),
            action_cb: self.action_cb.as_ref(),
            checksum: Mutex::new(None),
        }
    }

    /// Resolve and run the whole task list for the session
    pub(crate) fn run_pipeline(&mut self, session: &mut Session, erase_allowed: bool) -> Result<()> {
        let result = self.run_pipeline_inner(session, erase_allowed);
        self.set_active_task(None);
        result
    }

    fn run_pipeline_inner(&mut self, session: &mut Session, erase_allowed: bool) -> Result<()> {
        let tasks = match self.caps.build_pipeline(session) {
            Ok(tasks) if !tasks.is_empty() => tasks,
            Ok(_) => {
                tracing::debug!("Resolver produced an empty task list");
                return Err(Error::NotSupported);
            }
            Err(err) => {
                tracing::debug!("No task list for this session: {}", err);
                return Err(Error::NotSupported);
            }
        };

        self.tasks_done = 0;
        self.task_nb = tasks.len();
        tracing::debug!("{} tasks to perform", self.task_nb);

        let last_index = tasks.len() - 1;
        for (index, task) in tasks.into_iter().enumerate() {
            self.shared.cancel.checkpoint()?;
            self.set_active_task(Some(Arc::clone(&task)));

            let is_last = index == last_index;
            self.update_status_media(session, is_last);

            if task.action() == TaskAction::Erase {
                if erase_allowed {
                    self.run_eraser(session, task.as_ref())?;
                }
                // counted as done either way: after a dummy pass the
                // medium was already erased and not reloaded since
                self.set_active_task(None);
                self.tasks_done += 1;

                // some formatters make the disc vanish OS-wide for a
                // while; wait for it to reappear with a fresh status
                self.wait_for_dest_medium()?;
                continue;
            }

            // dry-run first: validate the stage and size its output
            // before anything is written
            self.run_imager(session, task.as_ref(), true)?;

            if session.dest_media().contains(MediaSet::RANDOM_WRITABLE) {
                // remember the projected write range for the post-burn
                // checksum, there are no track numbers on such media
                let len = task.output_size().unwrap_or(0);
                let start = if session
                    .flags()
                    .intersects(BurnFlags::MERGE.union(BurnFlags::APPEND))
                {
                    session
                        .burner()
                        .and_then(|drive| drive.medium())
                        .map(|medium| medium.next_writable_address())
                        .unwrap_or(0)
                } else {
                    0
                };
                self.session_start = start;
                self.session_end = start + len;
                tracing::debug!("Burning from {} to {}", self.session_start, self.session_end);
            }

            if is_last {
                if session.dest_is_file() {
                    self.run_imager(session, task.as_ref(), false)?;
                } else {
                    self.run_recorder(session, task.as_ref())?;
                }
                self.tasks_done += 1;
                break;
            }

            self.run_imager(session, task.as_ref(), false)?;
            self.set_active_task(None);
            self.tasks_done += 1;
        }

        Ok(())
    }

    fn update_status_media(&self, session: &Session, is_last: bool) {
        let media = if !is_last {
            session.input_type().media()
        } else if session.dest_is_file() {
            MediaSet::FILE
        } else {
            session.dest_media()
        };
        self.set_status_media(media);
    }

    /// Run an erase task, with the destination unmounted
    pub(crate) fn run_eraser(&self, session: &Session, task: &dyn Task) -> Result<()> {
        let drive = session.burner().ok_or(Error::OutputNone)?;

        if let Some(medium) = drive.medium() {
            if medium.is_mounted() && medium.unmount().is_err() {
                return Err(Error::DriveBusy);
            }
        }

        let monitor = self.monitor();
        task.run(&monitor)
    }

    /// Run an imaging task, dry (`fake`) or real, retrying through the
    /// recovery policy
    pub(crate) fn run_imager(
        &mut self,
        session: &mut Session,
        task: &dyn Task,
        fake: bool,
    ) -> Result<()> {
        loop {
            self.shared.cancel.checkpoint()?;

            // just in case: the source must not be mounted while read
            if let Some(src) = session.src_drive() {
                if let Some(medium) = src.medium() {
                    if medium.is_mounted() && medium.unmount().is_err() {
                        return Err(Error::DriveBusy);
                    }
                }
            }

            let (attempt, captured) = {
                let monitor = self.monitor();
                let result = if fake {
                    task.check(&monitor)
                } else {
                    task.run(&monitor)
                };
                (result, monitor.take_checksum())
            };

            let err = match attempt {
                Ok(()) => {
                    if !fake {
                        self.apply_captured_checksum(session, captured);
                        self.emit_progress(1.0, 1.0, None);
                    }
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.is_control() {
                return Err(err);
            }

            // a partial final image would only clutter the disk; temp
            // images are cleaned up by the session
            if session.dest_is_file() {
                if let Some((image, toc)) = session.output_paths() {
                    let _ = std::fs::remove_file(image);
                    if let Some(toc) = toc {
                        let _ = std::fs::remove_file(toc);
                    }
                }
            }

            match Recovery::classify(&err, session.flags(), TaskScope::Imaging) {
                Recovery::DisableJoliet => self.ask_for_joliet(session)?,
                Recovery::ReloadSource => self.reload_src_media(session, MediaIssue::NoData)?,
                Recovery::AlternateLocation => self.ask_for_location(session, &err)?,
                _ => return Err(err),
            }

            tracing::debug!("Retrying imaging stage");
        }
    }

    /// Run the recording task, retrying through the recovery policy
    pub(crate) fn run_recorder(&mut self, session: &mut Session, task: &dyn Task) -> Result<()> {
        let burner = session.burner().ok_or(Error::OutputNone)?;

        // another process could still hold the drive right after locking
        // or after a simulation; backends often cannot relock at once
        self.wait_exclusive(burner.as_ref())?;

        loop {
            self.shared.cancel.checkpoint()?;

            if session.flags().contains(BurnFlags::NO_TMP_FILES) {
                // burning on the fly reads the source disc directly
                if let Some(src) = session.src_drive() {
                    if let Some(medium) = src.medium() {
                        if medium.is_mounted() && medium.unmount().is_err() {
                            return Err(Error::DriveBusy);
                        }
                    }
                }
            }

            if let Some(medium) = burner.medium() {
                if medium.is_mounted() && medium.unmount().is_err() {
                    return Err(Error::DriveBusy);
                }
            }

            let (attempt, captured) = {
                let monitor = self.monitor();
                let result = task.run(&monitor);
                (result, monitor.take_checksum())
            };

            let err = match attempt {
                Ok(()) => {
                    self.apply_captured_checksum(session, captured);
                    self.emit_progress(1.0, 1.0, None);
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.is_control() {
                return Err(err);
            }

            match Recovery::classify(&err, session.flags(), TaskScope::Recording) {
                Recovery::DisableJoliet => self.ask_for_joliet(session)?,
                Recovery::ReloadSource => {
                    // on-the-fly source went empty mid-burn
                    self.reload_src_media(session, MediaIssue::NeedReload)?;
                }
                Recovery::Throttle => {
                    // the whole system just made a great effort; a short
                    // rest helps as much as the lower rate
                    self.shared.cancel.sleep(self.config.dma_backoff_delay())?;
                    let rate = throttled_rate(session.rate());
                    tracing::debug!("Throttling write rate to {} B/s", rate);
                    session.set_rate(rate);
                }
                Recovery::ReloadDestination(issue) => self.reload_dest_media(session, issue)?,
                Recovery::MergeImpossible => return Err(Error::MergeImpossible),
                Recovery::AlternateLocation | Recovery::Fatal => return Err(err),
            }

            tracing::debug!("Retrying recording stage");
        }
    }

    /// Attach a checksum a task reported to the track it processed
    fn apply_captured_checksum(
        &self,
        session: &mut Session,
        captured: Option<(ChecksumType, String)>,
    ) {
        if let Some((kind, value)) = captured {
            if let Some(track) = session.tracks_mut().last_mut() {
                track.set_checksum(kind, value);
            }
        }
    }

    /// Poll until no other process holds the drive
    fn wait_exclusive(&self, drive: &dyn Drive) -> Result<()> {
        while !drive.can_use_exclusively() {
            tracing::debug!("Device busy, retrying shortly");
            self.shared.cancel.sleep(self.config.exclusive_poll())?;
        }
        Ok(())
    }

    /// Ask to drop Joliet extensions, then do so on every data track
    fn ask_for_joliet(&mut self, session: &mut Session) -> Result<()> {
        if self.decisions.disable_joliet() != Decision::Proceed {
            return Err(Error::Cancelled);
        }

        for track in session.tracks_mut() {
            track.remove_joliet();
        }
        Ok(())
    }

    /// Ask for another image location and point the session at it
    fn ask_for_location(&mut self, session: &mut Session, err: &Error) -> Result<()> {
        // a temporary image is in play whenever the final output is a
        // disc; image-file output is always the last stage
        let is_temporary = !session.dest_is_file();

        match self.decisions.alternate_location(err, is_temporary) {
            Some(dir) => {
                if is_temporary {
                    session.set_tmp_dir(dir);
                } else {
                    session.relocate_output(&dir);
                }
                Ok(())
            }
            None => Err(Error::Cancelled),
        }
    }
}
