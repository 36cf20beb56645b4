//! Media lock manager
//!
//! Acquiring a drive means getting a usable medium into it first: each
//! lock operation classifies what is inserted, walks the user through
//! eject/insert prompts until something usable is loaded (or the user
//! cancels), then takes the exclusive OS-level lock. Re-entrant lock
//! calls are no-ops so a blank-then-burn sequence on one disc never asks
//! twice. Unlocking always releases the OS lock and either reprobes the
//! drive or ejects it when the session says so.

use std::sync::Arc;

use crate::decision::{DataLossWarning, Decision, MediaIssue};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::flags::BurnFlags;
use crate::medium::{Drive, MediaSet};
use crate::session::Session;
use crate::track::{StreamFormat, TrackType};

/// Outcome of a destination lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DestLock {
    /// The destination medium is usable and locked
    Ready,
    /// The medium must be swapped before going on
    NeedReload(MediaIssue),
}

impl Engine {
    // --- source ---

    /// Lock the source drive with a readable medium loaded
    pub(crate) fn lock_source(&mut self, session: &Session) -> Result<()> {
        loop {
            self.shared.cancel.checkpoint()?;

            let src = session.src_drive().ok_or(Error::SourceNone)?;
            self.src = Some(Arc::clone(&src));

            let medium = src.medium();
            if let Some(medium) = &medium {
                if medium.is_mounted() {
                    // best effort: reading does not strictly need it
                    if let Err(err) = medium.unmount() {
                        tracing::warn!(
                            "Couldn't unmount volume in drive {}: {}",
                            src.device_path().display(),
                            err
                        );
                    }
                }
            }

            let media = medium.map(|m| m.status()).unwrap_or(MediaSet::NONE);
            let issue = if media.is_empty() {
                Some(MediaIssue::NoMedium)
            } else if media.contains(MediaSet::BUSY) {
                Some(MediaIssue::Busy)
            } else if media.contains(MediaSet::UNSUPPORTED) {
                Some(MediaIssue::Unsupported)
            } else if media.contains(MediaSet::BLANK) {
                Some(MediaIssue::NoData)
            } else {
                None
            };

            match issue {
                Some(issue) => self.ask_for_src_media(session, issue)?,
                None => break,
            }
        }

        let src = session.src_drive().ok_or(Error::SourceNone)?;
        if !self.src_locked {
            src.lock("Ongoing copying process").map_err(|failure| {
                Error::General(format!("The drive cannot be locked ({})", failure))
            })?;
        }
        self.src_locked = true;

        Ok(())
    }

    /// Eject whatever is in the source drive and ask for a data medium
    pub(crate) fn ask_for_src_media(
        &mut self,
        session: &Session,
        issue: MediaIssue,
    ) -> Result<()> {
        let src = session.src_drive().or_else(|| self.src.clone());
        let Some(src) = src else {
            return Err(Error::SourceNone);
        };
        self.src = Some(Arc::clone(&src));

        let loaded = src
            .medium()
            .map(|medium| !medium.status().is_empty())
            .unwrap_or(false);
        if loaded {
            self.eject_src_media()?;
        }

        match self
            .decisions
            .insert_medium(&src.display_name(), issue, MediaSet::HAS_DATA)
        {
            Decision::Proceed => Ok(()),
            Decision::Cancel => Err(Error::Cancelled),
        }
    }

    /// Prompt for a fresh source medium and lock it again
    pub(crate) fn reload_src_media(&mut self, session: &Session, issue: MediaIssue) -> Result<()> {
        self.ask_for_src_media(session, issue)?;
        self.lock_source(session)
    }

    // --- destination ---

    /// Lock the destination drive once a medium the session can be
    /// written to is loaded.
    ///
    /// Returns `NeedReload` when only a different medium can help; the
    /// caller owns the ask-and-retry loop. Cancellable data-loss warnings
    /// fire here, before the lock is taken.
    pub(crate) fn lock_destination(&mut self, session: &Session) -> Result<DestLock> {
        let dest = session.burner().ok_or(Error::OutputNone)?;
        self.dest = Some(Arc::clone(&dest));

        let Some(medium) = dest.medium() else {
            return Ok(DestLock::NeedReload(MediaIssue::NoMedium));
        };

        if !medium.can_be_written() {
            return Err(Error::General(
                "The drive cannot burn or the disc cannot be burnt".to_string(),
            ));
        }

        // unmount before checking anything
        if medium.is_mounted() {
            if let Err(err) = medium.unmount() {
                tracing::debug!(
                    "Couldn't unmount volume in drive {}: {}",
                    dest.device_path().display(),
                    err
                );
            }
        }

        let media = medium.status();
        tracing::debug!("Media inserted is {}", media);

        if self.dest_locked {
            // after a blanking the disc still passed these checks once;
            // asking again would re-raise the data-loss warnings
            return Ok(DestLock::Ready);
        }

        if media.is_empty() {
            return Ok(DestLock::NeedReload(MediaIssue::NoMedium));
        }
        if media.contains(MediaSet::UNSUPPORTED) {
            return Ok(DestLock::NeedReload(MediaIssue::Unsupported));
        }
        if media.contains(MediaSet::BUSY) {
            return Ok(DestLock::NeedReload(MediaIssue::Busy));
        }

        let must_blank = match self.loaded_dest_media_supported(session, media) {
            Ok(must_blank) => must_blank,
            Err(issue) => {
                tracing::debug!("Inserted media is not supported");
                return Ok(DestLock::NeedReload(issue));
            }
        };

        let input = session.input_type();
        let flags = session.flags();

        if must_blank {
            // even for overwritten (not truly blanked) rewritable media
            // the user is about to lose what is on the disc
            if self.decisions.accept_data_loss(DataLossWarning::Blanking) != Decision::Proceed {
                return Err(Error::Cancelled);
            }
        } else if media.intersects(MediaSet::HAS_DATA.union(MediaSet::HAS_AUDIO)) {
            if input.is_stream() {
                // audio appended as last tracks is rarely readable by
                // common CD players
                if self
                    .decisions
                    .accept_data_loss(DataLossWarning::AudioToAppendable)
                    != Decision::Proceed
                {
                    return Err(Error::Cancelled);
                }
            }

            if media.contains(MediaSet::HAS_DATA)
                && input.is_data()
                && !flags.contains(BurnFlags::MERGE)
            {
                // the OS will only mount the last session by default
                if self
                    .decisions
                    .accept_data_loss(DataLossWarning::PreviousSessionInvisible)
                    != Decision::Proceed
                {
                    return Err(Error::Cancelled);
                }
            }
        }

        if media.contains(MediaSet::REWRITABLE) {
            let audio_only_stream = matches!(
                input,
                TrackType::Stream {
                    format: StreamFormat::Audio
                }
            );
            let audio_only_disc = input
                .media()
                .intersection(MediaSet::HAS_DATA.union(MediaSet::HAS_AUDIO))
                == MediaSet::HAS_AUDIO;

            if audio_only_stream || audio_only_disc {
                if self
                    .decisions
                    .accept_data_loss(DataLossWarning::RewritableAudio)
                    != Decision::Proceed
                {
                    return Err(Error::Cancelled);
                }
            }
        }

        if !self.dest_locked {
            dest.lock("Ongoing burning process").map_err(|failure| {
                Error::General(format!("The drive cannot be locked ({})", failure))
            })?;
        }
        self.dest_locked = true;

        Ok(DestLock::Ready)
    }

    /// Whether the loaded medium can take the session output, and whether
    /// that requires blanking it first.
    fn loaded_dest_media_supported(
        &self,
        session: &Session,
        media: MediaSet,
    ) -> std::result::Result<bool, MediaIssue> {
        let flags = session.flags();
        let blank_before_write = flags.contains(BurnFlags::BLANK_BEFORE_WRITE);

        if self
            .caps
            .output_supported(session, &TrackType::Disc { media })
        {
            // blanking only matters when the disc actually holds content
            let must_blank = blank_before_write
                && media.intersects(MediaSet::HAS_AUDIO.union(MediaSet::HAS_DATA));
            return Ok(must_blank);
        }

        if !blank_before_write {
            return Err(MediaIssue::Unsupported);
        }

        let required = session.required_media();
        let missing = required.difference(media);

        if missing.intersects(MediaSet::BLANK.union(MediaSet::APPENDABLE)) {
            // a rewritable disc can be brought to the required state
            if media.contains(MediaSet::REWRITABLE) && self.caps.can_blank(session) {
                return Ok(true);
            }
            return Err(MediaIssue::NotWritable);
        }

        Err(MediaIssue::Unsupported)
    }

    /// Eject whatever is in the destination drive and ask for a medium of
    /// the required class
    pub(crate) fn ask_for_dest_media(
        &mut self,
        session: &Session,
        issue: MediaIssue,
        required: MediaSet,
    ) -> Result<()> {
        if self.dest.is_none() {
            self.dest = Some(session.burner().ok_or(Error::OutputNone)?);
        }
        let dest = self.dest.clone().ok_or(Error::OutputNone)?;

        let loaded = dest
            .medium()
            .map(|medium| !medium.status().is_empty())
            .unwrap_or(false);
        if loaded {
            self.eject_dest_media()?;
        }

        match self
            .decisions
            .insert_medium(&dest.display_name(), issue, required)
        {
            Decision::Proceed => Ok(()),
            Decision::Cancel => Err(Error::Cancelled),
        }
    }

    /// Prompt-and-relock loop for the destination, driven until a usable
    /// medium is locked or the user cancels
    pub(crate) fn reload_dest_media(
        &mut self,
        session: &Session,
        mut issue: MediaIssue,
    ) -> Result<()> {
        loop {
            let required = Self::required_dest_media(session);
            self.ask_for_dest_media(session, issue, required)?;

            match self.lock_destination(session)? {
                DestLock::Ready => return Ok(()),
                DestLock::NeedReload(reload_issue) => issue = reload_issue,
            }
        }
    }

    /// Lock the destination with a rewritable medium loaded, for blanking
    pub(crate) fn lock_rewritable(&mut self, session: &Session) -> Result<()> {
        let dest = session.burner().ok_or(Error::OutputNone)?;
        self.dest = Some(Arc::clone(&dest));

        loop {
            self.shared.cancel.checkpoint()?;

            let medium = dest.medium();
            if let Some(medium) = &medium {
                if !medium.can_be_rewritten() {
                    return Err(Error::MediumNotRewritable);
                }
                if medium.is_mounted() {
                    if let Err(err) = medium.unmount() {
                        tracing::warn!(
                            "Couldn't unmount volume in drive {}: {}",
                            dest.device_path().display(),
                            err
                        );
                    }
                }
            }

            let media = medium.map(|m| m.status()).unwrap_or(MediaSet::NONE);
            let issue = if media.is_empty() {
                Some(MediaIssue::NoMedium)
            } else if media.contains(MediaSet::BUSY) {
                Some(MediaIssue::Busy)
            } else if media.contains(MediaSet::UNSUPPORTED) {
                Some(MediaIssue::Unsupported)
            } else if !media.contains(MediaSet::REWRITABLE) {
                Some(MediaIssue::NotRewritable)
            } else {
                None
            };

            match issue {
                Some(issue) => self.ask_for_dest_media(
                    session,
                    issue,
                    MediaSet::REWRITABLE.union(MediaSet::HAS_DATA),
                )?,
                None => break,
            }
        }

        if !self.dest_locked {
            dest.lock("Ongoing blanking process").map_err(|failure| {
                Error::General(format!("The drive cannot be locked ({})", failure))
            })?;
        }
        self.dest_locked = true;

        Ok(())
    }

    /// Lock the drive holding the medium to verify. The source drive of
    /// the session doubles as the destination of the checksum task.
    pub(crate) fn lock_for_checksum(&mut self, session: &Session) -> Result<()> {
        let drive = session.src_drive().ok_or(Error::SourceNone)?;
        self.dest = Some(Arc::clone(&drive));

        loop {
            self.shared.cancel.checkpoint()?;

            let media = drive
                .medium()
                .map(|m| m.status())
                .unwrap_or(MediaSet::NONE);
            tracing::debug!("Waiting for media to checksum, got {}", media);

            let usable = !media.is_empty()
                && !media.contains(MediaSet::BUSY)
                && !media.contains(MediaSet::UNSUPPORTED)
                && !media.contains(MediaSet::BLANK);
            if usable {
                break;
            }

            // the drive being empty here is expected: the disc was
            // ejected right after burning
            self.ask_for_dest_media(session, MediaIssue::Checksum, MediaSet::NONE)?;
        }

        if let Some(medium) = drive.medium() {
            if medium.is_mounted() && medium.unmount().is_err() {
                return Err(Error::DriveBusy);
            }
        }

        if !self.dest_locked {
            drive.lock("Ongoing checksumming operation").map_err(|failure| {
                Error::General(format!("The drive cannot be locked ({})", failure))
            })?;
        }
        self.dest_locked = true;

        Ok(())
    }

    // --- unlocking ---

    /// Release the source drive. The source is never ejected: other
    /// applications may be using it, and the user can eject it at will.
    pub(crate) fn unlock_source(&mut self) -> Result<()> {
        let Some(src) = self.src.take() else {
            return Ok(());
        };

        if self.src_locked {
            self.src_locked = false;
            src.unlock();
        }

        Ok(())
    }

    /// Release the destination drive, then eject it when the session asks
    /// for that, or reprobe it so the OS sees the new contents
    pub(crate) fn unlock_destination(&mut self, session: &Session) -> Result<()> {
        let Some(dest) = self.dest.take() else {
            return Ok(());
        };

        if !self.dest_locked {
            return Ok(());
        }

        self.dest_locked = false;
        dest.unlock();

        if session.flags().contains(BurnFlags::EJECT) {
            self.eject(dest.as_ref())?;
        } else {
            dest.reprobe();
        }

        Ok(())
    }

    /// Release both drives; the destination first, mirroring lock order
    pub(crate) fn unlock_both(&mut self, session: &Session) -> Result<()> {
        let dest = self.unlock_destination(session);
        let src = self.unlock_source();
        dest.and(src)
    }

    // --- ejecting ---

    /// Eject with retries: drives are frequently still busy right after
    /// an operation
    pub(crate) fn eject(&self, drive: &dyn Drive) -> Result<()> {
        if let Err(err) = drive.eject() {
            tracing::debug!("Eject attempt failed: {}", err);
        }

        // sleep some time and see what happened
        self.shared.cancel.sleep(self.config.eject_settle_delay())?;

        let mut counter = 0;
        while drive.medium().is_some() {
            counter += 1;
            if counter > self.config.eject_attempts {
                tracing::warn!("Max attempts reached at ejecting");
                return Err(Error::General(format!(
                    "The disc in \"{}\" cannot be ejected",
                    drive.display_name()
                )));
            }

            tracing::debug!("Retrying ejection");
            if let Err(err) = drive.eject() {
                tracing::debug!("Eject attempt failed: {}", err);
            }
            self.shared.cancel.sleep(self.config.eject_settle_delay())?;
        }

        Ok(())
    }

    /// Unmount, unlock and eject the source medium
    pub(crate) fn eject_src_media(&mut self) -> Result<()> {
        let Some(src) = self.src.clone() else {
            return Ok(());
        };

        tracing::debug!("Ejecting source disc");

        if let Some(medium) = src.medium() {
            if medium.is_mounted() {
                medium.unmount().map_err(Error::General)?;
            }
        }

        if self.src_locked {
            self.src_locked = false;
            if !src.unlock() {
                return Err(Error::General(format!(
                    "\"{}\" cannot be unlocked",
                    src.display_name()
                )));
            }
        }

        let result = self.eject(src.as_ref());
        self.src = None;
        result
    }

    /// Unmount, unlock and eject the destination medium
    pub(crate) fn eject_dest_media(&mut self) -> Result<()> {
        let Some(dest) = self.dest.clone() else {
            return Ok(());
        };

        tracing::debug!("Ejecting destination disc");

        if let Some(medium) = dest.medium() {
            if medium.is_mounted() {
                if let Err(err) = medium.unmount() {
                    tracing::debug!("Couldn't unmount destination medium: {}", err);
                }
            }
        }

        if self.dest_locked {
            self.dest_locked = false;
            if !dest.unlock() {
                return Err(Error::General(format!(
                    "\"{}\" cannot be unlocked",
                    dest.display_name()
                )));
            }
        }

        self.eject(dest.as_ref())
    }

    // --- probing ---

    /// Reprobe the destination and wait for the medium to be seen again
    pub(crate) fn wait_for_dest_medium(&self) -> Result<()> {
        let Some(dest) = &self.dest else {
            return Ok(());
        };

        dest.reprobe();
        while dest.medium().is_none() {
            self.shared.cancel.sleep(self.config.reprobe_poll())?;
        }

        Ok(())
    }
}
