//! Burn session
//!
//! A [`Session`] is the declarative description of one recording request:
//! what to burn (the track stack), where (source and destination drives or
//! an image file) and how (flags, write rate, temp-file policy). The
//! engine borrows the session exclusively for the duration of one
//! operation and uses the settings/track stacks to try a configuration and
//! roll back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{image_location_error, Error, Result};
use crate::flags::BurnFlags;
use crate::medium::{same_drive, Drive, MediaSet};
use crate::track::{ImageFormat, Track, TrackType};

static TMP_IMAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Where the session output goes
#[derive(Debug, Clone)]
pub enum Output {
    /// Burn to the destination drive
    Disc,
    /// Write an image file instead of burning
    File {
        /// Path of the image file
        image: PathBuf,
        /// Path of the companion TOC file, when the format has one
        toc: Option<PathBuf>,
        /// Image format
        format: ImageFormat,
    },
}

/// Snapshot taken by [`Session::push_settings`]
#[derive(Clone)]
struct SavedSettings {
    flags: BurnFlags,
    rate: u64,
    output: Output,
}

/// A declarative recording request
pub struct Session {
    flags: BurnFlags,
    rate: u64,
    tracks: Vec<Track>,
    track_stack: Vec<Vec<Track>>,
    settings_stack: Vec<SavedSettings>,
    burner: Option<Arc<dyn Drive>>,
    src_drive: Option<Arc<dyn Drive>>,
    output: Output,
    tmp_dir: PathBuf,
    required_media: MediaSet,
}

impl Session {
    /// Create an empty session burning to disc, with temp files under the
    /// system temp directory
    pub fn new() -> Self {
        Self {
            flags: BurnFlags::NONE,
            rate: 0,
            tracks: Vec::new(),
            track_stack: Vec::new(),
            settings_stack: Vec::new(),
            burner: None,
            src_drive: None,
            output: Output::Disc,
            tmp_dir: std::env::temp_dir(),
            required_media: MediaSet::WRITABLE
                .union(MediaSet::CD)
                .union(MediaSet::DVD)
                .union(MediaSet::BD),
        }
    }

    // --- flags ---

    /// Current flag set
    pub fn flags(&self) -> BurnFlags {
        self.flags
    }

    /// Replace the whole flag set
    pub fn set_flags(&mut self, flags: BurnFlags) {
        self.flags = flags;
    }

    /// Add flags
    pub fn add_flag(&mut self, flag: BurnFlags) {
        self.flags.insert(flag);
    }

    /// Remove flags
    pub fn remove_flag(&mut self, flag: BurnFlags) {
        self.flags.remove(flag);
    }

    // --- rate ---

    /// Requested write rate in bytes per second (0 = drive default)
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Set the write rate in bytes per second
    pub fn set_rate(&mut self, rate: u64) {
        self.rate = rate;
    }

    // --- tracks ---

    /// Tracks currently on top of the stack
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Mutable access to the current tracks
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    /// Append a track to the current track list
    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Replace the current track list
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
    }

    /// Save the current track list and start a fresh one
    pub fn push_tracks(&mut self) {
        self.track_stack.push(std::mem::take(&mut self.tracks));
    }

    /// Restore the track list saved by the matching [`Self::push_tracks`]
    pub fn pop_tracks(&mut self) {
        if let Some(saved) = self.track_stack.pop() {
            self.tracks = saved;
        }
    }

    // --- settings stack ---

    /// Snapshot flags, rate and output so a configuration can be tried
    /// and rolled back
    pub fn push_settings(&mut self) {
        self.settings_stack.push(SavedSettings {
            flags: self.flags,
            rate: self.rate,
            output: self.output.clone(),
        });
    }

    /// Restore the snapshot taken by the matching [`Self::push_settings`]
    pub fn pop_settings(&mut self) {
        if let Some(saved) = self.settings_stack.pop() {
            self.flags = saved.flags;
            self.rate = saved.rate;
            self.output = saved.output;
        }
    }

    // --- drives ---

    /// Destination drive
    pub fn burner(&self) -> Option<Arc<dyn Drive>> {
        self.burner.clone()
    }

    /// Set the destination drive
    pub fn set_burner(&mut self, drive: Arc<dyn Drive>) {
        self.burner = Some(drive);
    }

    /// Source drive, for disc inputs
    pub fn src_drive(&self) -> Option<Arc<dyn Drive>> {
        self.src_drive.clone()
    }

    /// Set the source drive
    pub fn set_src_drive(&mut self, drive: Arc<dyn Drive>) {
        self.src_drive = Some(drive);
    }

    /// Whether source and destination resolve to the same physical drive
    pub fn same_src_dest_drive(&self) -> bool {
        match (&self.src_drive, &self.burner) {
            (Some(src), Some(dest)) => same_drive(src.as_ref(), dest.as_ref()),
            _ => false,
        }
    }

    // --- output ---

    /// Current output target
    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Whether the destination is an image file rather than a drive
    pub fn dest_is_file(&self) -> bool {
        matches!(self.output, Output::File { .. })
    }

    /// Direct the output to an image file
    pub fn set_image_output(&mut self, format: ImageFormat, image: PathBuf, toc: Option<PathBuf>) {
        self.output = Output::File { image, toc, format };
    }

    /// Direct the output back to the destination drive
    pub fn set_disc_output(&mut self) {
        self.output = Output::Disc;
    }

    /// Image and TOC paths of a file output, if that is the target
    pub fn output_paths(&self) -> Option<(&Path, Option<&Path>)> {
        match &self.output {
            Output::File { image, toc, .. } => Some((image.as_path(), toc.as_deref())),
            Output::Disc => None,
        }
    }

    /// Move a file output into another directory, keeping file names
    pub fn relocate_output(&mut self, dir: &Path) {
        if let Output::File { image, toc, .. } = &mut self.output {
            if let Some(name) = image.file_name() {
                *image = dir.join(name);
            }
            if let Some(toc_path) = toc {
                if let Some(name) = toc_path.file_name() {
                    *toc_path = dir.join(name);
                }
            }
        }
    }

    // --- temp-file policy ---

    /// Directory used for temporary images
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Change the directory used for temporary images
    pub fn set_tmp_dir(&mut self, dir: PathBuf) {
        self.tmp_dir = dir;
    }

    /// Allocate a fresh temporary image path (and TOC path when the format
    /// has one), probing that the location is actually usable.
    pub fn tmp_image_path(&self, format: ImageFormat) -> Result<(PathBuf, Option<PathBuf>)> {
        if !self.tmp_dir.exists() {
            fs::create_dir_all(&self.tmp_dir)
                .map_err(|err| image_location_error(&err, &self.tmp_dir))?;
        }

        let seq = TMP_IMAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        let stem = format!("burnish-{}-{}", std::process::id(), seq);
        let image = self
            .tmp_dir
            .join(format!("{}.{}", stem, format.extension()));
        let toc = format
            .toc_extension()
            .map(|ext| self.tmp_dir.join(format!("{}.{}", stem, ext)));

        // Probe writability now so permission problems surface as a
        // recoverable location error instead of a late task failure.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&image)
        {
            Ok(_) => {
                let _ = fs::remove_file(&image);
            }
            Err(err) => return Err(image_location_error(&err, &image)),
        }

        Ok((image, toc))
    }

    // --- type queries ---

    /// Type of the session input, derived from the first track
    pub fn input_type(&self) -> TrackType {
        self.tracks
            .first()
            .map(Track::track_type)
            .unwrap_or(TrackType::None)
    }

    /// Type of the session output
    pub fn output_type(&self) -> TrackType {
        match &self.output {
            Output::File { format, .. } => TrackType::Image { format: *format },
            Output::Disc => TrackType::Disc {
                media: self.dest_media(),
            },
        }
    }

    /// Status of the destination medium, `NONE` when absent or when the
    /// output is a file
    pub fn dest_media(&self) -> MediaSet {
        match &self.output {
            Output::File { .. } => MediaSet::FILE,
            Output::Disc => self
                .burner
                .as_ref()
                .and_then(|drive| drive.medium())
                .map(|medium| medium.status())
                .unwrap_or(MediaSet::NONE),
        }
    }

    /// Class of medium this session needs in the destination drive
    pub fn required_media(&self) -> MediaSet {
        self.required_media
    }

    /// Narrow the class of medium this session needs
    pub fn set_required_media(&mut self, media: MediaSet) {
        self.required_media = media;
    }

    /// Validate the basic shape of the session: at least one track, and a
    /// burner unless the output is a file
    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(Error::General("There is no track to be burnt".to_string()));
        }
        if !self.dest_is_file() && self.burner.is_none() {
            return Err(Error::OutputNone);
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
