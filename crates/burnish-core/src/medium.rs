//! Drive and medium contract
//!
//! The engine never talks to hardware directly: it consumes the [`Drive`]
//! and [`Medium`] traits implemented by the platform layer. A medium's
//! state is reported as a [`MediaSet`], the same flag set used to describe
//! the class of medium a prompt asks the user to insert.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Data rate of a 1x CD drive in bytes per second
pub const CD_RATE: u64 = 176_400;

/// Data rate of a 1x DVD drive in bytes per second
pub const DVD_RATE: u64 = 1_385_000;

/// Convert a CD speed multiplier to a byte rate
pub fn cd_speed_to_rate(speed: u64) -> u64 {
    speed * CD_RATE
}

/// Status of a medium, or the class of medium required from the user
///
/// `BUSY` and `UNSUPPORTED` are exclusive markers reported alone by the
/// status query; every other flag composes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaSet(u32);

impl MediaSet {
    /// No medium present / no requirement
    pub const NONE: MediaSet = MediaSet(0);

    /// The drive is busy probing or claimed elsewhere
    pub const BUSY: MediaSet = MediaSet(1);

    /// The medium cannot be handled at all
    pub const UNSUPPORTED: MediaSet = MediaSet(1 << 1);

    /// Blank medium
    pub const BLANK: MediaSet = MediaSet(1 << 2);

    /// An open session can still be appended
    pub const APPENDABLE: MediaSet = MediaSet(1 << 3);

    /// The medium holds data sessions
    pub const HAS_DATA: MediaSet = MediaSet(1 << 4);

    /// The medium holds audio tracks
    pub const HAS_AUDIO: MediaSet = MediaSet(1 << 5);

    /// The medium can be blanked and rewritten
    pub const REWRITABLE: MediaSet = MediaSet(1 << 6);

    /// The medium can be written at all
    pub const WRITABLE: MediaSet = MediaSet(1 << 7);

    /// The medium is addressed by byte offset rather than track number
    /// (restricted-overwrite and plus-RW formats)
    pub const RANDOM_WRITABLE: MediaSet = MediaSet(1 << 8);

    /// CD family
    pub const CD: MediaSet = MediaSet(1 << 9);

    /// DVD family
    pub const DVD: MediaSet = MediaSet(1 << 10);

    /// Blu-ray family
    pub const BD: MediaSet = MediaSet(1 << 11);

    /// The destination is an image file, not a physical medium
    pub const FILE: MediaSet = MediaSet(1 << 12);

    /// Whether every flag of `other` is present
    pub fn contains(self, other: MediaSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether at least one flag of `other` is present
    pub fn intersects(self, other: MediaSet) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether the set is empty (no medium)
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets
    #[must_use]
    pub fn union(self, other: MediaSet) -> MediaSet {
        MediaSet(self.0 | other.0)
    }

    /// Intersection of two sets
    #[must_use]
    pub fn intersection(self, other: MediaSet) -> MediaSet {
        MediaSet(self.0 & other.0)
    }

    /// Flags of `self` not present in `other`
    #[must_use]
    pub fn difference(self, other: MediaSet) -> MediaSet {
        MediaSet(self.0 & !other.0)
    }
}

impl fmt::Display for MediaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(MediaSet, &str); 13] = [
            (MediaSet::BUSY, "BUSY"),
            (MediaSet::UNSUPPORTED, "UNSUPPORTED"),
            (MediaSet::BLANK, "BLANK"),
            (MediaSet::APPENDABLE, "APPENDABLE"),
            (MediaSet::HAS_DATA, "HAS_DATA"),
            (MediaSet::HAS_AUDIO, "HAS_AUDIO"),
            (MediaSet::REWRITABLE, "REWRITABLE"),
            (MediaSet::WRITABLE, "WRITABLE"),
            (MediaSet::RANDOM_WRITABLE, "RANDOM_WRITABLE"),
            (MediaSet::CD, "CD"),
            (MediaSet::DVD, "DVD"),
            (MediaSet::BD, "BD"),
            (MediaSet::FILE, "FILE"),
        ];

        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The medium currently loaded in a drive
pub trait Medium: Send + Sync {
    /// Current status flags of the medium
    fn status(&self) -> MediaSet;

    /// Whether the medium's filesystem is currently mounted
    fn is_mounted(&self) -> bool;

    /// Unmount the medium's filesystem
    fn unmount(&self) -> std::result::Result<(), String>;

    /// Whether the drive can write this medium
    fn can_be_written(&self) -> bool;

    /// Whether the medium can be blanked and rewritten
    fn can_be_rewritten(&self) -> bool;

    /// Next writable byte address for appended sessions
    fn next_writable_address(&self) -> u64;

    /// Number of tracks already on the medium
    fn track_count(&self) -> u32;
}

/// A physical drive, distinct from whatever medium it holds
pub trait Drive: Send + Sync {
    /// Human-readable drive name for prompts and error messages
    fn display_name(&self) -> String;

    /// Device node path
    fn device_path(&self) -> &Path;

    /// The currently loaded medium, if any
    fn medium(&self) -> Option<Arc<dyn Medium>>;

    /// Take the exclusive OS-level lock on the drive.
    ///
    /// The `reason` string is surfaced by the OS to other applications.
    /// On failure the OS failure string is returned.
    fn lock(&self, reason: &str) -> std::result::Result<(), String>;

    /// Release the exclusive OS-level lock; returns false when the lock
    /// could not be released.
    fn unlock(&self) -> bool;

    /// Open the tray / eject the medium
    fn eject(&self) -> std::result::Result<(), String>;

    /// Ask the OS to probe the drive contents again
    fn reprobe(&self);

    /// Whether no other process currently holds the drive
    fn can_use_exclusively(&self) -> bool;
}

/// Whether two drive handles designate the same physical device
pub fn same_drive(a: &dyn Drive, b: &dyn Drive) -> bool {
    a.device_path() == b.device_path()
}
