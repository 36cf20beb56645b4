//! Tracks and track types
//!
//! A [`Track`] is one entry on the session's track stack. [`TrackType`] is
//! the payload-free description used for capability queries ("is this
//! output supported"), both for session inputs and outputs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::medium::{Drive, MediaSet};

/// Well-known name of an MD5 checksum file carried on a data disc
pub const MD5_CHECKSUM_FILE: &str = "checksum.md5";

/// Well-known name of a SHA-1 checksum file carried on a data disc
pub const SHA1_CHECKSUM_FILE: &str = "checksum.sha1";

/// Well-known name of a SHA-256 checksum file carried on a data disc
pub const SHA256_CHECKSUM_FILE: &str = "checksum.sha256";

/// Image file formats, used to negotiate the intermediate image for
/// same-drive copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Plain BIN/ISO image
    Bin,
    /// BIN + CUE sheet
    Cue,
    /// Raw clone image
    Clone,
    /// cdrdao TOC + data
    Cdrdao,
}

impl ImageFormat {
    /// Negotiation order for intermediate images, most capable first
    pub const PREFERENCE: [ImageFormat; 4] = [
        ImageFormat::Cdrdao,
        ImageFormat::Clone,
        ImageFormat::Cue,
        ImageFormat::Bin,
    ];

    /// File extension of the main image file
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Bin => "iso",
            ImageFormat::Cue | ImageFormat::Clone | ImageFormat::Cdrdao => "bin",
        }
    }

    /// File extension of the companion table-of-contents file, when the
    /// format has one
    pub fn toc_extension(&self) -> Option<&'static str> {
        match self {
            ImageFormat::Bin => None,
            ImageFormat::Cue => Some("cue"),
            ImageFormat::Clone | ImageFormat::Cdrdao => Some("toc"),
        }
    }
}

/// Audio/video classification of a stream track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Plain audio tracks
    Audio,
    /// Video content (VCD, video DVD)
    Video,
}

/// Checksum kinds a track can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    /// MD5 digest of the track contents
    Md5,
    /// SHA-1 digest of the track contents
    Sha1,
    /// SHA-256 digest of the track contents
    Sha256,
    /// An MD5 file-list carried on the medium itself
    Md5File,
    /// A SHA-1 file-list carried on the medium itself
    Sha1File,
    /// A SHA-256 file-list carried on the medium itself
    Sha256File,
}

impl ChecksumType {
    /// Whether the checksum is a digest of the whole track contents, as
    /// opposed to a per-file list stored on the medium
    pub fn is_digest(&self) -> bool {
        matches!(
            self,
            ChecksumType::Md5 | ChecksumType::Sha1 | ChecksumType::Sha256
        )
    }

    /// Well-known on-disc file name for file-list checksum kinds
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            ChecksumType::Md5File => Some(MD5_CHECKSUM_FILE),
            ChecksumType::Sha1File => Some(SHA1_CHECKSUM_FILE),
            ChecksumType::Sha256File => Some(SHA256_CHECKSUM_FILE),
            _ => None,
        }
    }
}

/// Payload-free description of a track kind, for capability queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackType {
    /// No track
    None,
    /// A data filesystem track
    Data {
        /// Whether Joliet filename extensions are requested
        joliet: bool,
    },
    /// An audio/video stream track
    Stream {
        /// Stream classification
        format: StreamFormat,
    },
    /// A disc image
    Image {
        /// Image file format
        format: ImageFormat,
    },
    /// A physical medium
    Disc {
        /// Status flags of the medium
        media: MediaSet,
    },
}

impl TrackType {
    /// Whether this is a data track type
    pub fn is_data(&self) -> bool {
        matches!(self, TrackType::Data { .. })
    }

    /// Whether this is a stream track type
    pub fn is_stream(&self) -> bool {
        matches!(self, TrackType::Stream { .. })
    }

    /// Whether this is a physical-medium track type
    pub fn is_disc(&self) -> bool {
        matches!(self, TrackType::Disc { .. })
    }

    /// Medium flags for disc track types, `NONE` otherwise
    pub fn media(&self) -> MediaSet {
        match self {
            TrackType::Disc { media } => *media,
            _ => MediaSet::NONE,
        }
    }
}

/// Source payload of a track
#[derive(Clone)]
pub enum TrackSource {
    /// A data filesystem to lay out
    Data {
        /// Whether Joliet filename extensions are requested
        joliet: bool,
    },
    /// An audio/video stream
    Stream {
        /// Stream classification
        format: StreamFormat,
    },
    /// A disc image on the filesystem
    Image {
        /// Path to the image file
        path: PathBuf,
        /// Path to the companion TOC file, when the format has one
        toc: Option<PathBuf>,
        /// Image file format
        format: ImageFormat,
    },
    /// A physical medium in a drive
    Disc {
        /// The drive holding the medium
        drive: Arc<dyn Drive>,
        /// Specific track on the medium, when only one is meant
        track_num: Option<u32>,
    },
}

impl std::fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackSource::Data { joliet } => f.debug_struct("Data").field("joliet", joliet).finish(),
            TrackSource::Stream { format } => {
                f.debug_struct("Stream").field("format", format).finish()
            }
            TrackSource::Image { path, toc, format } => f
                .debug_struct("Image")
                .field("path", path)
                .field("toc", toc)
                .field("format", format)
                .finish(),
            TrackSource::Disc { drive, track_num } => f
                .debug_struct("Disc")
                .field("drive", &drive.display_name())
                .field("track_num", track_num)
                .finish(),
        }
    }
}

/// One entry on the session track stack
#[derive(Debug, Clone)]
pub struct Track {
    source: TrackSource,
    checksum: Option<(ChecksumType, String)>,
    address_start: Option<u64>,
    address_end: Option<u64>,
}

impl Track {
    /// Create a track from a source payload
    pub fn new(source: TrackSource) -> Self {
        Self {
            source,
            checksum: None,
            address_start: None,
            address_end: None,
        }
    }

    /// Create a data track
    pub fn data(joliet: bool) -> Self {
        Self::new(TrackSource::Data { joliet })
    }

    /// Create a stream track
    pub fn stream(format: StreamFormat) -> Self {
        Self::new(TrackSource::Stream { format })
    }

    /// Create an image track
    pub fn image(path: PathBuf, toc: Option<PathBuf>, format: ImageFormat) -> Self {
        Self::new(TrackSource::Image { path, toc, format })
    }

    /// Create a disc track for a whole medium
    pub fn disc(drive: Arc<dyn Drive>) -> Self {
        Self::new(TrackSource::Disc {
            drive,
            track_num: None,
        })
    }

    /// Source payload of the track
    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    /// Payload-free type of the track
    pub fn track_type(&self) -> TrackType {
        match &self.source {
            TrackSource::Data { joliet } => TrackType::Data { joliet: *joliet },
            TrackSource::Stream { format } => TrackType::Stream { format: *format },
            TrackSource::Image { format, .. } => TrackType::Image { format: *format },
            TrackSource::Disc { drive, .. } => TrackType::Disc {
                media: drive
                    .medium()
                    .map(|medium| medium.status())
                    .unwrap_or(MediaSet::NONE),
            },
        }
    }

    /// Checksum attached to the track, if any
    pub fn checksum(&self) -> Option<(ChecksumType, &str)> {
        self.checksum
            .as_ref()
            .map(|(kind, value)| (*kind, value.as_str()))
    }

    /// Attach a checksum to the track
    pub fn set_checksum(&mut self, kind: ChecksumType, value: impl Into<String>) {
        self.checksum = Some((kind, value.into()));
    }

    /// Remove any checksum from the track
    pub fn clear_checksum(&mut self) {
        self.checksum = None;
    }

    /// Restrict a disc track to one physical track number
    pub fn set_track_num(&mut self, num: u32) {
        if let TrackSource::Disc { track_num, .. } = &mut self.source {
            *track_num = Some(num);
        }
    }

    /// Tag the track with the byte range written on a random-writable
    /// medium
    pub fn set_address_range(&mut self, start: u64, end: u64) {
        self.address_start = Some(start);
        self.address_end = Some(end);
    }

    /// The tagged write range, when present
    pub fn address_range(&self) -> Option<(u64, u64)> {
        match (self.address_start, self.address_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Drop Joliet extensions from a data track
    pub fn remove_joliet(&mut self) {
        if let TrackSource::Data { joliet } = &mut self.source {
            *joliet = false;
        }
    }
}
