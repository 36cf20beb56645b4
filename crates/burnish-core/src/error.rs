//! Error types for the Burnish core library

use thiserror::Error;

/// Main error type for burn orchestration operations
///
/// Medium-state and resource variants are the ones the recovery policy can
/// act on; configuration variants surface immediately. `Cancelled` is not a
/// failure: it is the distinct terminal outcome of a user cancellation and
/// must never be swallowed by a retry loop.
#[derive(Error, Debug)]
pub enum Error {
    /// No destination drive set on the session
    #[error("No burner specified")]
    OutputNone,

    /// No source drive set on the session
    #[error("No source drive specified")]
    SourceNone,

    /// Generic failure with a human-readable message
    #[error("{0}")]
    General(String),

    /// No medium present in the drive
    #[error("There is no medium in the drive")]
    MediumNone,

    /// The drive is claimed by another process
    #[error("The drive is busy. Make sure another application is not using it")]
    DriveBusy,

    /// The inserted medium cannot be handled at all
    #[error("The medium is not supported")]
    MediumInvalid,

    /// The medium holds no readable data (blank source)
    #[error("The medium has no readable data")]
    MediumNoData,

    /// The medium cannot be blanked
    #[error("The medium has no rewriting capabilities")]
    MediumNotRewritable,

    /// The medium cannot receive the session in its current state
    #[error("The medium cannot be written to")]
    MediumNotWritable,

    /// The medium must be taken out and reloaded before going on
    #[error("The medium needs to be reloaded")]
    MediumNeedReloading,

    /// Insufficient space left on the destination medium
    #[error("Not enough space available on the disc")]
    MediumSpace,

    /// MERGE/APPEND was requested but cannot be honored
    #[error("Merging data is impossible with this disc")]
    MergeImpossible,

    /// Insufficient space on the filesystem holding a temp or final image
    #[error("Not enough space available at the image location: {0}")]
    DiskSpace(String),

    /// Missing permission on a temp or final image location
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Some filenames do not conform to the Joliet standard
    #[error("Some filenames do not conform to the Joliet standard")]
    ImageJoliet,

    /// The drive could not sustain the requested write rate (DMA underrun)
    #[error("The drive could not sustain the required write rate")]
    SlowDma,

    /// Operation was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// The current pipeline must be rebuilt and re-run
    #[error("The operation must be retried")]
    Retry,

    /// Status was queried while no operation is in flight
    #[error("Not ready to operate")]
    NotReady,

    /// The capability resolver cannot satisfy the session
    #[error("Unsupported operation")]
    NotSupported,

    /// A task was started while already running
    #[error("Operation already in progress")]
    Running,

    /// A task was driven while not running
    #[error("No operation in progress")]
    NotRunning,
}

impl Error {
    /// Whether this value is a control result (retry/ready/support state)
    /// rather than a real failure. Control results propagate through the
    /// recovery policy untouched.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Error::Cancelled
                | Error::Retry
                | Error::NotReady
                | Error::NotSupported
                | Error::Running
                | Error::NotRunning
        )
    }
}

/// Result type alias using the Burnish error type
pub type Result<T> = std::result::Result<T, Error>;

/// Map an I/O error from an image location probe onto the taxonomy.
///
/// Only permission and space problems are recoverable through the
/// alternate-location prompt; everything else stays generic.
pub(crate) fn image_location_error(err: &std::io::Error, path: &std::path::Path) -> Error {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => Error::Permission(path.display().to_string()),
        std::io::ErrorKind::StorageFull => Error::DiskSpace(path.display().to_string()),
        _ => Error::General(format!("{}: {}", path.display(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::OutputNone;
        assert_eq!(err.to_string(), "No burner specified");

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");

        let err = Error::DiskSpace("/tmp/burnish".to_string());
        assert!(err.to_string().contains("/tmp/burnish"));
    }

    #[test]
    fn test_control_results() {
        assert!(Error::Cancelled.is_control());
        assert!(Error::Retry.is_control());
        assert!(Error::NotSupported.is_control());
        assert!(!Error::MediumSpace.is_control());
        assert!(!Error::General("boom".to_string()).is_control());
    }

    #[test]
    fn test_image_location_error_mapping() {
        let path = std::path::Path::new("/no/such/dir");

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            image_location_error(&err, path),
            Error::Permission(_)
        ));

        let err = std::io::Error::new(std::io::ErrorKind::StorageFull, "full");
        assert!(matches!(
            image_location_error(&err, path),
            Error::DiskSpace(_)
        ));

        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(image_location_error(&err, path), Error::General(_)));
    }
}
