//! Error recovery policy
//!
//! Maps a failed task's error onto the action that may rescue the stage:
//! prompt and retry, re-lock a medium, throttle the write rate, or give
//! up. The mapping depends on whether the failing stage was imaging or
//! recording — a no-data error from an imager points at the source disc,
//! while medium-state errors from a recorder point at the destination.

use crate::decision::MediaIssue;
use crate::error::Error;
use crate::flags::BurnFlags;
use crate::medium::{cd_speed_to_rate, CD_RATE};

/// Which kind of stage reported the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskScope {
    /// An imager (dry or real run)
    Imaging,
    /// The recorder writing the destination medium
    Recording,
}

/// What to do about a failed stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Ask to drop Joliet from all data tracks, then retry the stage
    DisableJoliet,
    /// Prompt for and re-lock the source medium, then retry
    ReloadSource,
    /// Prompt for and re-lock the destination medium, then retry
    ReloadDestination(MediaIssue),
    /// Prompt for another image location, then retry
    AlternateLocation,
    /// Rest the system, reduce the write rate, then retry
    Throttle,
    /// Out of space with APPEND/MERGE: the image was generated for this
    /// very disc, swapping media would lose the merge
    MergeImpossible,
    /// Nothing can rescue the stage
    Fatal,
}

impl Recovery {
    /// Decide the recovery action for `error` in the given stage scope
    pub(crate) fn classify(error: &Error, flags: BurnFlags, scope: TaskScope) -> Recovery {
        match (scope, error) {
            (_, Error::ImageJoliet) => Recovery::DisableJoliet,

            (TaskScope::Imaging, Error::MediumNoData) => Recovery::ReloadSource,
            (TaskScope::Imaging, Error::DiskSpace(_) | Error::Permission(_)) => {
                Recovery::AlternateLocation
            }

            (TaskScope::Recording, Error::MediumNeedReloading) => Recovery::ReloadSource,
            (TaskScope::Recording, Error::SlowDma) => Recovery::Throttle,
            (TaskScope::Recording, Error::MediumSpace) => {
                if flags.intersects(BurnFlags::APPEND.union(BurnFlags::MERGE)) {
                    Recovery::MergeImpossible
                } else {
                    Recovery::ReloadDestination(MediaIssue::NoSpace)
                }
            }
            (TaskScope::Recording, Error::MediumNone) => {
                Recovery::ReloadDestination(MediaIssue::NoMedium)
            }
            (TaskScope::Recording, Error::DriveBusy) => {
                Recovery::ReloadDestination(MediaIssue::Busy)
            }
            (TaskScope::Recording, Error::MediumInvalid) => {
                Recovery::ReloadDestination(MediaIssue::Unsupported)
            }
            (TaskScope::Recording, Error::MediumNoData) => {
                Recovery::ReloadDestination(MediaIssue::NoData)
            }
            (TaskScope::Recording, Error::MediumNotWritable) => {
                Recovery::ReloadDestination(MediaIssue::NotWritable)
            }
            (TaskScope::Recording, Error::MediumNotRewritable) => {
                Recovery::ReloadDestination(MediaIssue::NotRewritable)
            }

            _ => Recovery::Fatal,
        }
    }
}

/// Next write rate after a DMA underrun.
///
/// Rates at or below 8x CD step down to 75 % with a 1x CD floor; anything
/// faster drops straight to the 8x CD cap. The result never exceeds the
/// input. The threshold unit is a CD-era heuristic kept as documented;
/// a per-medium policy would replace this one function.
pub(crate) fn throttled_rate(rate: u64) -> u64 {
    let cap = cd_speed_to_rate(8);
    if rate <= cap {
        (rate * 3 / 4).max(CD_RATE)
    } else {
        cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joliet_recovers_in_both_scopes() {
        for scope in [TaskScope::Imaging, TaskScope::Recording] {
            assert_eq!(
                Recovery::classify(&Error::ImageJoliet, BurnFlags::NONE, scope),
                Recovery::DisableJoliet
            );
        }
    }

    #[test]
    fn test_imaging_no_data_points_at_source() {
        assert_eq!(
            Recovery::classify(&Error::MediumNoData, BurnFlags::NONE, TaskScope::Imaging),
            Recovery::ReloadSource
        );
        assert_eq!(
            Recovery::classify(&Error::MediumNoData, BurnFlags::NONE, TaskScope::Recording),
            Recovery::ReloadDestination(MediaIssue::NoData)
        );
    }

    #[test]
    fn test_image_location_errors_prompt_for_location() {
        let err = Error::DiskSpace("/tmp".to_string());
        assert_eq!(
            Recovery::classify(&err, BurnFlags::NONE, TaskScope::Imaging),
            Recovery::AlternateLocation
        );

        let err = Error::Permission("/tmp".to_string());
        assert_eq!(
            Recovery::classify(&err, BurnFlags::NONE, TaskScope::Imaging),
            Recovery::AlternateLocation
        );
    }

    #[test]
    fn test_medium_space_with_merge_is_fatal() {
        assert_eq!(
            Recovery::classify(&Error::MediumSpace, BurnFlags::MERGE, TaskScope::Recording),
            Recovery::MergeImpossible
        );
        assert_eq!(
            Recovery::classify(&Error::MediumSpace, BurnFlags::APPEND, TaskScope::Recording),
            Recovery::MergeImpossible
        );
        assert_eq!(
            Recovery::classify(&Error::MediumSpace, BurnFlags::NONE, TaskScope::Recording),
            Recovery::ReloadDestination(MediaIssue::NoSpace)
        );
    }

    #[test]
    fn test_unclassified_errors_are_fatal() {
        let err = Error::General("backend exploded".to_string());
        assert_eq!(
            Recovery::classify(&err, BurnFlags::NONE, TaskScope::Recording),
            Recovery::Fatal
        );
        assert_eq!(
            Recovery::classify(&Error::SlowDma, BurnFlags::NONE, TaskScope::Imaging),
            Recovery::Fatal,
            "DMA underruns can only come from the recorder"
        );
    }

    #[test]
    fn test_throttle_steps_down_with_floor() {
        let rate = cd_speed_to_rate(4);
        let next = throttled_rate(rate);
        assert_eq!(next, rate * 3 / 4);
        assert!(next < rate);

        // repeated underruns keep decreasing, never below 1x CD
        let mut rate = cd_speed_to_rate(2);
        for _ in 0..32 {
            let next = throttled_rate(rate);
            assert!(next <= rate);
            assert!(next >= CD_RATE);
            rate = next;
        }
        assert_eq!(rate, CD_RATE);
    }

    #[test]
    fn test_throttle_caps_fast_rates_at_8x_cd() {
        let rate = cd_speed_to_rate(40);
        assert_eq!(throttled_rate(rate), cd_speed_to_rate(8));
    }
}
