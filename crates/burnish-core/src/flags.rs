//! Burn flag set
//!
//! Session flags are a plain value type: snapshots taken by the settings
//! stack are owned copies, never shared state. The consistency check
//! iterates the individual flags in declaration order.

use std::fmt;

/// Set of behavior flags attached to a burn session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BurnFlags(u32);

impl BurnFlags {
    /// Empty flag set
    pub const NONE: BurnFlags = BurnFlags(0);

    /// Eject the destination medium once the operation is finished
    pub const EJECT: BurnFlags = BurnFlags(1);

    /// Simulate the burn without committing data
    pub const DUMMY: BurnFlags = BurnFlags(1 << 1);

    /// Use disc-at-once recording
    pub const DAO: BurnFlags = BurnFlags(1 << 2);

    /// Use raw recording
    pub const RAW: BurnFlags = BurnFlags(1 << 3);

    /// Enable buffer-underrun protection in the recorder
    pub const BURNPROOF: BurnFlags = BurnFlags(1 << 4);

    /// Burn on the fly, without an intermediate image on disk
    pub const NO_TMP_FILES: BurnFlags = BurnFlags(1 << 5);

    /// Append the session after existing ones
    pub const APPEND: BurnFlags = BurnFlags(1 << 6);

    /// Merge the new session with the data already on the medium
    pub const MERGE: BurnFlags = BurnFlags(1 << 7);

    /// Leave the disc open for further sessions
    pub const MULTI: BurnFlags = BurnFlags(1 << 8);

    /// Blank the medium before writing when it holds data
    pub const BLANK_BEFORE_WRITE: BurnFlags = BurnFlags(1 << 9);

    /// Use fast (minimal) blanking
    pub const FAST_BLANK: BurnFlags = BurnFlags(1 << 10);

    const ALL: [(BurnFlags, &'static str); 11] = [
        (BurnFlags::EJECT, "EJECT"),
        (BurnFlags::DUMMY, "DUMMY"),
        (BurnFlags::DAO, "DAO"),
        (BurnFlags::RAW, "RAW"),
        (BurnFlags::BURNPROOF, "BURNPROOF"),
        (BurnFlags::NO_TMP_FILES, "NO_TMP_FILES"),
        (BurnFlags::APPEND, "APPEND"),
        (BurnFlags::MERGE, "MERGE"),
        (BurnFlags::MULTI, "MULTI"),
        (BurnFlags::BLANK_BEFORE_WRITE, "BLANK_BEFORE_WRITE"),
        (BurnFlags::FAST_BLANK, "FAST_BLANK"),
    ];

    /// Whether every flag of `other` is present in `self`
    pub fn contains(self, other: BurnFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether at least one flag of `other` is present in `self`
    pub fn intersects(self, other: BurnFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two flag sets
    #[must_use]
    pub fn union(self, other: BurnFlags) -> BurnFlags {
        BurnFlags(self.0 | other.0)
    }

    /// Flags of `self` not present in `other`
    #[must_use]
    pub fn difference(self, other: BurnFlags) -> BurnFlags {
        BurnFlags(self.0 & !other.0)
    }

    /// Add the given flags in place
    pub fn insert(&mut self, other: BurnFlags) {
        self.0 |= other.0;
    }

    /// Remove the given flags in place
    pub fn remove(&mut self, other: BurnFlags) {
        self.0 &= !other.0;
    }

    /// Iterate over every defined flag, in declaration order
    pub fn each() -> impl Iterator<Item = BurnFlags> {
        Self::ALL.iter().map(|(flag, _)| *flag)
    }

    /// Iterate over the flags present in this set, in declaration order
    pub fn iter(self) -> impl Iterator<Item = BurnFlags> {
        Self::ALL
            .iter()
            .map(|(flag, _)| *flag)
            .filter(move |flag| self.contains(*flag))
    }
}

impl fmt::Display for BurnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (flag, name) in Self::ALL {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersects() {
        let flags = BurnFlags::DUMMY.union(BurnFlags::EJECT);
        assert!(flags.contains(BurnFlags::DUMMY));
        assert!(flags.contains(BurnFlags::EJECT));
        assert!(!flags.contains(BurnFlags::MERGE));
        assert!(flags.intersects(BurnFlags::DUMMY.union(BurnFlags::MERGE)));
        assert!(!flags.intersects(BurnFlags::MERGE.union(BurnFlags::APPEND)));
    }

    #[test]
    fn test_insert_remove_roundtrip() {
        let mut flags = BurnFlags::NONE;
        flags.insert(BurnFlags::MERGE);
        flags.insert(BurnFlags::BLANK_BEFORE_WRITE);
        assert!(flags.contains(BurnFlags::MERGE));

        flags.remove(BurnFlags::MERGE);
        assert!(!flags.contains(BurnFlags::MERGE));
        assert!(flags.contains(BurnFlags::BLANK_BEFORE_WRITE));
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut flags = BurnFlags::DUMMY;
        let snapshot = flags;
        flags.insert(BurnFlags::EJECT);
        assert!(!snapshot.contains(BurnFlags::EJECT));
    }

    #[test]
    fn test_iter_only_yields_set_flags() {
        let flags = BurnFlags::APPEND.union(BurnFlags::MULTI);
        let collected: Vec<BurnFlags> = flags.iter().collect();
        assert_eq!(collected, vec![BurnFlags::APPEND, BurnFlags::MULTI]);
    }

    #[test]
    fn test_display() {
        assert_eq!(BurnFlags::NONE.to_string(), "NONE");
        let flags = BurnFlags::DUMMY.union(BurnFlags::MERGE);
        assert_eq!(flags.to_string(), "DUMMY|MERGE");
    }
}
