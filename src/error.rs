/// Errors returned by the dictionary, the skip list and the sorted set built
/// on top of them.
///
/// Every variant except [`Error::RehashOutOfRange`] describes a routine
/// outcome the caller is expected to branch on. `RehashOutOfRange` means the
/// dictionary's internal bookkeeping is corrupt and must not be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The rehash cursor walked past the end of the source table
    RehashOutOfRange,

    /// Operation on a structure whose storage was never allocated or has
    /// been released
    ObjPtrNil,

    /// Key is already present in the dictionary
    KeyExists,

    /// Key is not present in the dictionary
    KeyNotFound,

    /// The exact `(score, member)` pair is already present in the skip list
    SkipNodeExists,

    /// The exact `(score, member)` pair is not present in the skip list
    MemberNotFound,

    /// Index, rank or range argument outside valid bounds
    OutOfRange,

    /// Value cannot be represented, e.g. a NaN score
    NotAllowedType,

    /// The dictionary cannot be released while a rehash is in flight
    RehashInProgress,
}

impl Error {
    /// Numeric code of this error.
    pub const fn code(&self) -> u32 {
        match self {
            Self::RehashOutOfRange => 1,
            Self::ObjPtrNil => 2,
            Self::KeyExists => 3,
            Self::KeyNotFound => 4,
            Self::SkipNodeExists => 5,
            Self::MemberNotFound => 6,
            Self::OutOfRange => 7,
            Self::NotAllowedType => 8,
            Self::RehashInProgress => 11,
        }
    }

    /// Human-readable description of this error.
    pub const fn message(&self) -> &'static str {
        match self {
            Self::RehashOutOfRange => "rehash cursor out of range of the source table",
            Self::ObjPtrNil => "structure not allocated",
            Self::KeyExists => "key exists",
            Self::KeyNotFound => "key not found",
            Self::SkipNodeExists => "skip list node exists",
            Self::MemberNotFound => "member not found in skip list",
            Self::OutOfRange => "out of range",
            Self::NotAllowedType => "value type not allowed",
            Self::RehashInProgress => "rehash in progress",
        }
    }

    /// Returns `true` if this error signals a broken internal invariant
    /// rather than a routine miss or duplicate.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::RehashOutOfRange)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl core::error::Error for Error {}

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::RehashOutOfRange.code(), 1);
        assert_eq!(Error::ObjPtrNil.code(), 2);
        assert_eq!(Error::KeyExists.code(), 3);
        assert_eq!(Error::KeyNotFound.code(), 4);
        assert_eq!(Error::SkipNodeExists.code(), 5);
        assert_eq!(Error::MemberNotFound.code(), 6);
        assert_eq!(Error::OutOfRange.code(), 7);
        assert_eq!(Error::NotAllowedType.code(), 8);
        assert_eq!(Error::RehashInProgress.code(), 11);
    }

    #[test]
    fn display_carries_code() {
        assert_eq!(Error::KeyExists.to_string(), "key exists (code 3)");
        assert!(Error::RehashOutOfRange.is_internal());
        assert!(!Error::KeyNotFound.is_internal());
    }
}
