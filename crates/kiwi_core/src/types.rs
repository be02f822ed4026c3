//! Core type definitions for KiWi.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Version stamp assigned to every write.
///
/// Versions come from a single engine-wide clock and are never reused.
/// `Version::UNSET` marks an entry that has been allocated but not yet
/// stamped; such entries are invisible to every reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Version {
    /// Stamp of an entry that has not been assigned a version yet.
    pub const UNSET: Version = Version(0);

    /// First version handed out by a fresh clock.
    pub const FIRST: Version = Version(1);

    /// A read version that observes every stamped entry.
    pub const LATEST: Version = Version(u64::MAX - 1);

    /// Creates a version from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw version value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns true if the entry carrying this stamp has been versioned.
    #[must_use]
    pub const fn is_set(self) -> bool {
        self.0 != Self::UNSET.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of a segment.
///
/// Ids are drawn from an engine counter and are unique for the lifetime of
/// the engine. A pooled segment receives a fresh id every time it is reused,
/// so staged writes aimed at a retired incarnation never match the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl SegmentId {
    /// Creates a segment id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// The engine-wide version counter.
#[derive(Debug)]
pub(crate) struct VersionClock {
    next: AtomicU64,
}

impl VersionClock {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicU64::new(Version::FIRST.0),
        }
    }

    /// Takes a fresh version and advances the clock.
    pub(crate) fn advance(&self) -> Version {
        Version(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the version the next call to `advance` will hand out.
    pub(crate) fn current(&self) -> Version {
        Version(self.next.load(Ordering::SeqCst))
    }
}

/// A key that can be stored in a segment.
///
/// Segments lay keys out inline in their entry arena, which requires a
/// fixed width. Types that report `FIXED_WIDTH = None` are rejected by
/// [`Engine::new`](crate::Engine::new) with [`CoreError::Unsupported`](crate::CoreError::Unsupported).
pub trait Key: Ord + Clone + Send + Sync + fmt::Debug + 'static {
    /// Width of the key in bytes, or `None` for variable-length keys.
    const FIXED_WIDTH: Option<usize>;
}

macro_rules! fixed_width_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Key for $ty {
                const FIXED_WIDTH: Option<usize> = Some(std::mem::size_of::<$ty>());
            }
        )*
    };
}

fixed_width_key!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, char);

impl<const N: usize> Key for [u8; N] {
    const FIXED_WIDTH: Option<usize> = Some(N);
}

impl Key for String {
    const FIXED_WIDTH: Option<usize> = None;
}

impl Key for Vec<u8> {
    const FIXED_WIDTH: Option<usize> = None;
}

/// A value that can be stored in a segment.
///
/// Values are cloned out on reads, so cheap clones (or `Arc`) are
/// preferable for large payloads.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}


