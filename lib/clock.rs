//! The on-disk clock used by ninja's log files.

use std::num::NonZeroU64;

// On Windows the stored value is a FILETIME count shifted from the 1601
// epoch to 2001 (ninja's convention). Elsewhere it is the platform file
// clock's nanosecond count, stored as-is.
#[cfg(windows)]
const EPOCH_SHIFT: u64 = 126_227_704_000_000_000;
#[cfg(not(windows))]
const EPOCH_SHIFT: u64 = 0;

/// An mtime as stored in `.ninja_deps` and `.ninja_log`.
///
/// A stored value of 0 means the file was missing and maps to `None`. As a
/// timestamp is never 0, `Option<Timestamp>` is the same size as
/// `Timestamp`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Timestamp(NonZeroU64);

impl Timestamp {
	/// Convert an on-disk count (as used by the log files) to a timestamp.
	pub fn from_nanos(nanos: u64) -> Option<Self> {
		NonZeroU64::new(nanos).map(Timestamp)
	}

	/// The on-disk count, as written to the log files.
	pub fn to_nanos(self) -> u64 {
		self.0.get()
	}

	/// Convert a platform file-clock count to the on-disk convention.
	pub fn from_file_clock(count: u64) -> Option<Self> {
		Self::from_nanos(count.wrapping_sub(EPOCH_SHIFT))
	}

	/// The platform file-clock count for this timestamp.
	pub fn to_file_clock(self) -> u64 {
		self.to_nanos().wrapping_add(EPOCH_SHIFT)
	}
}
