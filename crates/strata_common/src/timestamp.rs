//! Millisecond wall-clock timestamps for last-modified comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Stored instead of [`SystemTime`] so that persisted records compare the
/// same way on every platform and serialize as a plain integer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch itself; older than any real file.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from raw milliseconds.
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns the raw milliseconds.
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Converts a [`SystemTime`]; times before the epoch clamp to [`Timestamp::ZERO`].
    pub fn from_system_time(time: SystemTime) -> Self {
        let ms = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(ms)
    }

    /// Reads the last-modified time of a file.
    pub fn modified(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self::from_system_time(meta.modified()?))
    }

    /// Returns this timestamp moved back by `slack`, saturating at zero.
    pub fn saturating_sub(self, slack: Duration) -> Self {
        Self(self.0.saturating_sub(slack.as_millis() as u64))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_millis() {
        assert!(Timestamp::from_millis(5) < Timestamp::from_millis(6));
        assert_eq!(Timestamp::ZERO, Timestamp::default());
    }

    #[test]
    fn before_epoch_clamps() {
        let t = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(Timestamp::from_system_time(t), Timestamp::ZERO);
    }

    #[test]
    fn saturating_sub_clamps() {
        let t = Timestamp::from_millis(100);
        assert_eq!(t.saturating_sub(Duration::from_millis(30)).as_millis(), 70);
        assert_eq!(t.saturating_sub(Duration::from_secs(1)), Timestamp::ZERO);
    }

    #[test]
    fn modified_reads_file_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "x").unwrap();
        let t = Timestamp::modified(&path).unwrap();
        assert!(t > Timestamp::ZERO);
        assert!(Timestamp::modified(&dir.path().join("missing")).is_err());
    }
}
