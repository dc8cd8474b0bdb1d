//! Timestamp sources for the timestamp verifier.
//!
//! The engine never reads the system clock itself. Each encode and decode
//! call takes a source, so tests drive time explicitly.

use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies the timestamp embedded at encode and compared at decode.
///
/// Units are up to the caller but must match on both ends and match the
/// decoder's timestamp window.
pub trait TimestampSource {
    /// Current timestamp.
    fn timestamp(&self) -> u64;
}

impl<F> TimestampSource for F
where
    F: Fn() -> u64,
{
    fn timestamp(&self) -> u64 {
        self()
    }
}

/// Wall clock in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimestampSource for SystemClock {
    fn timestamp(&self) -> u64 {
        // A clock before 1970 reads as 0
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Always 0. For channels without the timestamp verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimestamp;

impl TimestampSource for NoTimestamp {
    fn timestamp(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_source() {
        let clock = || 1234u64;
        assert_eq!(clock.timestamp(), 1234);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z in milliseconds
        assert!(SystemClock.timestamp() > 1_577_836_800_000);
    }

    #[test]
    fn no_timestamp_is_zero() {
        assert_eq!(NoTimestamp.timestamp(), 0);
    }
}
