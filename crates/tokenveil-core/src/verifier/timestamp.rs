//! Timestamp verifier.

use crate::{
    config::TimestampPolicy,
    error::{Status, TokenError},
};

/// Compare the encode timestamp with the decode timestamp.
///
/// A window of 0 disables the check. Differences equal to the window pass.
/// Under [`TimestampPolicy::Advisory`] an out-of-window message yields a
/// warning; under [`TimestampPolicy::Mandatory`] it is an error.
pub fn check(
    encoded: u64,
    decoded: u64,
    window: u64,
    policy: TimestampPolicy,
) -> Result<Status, TokenError> {
    if window == 0 {
        return Ok(Status::Success);
    }

    let status = if decoded > encoded && decoded - encoded > window {
        Status::TimestampStale
    } else if encoded > decoded && encoded - decoded > window {
        Status::TimestampFuture
    } else {
        return Ok(Status::Success);
    };

    tracing::warn!(encoded, decoded, window, ?status, "timestamp outside window");
    match policy {
        TimestampPolicy::Advisory => Ok(status),
        TimestampPolicy::Mandatory => {
            Err(TokenError::TimestampOutOfWindow { encoded, decoded, window })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_window_accepts_anything() {
        assert_eq!(check(0, u64::MAX, 0, TimestampPolicy::Mandatory), Ok(Status::Success));
    }

    #[test]
    fn boundary_is_inclusive() {
        assert_eq!(check(1000, 1100, 100, TimestampPolicy::Mandatory), Ok(Status::Success));
        assert_eq!(check(1100, 1000, 100, TimestampPolicy::Mandatory), Ok(Status::Success));
    }

    #[test]
    fn stale_under_advisory_is_warning() {
        assert_eq!(check(1000, 1101, 100, TimestampPolicy::Advisory), Ok(Status::TimestampStale));
    }

    #[test]
    fn future_under_advisory_is_warning() {
        assert_eq!(check(1101, 1000, 100, TimestampPolicy::Advisory), Ok(Status::TimestampFuture));
    }

    #[test]
    fn out_of_window_under_mandatory_is_error() {
        assert_eq!(
            check(1000, 1101, 100, TimestampPolicy::Mandatory),
            Err(TokenError::TimestampOutOfWindow { encoded: 1000, decoded: 1101, window: 100 })
        );
    }
}
