//! Time-related utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    // A clock set before 1970 is treated as the epoch itself.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Get the current system time in seconds since UNIX epoch
pub fn system_time_secs() -> u64 {
    since_epoch().as_secs()
}
