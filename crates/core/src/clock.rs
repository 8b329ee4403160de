//! Monotonic millisecond clock shared by ping tracking and penalty windows.

use std::sync::OnceLock;
use std::time::Instant;

/// Milliseconds elapsed on a monotonic clock since first use.
///
/// Wall-clock adjustments never move this value backwards, so ping
/// staleness and penalty-window arithmetic stay well-defined.
pub(crate) fn monotonic_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}
