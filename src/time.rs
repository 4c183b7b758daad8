//! Time and Timestamp Utilities
//!
//! Backed by the calibrated TSC on x86_64 (see [`crate::arch::x86_64::tsc`]).
//! All timestamps are microseconds since an arbitrary epoch; boot time is
//! captured once via [`init_boot_timestamp`] so uptime queries are relative
//! to kernel entry rather than CPU reset.

use core::sync::atomic::{AtomicU64, Ordering};

static BOOT_TIMESTAMP_US: AtomicU64 = AtomicU64::new(0);

/// Get current timestamp in microseconds since CPU reset (TSC-derived).
///
/// Returns 0 if the TSC has not been calibrated yet.
pub fn get_timestamp_us() -> u64 {
    use crate::arch::x86_64::tsc;

    let ticks = tsc::read_tsc();
    tsc::tsc_to_ns(ticks) / 1000
}

/// Initialize boot timestamp. Must be called once after TSC calibration,
/// before any uptime/timestamp queries are relied upon.
pub fn init_boot_timestamp() {
    BOOT_TIMESTAMP_US.store(get_timestamp_us(), Ordering::Relaxed);
}

/// Get time since boot in microseconds
pub fn get_time_since_boot_us() -> u64 {
    let current = get_timestamp_us();
    let boot = BOOT_TIMESTAMP_US.load(Ordering::Relaxed);
    current.saturating_sub(boot)
}

/// Get time since boot in milliseconds
pub fn get_time_since_boot_ms() -> u64 {
    get_time_since_boot_us() / 1000
}

/// Get uptime in milliseconds (alias for get_time_since_boot_ms)
pub fn get_uptime_ms() -> u64 {
    get_time_since_boot_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic_once_booted() {
        init_boot_timestamp();
        let a = get_time_since_boot_us();
        let b = get_time_since_boot_us();
        assert!(b >= a);
    }
}
