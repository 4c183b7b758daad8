//! # HPET (High Precision Event Timer)
//!
//! The HPET is a memory-mapped timer device standardized by Intel/Microsoft
//! to replace the PIT for high-resolution timekeeping. It runs a free-running
//! main counter at a fixed frequency given by the device itself, which makes
//! it useful for TSC calibration independent of PIT quirks.
//!
//! We locate it via the ACPI `HPET` table; if ACPI tables aren't available
//! (or the table is absent, e.g. under some QEMU machine types), `init()`
//! fails and callers fall back to the PIT for timing.
//!
//! ## Register Layout (MMIO)
//!
//! | Offset | Register                  |
//! |--------|----------------------------|
//! | 0x000  | General Capabilities ID    |
//! | 0x010  | General Configuration      |
//! | 0x0F0  | Main Counter Value         |

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Once;

const REG_CAPS: u64 = 0x000;
const REG_CONFIG: u64 = 0x010;
const REG_MAIN_COUNTER: u64 = 0x0F0;

const CONFIG_ENABLE: u64 = 1 << 0;

/// ACPI RSDP signature search range (legacy BIOS area) used to locate the RSDP
/// when no bootloader-provided pointer is available.
const BIOS_AREA_START: u64 = 0x000E_0000;
const BIOS_AREA_END: u64 = 0x000F_FFFF;

static HPET_BASE: Once<u64> = Once::new();
static COUNTER_PERIOD_FS: AtomicU64 = AtomicU64::new(0); // femtoseconds per tick

#[repr(C, packed)]
struct AcpiSdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

#[repr(C, packed)]
struct HpetTable {
    header: AcpiSdtHeader,
    event_timer_block_id: u32,
    base_address_space_id: u8,
    base_address_bit_width: u8,
    base_address_bit_offset: u8,
    base_address_reserved: u8,
    base_address: u64,
    hpet_number: u8,
    min_periodic_clock_tick: u16,
    page_protection: u8,
}

/// Read the 64-bit main counter (the only value consumers usually need).
pub fn read_counter() -> u64 {
    match HPET_BASE.get() {
        Some(&base) => unsafe { read_volatile((base + REG_MAIN_COUNTER) as *const u64) },
        None => 0,
    }
}

/// Femtoseconds per main-counter tick, as reported by the device's capability register.
pub fn tick_period_fs() -> u64 {
    COUNTER_PERIOD_FS.load(Ordering::Relaxed)
}

/// Convert a duration in microseconds into a number of HPET ticks.
pub fn us_to_ticks(us: u64) -> u64 {
    let period = tick_period_fs();
    if period == 0 {
        return 0;
    }
    // 1 us = 1_000_000_000 fs
    (us.saturating_mul(1_000_000_000)) / period
}

/// Busy-wait for the given number of microseconds using the HPET main counter.
///
/// # Safety
///
/// Only valid once [`init`] has succeeded.
pub unsafe fn delay_us(us: u64) {
    let ticks = us_to_ticks(us);
    if ticks == 0 {
        return;
    }
    let start = read_counter();
    let target = start.wrapping_add(ticks);
    while read_counter().wrapping_sub(start) < target.wrapping_sub(start) {
        core::hint::spin_loop();
    }
}

fn checksum_ok(bytes: &[u8]) -> bool {
    let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum == 0
}

unsafe fn find_rsdp() -> Option<u64> {
    let mut addr = BIOS_AREA_START;
    while addr < BIOS_AREA_END {
        let sig = read_volatile(addr as *const [u8; 8]);
        if &sig == b"RSD PTR " {
            return Some(addr);
        }
        addr += 16;
    }
    None
}

unsafe fn find_hpet_table() -> Option<u64> {
    let rsdp_addr = find_rsdp()?;

    // RSDP layout: sig(8) checksum(1) oem(6) revision(1) rsdt_addr(4) [v2: length(4) xsdt_addr(8) ...]
    let revision = read_volatile((rsdp_addr + 15) as *const u8);

    let (sdt_addr, entry_size, is_xsdt): (u64, u64, bool) = if revision >= 2 {
        let xsdt_addr = read_volatile((rsdp_addr + 24) as *const u64);
        (xsdt_addr, 8, true)
    } else {
        let rsdt_addr = read_volatile((rsdp_addr + 16) as *const u32) as u64;
        (rsdt_addr, 4, false)
    };

    if sdt_addr == 0 {
        return None;
    }

    let header = read_volatile(sdt_addr as *const AcpiSdtHeader);
    let total_len = header.length as u64;
    let entries_start = sdt_addr + core::mem::size_of::<AcpiSdtHeader>() as u64;
    let entries_bytes = total_len.saturating_sub(entries_start - sdt_addr);
    let num_entries = entries_bytes / entry_size;

    for i in 0..num_entries {
        let entry_ptr = entries_start + i * entry_size;
        let table_addr: u64 = if is_xsdt {
            read_volatile(entry_ptr as *const u64)
        } else {
            read_volatile(entry_ptr as *const u32) as u64
        };

        if table_addr == 0 {
            continue;
        }

        let sig = read_volatile(table_addr as *const [u8; 4]);
        if &sig == b"HPET" {
            return Some(table_addr);
        }
    }

    None
}

/// Locate, map, and enable the HPET main counter.
///
/// Returns an error (and leaves timing to the PIT) if no ACPI HPET table is
/// found, which is common on minimal QEMU machine configurations.
pub fn init() -> Result<(), &'static str> {
    let table_addr = unsafe { find_hpet_table() }.ok_or("HPET ACPI table not found")?;

    let table = unsafe { read_volatile(table_addr as *const HpetTable) };

    if !checksum_ok(unsafe {
        core::slice::from_raw_parts(table_addr as *const u8, table.header.length as usize)
    }) {
        return Err("HPET ACPI table checksum invalid");
    }

    let base = table.base_address;
    if base == 0 {
        return Err("HPET base address is null");
    }

    let caps = unsafe { read_volatile((base + REG_CAPS) as *const u64) };
    let period_fs = caps >> 32; // upper 32 bits: counter period in femtoseconds
    if period_fs == 0 {
        return Err("HPET reports zero counter period");
    }

    // Enable the main counter
    unsafe {
        let config = read_volatile((base + REG_CONFIG) as *const u64);
        write_volatile((base + REG_CONFIG) as *mut u64, config | CONFIG_ENABLE);
    }

    HPET_BASE.call_once(|| base);
    COUNTER_PERIOD_FS.store(period_fs, Ordering::Relaxed);

    Ok(())
}

/// Whether the HPET was successfully located and enabled.
pub fn is_available() -> bool {
    HPET_BASE.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_to_ticks_without_init_is_zero() {
        // Guards against panics/div-by-zero before init() has run.
        assert_eq!(us_to_ticks(1000), 0);
    }
}
