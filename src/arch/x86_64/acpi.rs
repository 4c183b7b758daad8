//! # ACPI Table Discovery
//!
//! Minimal ACPI static-table parsing: locate the RSDP in the legacy BIOS
//! area, walk the RSDT/XSDT, and hand out the physical addresses of tables
//! other subsystems care about (currently just MCFG, for PCIe ECAM).
//!
//! This intentionally does not implement AML/DSDT evaluation, power states,
//! or hotplug — those belong to a full ACPI driver, which is out of scope
//! here. We only need the static tables that describe fixed hardware.

use core::ptr::read_volatile;
use spin::Once;

const BIOS_AREA_START: u64 = 0x000E_0000;
const BIOS_AREA_END: u64 = 0x000F_FFFF;

static MCFG_ADDRESS: Once<Option<x86_64::PhysAddr>> = Once::new();

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

fn checksum_ok(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)) == 0
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

/// Find an ACPI table by its 4-byte signature (e.g. `b"MCFG"`, `b"HPET"`, `b"APIC"`).
pub fn find_table(signature: &[u8; 4]) -> Option<u64> {
    unsafe {
        let rsdp_addr = find_rsdp()?;
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
            if &sig == signature {
                let hdr = read_volatile(table_addr as *const AcpiSdtHeader);
                let bytes = core::slice::from_raw_parts(table_addr as *const u8, hdr.length as usize);
                if checksum_ok(bytes) {
                    return Some(table_addr);
                }
            }
        }

        None
    }
}

/// MCFG (PCI Express Memory Mapped Configuration) table, fixed portion.
#[repr(C, packed)]
struct McfgHeader {
    header: AcpiSdtHeader,
    reserved: u64,
    // followed by one or more McfgAllocation entries
}

/// Physical base address of the PCIe ECAM region described by the first MCFG
/// allocation entry, if an MCFG table is present.
pub fn get_mcfg_address() -> Option<x86_64::PhysAddr> {
    *MCFG_ADDRESS.call_once(|| {
        let table_addr = find_table(b"MCFG")?;
        let mcfg_len = unsafe { read_volatile(table_addr as *const AcpiSdtHeader) }.length as u64;
        let alloc_offset = core::mem::size_of::<McfgHeader>() as u64;

        if mcfg_len <= alloc_offset {
            return None;
        }

        // First McfgAllocation entry's base_address field is the first 8 bytes.
        let base = unsafe { read_volatile((table_addr + alloc_offset) as *const u64) };
        Some(x86_64::PhysAddr::new(base))
    })
}
