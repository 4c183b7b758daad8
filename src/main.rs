#![no_std]
#![no_main]
#![feature(alloc_error_handler)]
#![cfg_attr(target_arch = "x86_64", feature(abi_x86_interrupt))]
// CI lint gate: when built with `--features strict`, fail on any warning.
#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(unsafe_op_in_unsafe_fn))]

//! Nimbus kernel entry point.
//!
//! Boot order follows spec 9's documented init sequence: PMM -> IDT ->
//! Process -> Scheduler -> IPC -> VFS -> Net, with the heap and the
//! architecture's own early bring-up (GDT/TSS/IDT gates/serial/PIC/PIT/APIC)
//! happening first since every later stage allocates or logs.

extern crate alloc;

pub mod arch;
#[allow(special_module_name)]
pub mod lib;
pub mod console;
pub mod time;
pub mod heap;
pub mod build_info;
pub mod mm;
pub mod process;
pub mod ipc;
pub mod vfs;
pub mod fs;
pub mod block;
pub mod net;
pub mod security;
pub mod smp;
pub mod syscall;
pub mod drivers;

#[cfg(test)]
pub mod test_utils;
pub mod tests;

use alloc::vec::Vec;
use mm::pmm::MemoryMapEntry;

/// Convert the bootloader's memory region list into the PMM's own
/// `MemoryMapEntry` wire format (spec 6: "boot memory map ... {size,
/// address, length, type}").
fn build_memory_map(regions: &bootloader_api::info::MemoryRegions) -> Vec<MemoryMapEntry> {
    regions
        .iter()
        .map(|r| MemoryMapEntry {
            base: r.start,
            length: r.end.saturating_sub(r.start),
            region_type: if r.kind == bootloader_api::info::MemoryRegionKind::Usable {
                mm::pmm::REGION_AVAILABLE
            } else {
                0
            },
        })
        .collect()
}

/// Platform-independent kernel bring-up, run once the architecture layer has
/// handed us a working stack, GDT/IDT, and serial console.
fn kernel_main(boot_info: &'static bootloader_api::BootInfo) -> ! {
    crate::info!("boot: architecture early init complete");
    time::init_boot_timestamp();

    if let Err(e) = heap::init_heap() {
        crate::error!("boot: heap init failed: {}", e);
        arch::x86_64::boot::halt_forever();
    }

    // C1: physical frame allocator, driven by the bootloader's memory map.
    let entries = build_memory_map(&boot_info.memory_regions);
    if let Err(e) = mm::init_from_memory_map(&entries) {
        crate::error!("boot: PMM init failed: {:?} (fatal, spec 4.1)", e);
        arch::x86_64::boot::halt_forever();
    }
    let ram_ranges: Vec<(mm::PhysAddr, usize)> = entries
        .iter()
        .filter(|e| e.region_type == mm::pmm::REGION_AVAILABLE)
        .map(|e| (e.base, e.length as usize))
        .collect();
    if let Err(e) = mm::init_buddy(&ram_ranges) {
        crate::error!("boot: buddy allocator init failed: {:?}", e);
    }
    crate::info!("boot: PMM + buddy allocator online ({:?})", mm::pmm_stats());

    // C2: IDT gates (exceptions already installed by arch early init; this
    // hooks the timer/keyboard IRQ handlers and unmasks their PIC lines).
    arch::x86_64::irq::init();
    crate::info!("boot: IRQ dispatch online (timer, keyboard)");

    // C3/C4: process table and base scheduler. PID 0 becomes `current`.
    process::process_init();
    smp::init();
    process::advanced::init_cores(smp::num_cpus() as u32);
    crate::info!("boot: process table + scheduler online");

    // C6: IPC capability table, message queues, shared memory.
    security::init();
    ipc::init();
    crate::info!("boot: IPC online");

    // C7: VFS mount table, with tmpfs as the initial root. The FAT32
    // exemplar backend (fs::fat32) mounts over a block device once one
    // probes in; no block device is attached in this core build.
    vfs::init_vfs();
    match vfs::tmpfs::mount_tmpfs() {
        Ok(root) => {
            if let Err(e) = vfs::mount("tmpfs", root, "/") {
                crate::error!("boot: tmpfs mount failed: {:?}", e);
            }
        }
        Err(e) => crate::error!("boot: tmpfs root inode creation failed: {:?}", e),
    }
    crate::info!("boot: VFS online, tmpfs mounted at /");

    // C10: enumerate PCI once (spec 4.10: "idempotent and runs once at
    // boot"); block/NIC drivers are out of scope for this core, so
    // enumeration only logs what's present.
    match unsafe { arch::x86_64::pci::init() } {
        Ok(count) => crate::info!("boot: PCI enumeration found {} device(s)", count),
        Err(e) => crate::warn!("boot: PCI enumeration failed: {}", e),
    }

    // C8: bring up the smoltcp interface. No NIC is attached in this core
    // build (drivers are out of scope); `net::iface::set_device` is the seam
    // a real NIC driver calls into.
    if let Err(e) = net::init_network() {
        crate::error!("boot: network stack init failed: {:?}", e);
    } else {
        crate::info!("boot: network stack online (no NIC attached)");
    }

    build_info::print_build_info();
    crate::info!("boot: kernel initialization complete, entering idle loop");

    idle_loop();
}

/// Idle loop: halt until the next interrupt, poll the network stack and
/// console input. Runs as PID 0 (spec 4.4: "the idle class always contains
/// PID 0 as a fallback").
fn idle_loop() -> ! {
    loop {
        arch::x86_64::halt();

        let _ = net::network_poll();

        if let Some(ch) = console::try_read_key() {
            console::put_char(ch);
        }
    }
}

bootloader_api::entry_point!(kernel_entry);

fn kernel_entry(boot_info: &'static mut bootloader_api::BootInfo) -> ! {
    unsafe {
        if let Err(e) = arch::x86_64::boot::early_init() {
            arch::x86_64::serial::serial_write(b"\n[FATAL] architecture early init failed: ");
            arch::x86_64::serial::serial_write(e.as_bytes());
            arch::x86_64::serial::serial_write(b"\n");
            arch::x86_64::boot::halt_forever();
        }
    }
    arch::x86_64::boot::print_boot_info();
    kernel_main(boot_info)
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::lib::panic::panic_handler(info)
}
