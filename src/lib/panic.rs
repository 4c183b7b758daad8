// Enhanced panic handler
//
// Prints diagnostics (location, message, register dump, heap/uptime state,
// a best-effort frame-pointer walk) to the console, then halts the CPU.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::console::put_str;

/// Global panic state - prevents recursive panics
static PANICKING: AtomicBool = AtomicBool::new(false);

/// Panic counter for tracking multiple panics
static PANIC_COUNT: AtomicU64 = AtomicU64::new(0);

/// Enhanced panic handler with comprehensive diagnostics
pub fn panic_handler(info: &PanicInfo) -> ! {
    if PANICKING.swap(true, Ordering::SeqCst) {
        put_str(b"\n!!! RECURSIVE PANIC !!!\n");
        halt();
    }

    let panic_num = PANIC_COUNT.fetch_add(1, Ordering::SeqCst) + 1;

    disable_interrupts();

    print_panic_header(panic_num);
    print_panic_info(info);
    print_registers();
    print_system_state();
    print_stack_trace();
    print_next_steps();

    halt();
}

fn print_panic_header(panic_num: u64) {
    put_str(b"\n");
    put_str(b"================================================================================\n");
    put_str(b"!!!                        KERNEL PANIC                                      !!!\n");
    put_str(b"================================================================================\n");
    if panic_num > 1 {
        let msg = alloc::format!("Panic #{}\n", panic_num);
        put_str(msg.as_bytes());
    }
    put_str(b"\n");
}

fn print_panic_info(info: &PanicInfo) {
    put_str(b"PANIC INFORMATION:\n");
    put_str(b"------------------\n");

    if let Some(location) = info.location() {
        let loc = alloc::format!(
            "  Location: {}:{}:{}\n",
            location.file(),
            location.line(),
            location.column()
        );
        put_str(loc.as_bytes());
    } else {
        put_str(b"  Location: <unknown>\n");
    }

    if let Some(payload) = info.payload().downcast_ref::<&str>() {
        let msg = alloc::format!("  Message:  {}\n", payload);
        put_str(msg.as_bytes());
    } else if let Some(payload) = info.payload().downcast_ref::<alloc::string::String>() {
        let msg = alloc::format!("  Message:  {}\n", payload);
        put_str(msg.as_bytes());
    } else {
        put_str(b"  Message:  <no message>\n");
    }

    put_str(b"\n");
}

fn print_registers() {
    use core::arch::asm;

    put_str(b"REGISTER DUMP:\n");
    put_str(b"--------------\n");

    let (rax, rbx, rcx, rdx, rsi, rdi, rbp, rsp): (u64, u64, u64, u64, u64, u64, u64, u64);
    let (r8, r9, r10, r11, r12, r13, r14, r15): (u64, u64, u64, u64, u64, u64, u64, u64);
    unsafe {
        asm!("mov {}, rax", out(reg) rax);
        asm!("mov {}, rbx", out(reg) rbx);
        asm!("mov {}, rcx", out(reg) rcx);
        asm!("mov {}, rdx", out(reg) rdx);
        asm!("mov {}, rsi", out(reg) rsi);
        asm!("mov {}, rdi", out(reg) rdi);
        asm!("mov {}, rbp", out(reg) rbp);
        asm!("mov {}, rsp", out(reg) rsp);
        asm!("mov {}, r8", out(reg) r8);
        asm!("mov {}, r9", out(reg) r9);
        asm!("mov {}, r10", out(reg) r10);
        asm!("mov {}, r11", out(reg) r11);
        asm!("mov {}, r12", out(reg) r12);
        asm!("mov {}, r13", out(reg) r13);
        asm!("mov {}, r14", out(reg) r14);
        asm!("mov {}, r15", out(reg) r15);
    }

    let regs = alloc::format!(
        "  rax: {:016x}  rbx: {:016x}  rcx: {:016x}  rdx: {:016x}\n\
         rsi: {:016x}  rdi: {:016x}  rbp: {:016x}  rsp: {:016x}\n\
         r8:  {:016x}  r9:  {:016x}  r10: {:016x}  r11: {:016x}\n\
         r12: {:016x}  r13: {:016x}  r14: {:016x}  r15: {:016x}\n",
        rax, rbx, rcx, rdx, rsi, rdi, rbp, rsp, r8, r9, r10, r11, r12, r13, r14, r15
    );
    put_str(regs.as_bytes());
    put_str(b"\n");
}

fn print_system_state() {
    put_str(b"SYSTEM STATE:\n");
    put_str(b"-------------\n");

    let uptime_ms = crate::time::get_uptime_ms();
    let msg = alloc::format!(
        "  Uptime:       {} seconds ({} ms)\n",
        uptime_ms / 1000,
        uptime_ms
    );
    put_str(msg.as_bytes());

    let stats = crate::heap::get_heap_stats();
    let msg = alloc::format!(
        "  Heap usage:   {} KiB current, {} KiB peak\n\
         Allocations:  {} allocs, {} deallocs, {} failures\n",
        stats.current_allocated() / 1024,
        stats.peak_allocated() / 1024,
        stats.total_allocations(),
        stats.total_deallocations(),
        stats.allocation_failures(),
    );
    put_str(msg.as_bytes());

    let msg = alloc::format!("  Version:      {}\n", crate::build_info::get_version_string());
    put_str(msg.as_bytes());
    put_str(b"\n");
}

/// Best-effort frame-pointer walk; requires `-C force-frame-pointers=yes`.
fn print_stack_trace() {
    use core::arch::asm;

    put_str(b"STACK TRACE:\n");
    put_str(b"------------\n");

    let mut rbp: u64;
    unsafe {
        asm!("mov {}, rbp", out(reg) rbp);
    }

    for i in 0..10 {
        if rbp < 0x1000 || rbp > 0x0000_7FFF_FFFF_FFFF {
            break;
        }
        let frame_ptr = rbp as *const u64;
        let ret_addr = unsafe { frame_ptr.offset(1).read_volatile() };
        let msg = alloc::format!("  #{}: {:016x}\n", i, ret_addr);
        put_str(msg.as_bytes());
        rbp = unsafe { frame_ptr.read_volatile() };
    }
    put_str(b"\n");
}

fn print_next_steps() {
    put_str(b"DEBUGGING STEPS:\n");
    put_str(b"----------------\n");
    put_str(b"  1. Check panic location and message above\n");
    put_str(b"  2. Examine register values for invalid pointers\n");
    put_str(b"  3. Check heap usage for memory exhaustion\n");
    put_str(b"  4. If a stack trace is available, identify the call chain\n");
    put_str(b"\n");
}

#[inline(always)]
fn disable_interrupts() {
    unsafe {
        core::arch::asm!("cli");
    }
}

#[inline(always)]
fn halt() -> ! {
    put_str(b"================================================================================\n");
    put_str(b"System halted.\n");
    put_str(b"================================================================================\n");
    loop {
        unsafe {
            core::arch::asm!("hlt");
        }
    }
}

/// Get current panic count
pub fn get_panic_count() -> u64 {
    PANIC_COUNT.load(Ordering::Relaxed)
}

/// Check if currently panicking
pub fn is_panicking() -> bool {
    PANICKING.load(Ordering::Relaxed)
}
