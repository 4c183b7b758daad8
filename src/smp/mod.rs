/// SMP (Symmetric Multi-Processing) support - Phase E
///
/// Manages multiple CPU cores with per-CPU data, runqueues, and load balancing.

pub mod percpu;
pub mod ipi;

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

/// Maximum number of CPUs supported
pub const MAX_CPUS: usize = 8;

/// Number of CPUs detected and online
static CPU_COUNT: AtomicUsize = AtomicUsize::new(1); // Boot CPU = 1

/// CPU online bitmap (bit N = CPU N is online)
static CPU_ONLINE: [AtomicBool; MAX_CPUS] = [
    AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false),
    AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false), AtomicBool::new(false),
];

/// SMP initialization lock (ensures only boot CPU initializes)
static SMP_INIT_LOCK: Mutex<()> = Mutex::new(());

/// Get the number of online CPUs
pub fn num_cpus() -> usize {
    CPU_COUNT.load(Ordering::Acquire)
}

/// Check if a CPU is online
pub fn is_cpu_online(cpu_id: usize) -> bool {
    if cpu_id >= MAX_CPUS {
        return false;
    }
    CPU_ONLINE[cpu_id].load(Ordering::Acquire)
}

/// Mark a CPU as online
pub fn mark_cpu_online(cpu_id: usize) {
    if cpu_id >= MAX_CPUS {
        crate::warn!("SMP: CPU ID {} exceeds MAX_CPUS", cpu_id);
        return;
    }

    if !CPU_ONLINE[cpu_id].swap(true, Ordering::Release) {
        // Was not online before
        CPU_COUNT.fetch_add(1, Ordering::Release);
        crate::info!("SMP: CPU {} is now online", cpu_id);
    }
}

/// Mark a CPU as offline
pub fn mark_cpu_offline(cpu_id: usize) {
    if cpu_id >= MAX_CPUS {
        return;
    }

    if CPU_ONLINE[cpu_id].swap(false, Ordering::Release) {
        // Was online before
        CPU_COUNT.fetch_sub(1, Ordering::Release);
        crate::info!("SMP: CPU {} is now offline", cpu_id);
    }
}

/// Called by `arch::x86_64::smp::ap_main` once an application processor has
/// finished bringing up its own GDT/IDT/APIC/per-CPU state, to fold it into
/// the logical online-CPU view the scheduler consults.
pub fn on_ap_started(cpu_id: usize) {
    mark_cpu_online(cpu_id);
    percpu::init_percpu(cpu_id);
}

/// Initialize SMP system (called by boot CPU)
///
/// AP bring-up itself (INIT-SIPI-SIPI) is architecture-specific and lives in
/// `arch::x86_64::smp`; this module only tracks the logical view (which CPUs
/// are online, their per-CPU data, run-queue load) that the scheduler
/// consults. Non-boot CPUs call `mark_cpu_online` from their own entry point
/// once their per-CPU data is set up.
pub fn init() {
    let _lock = SMP_INIT_LOCK.lock();

    crate::info!("SMP: Initializing multi-core support");

    // Mark boot CPU (CPU 0) as online
    mark_cpu_online(0);

    // Initialize per-CPU data for boot CPU
    percpu::init_percpu(0);

    let online_cpus = num_cpus();
    crate::info!("SMP: Initialization complete, {} CPU(s) online", online_cpus);
}

/// Get statistics about the SMP system
pub fn stats() -> SmpStats {
    let mut online_cpu_ids = [false; MAX_CPUS];
    for i in 0..MAX_CPUS {
        online_cpu_ids[i] = is_cpu_online(i);
    }

    SmpStats {
        num_cpus: num_cpus(),
        online_cpu_ids,
    }
}

/// SMP statistics
pub struct SmpStats {
    pub num_cpus: usize,
    pub online_cpu_ids: [bool; MAX_CPUS],
}
