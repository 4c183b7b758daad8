//! # Local APIC (Advanced Programmable Interrupt Controller)
//!
//! The Local APIC is the per-CPU interrupt controller found in every x86_64
//! core since the Pentium Pro. It replaces (and cooperates with) the legacy
//! 8259 PIC: it delivers timer interrupts, inter-processor interrupts (IPIs),
//! and routes external interrupts forwarded by the I/O APIC.
//!
//! This module implements the xAPIC (MMIO) interface. x2APIC (MSR-based) is
//! not implemented; `init()` falls back to an error if no xAPIC is present,
//! and callers treat the Local APIC as optional, preferring legacy PIC/PIT
//! when it's unavailable.
//!
//! ## Register Layout (MMIO, default base 0xFEE00000)
//!
//! | Offset | Register              |
//! |--------|-----------------------|
//! | 0x020  | Local APIC ID         |
//! | 0x0B0  | End Of Interrupt      |
//! | 0x0F0  | Spurious Interrupt Vector |
//! | 0x300  | Interrupt Command Register (low)  |
//! | 0x310  | Interrupt Command Register (high) |
//! | 0x320  | LVT Timer             |
//! | 0x380  | Timer Initial Count   |
//! | 0x390  | Timer Current Count   |
//! | 0x3E0  | Timer Divide Config   |

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use raw_cpuid::CpuId;

/// Default xAPIC MMIO base (physical == virtual, identity-mapped low memory)
const DEFAULT_APIC_BASE: u64 = 0xFEE0_0000;

const REG_ID: u64 = 0x020;
const REG_EOI: u64 = 0x0B0;
const REG_SVR: u64 = 0x0F0;
const REG_ICR_LOW: u64 = 0x300;
const REG_ICR_HIGH: u64 = 0x310;
const REG_LVT_TIMER: u64 = 0x320;
const REG_TIMER_INITIAL_COUNT: u64 = 0x380;
const REG_TIMER_CURRENT_COUNT: u64 = 0x390;
const REG_TIMER_DIVIDE: u64 = 0x3E0;

/// IA32_APIC_BASE MSR
const IA32_APIC_BASE_MSR: u32 = 0x1B;
const APIC_BASE_ENABLE: u64 = 1 << 11;

/// Spurious interrupt vector we register (must have low nibble 0b1111 per spec recommendation)
const SPURIOUS_VECTOR: u8 = 0xFF;

static LOCAL_APIC: Mutex<Option<LocalApic>> = Mutex::new(None);

static EOI_COUNT: AtomicU64 = AtomicU64::new(0);

/// A handle to the current CPU's Local APIC MMIO registers.
pub struct LocalApic {
    base: u64,
    id: u32,
}

/// IPI destination shorthand / physical targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiDestination {
    /// Send to a specific APIC ID.
    Physical(u32),
    /// Send to all CPUs except self.
    AllExcludingSelf,
    /// Send to self only.
    SelfOnly,
}

/// IPI delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpiType {
    /// INIT IPI (reset target to wait-for-SIPI state)
    Init,
    /// Startup IPI (SIPI), vector encodes the trampoline page (addr >> 12)
    Startup(u8),
    /// Fixed-vector IPI (used for reschedule/function-call/TLB-shootdown)
    Fixed(u8),
}

impl LocalApic {
    fn read(&self, offset: u64) -> u32 {
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: u64, value: u32) {
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }

    /// This CPU's Local APIC ID.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Signal End-Of-Interrupt to retire the highest-priority in-service interrupt.
    pub fn end_of_interrupt(&self) {
        self.write(REG_EOI, 0);
        EOI_COUNT.fetch_add(1, Ordering::Relaxed);
    }

    /// Send an inter-processor interrupt.
    ///
    /// Writes the destination into ICR_HIGH, then the command (which triggers
    /// delivery) into ICR_LOW, per the Intel SDM's required write ordering.
    pub fn send_ipi(&self, dest: IpiDestination, kind: IpiType) {
        let (dest_shorthand, dest_field): (u32, u32) = match dest {
            IpiDestination::Physical(apic_id) => (0b00, apic_id),
            IpiDestination::AllExcludingSelf => (0b11, 0),
            IpiDestination::SelfOnly => (0b01, 0),
        };

        let (delivery_mode, vector): (u32, u32) = match kind {
            IpiType::Init => (0b101, 0),
            IpiType::Startup(v) => (0b110, v as u32),
            IpiType::Fixed(v) => (0b000, v as u32),
        };

        if let IpiDestination::Physical(apic_id) = dest {
            self.write(REG_ICR_HIGH, apic_id << 24);
        }

        // Level=1 (assert), trigger mode=edge, destination shorthand in bits 19:18
        let icr_low = vector
            | (delivery_mode << 8)
            | (1 << 14)
            | (dest_shorthand << 18);

        self.write(REG_ICR_LOW, icr_low);
    }

    /// Spin until the previous IPI has been accepted by the bus (ICR delivery status bit clears).
    pub fn wait_ipi_delivery(&self) {
        const DELIVERY_STATUS: u32 = 1 << 12;
        while self.read(REG_ICR_LOW) & DELIVERY_STATUS != 0 {
            core::hint::spin_loop();
        }
    }

    /// Program the LVT timer in periodic mode with the given initial count.
    pub fn start_periodic_timer(&self, vector: u8, initial_count: u32, divide: TimerDivide) {
        self.write(REG_TIMER_DIVIDE, divide as u32);
        // Bit 17 = periodic mode
        self.write(REG_LVT_TIMER, (vector as u32) | (1 << 17));
        self.write(REG_TIMER_INITIAL_COUNT, initial_count);
    }

    /// Current countdown value of the APIC timer.
    pub fn timer_current_count(&self) -> u32 {
        self.read(REG_TIMER_CURRENT_COUNT)
    }
}

/// APIC timer divide configuration.
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub enum TimerDivide {
    Div1 = 0b1011,
    Div2 = 0b0000,
    Div4 = 0b0001,
    Div8 = 0b0010,
    Div16 = 0b0011,
}

fn apic_base_msr() -> u64 {
    unsafe {
        let (hi, lo): (u32, u32);
        core::arch::asm!(
            "rdmsr",
            in("ecx") IA32_APIC_BASE_MSR,
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack)
        );
        ((hi as u64) << 32) | lo as u64
    }
}

fn set_apic_base_msr(value: u64) {
    unsafe {
        let lo = value as u32;
        let hi = (value >> 32) as u32;
        core::arch::asm!(
            "wrmsr",
            in("ecx") IA32_APIC_BASE_MSR,
            in("eax") lo,
            in("edx") hi,
            options(nomem, nostack)
        );
    }
}

/// Initialize the Local APIC for the current CPU.
///
/// Must be called once per CPU (BSP and each AP) after the IDT is loaded,
/// since enabling the APIC begins accepting vectored interrupts immediately.
pub fn init() -> Result<(), &'static str> {
    let cpuid = CpuId::new();
    let has_apic = cpuid
        .get_feature_info()
        .map(|f| f.has_apic())
        .unwrap_or(false);

    if !has_apic {
        return Err("CPUID reports no Local APIC present");
    }

    let base_msr = apic_base_msr();
    let phys_base = base_msr & !0xFFFu64;
    let base = if phys_base != 0 { phys_base } else { DEFAULT_APIC_BASE };

    // Ensure the APIC is globally enabled (bit 11 of IA32_APIC_BASE)
    if base_msr & APIC_BASE_ENABLE == 0 {
        set_apic_base_msr(base_msr | APIC_BASE_ENABLE);
    }

    let id = unsafe { read_volatile((base + REG_ID) as *const u32) } >> 24;

    let apic = LocalApic { base, id };

    // Software-enable the APIC and set the spurious interrupt vector.
    apic.write(REG_SVR, (SPURIOUS_VECTOR as u32) | (1 << 8));

    *LOCAL_APIC.lock() = Some(apic);

    Ok(())
}

/// Acquire a handle to the current CPU's Local APIC, if initialized.
pub fn get() -> Option<ApicGuard> {
    let guard = LOCAL_APIC.lock();
    if guard.is_some() {
        Some(ApicGuard(guard))
    } else {
        None
    }
}

/// Guard returned by [`get`]; forwards the common accessors so callers can
/// use it either directly (`guard.id()`) or via `.as_ref()` for the full API.
pub struct ApicGuard<'a>(spin::MutexGuard<'a, Option<LocalApic>>);

impl<'a> ApicGuard<'a> {
    pub fn as_ref(&self) -> Option<&LocalApic> {
        self.0.as_ref()
    }

    pub fn id(&self) -> u32 {
        self.0.as_ref().map(|a| a.id).unwrap_or(0)
    }
}

/// Signal End-Of-Interrupt on the current CPU's Local APIC (no-op if the APIC
/// is not initialized, e.g. legacy-PIC-only systems).
pub fn end_of_interrupt() {
    if let Some(guard) = get() {
        if let Some(apic) = guard.as_ref() {
            apic.end_of_interrupt();
        }
    }
}

/// Local APIC ID of the current CPU, or 0 if the APIC hasn't been initialized.
pub fn local_apic_id() -> u32 {
    get().map(|g| g.id()).unwrap_or(0)
}

/// Total EOIs signalled across all CPUs (diagnostic counter).
pub fn eoi_count() -> u64 {
    EOI_COUNT.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipi_fields_encode_expected_bits() {
        // Startup IPI for trampoline at 0x8000 encodes vector 0x08
        if let IpiType::Startup(v) = IpiType::Startup((0x8000u64 >> 12) as u8) {
            assert_eq!(v, 0x08);
        } else {
            panic!("wrong variant");
        }
    }
}
