//! Hardware IRQ dispatch (vectors 32-47), layered on top of the legacy PIC.
//!
//! Implements the common dispatcher algorithm (spec 4.2): count every
//! interrupt, look up a registered handler, invoke it or log it as
//! unhandled, then always send EOI to the PIC(s).

use super::pic::{self, Irq};
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use x86_64::structures::idt::InterruptStackFrame;

/// Installation state of an IRQ gate (spec 4.2 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Uninstalled,
    InstalledNoHandler,
    InstalledWithHandler,
}

pub type IrqHandlerFn = fn(vector: u8);

struct HandlerTable {
    handlers: [Option<IrqHandlerFn>; 16],
    state: [GateState; 16],
}

static HANDLERS: Mutex<HandlerTable> = Mutex::new(HandlerTable {
    handlers: [None; 16],
    state: [GateState::InstalledNoHandler; 16],
});

static TOTAL: AtomicU64 = AtomicU64::new(0);
static EXCEPTIONS: AtomicU64 = AtomicU64::new(0);
static IRQS: AtomicU64 = AtomicU64::new(0);
static SPURIOUS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStats {
    pub total: u64,
    pub exceptions: u64,
    pub irqs: u64,
    pub spurious: u64,
}

pub fn stats() -> DispatchStats {
    DispatchStats {
        total: TOTAL.load(Ordering::Relaxed),
        exceptions: EXCEPTIONS.load(Ordering::Relaxed),
        irqs: IRQS.load(Ordering::Relaxed),
        spurious: SPURIOUS.load(Ordering::Relaxed),
    }
}

/// Bucket a dispatched vector as a CPU exception, for callers that want the
/// same total/exception/IRQ/spurious accounting from the exception handlers.
pub fn note_exception() {
    TOTAL.fetch_add(1, Ordering::Relaxed);
    EXCEPTIONS.fetch_add(1, Ordering::Relaxed);
}

/// Register a handler for `irq`. Replaces any previously-installed handler
/// atomically under the table lock (spec: reinstalling is permitted).
pub fn register_irq_handler(irq: Irq, handler: IrqHandlerFn) {
    let mut t = HANDLERS.lock();
    let idx = irq as usize;
    t.handlers[idx] = Some(handler);
    t.state[idx] = GateState::InstalledWithHandler;
}

pub fn gate_state(irq: Irq) -> GateState {
    HANDLERS.lock().state[irq as usize]
}

/// Common dispatcher body, called from each of the 16 per-vector ISR stubs.
fn common_dispatch(vector: u8) {
    TOTAL.fetch_add(1, Ordering::Relaxed);
    IRQS.fetch_add(1, Ordering::Relaxed);

    let spurious = unsafe { pic::PICS.lock().is_spurious(vector) };
    if spurious {
        SPURIOUS.fetch_add(1, Ordering::Relaxed);
    } else if let Some(irq) = Irq::from_vector(vector) {
        let handler = HANDLERS.lock().handlers[irq as usize];
        match handler {
            Some(f) => f(vector),
            None => crate::console::debug("unhandled IRQ, no handler registered"),
        }
    }

    // Spec 4.2 step 4: always EOI the primary PIC, and the secondary too
    // when the vector belongs to it. Unconditional, even for spurious/
    // unhandled vectors.
    unsafe {
        pic::end_of_interrupt(vector);
    }
}

macro_rules! irq_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            common_dispatch($vector);
        }
    };
}

irq_stub!(irq32_handler, 32);
irq_stub!(irq33_handler, 33);
irq_stub!(irq34_handler, 34);
irq_stub!(irq35_handler, 35);
irq_stub!(irq36_handler, 36);
irq_stub!(irq37_handler, 37);
irq_stub!(irq38_handler, 38);
irq_stub!(irq39_handler, 39);
irq_stub!(irq40_handler, 40);
irq_stub!(irq41_handler, 41);
irq_stub!(irq42_handler, 42);
irq_stub!(irq43_handler, 43);
irq_stub!(irq44_handler, 44);
irq_stub!(irq45_handler, 45);
irq_stub!(irq46_handler, 46);
irq_stub!(irq47_handler, 47);

/// Install gates 32-47 into `idt`. Called once from `idt::init_idt_early`.
pub fn install_gates(idt: &mut x86_64::structures::idt::InterruptDescriptorTable) {
    idt[32].set_handler_fn(irq32_handler);
    idt[33].set_handler_fn(irq33_handler);
    idt[34].set_handler_fn(irq34_handler);
    idt[35].set_handler_fn(irq35_handler);
    idt[36].set_handler_fn(irq36_handler);
    idt[37].set_handler_fn(irq37_handler);
    idt[38].set_handler_fn(irq38_handler);
    idt[39].set_handler_fn(irq39_handler);
    idt[40].set_handler_fn(irq40_handler);
    idt[41].set_handler_fn(irq41_handler);
    idt[42].set_handler_fn(irq42_handler);
    idt[43].set_handler_fn(irq43_handler);
    idt[44].set_handler_fn(irq44_handler);
    idt[45].set_handler_fn(irq45_handler);
    idt[46].set_handler_fn(irq46_handler);
    idt[47].set_handler_fn(irq47_handler);
}

/// Timer IRQ (vector 32): drive the PIT tick counter and the scheduler
/// tick (spec 4.2, 4.4).
fn timer_handler(_vector: u8) {
    super::pit::tick();
    crate::process::scheduler::timer_tick();
}

/// Keyboard IRQ (vector 33): drain the PS/2 controller's output byte and
/// hand it to the console input queue. The scancode-to-ASCII mapping is
/// deliberately minimal (bare US-layout subset); a real keyboard driver is
/// out of scope (spec 1, Out of scope: device drivers).
fn keyboard_handler(_vector: u8) {
    let scancode: u8 = unsafe { x86_64::instructions::port::Port::new(0x60).read() };
    crate::console::push_scancode(scancode);
}

/// Hook the timer and keyboard handlers and unmask their IRQ lines. Must
/// run after `pic::init()`.
pub fn init() {
    register_irq_handler(Irq::Timer, timer_handler);
    register_irq_handler(Irq::Keyboard, keyboard_handler);
    unsafe {
        pic::enable_irq(Irq::Timer);
        pic::enable_irq(Irq::Keyboard);
    }
}
