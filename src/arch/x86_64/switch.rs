//! Kernel-thread context switch (spec 4.4 step 6).
//!
//! The scheduler does not keep a separate saved-register struct per thread;
//! the callee-saved registers live on the thread's own kernel stack, and a
//! `Thread` only remembers its current stack pointer. `context_switch` pushes
//! the outgoing thread's callee-saved registers, swaps `rsp`, pops the
//! incoming thread's registers, and returns into whatever `rip` the new
//! stack's top pointed at — for a never-before-run thread that is
//! `thread_trampoline` (see `process::task::prime_kernel_stack`).

use core::arch::global_asm;

global_asm!(
    r#"
.global context_switch
context_switch:
    // rdi = &mut prev_sp (where to store the outgoing rsp)
    // rsi = next_sp (incoming rsp to load)
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    pushfq

    mov [rdi], rsp
    mov rsp, rsi

    popfq
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret
"#
);

extern "C" {
    /// Save the current kernel stack pointer into `*prev_sp`, switch to
    /// `next_sp`, and return into the new stack's saved return address.
    ///
    /// # Safety
    /// `next_sp` must point at a stack previously saved by this same
    /// function, or one primed by `prime_kernel_stack` with an identical
    /// layout (callee-saved regs, then RFLAGS, then a return address).
    pub fn context_switch(prev_sp: *mut u64, next_sp: u64);
}
