//! Exception/trap frame layout (spec 3: "Exception frame").
//!
//! CPU exceptions and legacy IRQs go through the `x86_64` crate's
//! `extern "x86-interrupt"` ABI, which already captures the CPU-pushed
//! {RIP, CS, RFLAGS, RSP, SS} portion as `InterruptStackFrame` and restores
//! every general-purpose register transparently on return. The one place in
//! this kernel that needs to capture GPRs by hand is the legacy `int 0x80`
//! syscall gate (see `crate::syscall`), since its handler must read the
//! caller's RAX/RBX/RCX/RDX argument registers. `ExceptionFrame` is that
//! snapshot.

/// Snapshot of all general-purpose registers plus the CPU-pushed iret frame,
/// in the order the `int 0x80` naked stub in `syscall` pushes them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    // CPU-pushed on interrupt/exception entry:
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}
