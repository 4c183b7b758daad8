/// Page fault bookkeeping.
///
/// Spec 4.2 / 9: the page fault handler prints diagnostics and halts
/// unconditionally (see `arch::x86_64::idt::page_fault_handler`). Real
/// demand-paging, copy-on-write, and swap-in are out of scope for this core
/// and are left to a VM subsystem that does not exist yet; this module only
/// decodes the error-code bits the handler prints.

/// The three bits the spec calls out for the page-fault error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultInfo {
    /// false = non-present page, true = protection violation.
    pub protection_violation: bool,
    pub write: bool,
    pub user_mode: bool,
}

/// Decode the x86_64 page-fault error code (bits 0, 1, 2).
pub fn decode_error_code(error_code: u64) -> FaultInfo {
    FaultInfo {
        protection_violation: error_code & 0x1 != 0,
        write: error_code & 0x2 != 0,
        user_mode: error_code & 0x4 != 0,
    }
}
