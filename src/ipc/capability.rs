/// Capability-based security for IPC objects (message queues, shared memory)
///
/// Distinct from [`crate::cap`]'s model-graph capabilities: this table guards
/// access to the IPC objects in this module only, the way the process table
/// keeps its own per-slot lock separate from the scheduler's ready-queue
/// locks (spec 5: lock ordering is process-slot -> ready-queue -> ipc-queue
/// -> capability-table).
use crate::lib::error::{Errno, Result};
use crate::process::Pid;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;

bitflags::bitflags! {
    /// Capability operations bitmask (spec S6 "Capability operations").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapOps: u32 {
        const READ     = 1 << 0;
        const WRITE    = 1 << 1;
        const CREATE   = 1 << 2;
        const DELETE   = 1 << 3;
        const ADMIN    = 1 << 4;
        const ENCRYPT  = 1 << 5;
        const PRIORITY = 1 << 6;
        const REALTIME = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Queue,
    Shm,
}

/// Max delegation depth for a granted-then-regranted capability.
pub const MAX_DELEGATION_DEPTH: u8 = 8;

/// Per-holder capability table cap (bounded, spec 3 "per-holder table is bounded").
const MAX_CAPS_PER_HOLDER: usize = 64;

#[derive(Clone)]
pub struct Capability {
    pub cap_id: u64,
    pub holder: Pid,
    pub object_id: u64,
    pub kind: ObjectKind,
    pub allowed_ops: CapOps,
    /// 0 == never expires.
    pub expiry: u64,
    pub revocable: bool,
    pub transferable: bool,
    pub delegation_depth: u8,
    pub delegator: Pid,
    pub use_count: u64,
    pub last_used: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CapStats {
    pub capability_checks: u64,
    pub security_violations: u64,
}

struct CapabilityTable {
    by_holder: alloc::collections::BTreeMap<Pid, Vec<Capability>>,
    next_id: u64,
}

impl CapabilityTable {
    fn new() -> Self {
        Self { by_holder: alloc::collections::BTreeMap::new(), next_id: 1 }
    }
}

static TABLE: Mutex<Option<CapabilityTable>> = Mutex::new(None);
static CHECKING_ENABLED: AtomicBool = AtomicBool::new(true);
static CAPABILITY_CHECKS: AtomicU64 = AtomicU64::new(0);
static SECURITY_VIOLATIONS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    *TABLE.lock() = Some(CapabilityTable::new());
}

/// Global kill-switch: when disabled, `validate` always succeeds. Used by
/// trusted kernel-internal callers and by tests that want to bypass ACLs.
pub fn set_checking_enabled(enabled: bool) {
    CHECKING_ENABLED.store(enabled, Ordering::SeqCst);
}

pub fn checking_enabled() -> bool {
    CHECKING_ENABLED.load(Ordering::SeqCst)
}

/// Grant a capability to `target_pid` for `object_id`/`kind`.
pub fn grant(
    granter: Pid,
    target_pid: Pid,
    object_id: u64,
    kind: ObjectKind,
    ops: CapOps,
    expiry: u64,
    revocable: bool,
    transferable: bool,
    delegation_depth: u8,
) -> Result<u64> {
    if delegation_depth > MAX_DELEGATION_DEPTH {
        return Err(Errno::EINVAL);
    }
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let entry = table.by_holder.entry(target_pid).or_insert_with(Vec::new);
    if entry.len() >= MAX_CAPS_PER_HOLDER {
        return Err(Errno::EMFILE);
    }
    let cap_id = table.next_id;
    table.next_id += 1;
    entry.push(Capability {
        cap_id,
        holder: target_pid,
        object_id,
        kind,
        allowed_ops: ops,
        expiry,
        revocable,
        transferable,
        delegation_depth,
        delegator: granter,
        use_count: 0,
        last_used: 0,
    });
    Ok(cap_id)
}

/// Revoke every capability a holder has for a given object.
pub fn revoke_for_object(holder: Pid, object_id: u64, kind: ObjectKind) {
    let mut guard = TABLE.lock();
    if let Some(table) = guard.as_mut() {
        if let Some(caps) = table.by_holder.get_mut(&holder) {
            caps.retain(|c| !(c.object_id == object_id && c.kind == kind && c.revocable));
        }
    }
}

/// Validate that `pid` may perform `op` on `object_id`/`kind`, bumping the
/// appropriate statistic. Returns Ok(()) iff checking is disabled globally,
/// or a matching, unexpired capability grants `op`.
pub fn validate(pid: Pid, object_id: u64, kind: ObjectKind, op: CapOps, now: u64) -> Result<()> {
    if !checking_enabled() {
        return Ok(());
    }
    CAPABILITY_CHECKS.fetch_add(1, Ordering::Relaxed);
    let mut guard = TABLE.lock();
    let table = match guard.as_mut() {
        Some(t) => t,
        None => {
            SECURITY_VIOLATIONS.fetch_add(1, Ordering::Relaxed);
            return Err(Errno::EACCES);
        }
    };
    let caps = match table.by_holder.get_mut(&pid) {
        Some(c) => c,
        None => {
            SECURITY_VIOLATIONS.fetch_add(1, Ordering::Relaxed);
            return Err(Errno::EACCES);
        }
    };
    for cap in caps.iter_mut() {
        if cap.object_id == object_id
            && cap.kind == kind
            && cap.allowed_ops.contains(op)
            && (cap.expiry == 0 || now < cap.expiry)
        {
            cap.use_count += 1;
            cap.last_used = now;
            return Ok(());
        }
    }
    SECURITY_VIOLATIONS.fetch_add(1, Ordering::Relaxed);
    Err(Errno::EACCES)
}

pub fn stats() -> CapStats {
    CapStats {
        capability_checks: CAPABILITY_CHECKS.load(Ordering::Relaxed),
        security_violations: SECURITY_VIOLATIONS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_then_validate_succeeds() {
        init();
        let cap = grant(0, 7, 42, ObjectKind::Queue, CapOps::READ | CapOps::WRITE, 0, true, false, 0).unwrap();
        assert!(cap > 0);
        assert!(validate(7, 42, ObjectKind::Queue, CapOps::READ, 100).is_ok());
    }

    #[test]
    fn missing_capability_is_denied_and_counted() {
        init();
        let before = stats().security_violations;
        let result = validate(99, 42, ObjectKind::Queue, CapOps::READ, 100);
        assert_eq!(result, Err(Errno::EACCES));
        assert_eq!(stats().security_violations, before + 1);
    }

    #[test]
    fn expired_capability_is_denied() {
        init();
        grant(0, 7, 1, ObjectKind::Shm, CapOps::READ, 50, true, false, 0).unwrap();
        assert!(validate(7, 1, ObjectKind::Shm, CapOps::READ, 10).is_ok());
        assert_eq!(validate(7, 1, ObjectKind::Shm, CapOps::READ, 51), Err(Errno::EACCES));
    }

    #[test]
    fn delegation_depth_over_max_rejected() {
        init();
        let res = grant(0, 7, 1, ObjectKind::Queue, CapOps::READ, 0, true, true, MAX_DELEGATION_DEPTH + 1);
        assert_eq!(res, Err(Errno::EINVAL));
    }

    #[test]
    fn checking_disabled_allows_anything() {
        init();
        set_checking_enabled(false);
        assert!(validate(123, 999, ObjectKind::Queue, CapOps::ADMIN, 0).is_ok());
        set_checking_enabled(true);
    }
}
