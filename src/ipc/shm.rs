/// NUMA-aware shared memory segments.
///
/// Segments are reference-counted frame lists (backed by [`crate::mm::pmm`])
/// rather than raw pointers, so attach/detach order across processes doesn't
/// matter. Capability checks gate attach the same way [`super::queue`] gates
/// send/receive.
use super::capability::{self, CapOps, ObjectKind};
use crate::lib::error::{Errno, Result};
use crate::mm;
use crate::process::Pid;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShmFlags: u32 {
        const NUMA_INTERLEAVED = 0x10;
        const COPY_ON_WRITE    = 0x20;
        const EXECUTABLE       = 0x40;
        const HUGE_PAGES       = 0x80;
        const PREFAULT         = 0x100;
    }
}

struct ShmSegment {
    id: u64,
    owner: Pid,
    size_bytes: usize,
    flags: ShmFlags,
    numa_node_hint: Option<u32>,
    frames: Vec<u64>,
    ref_count: u32,
}

struct ShmTable {
    segments: alloc::collections::BTreeMap<u64, ShmSegment>,
}

static TABLE: Mutex<Option<ShmTable>> = Mutex::new(None);
static NEXT_SHM_ID: AtomicU64 = AtomicU64::new(1);

pub fn init() {
    *TABLE.lock() = Some(ShmTable { segments: alloc::collections::BTreeMap::new() });
}

fn frames_needed(size_bytes: usize) -> usize {
    (size_bytes + mm::pmm::FRAME_SIZE as usize - 1) / mm::pmm::FRAME_SIZE as usize
}

/// Allocate a new segment, eagerly faulting in all frames if `PREFAULT` is
/// set (spec 4.6.2); otherwise frames are still allocated up front in this
/// implementation since there is no lazy page-fault path wired to shm yet.
pub fn create_shm(owner: Pid, size_bytes: usize, flags: ShmFlags, numa_node_hint: Option<u32>) -> Result<u64> {
    if size_bytes == 0 {
        return Err(Errno::EINVAL);
    }
    let n = frames_needed(size_bytes);
    let mut frames = Vec::with_capacity(n);
    for _ in 0..n {
        match mm::alloc_frame() {
            Some(f) => frames.push(f),
            None => {
                for f in frames.drain(..) {
                    mm::free_frame(f);
                }
                return Err(Errno::ENOMEM);
            }
        }
    }
    let id = NEXT_SHM_ID.fetch_add(1, Ordering::Relaxed);
    let seg = ShmSegment {
        id,
        owner,
        size_bytes,
        flags,
        numa_node_hint,
        frames,
        ref_count: 1,
    };
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    table.segments.insert(id, seg);
    drop(guard);

    capability::grant(
        owner,
        owner,
        id,
        ObjectKind::Shm,
        CapOps::READ | CapOps::WRITE | CapOps::DELETE | CapOps::ADMIN,
        0,
        true,
        true,
        0,
    )?;
    Ok(id)
}

/// Attach `pid` to `shm_id`, bumping the reference count. The segment's
/// owner always has implicit access; other processes need a capability
/// unless the segment was created without access control semantics.
pub fn attach(shm_id: u64, pid: Pid, now_us: u64) -> Result<()> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let seg = table.segments.get_mut(&shm_id).ok_or(Errno::EINVAL)?;
    if seg.owner != pid {
        capability::validate(pid, shm_id, ObjectKind::Shm, CapOps::READ, now_us)?;
    }
    seg.ref_count += 1;
    Ok(())
}

/// Detach `pid` from `shm_id`. The segment and its frames are freed once the
/// reference count hits zero.
pub fn detach(shm_id: u64, _pid: Pid) -> Result<()> {
    let mut guard = TABLE.lock();
    let table = guard.as_mut().ok_or(Errno::EINVAL)?;
    let seg = table.segments.get_mut(&shm_id).ok_or(Errno::EINVAL)?;
    if seg.ref_count == 0 {
        return Err(Errno::EINVAL);
    }
    seg.ref_count -= 1;
    if seg.ref_count == 0 {
        let seg = table.segments.remove(&shm_id).unwrap();
        for f in seg.frames {
            mm::free_frame(f);
        }
    }
    Ok(())
}

pub fn ref_count(shm_id: u64) -> Result<u32> {
    let guard = TABLE.lock();
    let table = guard.as_ref().ok_or(Errno::EINVAL)?;
    Ok(table.segments.get(&shm_id).ok_or(Errno::EINVAL)?.ref_count)
}

pub fn size_bytes(shm_id: u64) -> Result<usize> {
    let guard = TABLE.lock();
    let table = guard.as_ref().ok_or(Errno::EINVAL)?;
    Ok(table.segments.get(&shm_id).ok_or(Errno::EINVAL)?.size_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        mm::pmm::init_from_memory_map(&[mm::pmm::MemoryMapEntry {
            base: 0,
            length: 16 * 1024 * 1024,
            region_type: mm::pmm::REGION_AVAILABLE,
        }])
        .unwrap();
        init();
        capability::init();
    }

    #[test]
    fn create_attach_detach_frees_frames_at_zero_refcount() {
        setup();
        let before = mm::pmm_stats().free_frames;
        let id = create_shm(1, 4096 * 4, ShmFlags::empty(), None).unwrap();
        assert_eq!(ref_count(id).unwrap(), 1);
        attach(id, 1, 0).unwrap();
        assert_eq!(ref_count(id).unwrap(), 2);
        detach(id, 1).unwrap();
        assert_eq!(ref_count(id).unwrap(), 1);
        detach(id, 1).unwrap();
        assert_eq!(ref_count(id), Err(Errno::EINVAL));
        assert_eq!(mm::pmm_stats().free_frames, before);
    }

    #[test]
    fn attach_without_capability_is_denied() {
        setup();
        let id = create_shm(1, 4096, ShmFlags::empty(), None).unwrap();
        let result = attach(id, 42, 0);
        assert_eq!(result, Err(Errno::EACCES));
    }

    #[test]
    fn zero_size_segment_rejected() {
        setup();
        assert_eq!(create_shm(1, 0, ShmFlags::empty(), None), Err(Errno::EINVAL));
    }
}
